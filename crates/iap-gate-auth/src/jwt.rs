//! IAP assertion verification.
//!
//! This module provides the signature, audience and time-validity checks for
//! the ES256 JWT that the identity-aware proxy attaches to every request.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::config::VerifierConfig;
use crate::error::{AuthError, Result};
use crate::keys::KeyStore;

/// The proxy signs assertions with ECDSA P-256 / SHA-256.
const ALGORITHM: Algorithm = Algorithm::ES256;

/// Clock skew tolerated on `exp`, `nbf` and `iat`, in seconds.
const LEEWAY_SECONDS: u64 = 60;

/// The claim set of a token that passed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    /// Wrap a claim set without verifying it.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn from_unverified(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Get a string claim. Non-string claims read as absent.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Get a claim of any JSON type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Trait for verifying identity assertions.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, signed by an unknown key,
    /// carries an invalid signature, targets another audience, or is outside
    /// its validity window.
    async fn verify(&self, token: &str) -> Result<VerifiedClaims>;
}

/// Verifies IAP assertions against the keys held by a [`KeyStore`].
pub struct IapVerifier {
    keys: Arc<KeyStore>,
    audience: String,
}

impl IapVerifier {
    /// Create a verifier sharing an existing key store.
    #[must_use]
    pub fn new(config: &VerifierConfig, keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            audience: config.audience(),
        }
    }

    /// Create a verifier with its own key store.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the key store cannot be built.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        let keys = Arc::new(KeyStore::from_config(config)?);
        Ok(Self::new(config, keys))
    }

    /// The expected `aud` claim.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// The key store backing this verifier.
    #[must_use]
    pub const fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = LEEWAY_SECONDS;
        validation
    }

    /// Checks jsonwebtoken leaves out: `aud` must be a single string, and
    /// `iat` must be present and not in the future.
    fn check_claims(&self, claims: &Map<String, Value>) -> Result<()> {
        if claims.get("aud").and_then(Value::as_str) != Some(self.audience.as_str()) {
            return Err(AuthError::AudienceMismatch);
        }

        let issued_at = claims
            .get("iat")
            .and_then(Value::as_f64)
            .ok_or_else(|| AuthError::MalformedToken("missing iat".to_string()))?;
        #[allow(clippy::cast_precision_loss)]
        let latest = chrono::Utc::now().timestamp() as f64 + LEEWAY_SECONDS as f64;
        if issued_at > latest {
            return Err(AuthError::TokenNotYetValid);
        }

        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for IapVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims> {
        let header =
            decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("missing kid".to_string()))?;

        let pem = self.keys.get(&kid).await?;
        let key = DecodingKey::from_ec_pem(pem.as_bytes())
            .map_err(|e| AuthError::InvalidKey(format!("{kid}: {e}")))?;

        let token_data = decode::<Map<String, Value>>(token, &key, &self.validation())
            .map_err(map_decode_error)?;
        self.check_claims(&token_data.claims)?;

        tracing::debug!(kid = %kid, "Verified IAP assertion");
        Ok(VerifiedClaims(token_data.claims))
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::SignatureInvalid,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::MalformedToken(format!("missing {claim}"))
        }
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
            AuthError::InvalidKey(err.to_string())
        }
        _ => AuthError::MalformedToken(err.to_string()),
    }
}
