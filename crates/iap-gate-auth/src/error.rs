//! Authentication error types.

use iap_gate_store::StoreError;
use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while authenticating an identity assertion.
///
/// Every variant leads to the same rejection at the HTTP boundary. The
/// variants exist so that operators can tell causes apart in logs.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The signing keys could not be fetched from the key endpoint.
    #[error("failed to fetch signing keys: {0}")]
    FetchError(String),

    /// The token could not be parsed, or its header lacks a key id.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The key id in the token header is not served by the key endpoint.
    #[error("unknown signing key: {0}")]
    UnknownSigningKey(String),

    /// The key endpoint served key material that is not a valid EC public key.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// The token signature (or its declared algorithm) is invalid.
    #[error("invalid signature")]
    SignatureInvalid,

    /// The `aud` claim is missing or does not match the expected audience.
    #[error("audience mismatch")]
    AudienceMismatch,

    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The token's `nbf` claim lies in the future.
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// A claim needed to derive the local identity is absent.
    #[error("missing required claim: {0}")]
    MissingClaims(String),

    /// The user store failed.
    #[error("user store unavailable: {0}")]
    StoreUnavailable(String),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// A stable label for this failure, used as a structured log field.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::FetchError(_) => "fetch_error",
            Self::MalformedToken(_) => "malformed_token",
            Self::UnknownSigningKey(_) => "unknown_signing_key",
            Self::InvalidKey(_) => "invalid_key",
            Self::SignatureInvalid => "signature_invalid",
            Self::AudienceMismatch => "audience_mismatch",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::MissingClaims(_) => "missing_claims",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Config(_) => "config",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
