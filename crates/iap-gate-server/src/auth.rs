//! Authentication middleware and extractors.
//!
//! [`require_iap_identity`] authenticates every request on the routes it
//! wraps. It reads the proxy's assertion from the configured header, verifies
//! it, resolves the local user and stores an [`AuthUser`] in the request
//! extensions. Handlers take [`AuthUser`] as an extractor.
//!
//! Every failure produces the same 403 response. The individual cause is only
//! visible in the logs.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use tracing::instrument;

use iap_gate_auth::{AuthError, IdentityResolver, TokenVerifier};
use iap_gate_core::UserId;
use iap_gate_store::{LocalIdentity, UserStore};

use crate::error::ApiError;
use crate::state::GatewayState;

/// The local user bound to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    /// The local user id.
    pub user_id: UserId,
    /// The local username.
    pub username: String,
    /// The user's email.
    pub email: String,
    /// Whether the user is staff.
    pub is_staff: bool,
    /// Whether the user is a superuser.
    pub is_superuser: bool,
}

impl From<LocalIdentity> for AuthUser {
    fn from(user: LocalIdentity) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            email: user.email,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        }
    }
}

/// Result of authenticating one request.
#[derive(Debug)]
pub enum AuthOutcome {
    /// The request carries no usable assertion.
    NoToken,
    /// The assertion failed verification, or no user could be resolved from it.
    TokenInvalid(AuthError),
    /// The request belongs to this user.
    Resolved(AuthUser),
}

/// Read the raw assertion from `headers`.
///
/// Returns `None` if the header is absent, empty, or not visible ASCII.
#[must_use]
pub fn extract_token(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Parse the configured assertion header name.
///
/// # Errors
///
/// Returns `AuthError::Config` if the name is not a valid HTTP header name.
pub fn token_header(name: &str) -> Result<HeaderName, AuthError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| AuthError::Config(format!("invalid header name {name:?}: {e}")))
}

/// Authenticate a request from its headers.
///
/// No verification or store access happens when the header is missing.
pub async fn authenticate<S, V>(
    verifier: &V,
    resolver: &IdentityResolver<S>,
    headers: &HeaderMap,
    header: &HeaderName,
) -> AuthOutcome
where
    S: UserStore,
    V: TokenVerifier + ?Sized,
{
    let Some(token) = extract_token(headers, header) else {
        return AuthOutcome::NoToken;
    };

    let claims = match verifier.verify(&token).await {
        Ok(claims) => claims,
        Err(err) => return AuthOutcome::TokenInvalid(err),
    };

    match resolver.resolve(&claims) {
        Ok(user) => AuthOutcome::Resolved(user.into()),
        Err(err) => AuthOutcome::TokenInvalid(err),
    }
}

/// Middleware rejecting requests that do not carry a valid assertion.
///
/// Requests that already carry an [`AuthUser`] pass through untouched, so
/// stacking this layer never verifies a request twice.
#[instrument(skip_all, name = "gateway.auth")]
pub async fn require_iap_identity<S, V>(
    State(state): State<Arc<GatewayState<S, V>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: UserStore + 'static,
    V: TokenVerifier + 'static,
{
    if req.extensions().get::<AuthUser>().is_some() {
        return Ok(next.run(req).await);
    }

    let outcome = authenticate(
        state.verifier.as_ref(),
        &state.resolver,
        req.headers(),
        &state.token_header,
    )
    .await;

    match outcome {
        AuthOutcome::Resolved(user) => {
            tracing::debug!(
                user_id = %user.user_id,
                username = %user.username,
                "Request authenticated"
            );
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        AuthOutcome::NoToken => {
            tracing::info!(
                header = %state.token_header,
                reason = "no_token",
                path = %req.uri().path(),
                "Rejected request"
            );
            Err(ApiError::Forbidden)
        }
        AuthOutcome::TokenInvalid(err) => {
            tracing::warn!(
                reason = err.reason(),
                error = %err,
                path = %req.uri().path(),
                "Rejected request"
            );
            Err(ApiError::Forbidden)
        }
    }
}

#[axum::async_trait]
impl<St> FromRequestParts<St> for AuthUser
where
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(ApiError::Forbidden)
    }
}
