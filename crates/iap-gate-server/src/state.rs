//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use axum::http::HeaderName;
use iap_gate_auth::{IdentityResolver, TokenVerifier};
use iap_gate_store::UserStore;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<S, V>
where
    S: UserStore,
    V: TokenVerifier,
{
    /// Verifier for identity assertions.
    pub verifier: Arc<V>,
    /// Maps verified claims to local users.
    pub resolver: Arc<IdentityResolver<S>>,
    /// Header carrying the assertion.
    pub token_header: HeaderName,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<S, V> GatewayState<S, V>
where
    S: UserStore,
    V: TokenVerifier,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        verifier: Arc<V>,
        resolver: Arc<IdentityResolver<S>>,
        token_header: HeaderName,
        config: GatewayConfig,
    ) -> Self {
        Self {
            verifier,
            resolver,
            token_header,
            config,
        }
    }
}

impl<S, V> Clone for GatewayState<S, V>
where
    S: UserStore,
    V: TokenVerifier,
{
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
            resolver: Arc::clone(&self.resolver),
            token_header: self.token_header.clone(),
            config: self.config.clone(),
        }
    }
}
