//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use iap_gate_auth::TokenVerifier;
use iap_gate_store::UserStore;

use crate::auth::require_iap_identity;
use crate::handlers::{health, me};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Authenticated
/// - `GET /v1/me` - The current user
pub fn create_router<S, V>(state: GatewayState<S, V>) -> Router
where
    S: UserStore + 'static,
    V: TokenVerifier + 'static,
{
    let request_timeout = state.config.request_timeout();
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/v1/me", get(me::get_me::<S, V>))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_iap_identity::<S, V>,
        ));

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        .merge(protected)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
