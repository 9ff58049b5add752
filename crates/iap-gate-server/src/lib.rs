//! HTTP gateway for services behind an identity-aware proxy.
//!
//! Every protected request must carry the proxy's signed assertion. The
//! gateway verifies it, binds the request to a local user, and rejects
//! everything else with 403.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Identity-Aware Proxy                        │
//! │            (adds x-goog-iap-jwt-assertion)                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     iap-gate-server                          │
//! │  ┌─────────────────────┐        ┌─────────────────────┐     │
//! │  │ require_iap_identity│───────▶│  Router + Handlers  │     │
//! │  │ (middleware)        │        │  (AuthUser)         │     │
//! │  └─────────────────────┘        └─────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//!               │                              │
//!               ▼                              ▼
//!        ┌──────────────┐               ┌──────────────┐
//!        │ IapVerifier  │               │  UserStore   │
//!        │ + KeyStore   │               │  (RocksDB)   │
//!        └──────────────┘               └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use iap_gate_auth::{IapVerifier, IdentityResolver, VerifierConfig};
//! use iap_gate_server::{auth, create_router, GatewayConfig, GatewayState};
//! use iap_gate_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier_config = VerifierConfig::from_env()?;
//! let store = Arc::new(RocksStore::open("/tmp/iap-gate")?);
//!
//! let state = GatewayState::new(
//!     Arc::new(IapVerifier::from_config(&verifier_config)?),
//!     Arc::new(IdentityResolver::new(store, &verifier_config)),
//!     auth::token_header(&verifier_config.header_name())?,
//!     GatewayConfig::default(),
//! );
//!
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

pub use auth::{AuthOutcome, AuthUser};
