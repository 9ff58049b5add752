//! Identity-Aware Proxy assertion verification for iap-gate.
//!
//! This crate provides:
//!
//! - Signing key fetching and caching with refetch-on-miss
//! - ES256 signature, audience and validity checks
//! - Mapping verified claims to local users with allow-list promotion
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│  TokenVerifier   │
//! │   (HTTP)         │     │  (trait)         │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │
//!          │               ┌────────▼─────────┐
//!          │               │   IapVerifier    │
//!          │               └────────┬─────────┘
//!          │                        │
//!          │               ┌────────▼─────────┐
//!          │               │    KeyStore      │
//!          │               │   (key cache)    │
//!          │               └────────┬─────────┘
//!          │                        │ HTTPS
//!          │               ┌────────▼─────────┐
//!          │               │  IAP public key  │
//!          │               │  endpoint        │
//!          │               └──────────────────┘
//!          │
//! ┌────────▼─────────┐     ┌──────────────────┐
//! │ IdentityResolver │────▶│    UserStore     │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use iap_gate_auth::{IapVerifier, IdentityResolver, TokenVerifier, VerifierConfig};
//! use iap_gate_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig {
//!     project_id: "my-project".to_string(),
//!     project_numeric_id: "1234567890".to_string(),
//!     ..VerifierConfig::default()
//! };
//!
//! let verifier = IapVerifier::from_config(&config)?;
//! let resolver = IdentityResolver::new(MemoryStore::new(), &config);
//!
//! // In a request handler:
//! let token = "eyJhbGciOiJFUzI1NiIsImtpZCI6Ii4uLiJ9...";
//! let claims = verifier.verify(token).await?;
//! let user = resolver.resolve(&claims)?;
//!
//! println!("User: {} ({})", user.username, user.id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod resolver;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use config::VerifierConfig;
pub use error::{AuthError, Result};
pub use jwt::{IapVerifier, TokenVerifier, VerifiedClaims};
pub use keys::{KeyStore, SigningKeySet};
pub use resolver::IdentityResolver;
