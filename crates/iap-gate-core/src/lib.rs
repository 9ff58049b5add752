//! Core types for iap-gate.
//!
//! This crate provides the identifier types shared by the store, the
//! authentication engine and the HTTP server.
//!
//! # Example
//!
//! ```
//! use iap_gate_core::UserId;
//!
//! let user_id = UserId::generate();
//! let parsed: UserId = user_id.to_string().parse().unwrap();
//! assert_eq!(user_id, parsed);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{IdError, UserId};
