//! # sporta_core
//!
//! Core domain logic for Sporta: token issuance, session orchestration,
//! and the credential/cache store abstractions they run on.

pub mod auth;
pub mod cache;
pub mod config;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
