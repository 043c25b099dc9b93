//! Shared primitives used across the kiro-proxy workspace.
//!
//! This crate intentionally stays free of async runtimes and HTTP types —
//! it only carries the small vocabulary every other crate needs: identity
//! ids, the auth-method enum, and the external client-facing error taxonomy.

pub mod client_error;
pub mod ids;

pub use client_error::{ClientError, ClientErrorKind};
pub use ids::IdentityId;

/// The three credential refresh dances a stored identity may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Device,
    Social,
    Idc,
}

/// Lifecycle status of a pooled identity (§3 DATA MODEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    #[default]
    Active,
    Unhealthy,
    Suspended,
}
