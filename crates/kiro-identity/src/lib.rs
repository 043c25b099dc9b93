//! The identity pool: credential storage and refresh (C2), cooldown
//! tracking (C3), account scheduling (C4), and per-identity rate limiting
//! (C5).

pub mod cooldown;
pub mod model;
pub mod persist;
pub mod ratelimit;
pub mod scheduler;
pub mod store;

pub use cooldown::{CooldownReason, CooldownTable, DEFAULT_COOLDOWN};
pub use model::{Credentials, Identity};
pub use persist::PersistError;
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use scheduler::Scheduler;
pub use store::{CredentialRefresher, CredentialStore, RefreshError, StoreError};
