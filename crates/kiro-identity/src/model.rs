use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use kiro_common::{AuthMethod, IdentityId, IdentityStatus};

/// A long-lived account record. Credentials are loaded lazily from
/// `credential_path` and cached by the store alongside this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub enabled: bool,
    pub credential_path: String,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub last_used: Option<OffsetDateTime>,
    #[serde(default)]
    pub status: IdentityStatus,
    /// Opt-in: identities with affinity disabled are never preferred by a
    /// session fingerprint, only picked by rank.
    #[serde(default = "default_true")]
    pub affinity_opt_in: bool,
}

fn default_true() -> bool {
    true
}

impl Identity {
    pub fn is_schedulable_status(&self) -> bool {
        matches!(self.status, IdentityStatus::Active | IdentityStatus::Unhealthy)
    }
}

/// The credential blob persisted at `Identity::credential_path`, and the
/// in-memory cached form the store hands back from `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub auth_method: AuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
    /// Absolute expiry, unix seconds.
    pub expires_at: i64,
}

impl Credentials {
    /// Usable iff the access token is non-empty and not within `skew` of expiry.
    pub fn usable(&self, skew_seconds: i64) -> bool {
        !self.access_token.is_empty() && !self.expiring_soon(skew_seconds)
    }

    pub fn expiring_soon(&self, skew_seconds: i64) -> bool {
        now_unix() + skew_seconds >= self.expires_at
    }

    pub fn expired(&self) -> bool {
        self.expiring_soon(0)
    }
}

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
