//! Process-wide configuration (§3 "Config (ambient, new)"). Loaded once at
//! startup from TOML, overlaid by `KIRO_PROXY_`-prefixed environment
//! variables, then frozen behind an `Arc` for the lifetime of the process.
//! Merge style follows the teacher's `GlobalConfig`/`GlobalConfigPatch`
//! split (patch-then-finalize), simplified here since there is no database
//! layer to merge against.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kiro_adapters::{ErrorMarkers, HistoryBudget};
use kiro_identity::RateLimitConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("identity pool must not be empty")]
    EmptyIdentityPool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub id: String,
    pub display_name: String,
    pub credential_path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub affinity_opt_in: bool,
}

fn default_true() -> bool {
    true
}

/// Final, merged configuration used by the running process.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub identities: Vec<IdentityConfig>,
    pub upstream_url: String,
    pub cooldown_default: Duration,
    pub history_budget: HistoryBudget,
    pub rate_limit: RateLimitConfig,
    pub non_stream_timeout: Duration,
    pub stream_timeout: Duration,
    pub error_markers: ErrorMarkers,
    pub machine_id: String,
}

/// TOML-shaped representation; every field optional so environment
/// overlay and defaulting can fill gaps (mirrors `GlobalConfigPatch`).
#[derive(Debug, Clone, Default, Deserialize)]
struct ProxyConfigPatch {
    bind_host: Option<String>,
    bind_port: Option<u16>,
    #[serde(default)]
    identities: Vec<IdentityConfig>,
    upstream_url: Option<String>,
    cooldown_default_secs: Option<u64>,
    history_max_chars: Option<usize>,
    history_max_turns: Option<usize>,
    rate_limit_max_requests: Option<u32>,
    rate_limit_window_secs: Option<u64>,
    non_stream_timeout_secs: Option<u64>,
    stream_timeout_secs: Option<u64>,
    length_error_markers: Option<Vec<String>>,
    quota_markers: Option<Vec<String>>,
    machine_id: Option<String>,
}

impl ProxyConfigPatch {
    fn overlay_env(&mut self, env: &HashMap<String, String>) {
        if let Some(v) = env.get("KIRO_PROXY_BIND_HOST") {
            self.bind_host = Some(v.clone());
        }
        if let Some(v) = env.get("KIRO_PROXY_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = Some(v);
        }
        if let Some(v) = env.get("KIRO_PROXY_COOLDOWN_DEFAULT_SECS").and_then(|v| v.parse().ok()) {
            self.cooldown_default_secs = Some(v);
        }
        if let Some(v) = env.get("KIRO_PROXY_NON_STREAM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.non_stream_timeout_secs = Some(v);
        }
        if let Some(v) = env.get("KIRO_PROXY_STREAM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.stream_timeout_secs = Some(v);
        }
        if let Some(v) = env.get("KIRO_PROXY_MACHINE_ID") {
            self.machine_id = Some(v.clone());
        }
        if let Some(v) = env.get("KIRO_PROXY_UPSTREAM_URL") {
            self.upstream_url = Some(v.clone());
        }
    }

    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        if self.identities.is_empty() {
            return Err(ConfigError::EmptyIdentityPool);
        }
        let length_error_markers = self.length_error_markers;
        let quota_markers = self.quota_markers;
        let error_markers = match (length_error_markers, quota_markers) {
            (None, None) => ErrorMarkers::default(),
            (length, quota) => {
                let defaults = ErrorMarkers::default();
                ErrorMarkers {
                    length_error: length.unwrap_or(defaults.length_error),
                    quota: quota.unwrap_or(defaults.quota),
                }
            }
        };
        let default_history = HistoryBudget::default();
        let default_rate_limit = RateLimitConfig::default();

        Ok(ProxyConfig {
            bind_host: self.bind_host.unwrap_or_else(|| "0.0.0.0".to_string()),
            bind_port: self.bind_port.unwrap_or(8080),
            identities: self.identities,
            upstream_url: self.upstream_url.unwrap_or_else(|| {
                "https://codewhisperer.us-east-1.amazonaws.com/generateAssistantResponse".to_string()
            }),
            cooldown_default: Duration::from_secs(self.cooldown_default_secs.unwrap_or(15 * 60)),
            history_budget: HistoryBudget {
                max_chars: self.history_max_chars.unwrap_or(default_history.max_chars),
                max_turns: self.history_max_turns.unwrap_or(default_history.max_turns),
            },
            rate_limit: RateLimitConfig {
                max_requests: self.rate_limit_max_requests.unwrap_or(default_rate_limit.max_requests),
                window: Duration::from_secs(self.rate_limit_window_secs.unwrap_or(60)),
            },
            non_stream_timeout: Duration::from_secs(self.non_stream_timeout_secs.unwrap_or(120)),
            stream_timeout: Duration::from_secs(self.stream_timeout_secs.unwrap_or(300)),
            error_markers,
            machine_id: self.machine_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        })
    }
}

/// Loads `path` as TOML, overlays `KIRO_PROXY_*` environment variables,
/// and finalizes into a `ProxyConfig`. Called once at startup.
pub fn load(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut patch: ProxyConfigPatch = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    let env: HashMap<String, String> = std::env::vars().collect();
    patch.overlay_env(&env);
    patch.into_config()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_sane_defaults() {
        let patch: ProxyConfigPatch = toml::from_str(
            r#"
            [[identities]]
            id = "acct-1"
            display_name = "Account One"
            credential_path = "/tmp/acct-1.json"
            "#,
        )
        .unwrap();
        let config = patch.into_config().unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.identities.len(), 1);
        assert!(config.identities[0].enabled);
        assert_eq!(config.non_stream_timeout, Duration::from_secs(120));
        assert_eq!(config.stream_timeout, Duration::from_secs(300));
    }

    #[test]
    fn empty_identity_pool_is_rejected() {
        let patch = ProxyConfigPatch::default();
        assert!(matches!(patch.into_config(), Err(ConfigError::EmptyIdentityPool)));
    }

    #[test]
    fn env_overlay_wins_over_toml() {
        let mut patch: ProxyConfigPatch = toml::from_str(
            r#"
            bind_port = 9000
            [[identities]]
            id = "acct-1"
            display_name = "Account One"
            credential_path = "/tmp/acct-1.json"
            "#,
        )
        .unwrap();
        let mut env = HashMap::new();
        env.insert("KIRO_PROXY_BIND_PORT".to_string(), "9100".to_string());
        patch.overlay_env(&env);
        let config = patch.into_config().unwrap();
        assert_eq!(config.bind_port, 9100);
    }
}
