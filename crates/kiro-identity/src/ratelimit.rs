use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use kiro_common::IdentityId;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    started_at: OffsetDateTime,
    count: u32,
}

/// C5: per-identity fixed-window rate limiter. The engine never switches
/// identities for this — it sleeps `wait_seconds` and re-asks.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: RwLock<HashMap<IdentityId, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `(ok, wait_seconds, reason)`. When `ok` is false the caller
    /// should sleep `wait_seconds` before re-asking.
    pub async fn can_request(&self, id: &IdentityId) -> (bool, f64, Option<&'static str>) {
        let now = OffsetDateTime::now_utc();
        let mut windows = self.windows.write().await;
        let window = windows.entry(id.clone()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if (now - window.started_at).as_seconds_f64() >= self.config.window.as_secs_f64() {
            window.started_at = now;
            window.count = 0;
        }

        if window.count < self.config.max_requests {
            window.count += 1;
            return (true, 0.0, None);
        }

        let elapsed = now - window.started_at;
        let remaining = self.config.window.as_secs_f64() - elapsed.as_seconds_f64();
        (false, remaining.max(0.0), Some("rate_limit_window_exhausted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new(RateLimitConfig { max_requests: 2, window: Duration::from_secs(60) });
        let id = IdentityId::from("a");
        assert!(limiter.can_request(&id).await.0);
        assert!(limiter.can_request(&id).await.0);
    }

    #[tokio::test]
    async fn blocks_once_the_window_is_exhausted() {
        let limiter = RateLimiter::new(RateLimitConfig { max_requests: 1, window: Duration::from_secs(60) });
        let id = IdentityId::from("a");
        assert!(limiter.can_request(&id).await.0);
        let (ok, wait, reason) = limiter.can_request(&id).await;
        assert!(!ok);
        assert!(wait > 0.0);
        assert_eq!(reason, Some("rate_limit_window_exhausted"));
    }
}
