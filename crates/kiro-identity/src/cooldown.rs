use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use kiro_common::IdentityId;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    RateLimit,
    AuthInvalid,
    Manual,
}

#[derive(Debug, Clone)]
struct CooldownRecord {
    exceeded_at: OffsetDateTime,
    cooldown_until: OffsetDateTime,
    reason: CooldownReason,
}

/// C3: process-local, unpersisted cooldown table. Entries expire by plain
/// timestamp comparison in `available` — there is no background sweeper,
/// matching the "no persistence, reset on restart" contract.
#[derive(Default)]
pub struct CooldownTable {
    records: RwLock<HashMap<IdentityId, CooldownRecord>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark(&self, id: &IdentityId, reason: CooldownReason, duration: Duration) {
        let now = OffsetDateTime::now_utc();
        let until = now + duration;
        self.records.write().await.insert(
            id.clone(),
            CooldownRecord {
                exceeded_at: now,
                cooldown_until: until,
                reason,
            },
        );
    }

    pub async fn available(&self, id: &IdentityId) -> bool {
        match self.records.read().await.get(id) {
            Some(record) => OffsetDateTime::now_utc() >= record.cooldown_until,
            None => true,
        }
    }

    pub async fn restore(&self, id: &IdentityId) {
        self.records.write().await.remove(id);
    }

    pub async fn until(&self, id: &IdentityId) -> Option<OffsetDateTime> {
        self.records
            .read()
            .await
            .get(id)
            .filter(|record| OffsetDateTime::now_utc() < record.cooldown_until)
            .map(|record| record.cooldown_until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_identity_is_available() {
        let table = CooldownTable::new();
        let id = IdentityId::from("acct-1");
        assert!(table.available(&id).await);
    }

    #[tokio::test]
    async fn marked_identity_is_unavailable_until_restored() {
        let table = CooldownTable::new();
        let id = IdentityId::from("acct-1");
        table.mark(&id, CooldownReason::RateLimit, Duration::from_secs(60)).await;
        assert!(!table.available(&id).await);
        table.restore(&id).await;
        assert!(table.available(&id).await);
    }

    #[tokio::test]
    async fn zero_duration_cooldown_expires_immediately() {
        let table = CooldownTable::new();
        let id = IdentityId::from("acct-1");
        table.mark(&id, CooldownReason::Manual, Duration::from_secs(0)).await;
        assert!(table.available(&id).await);
    }
}
