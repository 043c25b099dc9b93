use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use kiro_common::{IdentityId, IdentityStatus};

use crate::cooldown::CooldownTable;
use crate::model::Identity;
use crate::store::CredentialStore;

/// C4: picks an identity for a request, preferring session affinity when a
/// fingerprint is given and falling back to a least-recently-used rank.
pub struct Scheduler {
    store: Arc<CredentialStore>,
    cooldowns: Arc<CooldownTable>,
    affinity: RwLock<HashMap<String, IdentityId>>,
}

impl Scheduler {
    pub fn new(store: Arc<CredentialStore>, cooldowns: Arc<CooldownTable>) -> Self {
        Self {
            store,
            cooldowns,
            affinity: RwLock::new(HashMap::new()),
        }
    }

    async fn candidates(&self) -> Vec<Identity> {
        let mut out = Vec::new();
        for identity in self.store.identities().await {
            if !identity.enabled || !identity.is_schedulable_status() {
                continue;
            }
            if self.cooldowns.available(&identity.id).await {
                out.push(identity);
            }
        }
        out
    }

    fn rank(candidates: &mut [Identity]) {
        candidates.sort_by(|a, b| {
            let a_active = a.status == IdentityStatus::Active;
            let b_active = b.status == IdentityStatus::Active;
            b_active
                .cmp(&a_active)
                .then_with(|| a.last_used.cmp(&b.last_used))
                .then_with(|| a.request_count.cmp(&b.request_count))
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
    }

    /// Picks an identity, preferring the one previously used for
    /// `fingerprint` when it is still a viable candidate.
    pub async fn pick(&self, fingerprint: Option<&str>) -> Option<Identity> {
        let mut candidates = self.candidates().await;
        if candidates.is_empty() {
            return None;
        }
        Self::rank(&mut candidates);

        if let Some(fp) = fingerprint {
            let preferred_id = self.affinity.read().await.get(fp).cloned();
            if let Some(preferred_id) = preferred_id
                && let Some(preferred) = candidates
                    .iter()
                    .find(|c| c.id == preferred_id && c.affinity_opt_in)
                    .cloned()
            {
                self.remember(fp, &preferred.id).await;
                return Some(preferred);
            }
        }

        let chosen = candidates.into_iter().next()?;
        if let Some(fp) = fingerprint {
            self.remember(fp, &chosen.id).await;
        }
        Some(chosen)
    }

    /// Highest-ranked candidate excluding `current`; used on failover.
    pub async fn next_other_than(&self, current: &IdentityId) -> Option<Identity> {
        let mut candidates = self.candidates().await;
        candidates.retain(|c| &c.id != current);
        if candidates.is_empty() {
            return None;
        }
        Self::rank(&mut candidates);
        candidates.into_iter().next()
    }

    async fn remember(&self, fingerprint: &str, id: &IdentityId) {
        self.affinity.write().await.insert(fingerprint.to_string(), id.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::model::Credentials;
    use crate::store::{CredentialRefresher, RefreshError};

    struct NoopRefresher;

    #[async_trait]
    impl CredentialRefresher for NoopRefresher {
        async fn refresh(&self, _identity: &Identity, _current: &Credentials) -> Result<Credentials, RefreshError> {
            Err(RefreshError::new("not implemented"))
        }
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: IdentityId::from(id),
            display_name: id.to_string(),
            enabled: true,
            credential_path: format!("/tmp/{id}.json"),
            request_count: 0,
            error_count: 0,
            last_used: None,
            status: IdentityStatus::Active,
            affinity_opt_in: true,
        }
    }

    async fn fixture(ids: &[&str]) -> (Arc<CredentialStore>, Arc<CooldownTable>, Scheduler) {
        let store = Arc::new(CredentialStore::new(Arc::new(NoopRefresher)));
        for id in ids {
            store.register(identity(id)).await;
        }
        let cooldowns = Arc::new(CooldownTable::new());
        let scheduler = Scheduler::new(store.clone(), cooldowns.clone());
        (store, cooldowns, scheduler)
    }

    #[tokio::test]
    async fn returns_none_when_no_candidates() {
        let (_store, _cooldowns, scheduler) = fixture(&[]).await;
        assert!(scheduler.pick(None).await.is_none());
    }

    #[tokio::test]
    async fn skips_cooled_down_identities() {
        let (_store, cooldowns, scheduler) = fixture(&["a", "b"]).await;
        cooldowns
            .mark(&IdentityId::from("a"), crate::cooldown::CooldownReason::RateLimit, Duration::from_secs(60))
            .await;
        let picked = scheduler.pick(None).await.expect("one candidate remains");
        assert_eq!(picked.id.as_str(), "b");
    }

    #[tokio::test]
    async fn affinity_prefers_previously_used_identity() {
        let (_store, _cooldowns, scheduler) = fixture(&["a", "b"]).await;
        let first = scheduler.pick(Some("fp1")).await.unwrap();
        let second = scheduler.pick(Some("fp1")).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn next_other_than_excludes_current() {
        let (_store, _cooldowns, scheduler) = fixture(&["a", "b"]).await;
        let alt = scheduler.next_other_than(&IdentityId::from("a")).await.unwrap();
        assert_eq!(alt.id.as_str(), "b");
    }
}
