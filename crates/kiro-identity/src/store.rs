use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use kiro_common::{IdentityId, IdentityStatus};

use crate::model::{Credentials, Identity};
use crate::persist::{self, PersistError};

/// The refresh dance for a given `auth_method` (device/social/idc). This
/// crate only serialises and caches refreshes; the HTTP exchange itself is
/// implemented upstream in the engine, which wires its own `CredentialRefresher`
/// into the store at startup.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(
        &self,
        identity: &Identity,
        current: &Credentials,
    ) -> Result<Credentials, RefreshError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RefreshError {
    pub message: String,
}

impl RefreshError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity {0} is not registered")]
    UnknownIdentity(IdentityId),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("refresh failed: {0}")]
    Refresh(#[from] RefreshError),
}

/// Fields that change over the identity's lifetime, separated from the
/// immutable pool config so mutation never requires unique ownership of
/// the entry.
struct MutableState {
    status: IdentityStatus,
    request_count: u64,
    error_count: u64,
    last_used: Option<OffsetDateTime>,
}

struct Entry {
    config: Identity,
    state: RwLock<MutableState>,
    cached: RwLock<Option<Credentials>>,
    refresh_lock: Mutex<()>,
}

impl Entry {
    async fn snapshot(&self) -> Identity {
        let state = self.state.read().await;
        Identity {
            id: self.config.id.clone(),
            display_name: self.config.display_name.clone(),
            enabled: self.config.enabled,
            credential_path: self.config.credential_path.clone(),
            request_count: state.request_count,
            error_count: state.error_count,
            last_used: state.last_used,
            status: state.status,
            affinity_opt_in: self.config.affinity_opt_in,
        }
    }
}

/// C2: the per-identity credential cache with single-flight refresh.
pub struct CredentialStore {
    refresher: Arc<dyn CredentialRefresher>,
    entries: RwLock<HashMap<IdentityId, Arc<Entry>>>,
}

impl CredentialStore {
    pub fn new(refresher: Arc<dyn CredentialRefresher>) -> Self {
        Self {
            refresher,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, identity: Identity) {
        let id = identity.id.clone();
        let state = MutableState {
            status: identity.status,
            request_count: identity.request_count,
            error_count: identity.error_count,
            last_used: identity.last_used,
        };
        self.entries.write().await.insert(
            id,
            Arc::new(Entry {
                config: identity,
                state: RwLock::new(state),
                cached: RwLock::new(None),
                refresh_lock: Mutex::new(()),
            }),
        );
    }

    async fn entry(&self, id: &IdentityId) -> Option<Arc<Entry>> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn identity(&self, id: &IdentityId) -> Option<Identity> {
        match self.entry(id).await {
            Some(entry) => Some(entry.snapshot().await),
            None => None,
        }
    }

    pub async fn identities(&self) -> Vec<Identity> {
        let entries: Vec<Arc<Entry>> = self.entries.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.snapshot().await);
        }
        out
    }

    pub async fn set_status(&self, id: &IdentityId, status: IdentityStatus) {
        if let Some(entry) = self.entry(id).await {
            entry.state.write().await.status = status;
        }
    }

    pub async fn mark_unhealthy(&self, id: &IdentityId) {
        self.set_status(id, IdentityStatus::Unhealthy).await;
    }

    pub async fn disable(&self, id: &IdentityId) {
        self.set_status(id, IdentityStatus::Suspended).await;
    }

    pub async fn restore(&self, id: &IdentityId) {
        self.set_status(id, IdentityStatus::Active).await;
    }

    pub async fn record_use(&self, id: &IdentityId) {
        if let Some(entry) = self.entry(id).await {
            let mut state = entry.state.write().await;
            state.request_count += 1;
            state.last_used = Some(OffsetDateTime::now_utc());
        }
    }

    pub async fn record_error(&self, id: &IdentityId) {
        if let Some(entry) = self.entry(id).await {
            entry.state.write().await.error_count += 1;
        }
    }

    /// Loads on first call, returns the cached value thereafter, revalidating
    /// expiry on every call (C2 `get`).
    pub async fn get(&self, id: &IdentityId) -> Result<Credentials, StoreError> {
        let entry = self.entry(id).await.ok_or_else(|| StoreError::UnknownIdentity(id.clone()))?;
        {
            let cached = entry.cached.read().await;
            if let Some(creds) = cached.as_ref() {
                return Ok(creds.clone());
            }
        }
        let loaded = persist::load(std::path::Path::new(&entry.config.credential_path)).await?;
        *entry.cached.write().await = Some(loaded.clone());
        Ok(loaded)
    }

    pub async fn expiring_soon(&self, id: &IdentityId, skew_seconds: i64) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.expiring_soon(skew_seconds))
    }

    pub async fn expired(&self, id: &IdentityId) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.expired())
    }

    /// C2 `refresh`: serialised per identity. A second concurrent caller
    /// blocks on `refresh_lock` and, on waking, finds the cache already
    /// updated by the first — it reads that instead of refreshing again.
    pub async fn refresh(&self, id: &IdentityId) -> Result<Credentials, StoreError> {
        let entry = self.entry(id).await.ok_or_else(|| StoreError::UnknownIdentity(id.clone()))?;
        let _guard = entry.refresh_lock.lock().await;

        let current = {
            let cached = entry.cached.read().await;
            match cached.as_ref() {
                Some(c) if !c.expired() => return Ok(c.clone()),
                Some(c) => c.clone(),
                None => persist::load(std::path::Path::new(&entry.config.credential_path)).await?,
            }
        };

        let identity = entry.snapshot().await;
        match self.refresher.refresh(&identity, &current).await {
            Ok(refreshed) => {
                *entry.cached.write().await = Some(refreshed.clone());
                if let Err(err) =
                    persist::save(std::path::Path::new(&entry.config.credential_path), &refreshed).await
                {
                    persist::log_save_failure(entry.config.id.as_str(), &err);
                }
                Ok(refreshed)
            }
            Err(err) => {
                warn!(
                    identity = %entry.config.id,
                    auth_method = ?current.auth_method,
                    "credential refresh failed"
                );
                self.mark_unhealthy(id).await;
                Err(StoreError::Refresh(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_common::AuthMethod;

    struct AlwaysFails;

    #[async_trait]
    impl CredentialRefresher for AlwaysFails {
        async fn refresh(&self, _identity: &Identity, _current: &Credentials) -> Result<Credentials, RefreshError> {
            Err(RefreshError::new("upstream refresh rejected"))
        }
    }

    fn write_creds(path: &std::path::Path) {
        let creds = Credentials {
            access_token: "stale".into(),
            refresh_token: Some("r".into()),
            auth_method: AuthMethod::Social,
            region: None,
            client_id: None,
            client_secret: None,
            profile_arn: None,
            expires_at: 0,
        };
        std::fs::write(path, serde_json::to_vec(&creds).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn refresh_failure_marks_identity_unhealthy() {
        let path = std::env::temp_dir().join(format!("kiro-identity-test-{}.json", uuid_like()));
        write_creds(&path);

        let store = CredentialStore::new(Arc::new(AlwaysFails));
        let id = IdentityId("acct-1".to_string());
        store
            .register(Identity {
                id: id.clone(),
                display_name: "acct-1".into(),
                enabled: true,
                credential_path: path.to_string_lossy().into_owned(),
                request_count: 0,
                error_count: 0,
                last_used: None,
                status: IdentityStatus::Active,
                affinity_opt_in: true,
            })
            .await;

        let result = store.refresh(&id).await;
        assert!(result.is_err());
        assert_eq!(store.identity(&id).await.unwrap().status, IdentityStatus::Unhealthy);

        let _ = std::fs::remove_file(&path);
    }

    fn uuid_like() -> u128 {
        OffsetDateTime::now_utc().unix_timestamp_nanos() as u128
    }
}
