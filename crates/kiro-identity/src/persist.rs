use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Credentials;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("credential blob not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read credential blob {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse credential blob {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write credential blob {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub async fn load(path: &Path) -> Result<Credentials, PersistError> {
    let path = path.to_path_buf();
    let read_path = path.clone();
    let bytes = tokio::task::spawn_blocking(move || std::fs::read(&read_path))
        .await
        .expect("blocking load task panicked")
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                PersistError::NotFound(path.clone())
            } else {
                PersistError::Read {
                    path: path.clone(),
                    source,
                }
            }
        })?;
    serde_json::from_slice(&bytes).map_err(|source| PersistError::Parse { path, source })
}

/// Persists `credentials` to `path` atomically: serialize, write to a
/// sibling temp file, then rename over the destination. A concurrent reader
/// either sees the old file or the fully-written new one, never a partial
/// write.
pub async fn save(path: &Path, credentials: &Credentials) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(credentials)
        .map_err(|source| PersistError::Parse { path: path.to_path_buf(), source })?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write(&path, &json))
        .await
        .expect("blocking save task panicked")
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, bytes).map_err(|source| PersistError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) = std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)) {
            warn!(path = %tmp_path.display(), error = %err, "failed to restrict credential blob permissions");
        }
    }
    std::fs::rename(&tmp_path, path).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn log_save_failure(identity_id: &str, err: &PersistError) {
    error!(identity = identity_id, error = %err, "failed to persist refreshed credentials");
}
