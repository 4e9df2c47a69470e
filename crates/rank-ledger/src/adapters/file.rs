//! JSON-file document store.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{LedgerError, LedgerResult};
use crate::ports::outbound::DocumentStore;

/// Document store keeping one `<key>.json` file per key under a directory.
///
/// Each write goes to its own uniquely named temp file in the same
/// directory, which is synced and renamed over the target, so a reader sees
/// either the old document or the new one. Puts to the same key are
/// serialized and land in call order.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    dir: PathBuf,
    key_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl FileDocumentStore {
    /// Open (and create if needed) the data directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> LedgerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            LedgerError::Configuration(format!(
                "cannot create data directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        info!("[rank-ledger] file store at {}", dir.display());
        Ok(Self {
            dir,
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> LedgerResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(LedgerError::Validation(format!(
                "invalid document key '{}'",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

/// Write `bytes` to a fresh temp file in `dir` and rename it over `path`.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(".rank-ledger-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, key: &str) -> LedgerResult<Option<Value>> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| LedgerError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, key: &str, value: Value) -> LedgerResult<()> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(&value).map_err(|e| {
            LedgerError::Storage(format!("cannot encode '{}': {}", key, e))
        })?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let len = bytes.len();
        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| LedgerError::Storage(format!("write task for '{}' failed: {}", key, e)))??;

        debug!("[rank-ledger] wrote {} bytes to {}", len, path.display());
        Ok(())
    }
}
