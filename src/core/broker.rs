//! Write broker: the serialization point for document mutations.
//!
//! Every load-or-create and every write for a given path runs under that
//! path's mutex, so `set` calls against one scope key land on disk in the
//! order they were made. Each brokered operation appends one line to
//! `vault.events.jsonl` under the store root.

use crate::core::error::VaultError;
use crate::core::time;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const AUDIT_LOG_NAME: &str = "vault.events.jsonl";

pub struct Broker {
    audit_log_path: PathBuf,
    locks: Mutex<FxHashMap<PathBuf, Arc<Mutex<()>>>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VaultEvent {
    pub ts: String,
    pub event_id: String,
    pub namespace: String,
    pub op: String,
    pub path: String,
    pub status: String,
    pub content_hash: Option<String>,
}

impl Broker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(AUDIT_LOG_NAME),
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn audit_log_path(&self) -> &Path {
        &self.audit_log_path
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Execute a closure holding the write lock for `path`, then append
    /// the outcome to the audit log. `content_hash` is the hash of the
    /// bytes a write puts on disk, when the operation is a write.
    pub fn with_path<F, R>(
        &self,
        path: &Path,
        namespace: &str,
        op: &str,
        content_hash: Option<&str>,
        f: F,
    ) -> Result<R, VaultError>
    where
        F: FnOnce() -> Result<R, VaultError>,
    {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap();

        let result = f();

        let status = if result.is_ok() { "success" } else { "error" };
        self.log_event(namespace, op, path, status, content_hash)?;

        result
    }

    fn log_event(
        &self,
        namespace: &str,
        op: &str,
        path: &Path,
        status: &str,
        content_hash: Option<&str>,
    ) -> Result<(), VaultError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = VaultEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            namespace: namespace.to_string(),
            op: op.to_string(),
            path: path.display().to_string(),
            status: status.to_string(),
            content_hash: content_hash.map(|s| s.to_string()),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(VaultError::IoError)?;

        writeln!(f, "{}", serde_json::to_string(&ev).unwrap()).map_err(VaultError::IoError)?;
        Ok(())
    }
}

/// SHA-256 over the compact serialization of a raw document.
pub fn content_hash(raw: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
