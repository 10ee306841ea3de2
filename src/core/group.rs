//! A bound document: one scope's backing file plus its in-memory cache.

use crate::core::broker::{Broker, content_hash};
use crate::core::error::VaultError;
use crate::core::marshal;
use crate::core::schema::Document;
use crate::core::store;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One configuration file, loaded.
///
/// The cache is always consistent with the last `set` this handle
/// performed. Two independently obtained groups for the same scope key
/// hold independent caches; their disk writes are serialized by the
/// broker, but the later write wins.
pub struct Group<D: Document> {
    path: PathBuf,
    namespace: String,
    broker: Arc<Broker>,
    data: D,
}

impl<D: Document> Group<D> {
    /// Binds `path`, loading its document or creating it from the raw
    /// default. The only transition from unloaded to loaded.
    pub(crate) fn bind(
        path: PathBuf,
        namespace: &str,
        broker: Arc<Broker>,
        default_raw: &Value,
    ) -> Result<Self, VaultError> {
        let data = broker.with_path(&path, namespace, "group.load", None, || {
            store::load_or_create(&path, default_raw)
        })?;
        Ok(Self {
            path,
            namespace: namespace.to_string(),
            broker,
            data,
        })
    }

    /// The cached document. Never touches disk.
    pub fn get(&self) -> &D {
        &self.data
    }

    /// Resolved backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `data` through to disk, then replaces the cache.
    ///
    /// Setting a value structurally equal to the cache skips the disk
    /// write entirely.
    pub fn set(&mut self, data: D) -> Result<(), VaultError> {
        if data == self.data {
            return Ok(());
        }
        let raw = marshal::to_raw(&data)?;
        let hash = content_hash(&raw);
        self.broker
            .with_path(&self.path, &self.namespace, "group.set", Some(&hash), || {
                store::write_raw(&self.path, &raw)
            })?;
        self.data = data;
        Ok(())
    }

    /// Read-modify-write convenience: clones the cache, applies `f`, then
    /// `set`s the result.
    pub fn update<F>(&mut self, f: F) -> Result<(), VaultError>
    where
        F: FnOnce(&mut D),
    {
        let mut next = self.data.clone();
        f(&mut next);
        self.set(next)
    }
}

impl<D: Document + fmt::Debug> fmt::Debug for Group<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data.fmt(f)
    }
}
