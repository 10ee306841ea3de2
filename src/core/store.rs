//! File-backed document primitives.
//!
//! Documents are whole files: loads read and marshal the full tree, writes
//! replace the full contents. There is no incremental patching and no
//! on-disk envelope; a document file holds exactly the JSON object or
//! array its schema declares.

use crate::core::error::VaultError;
use crate::core::marshal;
use crate::core::schema::Document;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const EXTENSION: &str = "json";

/// Handle to the directory tree every namespace lives under.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute or cwd-relative root of the vault.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }
}

/// Reads and marshals the document at `path`.
///
/// A missing file is not an error: the raw default is written there first
/// and the default is marshalled instead. Anything present but unparsable
/// is [`VaultError::MalformedDocument`]; the default is never silently
/// substituted for it.
pub fn load_or_create<D: Document>(path: &Path, default_raw: &Value) -> Result<D, VaultError> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let raw: Value =
                serde_json::from_str(&text).map_err(|source| VaultError::MalformedDocument {
                    path: path.to_path_buf(),
                    source,
                })?;
            marshal::to_typed(&raw)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            write_raw(path, default_raw)?;
            marshal::to_typed(default_raw)
        }
        Err(err) => Err(VaultError::IoError(err)),
    }
}

/// Whole-file replace: serialize, write to a sibling temp file, rename
/// into place. Parent directories are created on demand; creating an
/// already-existing directory is not an error.
pub fn write_raw(path: &Path, raw: &Value) -> Result<(), VaultError> {
    let parent = path.parent().ok_or_else(|| {
        VaultError::PathError(format!("document path has no parent: {}", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let text = serde_json::to_string_pretty(raw)
        .map_err(|err| VaultError::ValidationError(format!("unserializable document: {}", err)))?;

    // writes to one path are serialized upstream, so one sibling name suffices
    let tmp = tmp_sibling(path);
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = match path.file_name() {
        Some(n) => format!(".{}.tmp", n.to_string_lossy()),
        None => ".vault.tmp".to_string(),
    };
    path.with_file_name(name)
}

/// Lists `<id>.json` entries directly under `dir`, sorted by id.
///
/// A missing directory is created and reads as empty. Entries whose stem
/// is not a numeric id are ignored.
pub fn list_documents(dir: &Path) -> Result<Vec<(u64, PathBuf)>, VaultError> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(id) = stem.parse::<u64>() {
            found.push((id, path));
        }
    }
    found.sort_by_key(|(id, _)| *id);
    Ok(found)
}

/// Lists numeric subdirectories of `dir` (the guild folders under a
/// `member/` scope), sorted. A missing directory reads as empty.
pub fn list_subscopes(dir: &Path) -> Result<Vec<u64>, VaultError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(id) = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            found.push(id);
        }
    }
    found.sort_unstable();
    Ok(found)
}
