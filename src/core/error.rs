use serde_json;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Malformed document {path}: {source}")]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Path error: {0}")]
    PathError(String),
}
