use rusqlite;
use std::io;
use thiserror::Error;

/// Unified error type for all vault operations.
///
/// Lenient accessors (`get`, `pop`) convert the missing-key case into a
/// normal return value before it ever reaches the caller; the variants here
/// are what the strict paths and the storage layer surface.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Opening a named vault with creation disabled when no backing file exists.
    #[error("no such vault: '{0}'")]
    NotFound(String),
    /// Strict single-key operations on a key that is not present.
    #[error("key not found in vault: {0}")]
    KeyNotFound(String),
    /// `pop_entry` on a vault with zero entries.
    #[error("vault '{0}' is empty")]
    Empty(String),
    /// Unrecognized payload tag, or a value neither codec can represent.
    #[error("payload format error: {0}")]
    Format(String),
    /// Failure surfaced by the backing SQLite engine, with the operation
    /// that triggered it preserved for diagnostics.
    #[error("storage failure in '{op}': {source}")]
    Storage {
        op: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Wraps a backend failure with the name of the operation that hit it.
pub(crate) fn storage(op: &str, source: rusqlite::Error) -> VaultError {
    VaultError::Storage {
        op: op.to_string(),
        source,
    }
}
