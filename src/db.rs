//! Schema and connection management for a single vault file.
//!
//! One `VaultDb` owns one `rusqlite::Connection` to one backing file holding
//! the two-column table `vault(key BLOB PRIMARY KEY, value BLOB)`. Every
//! helper maps backend failures into [`VaultError::Storage`] with the
//! operation name preserved; the missing-key-to-default conversion for the
//! lenient API happens one layer up, never here.

use crate::error::{VaultError, storage};
use log::{info, warn};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS vault (key BLOB PRIMARY KEY NOT NULL, value BLOB NOT NULL)";

/// Upper bound on bound parameters per statement, kept under SQLite's
/// historical 999-variable default so batches work on older builds.
const MAX_PARAMS: usize = 900;

#[derive(Debug)]
pub(crate) struct VaultDb {
    path: PathBuf,
    conn: Connection,
}

impl VaultDb {
    /// Opens (and if permitted, creates) the backing file and ensures the
    /// table exists. A missing file with creation disabled is `NotFound`.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> Result<VaultDb, VaultError> {
        let existed = path.exists();
        if !existed && !create_if_missing {
            return Err(VaultError::NotFound(display_name(path)));
        }
        let conn = Connection::open(path).map_err(|e| storage("open", e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| storage("open", e))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
            .map_err(|e| storage("open", e))?;
        conn.execute(SCHEMA, []).map_err(|e| storage("open", e))?;
        if !existed {
            info!("created vault file at {}", path.display());
        }
        Ok(VaultDb {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub(crate) fn upsert(&self, key: &[u8], value: &[u8]) -> Result<(), VaultError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO vault(key, value) VALUES(?1, ?2)",
                params![key, value],
            )
            .map_err(|e| storage("put", e))?;
        Ok(())
    }

    /// Batched upsert inside one transaction. Returns the number of rows
    /// written, which with `OR REPLACE` counts updates as well as inserts.
    pub(crate) fn upsert_many(&mut self, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<usize, VaultError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction().map_err(|e| storage("put_many", e))?;
        let mut written = 0;
        for chunk in rows.chunks(MAX_PARAMS / 2) {
            let sql = format!(
                "INSERT OR REPLACE INTO vault(key, value) VALUES {}",
                vec!["(?, ?)"; chunk.len()].join(", ")
            );
            written += tx
                .execute(
                    &sql,
                    params_from_iter(chunk.iter().flat_map(|(k, v)| [k.as_slice(), v.as_slice()])),
                )
                .map_err(|e| storage("put_many", e))?;
        }
        tx.commit().map_err(|e| storage("put_many", e))?;
        Ok(written)
    }

    /// Single-row lookup. `op` names the calling operation so storage
    /// failures report the right context.
    pub(crate) fn fetch(&self, key: &[u8], op: &str) -> Result<Option<Vec<u8>>, VaultError> {
        self.conn
            .query_row(
                "SELECT value FROM vault WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage(op, e))
    }

    pub(crate) fn exists(&self, key: &[u8]) -> Result<bool, VaultError> {
        self.conn
            .query_row("SELECT 1 FROM vault WHERE key = ?1", params![key], |_| {
                Ok(())
            })
            .optional()
            .map(|row| row.is_some())
            .map_err(|e| storage("contains", e))
    }

    /// Deletes one row, reporting whether it was present.
    pub(crate) fn remove(&self, key: &[u8]) -> Result<bool, VaultError> {
        let changed = self
            .conn
            .execute("DELETE FROM vault WHERE key = ?1", params![key])
            .map_err(|e| storage("remove", e))?;
        Ok(changed > 0)
    }

    /// Reads and deletes one row atomically.
    pub(crate) fn take(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, VaultError> {
        let tx = self.conn.transaction().map_err(|e| storage("pop", e))?;
        let value: Option<Vec<u8>> = tx
            .query_row(
                "SELECT value FROM vault WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage("pop", e))?;
        if value.is_some() {
            tx.execute("DELETE FROM vault WHERE key = ?1", params![key])
                .map_err(|e| storage("pop", e))?;
        }
        tx.commit().map_err(|e| storage("pop", e))?;
        Ok(value)
    }

    /// Reads and deletes one arbitrary row atomically.
    pub(crate) fn take_first(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, VaultError> {
        let tx = self.conn.transaction().map_err(|e| storage("pop_entry", e))?;
        let row: Option<(Vec<u8>, Vec<u8>)> = tx
            .query_row("SELECT key, value FROM vault LIMIT 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(|e| storage("pop_entry", e))?;
        if let Some((key, _)) = &row {
            tx.execute("DELETE FROM vault WHERE key = ?1", params![key.as_slice()])
                .map_err(|e| storage("pop_entry", e))?;
        }
        tx.commit().map_err(|e| storage("pop_entry", e))?;
        Ok(row)
    }

    pub(crate) fn select_many(
        &self,
        keys: &[Vec<u8>],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, VaultError> {
        select_in(&self.conn, keys, "get_many")
    }

    /// Reads and deletes the rows matching `keys` in one transaction,
    /// returning exactly the rows that were present.
    pub(crate) fn take_many(
        &mut self,
        keys: &[Vec<u8>],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, VaultError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.conn.transaction().map_err(|e| storage("pop_many", e))?;
        let found = select_in(&tx, keys, "pop_many")?;
        for chunk in found.chunks(MAX_PARAMS) {
            let sql = format!(
                "DELETE FROM vault WHERE key IN ({})",
                placeholders(chunk.len())
            );
            tx.execute(
                &sql,
                params_from_iter(chunk.iter().map(|(k, _)| k.as_slice())),
            )
            .map_err(|e| storage("pop_many", e))?;
        }
        tx.commit().map_err(|e| storage("pop_many", e))?;
        Ok(found)
    }

    pub(crate) fn count(&self) -> Result<u64, VaultError> {
        // COUNT(*) arrives as SQLite's native i64; it is never negative.
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vault", [], |row| row.get(0))
            .map_err(|e| storage("len", e))?;
        Ok(n as u64)
    }

    /// Number of rows whose key appears in `keys`.
    pub(crate) fn count_of(&self, keys: &[Vec<u8>]) -> Result<u64, VaultError> {
        let mut total: u64 = 0;
        for chunk in keys.chunks(MAX_PARAMS) {
            let sql = format!(
                "SELECT COUNT(*) FROM vault WHERE key IN ({})",
                placeholders(chunk.len())
            );
            let n: i64 = self
                .conn
                .query_row(
                    &sql,
                    params_from_iter(chunk.iter().map(Vec::as_slice)),
                    |row| row.get(0),
                )
                .map_err(|e| storage("has_keys", e))?;
            total += n as u64;
        }
        Ok(total)
    }

    pub(crate) fn all_keys(&self) -> Result<Vec<Vec<u8>>, VaultError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM vault")
            .map_err(|e| storage("keys", e))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| storage("keys", e))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| storage("keys", e))?);
        }
        Ok(keys)
    }

    pub(crate) fn all_rows(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, VaultError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM vault")
            .map_err(|e| storage("entries", e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| storage("entries", e))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| storage("entries", e))?);
        }
        Ok(entries)
    }

    /// Deletes every row; the table itself persists.
    pub(crate) fn clear(&self) -> Result<usize, VaultError> {
        self.conn
            .execute("DELETE FROM vault", [])
            .map_err(|e| storage("clear", e))
    }

    /// Flushes the WAL into the main database file.
    pub(crate) fn checkpoint(&self) -> Result<(), VaultError> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))
            .map_err(|e| storage("flush", e))
    }

    /// Disposes the connection, yielding the backing path. Consuming `self`
    /// makes a second close unrepresentable rather than a runtime no-op.
    pub(crate) fn close(self) -> Result<PathBuf, VaultError> {
        if let Err((_conn, e)) = self.conn.close() {
            return Err(storage("close", e));
        }
        Ok(self.path)
    }
}

/// Removes the backing file after close. A file that is already gone is a
/// warning, not an error.
pub(crate) fn remove_file(path: &Path) -> Result<(), VaultError> {
    if path.exists() {
        fs::remove_file(path)?;
        // WAL sidecars are cleaned up on close, but a crashed writer can
        // leave them behind.
        let _ = fs::remove_file(path.with_extension("db-wal"));
        let _ = fs::remove_file(path.with_extension("db-shm"));
    } else {
        warn!("vault file {} does not exist", path.display());
    }
    Ok(())
}

fn select_in(
    conn: &Connection,
    keys: &[Vec<u8>],
    op: &str,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, VaultError> {
    let mut found = Vec::new();
    for chunk in keys.chunks(MAX_PARAMS) {
        let sql = format!(
            "SELECT key, value FROM vault WHERE key IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| storage(op, e))?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter().map(Vec::as_slice)), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(|e| storage(op, e))?;
        for row in rows {
            found.push(row.map_err(|e| storage(op, e))?);
        }
    }
    Ok(found)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn display_name(path: &Path) -> String {
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}
