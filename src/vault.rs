//! The vault facade: dict-like operations over one backing file.
//!
//! A [`Vault`] combines the codec, the connection manager and the lock
//! coordinator. Every operation encodes through the same codec path,
//! executes against the single connection under the mutex, and logs its
//! start and outcome through the `log` facade.
//!
//! The operation surface is deliberately asymmetric: `get` and `pop` are
//! lenient (a missing key is a normal return value), while `fetch` and
//! `remove` are strict (a missing key is [`VaultError::KeyNotFound`]). Both
//! calling conventions are part of the contract.

use crate::codec::{self, Codec, Value};
use crate::config::VaultOptions;
use crate::db::{self, VaultDb};
use crate::error::VaultError;
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One named, file-backed key-value container.
///
/// The handle owns exactly one connection for its lifetime and is safe to
/// share across threads: the internal mutex is the serialization point, so
/// one thread executes against the connection at a time. The backing file
/// lives at `<root>/vaults/<name>.db` and is removed only by
/// [`Vault::delete_vault`].
#[derive(Debug)]
pub struct Vault {
    name: String,
    path: PathBuf,
    codec: Codec,
    db: Mutex<VaultDb>,
}

impl Vault {
    /// Opens the named vault with default options, creating the backing
    /// file under the process default root when missing.
    pub fn open(name: impl Into<String>) -> Result<Vault, VaultError> {
        VaultOptions::new().open(name)
    }

    pub(crate) fn open_with(
        name: impl Into<String>,
        options: VaultOptions,
    ) -> Result<Vault, VaultError> {
        let name = name.into();
        let folder = options.resolved_root().join("vaults");
        fs::create_dir_all(&folder)?;
        let path = folder.join(format!("{name}.db"));
        let db = VaultDb::open(&path, options.create_if_missing)?;
        info!("opened vault '{name}' at {}", path.display());
        Ok(Vault {
            name,
            path,
            codec: options.codec,
            db: Mutex::new(db),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // A poisoned mutex only means some thread panicked mid-operation; the
    // statement it was running either committed or rolled back, so the
    // guard is safe to recover.
    fn db(&self) -> MutexGuard<'_, VaultDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces the entry for `key`.
    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<(), VaultError> {
        let (key, value) = (key.into(), value.into());
        debug!("putting key {key:?} into vault '{}'", self.name);
        let key_bytes = codec::encode_key(&key)?;
        let value_bytes = self.codec.encode(&value)?;
        self.db().upsert(&key_bytes, &value_bytes)?;
        info!("key {key:?} stored in vault '{}'", self.name);
        Ok(())
    }

    /// Lenient lookup: `None` for a missing key, and backend failures are
    /// logged and absorbed into `None` rather than surfaced. Use
    /// [`Vault::try_get`] to observe storage errors, or [`Vault::fetch`]
    /// for the strict convention.
    pub fn get(&self, key: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        match self.try_get_value(&key) {
            Ok(value) => value,
            Err(e) => {
                error!("get of key {key:?} in vault '{}' failed: {e}", self.name);
                None
            }
        }
    }

    /// Like [`Vault::get`] with a caller-supplied default for the missing
    /// (or unreadable) case.
    pub fn get_or(&self, key: impl Into<Value>, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Lenient lookup that still propagates storage failures.
    pub fn try_get(&self, key: impl Into<Value>) -> Result<Option<Value>, VaultError> {
        self.try_get_value(&key.into())
    }

    fn try_get_value(&self, key: &Value) -> Result<Option<Value>, VaultError> {
        debug!("retrieving key {key:?} from vault '{}'", self.name);
        let key_bytes = codec::encode_key(key)?;
        let row = self.db().fetch(&key_bytes, "get")?;
        match row {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => {
                warn!("key {key:?} not found in vault '{}'", self.name);
                Ok(None)
            }
        }
    }

    /// Strict lookup: a missing key is [`VaultError::KeyNotFound`].
    pub fn fetch(&self, key: impl Into<Value>) -> Result<Value, VaultError> {
        let key = key.into();
        self.try_get_value(&key)?
            .ok_or_else(|| VaultError::KeyNotFound(format!("{key:?}")))
    }

    /// Removes and returns the entry for `key`; `None` if absent.
    pub fn pop(&self, key: impl Into<Value>) -> Result<Option<Value>, VaultError> {
        let key = key.into();
        debug!("popping key {key:?} from vault '{}'", self.name);
        let key_bytes = codec::encode_key(&key)?;
        match self.db().take(&key_bytes)? {
            Some(bytes) => {
                info!("key {key:?} removed from vault '{}'", self.name);
                Ok(Some(codec::decode(&bytes)?))
            }
            None => {
                warn!("key {key:?} not found for pop in vault '{}'", self.name);
                Ok(None)
            }
        }
    }

    /// Removes and returns one arbitrary entry. An empty vault is
    /// [`VaultError::Empty`].
    pub fn pop_entry(&self) -> Result<(Value, Value), VaultError> {
        debug!("popping one entry from vault '{}'", self.name);
        let row = self.db().take_first()?;
        let Some((key_bytes, value_bytes)) = row else {
            warn!("vault '{}' is empty, nothing to pop", self.name);
            return Err(VaultError::Empty(self.name.clone()));
        };
        let key = codec::decode(&key_bytes)?;
        let value = codec::decode(&value_bytes)?;
        info!("entry {key:?} removed from vault '{}'", self.name);
        Ok((key, value))
    }

    /// Strict deletion: a missing key is [`VaultError::KeyNotFound`],
    /// unlike [`Vault::pop`].
    pub fn remove(&self, key: impl Into<Value>) -> Result<(), VaultError> {
        let key = key.into();
        let key_bytes = codec::encode_key(&key)?;
        if self.db().remove(&key_bytes)? {
            info!("key {key:?} deleted from vault '{}'", self.name);
            Ok(())
        } else {
            Err(VaultError::KeyNotFound(format!("{key:?}")))
        }
    }

    pub fn contains(&self, key: impl Into<Value>) -> Result<bool, VaultError> {
        let key = key.into();
        debug!("checking for key {key:?} in vault '{}'", self.name);
        let key_bytes = codec::encode_key(&key)?;
        let present = self.db().exists(&key_bytes)?;
        if present {
            info!("key {key:?} found in vault '{}'", self.name);
        } else {
            warn!("key {key:?} not found in vault '{}'", self.name);
        }
        Ok(present)
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize, VaultError> {
        debug!("counting entries in vault '{}'", self.name);
        let n = self.db().count()? as usize;
        info!("vault '{}' holds {n} entries", self.name);
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool, VaultError> {
        Ok(self.len()? == 0)
    }

    /// Deletes every entry; the vault stays open and usable.
    pub fn clear(&self) -> Result<(), VaultError> {
        debug!("clearing vault '{}'", self.name);
        let removed = self.db().clear()?;
        info!("cleared {removed} entries from vault '{}'", self.name);
        Ok(())
    }

    /// All keys, decoded, as a snapshot taken at call time.
    pub fn keys(&self) -> Result<Vec<Value>, VaultError> {
        debug!("listing keys in vault '{}'", self.name);
        let raw = self.db().all_keys()?;
        let keys: Vec<Value> = raw
            .iter()
            .map(|bytes| codec::decode(bytes))
            .collect::<Result<_, _>>()?;
        info!("listed {} keys from vault '{}'", keys.len(), self.name);
        Ok(keys)
    }

    /// All values as a snapshot taken at call time.
    pub fn values(&self) -> Result<Vec<Value>, VaultError> {
        debug!("listing values in vault '{}'", self.name);
        let rows = self.db().all_rows()?;
        let values: Vec<Value> = rows
            .iter()
            .map(|(_, v)| codec::decode(v))
            .collect::<Result<_, _>>()?;
        info!("listed {} values from vault '{}'", values.len(), self.name);
        Ok(values)
    }

    /// All entries as a snapshot taken at call time.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>, VaultError> {
        debug!("listing entries in vault '{}'", self.name);
        let rows = self.db().all_rows()?;
        let entries: Vec<(Value, Value)> = rows
            .iter()
            .map(|(k, v)| Ok::<_, VaultError>((codec::decode(k)?, codec::decode(v)?)))
            .collect::<Result<_, _>>()?;
        info!(
            "listed {} entries from vault '{}'",
            entries.len(),
            self.name
        );
        Ok(entries)
    }

    /// Snapshot iterator over keys. No live cursor: concurrent writes after
    /// the call do not show up in the iteration.
    pub fn iter(&self) -> Result<std::vec::IntoIter<Value>, VaultError> {
        Ok(self.keys()?.into_iter())
    }

    /// Upserts every pair in order, one statement each. Not one transaction;
    /// for an atomic batch use [`Vault::put_many`].
    pub fn update<K, V, I>(&self, entries: I) -> Result<(), VaultError>
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Returns the stored value for `key`, inserting `default` first when
    /// the key is absent. The whole call holds the lock, so concurrent
    /// callers see one consistent winner.
    pub fn get_or_insert(
        &self,
        key: impl Into<Value>,
        default: impl Into<Value>,
    ) -> Result<Value, VaultError> {
        let (key, default) = (key.into(), default.into());
        let key_bytes = codec::encode_key(&key)?;
        let db = self.db();
        if let Some(bytes) = db.fetch(&key_bytes, "get_or_insert")? {
            return codec::decode(&bytes);
        }
        db.upsert(&key_bytes, &self.codec.encode(&default)?)?;
        info!("key {key:?} defaulted in vault '{}'", self.name);
        Ok(default)
    }

    /// Batched upsert in one transaction. Returns the number of entries
    /// written; an empty input is a no-op returning 0.
    pub fn put_many<K, V, I>(&self, entries: I) -> Result<usize, VaultError>
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut rows = Vec::new();
        for (key, value) in entries {
            let (key, value) = (key.into(), value.into());
            rows.push((codec::encode_key(&key)?, self.codec.encode(&value)?));
        }
        if rows.is_empty() {
            return Ok(0);
        }
        let written = self.db().upsert_many(&rows)?;
        info!("stored {written} entries in vault '{}'", self.name);
        Ok(written)
    }

    /// Returns the entries found for `keys`; missing keys are silently
    /// omitted, so the result's key set is the intersection of `keys` and
    /// the vault's current key set.
    pub fn get_many<K, I>(&self, keys: I) -> Result<Vec<(Value, Value)>, VaultError>
    where
        K: Into<Value>,
        I: IntoIterator<Item = K>,
    {
        let key_bytes = encode_keys(keys)?;
        debug!(
            "retrieving {} keys from vault '{}'",
            key_bytes.len(),
            self.name
        );
        if key_bytes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.db().select_many(&key_bytes)?;
        info!(
            "found {} of {} keys in vault '{}'",
            rows.len(),
            key_bytes.len(),
            self.name
        );
        decode_rows(&rows)
    }

    /// Removes and returns exactly the entries found for `keys`, in one
    /// transaction. Keys not present are simply absent from the result.
    pub fn pop_many<K, I>(&self, keys: I) -> Result<Vec<(Value, Value)>, VaultError>
    where
        K: Into<Value>,
        I: IntoIterator<Item = K>,
    {
        let key_bytes = encode_keys(keys)?;
        debug!(
            "popping {} keys from vault '{}'",
            key_bytes.len(),
            self.name
        );
        if key_bytes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.db().take_many(&key_bytes)?;
        info!("popped {} entries from vault '{}'", rows.len(), self.name);
        decode_rows(&rows)
    }

    /// True iff every key in `keys` is present. An empty input is true.
    pub fn has_keys<K, I>(&self, keys: I) -> Result<bool, VaultError>
    where
        K: Into<Value>,
        I: IntoIterator<Item = K>,
    {
        let key_bytes = encode_keys(keys)?;
        debug!(
            "checking {} keys in vault '{}'",
            key_bytes.len(),
            self.name
        );
        if key_bytes.is_empty() {
            return Ok(true);
        }
        let found = self.db().count_of(&key_bytes)?;
        info!(
            "vault '{}' holds {found} of {} requested keys",
            self.name,
            key_bytes.len()
        );
        Ok(found == key_bytes.len() as u64)
    }

    /// Commits any pending WAL state to the main database file. The vault
    /// stays open; this is the scope-exit flush, not a close.
    pub fn flush(&self) -> Result<(), VaultError> {
        debug!("flushing vault '{}'", self.name);
        self.db().checkpoint()?;
        info!("vault '{}' flushed", self.name);
        Ok(())
    }

    /// Closes the connection and removes the backing file. Consumes the
    /// handle; a file that is already gone is a warning, not an error.
    pub fn delete_vault(self) -> Result<(), VaultError> {
        let db = self.db.into_inner().unwrap_or_else(PoisonError::into_inner);
        let path = db.close()?;
        db::remove_file(&path)?;
        info!("vault '{}' deleted", self.name);
        Ok(())
    }
}

fn encode_keys<K, I>(keys: I) -> Result<Vec<Vec<u8>>, VaultError>
where
    K: Into<Value>,
    I: IntoIterator<Item = K>,
{
    keys.into_iter()
        .map(|key| codec::encode_key(&key.into()))
        .collect()
}

fn decode_rows(rows: &[(Vec<u8>, Vec<u8>)]) -> Result<Vec<(Value, Value)>, VaultError> {
    rows.iter()
        .map(|(k, v)| Ok((codec::decode(k)?, codec::decode(v)?)))
        .collect()
}
