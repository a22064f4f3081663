//! Construction-time configuration for vaults.
//!
//! The root directory and codec preference travel with [`VaultOptions`]
//! rather than being read from globals inside the core; the process-wide
//! default root exists only as a convenience for the outermost entry point.

use crate::codec::Codec;
use crate::error::VaultError;
use crate::vault::Vault;
use log::info;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

static DEFAULT_ROOT: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Sets the process-wide default root directory under which the `vaults/`
/// folder lives. Options with an explicit root override this.
pub fn set_default_root(path: impl Into<PathBuf>) {
    let path = path.into();
    info!("default vault root set to {}", path.display());
    *DEFAULT_ROOT.write().unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// The current default root: the configured one, else the working directory.
pub fn default_root() -> PathBuf {
    DEFAULT_ROOT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Builder for opening a [`Vault`].
///
/// Defaults: create the backing file when missing, packed codec, the
/// process-wide default root.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    pub(crate) root: Option<PathBuf>,
    pub(crate) create_if_missing: bool,
    pub(crate) codec: Codec,
}

impl Default for VaultOptions {
    fn default() -> Self {
        VaultOptions {
            root: None,
            create_if_missing: true,
            codec: Codec::default(),
        }
    }
}

impl VaultOptions {
    pub fn new() -> VaultOptions {
        VaultOptions::default()
    }

    /// Root directory for this vault, overriding the process default.
    pub fn root(mut self, root: impl Into<PathBuf>) -> VaultOptions {
        self.root = Some(root.into());
        self
    }

    /// Whether opening a vault whose file does not exist creates it. When
    /// disabled, such an open fails with [`VaultError::NotFound`].
    pub fn create_if_missing(mut self, create: bool) -> VaultOptions {
        self.create_if_missing = create;
        self
    }

    /// Codec used for newly written values. Reads dispatch on the payload
    /// tag, so changing this never invalidates existing data.
    pub fn codec(mut self, codec: Codec) -> VaultOptions {
        self.codec = codec;
        self
    }

    /// Opens the named vault with these options.
    pub fn open(self, name: impl Into<String>) -> Result<Vault, VaultError> {
        Vault::open_with(name, self)
    }

    pub(crate) fn resolved_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_root)
    }
}
