//! bytevault: persistent dict-like vaults over single-file SQLite.
//!
//! A vault is one named key-value container backed by one SQLite file and
//! one connection. Keys and values are arbitrary structured [`Value`]s,
//! serialized through tagged codecs so mixed encodings coexist in a single
//! table and old payloads stay readable.
//!
//! # Layout
//!
//! - [`codec`]: the `Value` model and the tagged packed/JSON encodings
//! - `db`: schema and connection management (one table, one connection)
//! - [`config`]: open-time options and the process-wide default root
//! - [`vault`]: the facade with the dict-like operation surface
//!
//! # Conventions
//!
//! - Lenient vs strict: `get`/`pop` turn a missing key into `None`;
//!   `fetch`/`remove` fail with [`VaultError::KeyNotFound`]. Both exist on
//!   purpose and serve different call sites.
//! - One handle may be shared across threads; an internal mutex serializes
//!   all access to the connection.
//! - Every operation logs through the [`log`] facade; install any
//!   `log::Log` sink at the process boundary to capture it.
//!
//! ```no_run
//! use bytevault::{Value, VaultOptions};
//!
//! let vault = VaultOptions::new().root("/tmp/app-state").open("sessions")?;
//! vault.put("user:1", Value::map([("name", "ada"), ("role", "admin")]))?;
//! assert!(vault.contains("user:1")?);
//! # Ok::<(), bytevault::VaultError>(())
//! ```

pub mod codec;
pub mod config;
mod db;
pub mod error;
pub mod vault;

pub use codec::{Codec, Value};
pub use config::{VaultOptions, default_root, set_default_root};
pub use error::VaultError;
pub use vault::Vault;
