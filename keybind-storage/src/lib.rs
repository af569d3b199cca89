//! Key store backends for keybind.
//!
//! Provides the [`KeyStore`] trait the activation engine is written
//! against, plus interchangeable implementations:
//!
//! - [`MemoryKeyStore`]: a locked map, for tests and ephemeral servers
//! - [`SqliteKeyStore`]: one row per key in a SQLite table
//! - [`JsonFileKeyStore`]: every record in a single JSON document
//! - [`TimedKeyStore`]: a decorator bounding each call of another backend
//!
//! # Atomicity
//!
//! Every mutation is atomic per key. First activation in particular is a
//! conditional write that only succeeds while the record is unbound, so
//! two racing activations can never both win.

mod error;
mod json_file;
mod memory;
mod sqlite;
mod store;
mod timeout;

pub use error::{StorageError, StorageResult};
pub use json_file::JsonFileKeyStore;
pub use memory::MemoryKeyStore;
pub use sqlite::SqliteKeyStore;
pub use store::{BindOutcome, CreateOutcome, DeleteOutcome, KeyStore};
pub use timeout::TimedKeyStore;
