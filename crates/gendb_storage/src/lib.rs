//! # gendb Storage
//!
//! Physical storage for gendb family trees.
//!
//! Every engine is presented as a set of key/blob tables through the
//! [`StorageBackend`] trait, so nothing above this crate knows which engine
//! a tree lives in.
//!
//! ## Available Backends
//!
//! - SQLite ([`open_sqlite`]): the embedded default, optionally in WAL mode
//!   with per-thread readers from a [`ReaderRegistry`]
//! - [`SqlBackend`]: the row backend shared by every SQL engine; statements
//!   are rewritten per [`SqlDialect`]
//! - [`LegacyBackend`]: read-only page-cache trees, used as an upgrade source
//! - [`InMemoryBackend`]: tables in process memory
//!
//! [`open_backend`] resolves a [`BackendKind`] to an implementation.
//!
//! A [`FrameLog`] is a record-numbered file of checksummed frames; the undo
//! journal and legacy table files are written as frame logs.
//!
//! ## Example
//!
//! ```rust
//! use gendb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.create_table("person").unwrap();
//! backend.put("person", "h1", b"blob").unwrap();
//! assert_eq!(backend.get("person", "h1").unwrap(), Some(b"blob".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dialect;
mod error;
mod framelog;
mod legacy;
mod memory;
mod readers;
mod registry;
mod sql;
mod sqlite;

pub use backend::{validate_table_name, BackendKind, RowIter, SqlValue, StorageBackend};
pub use dialect::SqlDialect;
pub use error::{StorageError, StorageResult};
pub use framelog::FrameLog;
#[cfg(any(test, feature = "fixtures"))]
pub use legacy::LegacyWriter;
pub use legacy::{LegacyBackend, LEGACY_MAGIC};
pub use memory::InMemoryBackend;
pub use readers::{ReaderRegistry, ThreadReader};
pub use registry::{open_backend, BackendConfig};
pub use sql::{SqlBackend, SqlConnection};
pub use sqlite::{open_sqlite, SqliteConnection, SqliteOptions, SQLITE_FILE};
