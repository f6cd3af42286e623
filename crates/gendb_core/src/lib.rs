//! # gendb Core
//!
//! Transactional object store for gendb family trees.
//!
//! This crate provides:
//! - Typed primary objects and the versioned tuple layouts they are stored in
//! - The [`ObjectStore`] facade with scoped, all-or-nothing transactions
//! - A session undo journal with undo and redo
//! - Tree directories with advisory locking and a recovery marker
//! - The schema upgrade chain from version 14 to the current version
//! - The [`DbManager`] used by front ends to list and manage trees
//!
//! ## Example
//!
//! ```rust
//! use gendb_core::objects::Person;
//! use gendb_core::{Config, ObjectStore};
//!
//! let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
//! let mut person = Person::default();
//! let handle = store
//!     .transaction("Add person", |s, txn| s.add_person(&mut person, txn))
//!     .unwrap();
//! assert_eq!(store.get_person(&handle).unwrap().unwrap().gramps_id, "I0000");
//! store.undo().unwrap();
//! assert!(store.get_person(&handle).unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod objects;
pub mod upgrade;

mod backup;
mod config;
mod dir;
mod error;
mod index;
mod manager;
mod signals;
mod store;
mod txn;
mod types;
mod undo;

pub use backup::{make_zip_backup, restore_zip_backup, sanitize_title};
pub use config::{Config, OpenOptions};
pub use dir::{
    lock_identity, TreeDir, TreeLock, BACKEND_FILE, LOCK_FILE, META_FILE, NAME_FILE,
    RECOVERY_FILE, SCHEMA_VERSION_FILE,
};
pub use error::{StoreError, StoreResult};
pub use index::{GrampsIdIndex, ReferenceIndex};
pub use manager::{DbManager, Summary, TreeEntry, TreeStatus};
pub use signals::{Signal, SignalHub};
pub use store::{read_with, ObjectStore, TxnScope, MEDIA_PATH_KEY, METADATA_TABLE, VERSION_KEY};
pub use txn::{DbTxn, TxnChange, TxnState};
pub use types::{
    now_timestamp, Handle, ObjectType, RecordNumber, TxnOp, CURRENT_SCHEMA_VERSION,
    MIN_SCHEMA_VERSION,
};
pub use undo::{TxnRange, UndoEntry, UndoHistory, UndoLog, UNDO_FILE, UNDO_MAGIC};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
