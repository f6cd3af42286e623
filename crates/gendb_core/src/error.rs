//! Error types for the gendb object store.

use crate::types::{Handle, ObjectType};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the object store, tree directories and the upgrade chain.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] gendb_storage::StorageError),

    /// Blob codec error.
    #[error("codec error: {0}")]
    Codec(#[from] gendb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Backup archive error.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The backend for a tree cannot be opened.
    #[error("cannot open {}: {message}", path.display())]
    Connection {
        /// Tree directory.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },

    /// The stored schema version cannot be handled at all.
    #[error(
        "{}: schema version {found} is outside the supported range {min}..={max}",
        path.display()
    )]
    SchemaVersion {
        /// Tree directory.
        path: PathBuf,
        /// Version found on disk.
        found: u16,
        /// Oldest version the upgrade chain accepts.
        min: u16,
        /// Version this build writes.
        max: u16,
    },

    /// The tree must be upgraded before it can be opened.
    #[error("{}: schema version {found} needs an upgrade to {current}", path.display())]
    UpgradeRequired {
        /// Tree directory.
        path: PathBuf,
        /// Version found on disk.
        found: u16,
        /// Version this build writes.
        current: u16,
        /// Whether the tree is also stored in the legacy engine.
        legacy: bool,
    },

    /// Another process appears to hold the tree.
    #[error("{} is locked by {holder}", path.display())]
    LockHeld {
        /// Tree directory.
        path: PathBuf,
        /// Contents of the lock file.
        holder: String,
    },

    /// The last session did not close cleanly.
    #[error("{} was not closed cleanly and needs recovery", path.display())]
    RecoveryRequired {
        /// Tree directory.
        path: PathBuf,
    },

    /// A stored tuple does not match a known shape.
    #[error("cannot decode {object_type} {handle}: {message}")]
    Decode {
        /// Type of the offending object.
        object_type: ObjectType,
        /// Handle of the offending object.
        handle: Handle,
        /// Description of the mismatch.
        message: String,
    },

    /// A scoped transaction was unwound.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The transaction is not in a state that allows the operation.
    #[error("invalid transaction: {message}")]
    InvalidTransaction {
        /// What was attempted.
        message: String,
    },

    /// A transaction is already running on this store.
    #[error("a transaction is already active")]
    TransactionActive,

    /// An upgrade step failed.
    #[error("upgrade to schema version {version} failed for {}: {message}", path.display())]
    UpgradeFailed {
        /// Version the step was producing.
        version: u16,
        /// Tree directory.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },

    /// `database.txt` names an unknown engine.
    #[error("unknown backend: {id}")]
    UnknownBackend {
        /// Identifier found.
        id: String,
    },

    /// A tree title pattern is not a valid regular expression.
    #[error("invalid title pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// No family tree matched.
    #[error("family tree not found: {name}")]
    TreeNotFound {
        /// Path or title that was looked up.
        name: String,
    },

    /// The store was opened read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a decode error.
    pub fn decode(object_type: ObjectType, handle: &Handle, message: impl Into<String>) -> Self {
        Self::Decode {
            object_type,
            handle: handle.clone(),
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid transaction error.
    pub fn invalid_transaction(message: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            message: message.into(),
        }
    }

    /// Creates a connection error for the tree at `path`.
    pub fn connection(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Connection {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an upgrade failure.
    pub fn upgrade_failed(version: u16, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::UpgradeFailed {
            version,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a tree-not-found error.
    pub fn tree_not_found(name: impl Into<String>) -> Self {
        Self::TreeNotFound { name: name.into() }
    }

    /// Whether the caller can retry with an explicit yes/no answer.
    ///
    /// Lock, upgrade and recovery questions are decisions, not failures.
    #[must_use]
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            Self::LockHeld { .. } | Self::UpgradeRequired { .. } | Self::RecoveryRequired { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_show_path() {
        let err = StoreError::connection("/trees/abc", "no such file");
        assert!(err.to_string().contains("/trees/abc"));
        let err = StoreError::SchemaVersion {
            path: "/trees/abc".into(),
            found: 9,
            min: 14,
            max: 20,
        };
        assert!(err.to_string().contains("/trees/abc"));
        assert!(err.to_string().contains("14..=20"));
    }

    #[test]
    fn decisions() {
        assert!(StoreError::RecoveryRequired { path: "/t".into() }.is_decision());
        assert!(!StoreError::Closed.is_decision());
    }
}
