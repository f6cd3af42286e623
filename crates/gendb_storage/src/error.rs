//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame log has no record with the requested number.
    #[error("no record {record} in a log of {len} frames")]
    ReadPastEnd {
        /// The requested record number.
        record: u64,
        /// Number of frames in the log.
        len: u64,
    },

    /// The engine could not be opened or reached.
    #[error("cannot connect to storage: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A uniqueness or integrity constraint was violated.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Engine-provided description.
        message: String,
    },

    /// A statement failed for any other reason.
    #[error("query failed: {message}")]
    Query {
        /// Engine-provided description.
        message: String,
    },

    /// Stored data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Transaction protocol misuse (commit without begin, nested begin).
    #[error("transaction state error: {message}")]
    Transaction {
        /// Description of the misuse.
        message: String,
    },

    /// The backend is read-only.
    #[error("backend is read-only")]
    ReadOnly,

    /// The backend does not implement the requested operation.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        /// Backend display name.
        backend: &'static str,
        /// Name of the operation.
        operation: &'static str,
    },

    /// A table name is not a plain identifier.
    #[error("invalid table name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A thread-bound reader was used from another thread.
    #[error("reader connection used outside its owning thread")]
    WrongThread,

    /// The backend is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates a transaction state error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }
}

impl From<gendb_codec::CodecError> for StorageError {
    fn from(err: gendb_codec::CodecError) -> Self {
        Self::Corrupted(err.to_string())
    }
}
