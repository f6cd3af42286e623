//! Thread-local read connections for the embedded engine.
//!
//! In write-ahead-log mode SQLite allows one writer and any number of
//! readers. The write connection belongs to the transaction manager; read
//! work on other threads goes through a [`ThreadReader`] obtained from a
//! [`ReaderRegistry`]. Each thread gets its own connection, created on first
//! request and reused afterwards.

use crate::backend::{RowIter, SqlValue, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::sql::SqlBackend;
use crate::sqlite::{open_sqlite, SqliteConnection, SqliteOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A read-only connection bound to the thread that created it.
///
/// The handle may be moved or cloned, but every call from a thread other
/// than its owner fails with [`StorageError::WrongThread`].
pub struct ThreadReader {
    owner: ThreadId,
    backend: Mutex<SqlBackend<SqliteConnection>>,
}

impl ThreadReader {
    fn check_thread(&self) -> StorageResult<()> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(StorageError::WrongThread)
        }
    }

    /// Thread this reader belongs to.
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// See [`StorageBackend::get`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WrongThread`] off the owning thread.
    pub fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_thread()?;
        self.backend.lock().get(table, key)
    }

    /// See [`StorageBackend::scan`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WrongThread`] off the owning thread.
    pub fn scan(&self, table: &str) -> StorageResult<RowIter> {
        self.check_thread()?;
        self.backend.lock().scan(table)
    }

    /// See [`StorageBackend::keys`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WrongThread`] off the owning thread.
    pub fn keys(&self, table: &str) -> StorageResult<Vec<String>> {
        self.check_thread()?;
        self.backend.lock().keys(table)
    }

    /// See [`StorageBackend::count`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WrongThread`] off the owning thread.
    pub fn count(&self, table: &str) -> StorageResult<u64> {
        self.check_thread()?;
        self.backend.lock().count(table)
    }

    /// See [`StorageBackend::query_raw`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WrongThread`] off the owning thread.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        self.check_thread()?;
        self.backend.lock().query_raw(sql, params)
    }

    fn close(&self) -> StorageResult<()> {
        self.backend.lock().close()
    }
}

/// Per-thread registry of read connections to one tree.
pub struct ReaderRegistry {
    tree_dir: PathBuf,
    readers: Mutex<HashMap<ThreadId, Arc<ThreadReader>>>,
}

impl ReaderRegistry {
    /// Creates an empty registry for the tree at `tree_dir`.
    #[must_use]
    pub fn new(tree_dir: &Path) -> Self {
        Self {
            tree_dir: tree_dir.to_path_buf(),
            readers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the calling thread's reader, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the connection cannot be opened.
    pub fn reader(&self) -> StorageResult<Arc<ThreadReader>> {
        let id = thread::current().id();
        let mut readers = self.readers.lock();
        if let Some(reader) = readers.get(&id) {
            return Ok(Arc::clone(reader));
        }

        let backend = open_sqlite(
            &self.tree_dir,
            SqliteOptions {
                wal: true,
                read_only: true,
            },
        )?;
        let reader = Arc::new(ThreadReader {
            owner: id,
            backend: Mutex::new(backend),
        });
        readers.insert(id, Arc::clone(&reader));
        tracing::debug!(thread = ?id, open = readers.len(), "opened thread reader");
        Ok(reader)
    }

    /// Number of open readers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    /// Whether no reader is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readers.lock().is_empty()
    }

    /// Closes every reader and empties the registry; returns how many closed.
    ///
    /// Handles still held by callers fail with [`StorageError::Closed`]
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first close error; remaining readers are still closed.
    pub fn close_all(&self) -> StorageResult<usize> {
        let drained: Vec<_> = self.readers.lock().drain().map(|(_, r)| r).collect();
        let mut first_err = None;
        for reader in &drained {
            if let Err(e) = reader.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(drained.len()),
        }
    }
}

impl Drop for ReaderRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            tracing::warn!(error = %e, "failed to close thread readers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seeded_tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let mut writer = open_sqlite(dir.path(), SqliteOptions::default()).unwrap();
        writer.create_table("person").unwrap();
        writer.put("person", "h1", b"p1").unwrap();
        writer.close().unwrap();
        dir
    }

    #[test]
    fn one_connection_per_thread() {
        let dir = seeded_tree();
        let registry = Arc::new(ReaderRegistry::new(dir.path()));

        let first = registry.reader().unwrap();
        let again = registry.reader().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.get("person", "h1").unwrap(), Some(b"p1".to_vec()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let reader = registry.reader().unwrap();
                    assert_eq!(reader.owner(), thread::current().id());
                    reader.count("person").unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.close_all().unwrap(), 4);
        assert!(registry.is_empty());
    }

    #[test]
    fn reader_refuses_foreign_thread() {
        let dir = seeded_tree();
        let registry = ReaderRegistry::new(dir.path());
        let reader = registry.reader().unwrap();

        let result = thread::spawn(move || reader.get("person", "h1").map(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(StorageError::WrongThread)));
    }

    #[test]
    fn closed_reader_fails() {
        let dir = seeded_tree();
        let registry = ReaderRegistry::new(dir.path());
        let reader = registry.reader().unwrap();
        registry.close_all().unwrap();
        assert!(matches!(reader.keys("person"), Err(StorageError::Closed)));
    }
}
