//! Static backend factory.

use crate::backend::{BackendKind, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::legacy::LegacyBackend;
use crate::memory::InMemoryBackend;
use crate::sqlite::{open_sqlite, SqliteOptions};
use std::path::{Path, PathBuf};

/// Everything needed to open a backend for one tree.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Engine to open.
    pub kind: BackendKind,
    /// Tree directory holding the engine's files.
    pub tree_dir: PathBuf,
    /// Write-ahead-log mode for the embedded engine.
    pub wal: bool,
    /// Open without write access.
    pub read_only: bool,
}

impl BackendConfig {
    /// Creates a writable configuration with WAL enabled.
    #[must_use]
    pub fn new(kind: BackendKind, tree_dir: &Path) -> Self {
        Self {
            kind,
            tree_dir: tree_dir.to_path_buf(),
            wal: true,
            read_only: false,
        }
    }

    /// Sets write-ahead-log mode.
    #[must_use]
    pub fn wal(mut self, value: bool) -> Self {
        self.wal = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

/// Opens the backend described by `config`.
///
/// Client/server engines share the SQL row backend and dialect rewriting but
/// need a network driver, which this build does not link; selecting one
/// fails with a connection error naming the missing driver.
///
/// # Errors
///
/// Returns [`StorageError::Connection`] if the engine cannot be opened.
pub fn open_backend(config: &BackendConfig) -> StorageResult<Box<dyn StorageBackend>> {
    match config.kind {
        BackendKind::Sqlite => {
            let backend = open_sqlite(
                &config.tree_dir,
                SqliteOptions {
                    wal: config.wal,
                    read_only: config.read_only,
                },
            )?;
            Ok(Box::new(backend))
        }
        BackendKind::Legacy => Ok(Box::new(LegacyBackend::open(&config.tree_dir)?)),
        BackendKind::InMemory => Ok(Box::new(InMemoryBackend::new())),
        BackendKind::Postgresql | BackendKind::Mysql => Err(StorageError::connection(format!(
            "no {} driver is compiled into this build",
            config.kind.display_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_embedded_engine() {
        let dir = tempdir().unwrap();
        let mut backend = open_backend(&BackendConfig::new(BackendKind::Sqlite, dir.path())).unwrap();
        assert_eq!(backend.kind(), BackendKind::Sqlite);
        backend.create_table("person").unwrap();
        backend.close().unwrap();
        assert!(dir.path().join(crate::SQLITE_FILE).exists());
    }

    #[test]
    fn server_engines_report_missing_driver() {
        let dir = tempdir().unwrap();
        for kind in [BackendKind::Postgresql, BackendKind::Mysql] {
            let err = open_backend(&BackendConfig::new(kind, dir.path())).err().unwrap();
            assert!(matches!(err, StorageError::Connection { .. }));
            assert!(err.to_string().contains(kind.display_name()));
        }
    }

    #[test]
    fn legacy_opens_read_only() {
        let dir = tempdir().unwrap();
        let backend = open_backend(&BackendConfig::new(BackendKind::Legacy, dir.path())).unwrap();
        assert!(backend.is_read_only());
    }
}
