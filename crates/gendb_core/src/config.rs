//! Store configuration.

use gendb_storage::BackendKind;
use std::path::{Path, PathBuf};

/// Configuration shared by the tree manager and every store it opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one subdirectory per family tree.
    pub database_path: PathBuf,

    /// Engine used for new trees.
    pub default_backend: BackendKind,

    /// Whether to archive the tree before running upgrades.
    pub backup_on_upgrade: bool,

    /// Maximum number of undoable transactions kept.
    pub undo_history_limit: usize,

    /// Whether the embedded engine runs in write-ahead-log mode.
    pub sqlite_wal: bool,

    /// Whether the undo journal lives on disk (`undo.log`) or in memory.
    pub disk_undo_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        let database_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gendb")
            .join("grampsdb");
        Self {
            database_path,
            default_backend: BackendKind::Sqlite,
            backup_on_upgrade: true,
            undo_history_limit: 1000,
            sqlite_wal: true,
            disk_undo_log: true,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default configuration rooted at `path`.
    #[must_use]
    pub fn with_root(path: &Path) -> Self {
        Self {
            database_path: path.to_path_buf(),
            ..Self::default()
        }
    }

    /// Sets the engine for new trees.
    #[must_use]
    pub const fn default_backend(mut self, kind: BackendKind) -> Self {
        self.default_backend = kind;
        self
    }

    /// Sets whether upgrades are preceded by a backup.
    #[must_use]
    pub const fn backup_on_upgrade(mut self, value: bool) -> Self {
        self.backup_on_upgrade = value;
        self
    }

    /// Sets the undo history length.
    #[must_use]
    pub const fn undo_history_limit(mut self, limit: usize) -> Self {
        self.undo_history_limit = limit;
        self
    }

    /// Sets write-ahead-log mode for the embedded engine.
    #[must_use]
    pub const fn sqlite_wal(mut self, value: bool) -> Self {
        self.sqlite_wal = value;
        self
    }

    /// Sets whether the undo journal is kept on disk.
    #[must_use]
    pub const fn disk_undo_log(mut self, value: bool) -> Self {
        self.disk_undo_log = value;
        self
    }
}

/// Answers to the questions a load can raise.
///
/// A caller that receives [`StoreError::LockHeld`], [`StoreError::UpgradeRequired`]
/// or [`StoreError::RecoveryRequired`] retries the open with the matching
/// flag set.
///
/// [`StoreError::LockHeld`]: crate::StoreError::LockHeld
/// [`StoreError::UpgradeRequired`]: crate::StoreError::UpgradeRequired
/// [`StoreError::RecoveryRequired`]: crate::StoreError::RecoveryRequired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Break a lock held by another process.
    pub force_unlock: bool,
    /// Run pending schema upgrades.
    pub allow_upgrade: bool,
    /// Open a tree that was not closed cleanly.
    pub allow_recovery: bool,
    /// Open without taking the lock or writing anything.
    pub read_only: bool,
}

impl OpenOptions {
    /// Creates options with every flag off.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            force_unlock: false,
            allow_upgrade: false,
            allow_recovery: false,
            read_only: false,
        }
    }

    /// Sets whether a foreign lock is broken.
    #[must_use]
    pub const fn force_unlock(mut self, value: bool) -> Self {
        self.force_unlock = value;
        self
    }

    /// Sets whether upgrades may run.
    #[must_use]
    pub const fn allow_upgrade(mut self, value: bool) -> Self {
        self.allow_upgrade = value;
        self
    }

    /// Sets whether recovery may run.
    #[must_use]
    pub const fn allow_recovery(mut self, value: bool) -> Self {
        self.allow_recovery = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.backup_on_upgrade);
        assert_eq!(config.undo_history_limit, 1000);
        assert_eq!(config.default_backend, BackendKind::Sqlite);
        assert!(config.database_path.ends_with("gendb/grampsdb"));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::with_root(Path::new("/tmp/trees"))
            .backup_on_upgrade(false)
            .undo_history_limit(5)
            .sqlite_wal(false);
        assert_eq!(config.database_path, PathBuf::from("/tmp/trees"));
        assert!(!config.backup_on_upgrade);
        assert_eq!(config.undo_history_limit, 5);
        assert!(!config.sqlite_wal);

        let opts = OpenOptions::new().allow_upgrade(true);
        assert!(opts.allow_upgrade);
        assert!(!opts.force_unlock);
    }
}
