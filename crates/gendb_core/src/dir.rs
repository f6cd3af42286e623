//! Family-tree directory management.
//!
//! Each tree lives in its own directory under the configured root:
//!
//! ```text
//! <root>/<tree>/
//! ├─ name.txt           # display title
//! ├─ database.txt       # backend identifier
//! ├─ lock               # "user@host" of the holder; presence = locked
//! ├─ need_recover       # presence = last session did not close cleanly
//! ├─ schemaversion.txt  # schema version for legacy readers
//! ├─ sqlite.db          # engine files
//! └─ undo.log           # session undo journal
//! ```
//!
//! The `lock` file is advisory. While a store is open it additionally holds
//! an OS-level lock on that file, so a forced unlock can tell a stale lock
//! from a live holder.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Local};
use fs2::FileExt;
use gendb_storage::{BackendKind, SQLITE_FILE};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Display title file.
pub const NAME_FILE: &str = "name.txt";
/// Backend identifier file.
pub const BACKEND_FILE: &str = "database.txt";
/// Advisory lock file.
pub const LOCK_FILE: &str = "lock";
/// Recovery marker file.
pub const RECOVERY_FILE: &str = "need_recover";
/// Schema version file.
pub const SCHEMA_VERSION_FILE: &str = "schemaversion.txt";
/// Metadata file of legacy trees.
pub const META_FILE: &str = "meta_data.db";

/// One family-tree directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDir {
    path: PathBuf,
}

impl TreeDir {
    /// Wraps an existing tree directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if `path` is not a directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.is_dir() {
            return Err(StoreError::connection(path, "family tree directory does not exist"));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Allocates a fresh directory under `root` and writes its name and
    /// backend files.
    ///
    /// The directory name is the current time in hex milliseconds, bumped
    /// until unused.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or its files cannot be written.
    pub fn create(root: &Path, title: &str, backend: BackendKind) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        let mut stamp = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let path = loop {
            let candidate = root.join(format!("{stamp:x}"));
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => return Err(e.into()),
            }
        };
        let dir = Self { path };
        dir.write_title(title)?;
        dir.write_backend(backend)?;
        info!(path = %dir.path.display(), title, backend = backend.id(), "created family tree");
        Ok(dir)
    }

    /// Tree directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `name.txt`.
    #[must_use]
    pub fn name_file(&self) -> PathBuf {
        self.path.join(NAME_FILE)
    }

    /// Display title, or the directory name if `name.txt` is missing.
    #[must_use]
    pub fn title(&self) -> String {
        read_line(&self.name_file()).unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Replaces the display title.
    ///
    /// # Errors
    ///
    /// Returns an error if `name.txt` cannot be written.
    pub fn write_title(&self, title: &str) -> StoreResult<()> {
        write_line(&self.name_file(), title)
    }

    /// Backend identifier from `database.txt`; trees without one are legacy.
    #[must_use]
    pub fn backend_id(&self) -> String {
        read_line(&self.path.join(BACKEND_FILE))
            .unwrap_or_else(|| BackendKind::Legacy.id().to_string())
    }

    /// Backend named by `database.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownBackend`] for an unrecognised identifier.
    pub fn backend(&self) -> StoreResult<BackendKind> {
        let id = self.backend_id();
        BackendKind::from_id(&id).ok_or(StoreError::UnknownBackend { id })
    }

    /// Rewrites `database.txt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_backend(&self, backend: BackendKind) -> StoreResult<()> {
        write_line(&self.path.join(BACKEND_FILE), backend.id())
    }

    /// Whether a lock file exists.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.path.join(LOCK_FILE).exists()
    }

    /// Identity written in the lock file.
    #[must_use]
    pub fn lock_holder(&self) -> Option<String> {
        read_line(&self.path.join(LOCK_FILE))
    }

    /// Writes the lock file with `identity`, verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_lock(&self, identity: &str) -> StoreResult<()> {
        write_line(&self.path.join(LOCK_FILE), identity)?;
        debug!(path = %self.path.display(), identity, "wrote lock");
        Ok(())
    }

    /// Removes the lock file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn clear_lock(&self) -> StoreResult<()> {
        remove_if_exists(&self.path.join(LOCK_FILE))?;
        debug!(path = %self.path.display(), "cleared lock");
        Ok(())
    }

    /// Removes the lock file regardless of who wrote it.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn break_lock(&self) -> StoreResult<()> {
        if let Some(holder) = self.lock_holder() {
            warn!(path = %self.path.display(), holder, "breaking lock");
        }
        remove_if_exists(&self.path.join(LOCK_FILE))?;
        Ok(())
    }

    /// Whether an open store in some process still holds the OS lock.
    #[must_use]
    pub fn lock_is_live(&self) -> bool {
        let Ok(file) = File::open(self.path.join(LOCK_FILE)) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    /// Creates the lock file and takes the OS lock on it.
    ///
    /// A failed attempt leaves the directory as it found it: an existing
    /// lock file belongs to someone else and is not touched, and a file this
    /// call created is removed again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockHeld`] if a lock file already exists or
    /// another process holds the OS lock, or an I/O error.
    pub fn acquire_lock(&self, identity: &str) -> StoreResult<TreeLock> {
        let path = self.path.join(LOCK_FILE);
        let held = || StoreError::LockHeld {
            path: self.path.clone(),
            holder: self.lock_holder().unwrap_or_default(),
        };
        let mut file = match fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(held()),
            Err(e) => return Err(e.into()),
        };
        if file.try_lock_exclusive().is_err() {
            drop(file);
            remove_if_exists(&path)?;
            return Err(held());
        }
        if let Err(e) = file.write_all(identity.as_bytes()).and_then(|()| file.flush()) {
            let _ = FileExt::unlock(&file);
            drop(file);
            remove_if_exists(&path)?;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), identity, "acquired lock");
        Ok(TreeLock { file, path })
    }

    /// Whether the recovery marker exists.
    #[must_use]
    pub fn needs_recovery(&self) -> bool {
        self.path.join(RECOVERY_FILE).exists()
    }

    /// Creates the recovery marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn set_recovery_marker(&self) -> StoreResult<()> {
        File::create(self.path.join(RECOVERY_FILE))?;
        Ok(())
    }

    /// Removes the recovery marker.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing marker cannot be removed.
    pub fn clear_recovery_marker(&self) -> StoreResult<()> {
        remove_if_exists(&self.path.join(RECOVERY_FILE))
    }

    /// Schema version from `schemaversion.txt`.
    #[must_use]
    pub fn schema_version(&self) -> Option<u16> {
        read_line(&self.path.join(SCHEMA_VERSION_FILE)).and_then(|s| s.parse().ok())
    }

    /// Rewrites `schemaversion.txt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_schema_version(&self, version: u16) -> StoreResult<()> {
        write_line(&self.path.join(SCHEMA_VERSION_FILE), &version.to_string())
    }

    /// When the tree's data was last written.
    ///
    /// Taken from the engine file, falling back to the legacy metadata file
    /// and then the directory itself. Where the reported creation time is
    /// later than the modification time, the creation time is used.
    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        [SQLITE_FILE, META_FILE]
            .iter()
            .map(|f| self.path.join(f))
            .find(|p| p.exists())
            .unwrap_or_else(|| self.path.clone())
            .metadata()
            .ok()
            .and_then(|meta| {
                let modified = meta.modified().ok()?;
                Some(match meta.created() {
                    Ok(created) if created > modified => created,
                    _ => modified,
                })
            })
    }

    /// [`last_modified`](Self::last_modified) as local time text, or
    /// `"Never"`.
    #[must_use]
    pub fn last_accessed_text(&self) -> String {
        self.last_modified().map_or_else(
            || "Never".to_string(),
            |t| {
                DateTime::<Local>::from(t)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
    }

    /// Deletes the whole directory.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn remove(self) -> StoreResult<()> {
        fs::remove_dir_all(&self.path)?;
        info!(path = %self.path.display(), "removed family tree");
        Ok(())
    }
}

/// Held lock on an open tree; released by [`release`](Self::release) or
/// on drop.
#[derive(Debug)]
pub struct TreeLock {
    file: File,
    path: PathBuf,
}

impl TreeLock {
    /// Drops the OS lock and removes the lock file.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be removed.
    pub fn release(self) -> StoreResult<()> {
        let _ = FileExt::unlock(&self.file);
        remove_if_exists(&self.path)
    }
}

/// `user@host` for the current process, or just `user`.
#[must_use]
pub fn lock_identity() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| read_line(Path::new("/etc/hostname")))
        .filter(|h| !h.is_empty());
    match host {
        Some(host) => format!("{user}@{host}"),
        None => user,
    }
}

fn read_line(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    Some(text.lines().next().unwrap_or_default().trim().to_string())
}

fn write_line(path: &Path, text: &str) -> StoreResult<()> {
    fs::write(path, text)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_writes_name_and_backend() {
        let root = tempdir().unwrap();
        let a = TreeDir::create(root.path(), "Test Tree", BackendKind::Sqlite).unwrap();
        let b = TreeDir::create(root.path(), "Other", BackendKind::Sqlite).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.title(), "Test Tree");
        assert_eq!(a.backend().unwrap(), BackendKind::Sqlite);
        assert_eq!(fs::read_to_string(a.name_file()).unwrap(), "Test Tree");
    }

    #[test]
    fn missing_backend_file_means_legacy() {
        let root = tempdir().unwrap();
        let dir = TreeDir::open(root.path()).unwrap();
        assert_eq!(dir.backend().unwrap(), BackendKind::Legacy);
        write_line(&root.path().join(BACKEND_FILE), "nosuchdb").unwrap();
        assert!(matches!(dir.backend(), Err(StoreError::UnknownBackend { .. })));
    }

    #[test]
    fn lock_file_discipline() {
        let root = tempdir().unwrap();
        let dir = TreeDir::open(root.path()).unwrap();
        assert!(!dir.is_locked());
        dir.write_lock("alice@host1").unwrap();
        assert!(dir.is_locked());
        assert_eq!(dir.lock_holder().as_deref(), Some("alice@host1"));
        assert!(!dir.lock_is_live());
        dir.clear_lock().unwrap();
        assert!(!dir.is_locked());
        dir.write_lock("bob").unwrap();
        dir.break_lock().unwrap();
        assert!(!dir.is_locked());
        dir.clear_lock().unwrap();
    }

    #[test]
    fn acquired_lock_is_live_until_released() {
        let root = tempdir().unwrap();
        let dir = TreeDir::open(root.path()).unwrap();
        let lock = dir.acquire_lock("me@here").unwrap();
        assert!(dir.is_locked());
        assert!(dir.lock_is_live());
        assert!(matches!(dir.acquire_lock("other"), Err(StoreError::LockHeld { .. })));
        assert_eq!(dir.lock_holder().as_deref(), Some("me@here"));
        lock.release().unwrap();
        assert!(!dir.is_locked());
    }

    #[test]
    fn failed_acquire_leaves_existing_lock_alone() {
        let root = tempdir().unwrap();
        let dir = TreeDir::open(root.path()).unwrap();
        dir.write_lock("alice@host1").unwrap();
        let err = dir.acquire_lock("me@here").unwrap_err();
        assert!(matches!(err, StoreError::LockHeld { ref holder, .. } if holder == "alice@host1"));
        assert_eq!(dir.lock_holder().as_deref(), Some("alice@host1"));

        dir.break_lock().unwrap();
        let lock = dir.acquire_lock("me@here").unwrap();
        assert_eq!(dir.lock_holder().as_deref(), Some("me@here"));
        lock.release().unwrap();
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn recovery_marker_and_schema_version() {
        let root = tempdir().unwrap();
        let dir = TreeDir::open(root.path()).unwrap();
        assert!(!dir.needs_recovery());
        dir.set_recovery_marker().unwrap();
        assert!(dir.needs_recovery());
        dir.clear_recovery_marker().unwrap();
        assert!(!dir.needs_recovery());

        assert_eq!(dir.schema_version(), None);
        dir.write_schema_version(15).unwrap();
        assert_eq!(dir.schema_version(), Some(15));
        assert!(dir.last_modified().is_some());
    }

    #[test]
    fn identity_is_not_empty() {
        assert!(!lock_identity().is_empty());
    }
}
