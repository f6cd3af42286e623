//! Family-tree manager.
//!
//! [`DbManager`] is the surface shown to the GUI and the command line: it
//! enumerates the trees under the configured root, creates, renames and
//! removes them, and opens and closes their stores.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gendb_core::{Config, DbManager, OpenOptions};
//!
//! let manager = DbManager::new(Config::new());
//! let (path, title) = manager.create_new_tree(None, None)?;
//! let store = manager.open(&path, OpenOptions::new())?;
//! println!("{title}: {} people", store.get_number_of_people()?);
//! manager.close(store)?;
//! # Ok::<(), gendb_core::StoreError>(())
//! ```

use crate::config::{Config, OpenOptions};
use crate::dir::{TreeDir, NAME_FILE};
use crate::error::{StoreError, StoreResult};
use crate::store::ObjectStore;
use gendb_storage::BackendKind;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{info, warn};

/// How a tree is shown in the tree list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStatus {
    /// Opened by this manager.
    Open,
    /// Locked by someone else.
    Locked,
    /// Last session did not close cleanly.
    NeedsRecovery,
    /// Closed and unlocked.
    Normal,
}

/// One row of the tree list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Display title.
    pub title: String,
    /// Tree directory.
    pub path: PathBuf,
    /// Path of the title file.
    pub name_file: PathBuf,
    /// Last access as local time text, or `"Never"`.
    pub last_accessed: String,
    /// Last access in seconds since the epoch, for sorting.
    pub last_accessed_sort: i64,
    /// Whether the tree is open here or locked elsewhere.
    pub is_open_or_locked: bool,
    /// List status.
    pub status: TreeStatus,
    /// Identifier from `database.txt`.
    pub backend_id: String,
}

/// Ordered key/value summary of one tree.
pub type Summary = Vec<(String, String)>;

/// Manages the family trees under one root directory.
pub struct DbManager {
    config: Config,
    open: Mutex<BTreeSet<PathBuf>>,
}

impl DbManager {
    /// Creates a manager over `config.database_path`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            open: Mutex::new(BTreeSet::new()),
        }
    }

    /// Root directory holding the trees.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.database_path
    }

    /// Configuration handed to every opened store.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Every tree under the root, sorted by title.
    ///
    /// Directories without a title file are ignored. A missing root is an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read.
    pub fn family_tree_list(&self) -> StoreResult<Vec<TreeEntry>> {
        let root = self.root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let open = self.open.lock();
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(root)? {
            let path = dir_entry?.path();
            if !path.join(NAME_FILE).is_file() {
                continue;
            }
            let dir = TreeDir::open(&path)?;
            let status = if open.contains(&path) {
                TreeStatus::Open
            } else if dir.is_locked() {
                TreeStatus::Locked
            } else if dir.needs_recovery() {
                TreeStatus::NeedsRecovery
            } else {
                TreeStatus::Normal
            };
            let last_accessed_sort = dir
                .last_modified()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .and_then(|d| i64::try_from(d.as_secs()).ok())
                .unwrap_or_default();
            entries.push(TreeEntry {
                title: dir.title(),
                name_file: dir.name_file(),
                last_accessed: dir.last_accessed_text(),
                last_accessed_sort,
                is_open_or_locked: matches!(status, TreeStatus::Open | TreeStatus::Locked),
                status,
                backend_id: dir.backend_id(),
                path,
            });
        }
        entries.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// Titles currently in use under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read.
    pub fn titles(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.family_tree_list()?.into_iter().map(|e| e.title).collect())
    }

    /// `"Family Tree N"` with the smallest unused `N`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read.
    pub fn default_title(&self) -> StoreResult<String> {
        let titles = self.titles()?;
        Ok((1u32..)
            .map(|n| format!("Family Tree {n}"))
            .find(|t| !titles.contains(t))
            .unwrap_or_else(|| "Family Tree".to_string()))
    }

    /// Creates and initializes an empty tree, returning its directory and
    /// title.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] for the legacy engine, which cannot
    /// create trees, or any error from creating the directory or the store.
    pub fn create_new_tree(
        &self,
        title: Option<&str>,
        backend: Option<BackendKind>,
    ) -> StoreResult<(PathBuf, String)> {
        let backend = backend.unwrap_or(self.config.default_backend);
        if backend == BackendKind::Legacy {
            return Err(StoreError::ReadOnly);
        }
        let title = match title {
            Some(title) => title.to_string(),
            None => self.default_title()?,
        };
        let dir = TreeDir::create(self.root(), &title, backend)?;
        let path = dir.path().to_path_buf();
        let initialized = ObjectStore::open(&path, &self.config, OpenOptions::new()).and_then(ObjectStore::close);
        if let Err(err) = initialized {
            warn!(path = %path.display(), error = %err, "removing tree that failed to initialize");
            dir.remove()?;
            return Err(err);
        }
        Ok((path, title))
    }

    /// Opens the store of the tree at `path`.
    ///
    /// # Errors
    ///
    /// See [`ObjectStore::open`].
    pub fn open(&self, path: &Path, options: OpenOptions) -> StoreResult<ObjectStore> {
        let store = ObjectStore::open(path, &self.config, options)?;
        self.open.lock().insert(path.to_path_buf());
        Ok(store)
    }

    /// Closes a store opened by [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// See [`ObjectStore::close`].
    pub fn close(&self, store: ObjectStore) -> StoreResult<()> {
        if let Some(path) = store.path() {
            self.open.lock().remove(path);
        }
        store.close()
    }

    /// Whether this manager has the tree at `path` open.
    #[must_use]
    pub fn is_open(&self, path: &Path) -> bool {
        self.open.lock().contains(path)
    }

    /// Removes every tree whose whole title matches `title_pattern`,
    /// returning the removed titles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Pattern`] for an invalid pattern,
    /// [`StoreError::TreeNotFound`] if nothing matches and
    /// [`StoreError::LockHeld`] if a matching tree is open or locked; in the
    /// last case nothing is removed.
    pub fn remove_tree(&self, title_pattern: &str) -> StoreResult<Vec<String>> {
        let pattern = Regex::new(&format!("^(?:{title_pattern})$"))?;
        let matching: Vec<TreeEntry> = self
            .family_tree_list()?
            .into_iter()
            .filter(|e| pattern.is_match(&e.title))
            .collect();
        if matching.is_empty() {
            return Err(StoreError::tree_not_found(title_pattern));
        }
        if let Some(busy) = matching.iter().find(|e| e.is_open_or_locked) {
            return Err(StoreError::LockHeld {
                path: busy.path.clone(),
                holder: TreeDir::open(&busy.path)?.lock_holder().unwrap_or_default(),
            });
        }
        let mut removed = Vec::with_capacity(matching.len());
        for entry in matching {
            TreeDir::open(&entry.path)?.remove()?;
            removed.push(entry.title);
        }
        Ok(removed)
    }

    /// Retitles the tree owning `name_file`, returning the old and new
    /// titles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TreeNotFound`] if `name_file` is not inside a
    /// tree directory, or an I/O error.
    pub fn rename_tree(&self, name_file: &Path, new_title: &str) -> StoreResult<(String, String)> {
        let dir = name_file
            .parent()
            .filter(|_| name_file.file_name().is_some_and(|n| n == NAME_FILE))
            .ok_or_else(|| StoreError::tree_not_found(name_file.display().to_string()))?;
        let dir = TreeDir::open(dir)?;
        let old_title = dir.title();
        dir.write_title(new_title)?;
        info!(path = %dir.path().display(), old = %old_title, new = new_title, "renamed family tree");
        Ok((old_title, new_title.to_string()))
    }

    /// Removes the lock file of the tree at `path`, whoever holds it.
    ///
    /// Callers confirm with the user first; a tree still open somewhere is
    /// only logged.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a tree directory or the file cannot
    /// be removed.
    pub fn break_lock(&self, path: &Path) -> StoreResult<()> {
        let dir = TreeDir::open(path)?;
        if self.is_open(path) || dir.lock_is_live() {
            warn!(
                path = %path.display(),
                holder = dir.lock_holder().unwrap_or_default(),
                "breaking the lock of a tree that is still open"
            );
        }
        dir.break_lock()
    }

    /// Describes the tree at `path`.
    ///
    /// The object count comes from a read-only open. When that is not
    /// possible, for example for trees that still need an upgrade, the count
    /// is reported as unavailable and the schema version is taken from
    /// `schemaversion.txt`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a tree directory.
    pub fn get_summary(&self, path: &Path) -> StoreResult<Summary> {
        let dir = TreeDir::open(path)?;
        let database = dir
            .backend()
            .map(|k| k.display_name().to_string())
            .unwrap_or_else(|_| dir.backend_id());
        let counts = ObjectStore::open(
            path,
            &self.config,
            OpenOptions::new().read_only(true).allow_recovery(true),
        )
        .and_then(|store| {
            let counted = store
                .get_number_of_people()
                .map(|people| (people, store.schema_version()));
            store.close()?;
            counted
        });
        let (people, schema) = match counts {
            Ok((people, schema)) => (people.to_string(), schema.to_string()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read tree for summary");
                let schema = dir
                    .schema_version()
                    .map_or_else(|| "unknown".to_string(), |v| v.to_string());
                ("unavailable".to_string(), schema)
            }
        };
        let locked = if dir.is_locked() { "yes" } else { "no" };
        Ok(vec![
            ("Path".to_string(), path.display().to_string()),
            ("Family Tree".to_string(), dir.title()),
            ("Last accessed".to_string(), dir.last_accessed_text()),
            ("Database".to_string(), database),
            ("Locked?".to_string(), locked.to_string()),
            ("Number of people".to_string(), people),
            ("Version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("Schema version".to_string(), schema),
        ])
    }

    /// Entry whose title is exactly `title`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TreeNotFound`] if no tree has that title.
    pub fn find_by_title(&self, title: &str) -> StoreResult<TreeEntry> {
        self.family_tree_list()?
            .into_iter()
            .find(|e| e.title == title)
            .ok_or_else(|| StoreError::tree_not_found(title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CURRENT_SCHEMA_VERSION;
    use tempfile::tempdir;

    fn manager(root: &Path) -> DbManager {
        DbManager::new(Config::with_root(root).backup_on_upgrade(false))
    }

    fn value<'a>(summary: &'a Summary, key: &str) -> &'a str {
        &summary.iter().find(|(k, _)| k == key).unwrap().1
    }

    #[test]
    fn default_titles_fill_gaps() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let (_, first) = manager.create_new_tree(None, None).unwrap();
        let (_, second) = manager.create_new_tree(None, None).unwrap();
        assert_eq!(first, "Family Tree 1");
        assert_eq!(second, "Family Tree 2");

        manager.remove_tree("Family Tree 1").unwrap();
        assert_eq!(manager.default_title().unwrap(), "Family Tree 1");
    }

    #[test]
    fn list_reports_status() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let (path, _) = manager.create_new_tree(Some("Smith"), None).unwrap();
        manager.create_new_tree(Some("Jones"), None).unwrap();

        let list = manager.family_tree_list().unwrap();
        let titles: Vec<_> = list.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Jones", "Smith"]);
        assert!(list.iter().all(|e| e.status == TreeStatus::Normal));
        assert!(list.iter().all(|e| e.backend_id == "sqlite"));

        let store = manager.open(&path, OpenOptions::new()).unwrap();
        let smith = manager.find_by_title("Smith").unwrap();
        assert_eq!(smith.status, TreeStatus::Open);
        assert!(smith.is_open_or_locked);
        assert!(manager.remove_tree("Smith").is_err());

        manager.close(store).unwrap();
        assert_eq!(manager.find_by_title("Smith").unwrap().status, TreeStatus::Normal);
    }

    #[test]
    fn remove_matches_whole_titles() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        for title in ["Smith", "Smithson", "Jones"] {
            manager.create_new_tree(Some(title), None).unwrap();
        }
        assert_eq!(manager.remove_tree("Smith").unwrap(), ["Smith"]);
        assert!(matches!(
            manager.remove_tree("Smith"),
            Err(StoreError::TreeNotFound { .. })
        ));
        assert!(matches!(manager.remove_tree("("), Err(StoreError::Pattern(_))));
        let mut removed = manager.remove_tree(".*s.*").unwrap();
        removed.sort();
        assert_eq!(removed, ["Jones", "Smithson"]);
        assert!(manager.family_tree_list().unwrap().is_empty());
    }

    #[test]
    fn rename_returns_both_titles() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let (path, _) = manager.create_new_tree(Some("Draft"), None).unwrap();
        let entry = manager.find_by_title("Draft").unwrap();
        let (old, new) = manager.rename_tree(&entry.name_file, "Final").unwrap();
        assert_eq!((old.as_str(), new.as_str()), ("Draft", "Final"));
        assert_eq!(TreeDir::open(&path).unwrap().title(), "Final");
        assert!(manager.rename_tree(&path, "Nope").is_err());
    }

    #[test]
    fn break_lock_removes_any_lock() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let (path, _) = manager.create_new_tree(Some("Old"), None).unwrap();
        let dir = TreeDir::open(&path).unwrap();
        dir.write_lock("someone@elsewhere").unwrap();
        assert_eq!(manager.find_by_title("Old").unwrap().status, TreeStatus::Locked);

        manager.break_lock(&path).unwrap();
        assert!(!dir.is_locked());

        let store = manager.open(&path, OpenOptions::new()).unwrap();
        manager.break_lock(&path).unwrap();
        assert!(!dir.is_locked());
        manager.close(store).unwrap();
        assert!(!manager.is_open(&path));
    }

    #[test]
    fn summary_lists_the_tree() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let (path, _) = manager.create_new_tree(Some("Summary"), None).unwrap();
        let mut store = manager.open(&path, OpenOptions::new()).unwrap();
        let mut person = crate::objects::Person::default();
        store.transaction("add", |s, txn| s.add_person(&mut person, txn)).unwrap();
        manager.close(store).unwrap();

        let summary = manager.get_summary(&path).unwrap();
        assert_eq!(value(&summary, "Family Tree"), "Summary");
        assert_eq!(value(&summary, "Database"), "SQLite");
        assert_eq!(value(&summary, "Locked?"), "no");
        assert_eq!(value(&summary, "Number of people"), "1");
        assert_eq!(
            value(&summary, "Schema version"),
            CURRENT_SCHEMA_VERSION.to_string()
        );
        assert!(!TreeDir::open(&path).unwrap().needs_recovery());
    }

    #[test]
    fn legacy_engine_cannot_create() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        assert!(matches!(
            manager.create_new_tree(None, Some(BackendKind::Legacy)),
            Err(StoreError::ReadOnly)
        ));
    }
}
