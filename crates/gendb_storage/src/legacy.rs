//! Legacy page-cache engine.
//!
//! Old trees keep one file per table, named `<table>.db` (the metadata table
//! lives in `meta_data.db`). Each file is a sequence of checksummed frames:
//! a put frame carries a key and a blob, a delete frame carries only a key.
//! On open every file is replayed into an in-memory page cache.
//!
//! The engine is an upgrade source only. [`LegacyBackend`] rejects all
//! writes. With the `fixtures` feature, `LegacyWriter` produces such trees
//! for conversion tests.

use crate::backend::{BackendKind, RowIter, SqlValue, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::framelog::FrameLog;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Frame magic of legacy table files.
pub const LEGACY_MAGIC: [u8; 4] = *b"GLPC";

const FRAME_PUT: u8 = 1;
const FRAME_DELETE: u8 = 2;

const METADATA_TABLE: &str = "metadata";
const METADATA_FILE: &str = "meta_data.db";

#[cfg(any(test, feature = "fixtures"))]
fn table_file(table: &str) -> String {
    if table == METADATA_TABLE {
        METADATA_FILE.to_string()
    } else {
        format!("{table}.db")
    }
}

fn table_for_file(file_name: &str) -> Option<String> {
    if file_name == METADATA_FILE {
        return Some(METADATA_TABLE.to_string());
    }
    let stem = file_name.strip_suffix(".db")?;
    crate::backend::validate_table_name(stem).ok()?;
    Some(stem.to_string())
}

#[cfg(any(test, feature = "fixtures"))]
fn encode_entry(key: &str, blob: &[u8]) -> StorageResult<Vec<u8>> {
    let key_len = u16::try_from(key.len())
        .map_err(|_| StorageError::query(format!("key too long: {} bytes", key.len())))?;
    let mut payload = Vec::with_capacity(2 + key.len() + blob.len());
    payload.extend_from_slice(&key_len.to_le_bytes());
    payload.extend_from_slice(key.as_bytes());
    payload.extend_from_slice(blob);
    Ok(payload)
}

fn replay(path: &Path) -> StorageResult<BTreeMap<String, Vec<u8>>> {
    let log = FrameLog::open_read_only(path, LEGACY_MAGIC)?;
    let mut rows = BTreeMap::new();

    for frame in log.frames() {
        let (kind, payload) = frame?;
        if payload.len() < 2 {
            return Err(StorageError::Corrupted(format!(
                "short legacy frame in {}",
                path.display()
            )));
        }
        let key_len = usize::from(u16::from_le_bytes([payload[0], payload[1]]));
        if payload.len() < 2 + key_len {
            return Err(StorageError::Corrupted(format!(
                "legacy key overruns frame in {}",
                path.display()
            )));
        }
        let key = String::from_utf8(payload[2..2 + key_len].to_vec())
            .map_err(|_| StorageError::Corrupted("legacy key is not UTF-8".to_string()))?;
        match kind {
            FRAME_PUT => {
                rows.insert(key, payload[2 + key_len..].to_vec());
            }
            FRAME_DELETE => {
                rows.remove(&key);
            }
            other => {
                return Err(StorageError::Corrupted(format!(
                    "unknown legacy frame kind {other}"
                )))
            }
        }
    }
    Ok(rows)
}

/// Read-only view over a legacy tree directory.
#[derive(Debug)]
pub struct LegacyBackend {
    dir: PathBuf,
    tables: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    closed: bool,
}

impl LegacyBackend {
    /// Replays every table file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the directory cannot be read
    /// and [`StorageError::Corrupted`] for damaged frames.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| StorageError::connection(format!("{}: {e}", dir.display())))?;

        let mut tables = BTreeMap::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(table) = name.to_str().and_then(table_for_file) else {
                continue;
            };
            if !entry.file_type()?.is_file() {
                continue;
            }
            tables.insert(table, replay(&entry.path())?);
        }

        tracing::debug!(dir = %dir.display(), tables = tables.len(), "opened legacy tree");
        Ok(Self {
            dir: dir.to_path_buf(),
            tables,
            closed: false,
        })
    }

    /// Names of the tables found on disk.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Directory this view was loaded from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table(&self, name: &str) -> StorageResult<Option<&BTreeMap<String, Vec<u8>>>> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(self.tables.get(name))
    }
}

impl StorageBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table(table)?.and_then(|rows| rows.get(key).cloned()))
    }

    fn put(&mut self, _table: &str, _key: &str, _blob: &[u8]) -> StorageResult<()> {
        Err(StorageError::ReadOnly)
    }

    fn delete(&mut self, _table: &str, _key: &str) -> StorageResult<bool> {
        Err(StorageError::ReadOnly)
    }

    fn scan(&self, table: &str) -> StorageResult<RowIter> {
        let rows: Vec<_> = self
            .table(table)?
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(rows.into_iter())
    }

    fn count(&self, table: &str) -> StorageResult<u64> {
        Ok(self.table(table)?.map_or(0, |rows| rows.len() as u64))
    }

    fn execute_raw(&mut self, _sql: &str, _params: &[SqlValue]) -> StorageResult<usize> {
        Err(StorageError::ReadOnly)
    }

    fn query_raw(&self, _sql: &str, _params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        Err(StorageError::Unsupported {
            backend: BackendKind::Legacy.display_name(),
            operation: "raw SQL",
        })
    }

    fn begin(&mut self) -> StorageResult<()> {
        Err(StorageError::ReadOnly)
    }

    fn commit(&mut self) -> StorageResult<()> {
        Err(StorageError::transaction("commit without open transaction"))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        Err(StorageError::transaction("rollback without open transaction"))
    }

    fn in_transaction(&self) -> bool {
        false
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.table(name)?.is_some())
    }

    fn create_table(&mut self, _name: &str) -> StorageResult<()> {
        Err(StorageError::ReadOnly)
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn close(&mut self) -> StorageResult<()> {
        self.tables.clear();
        self.closed = true;
        Ok(())
    }
}

/// Appends frames to legacy table files.
#[cfg(any(test, feature = "fixtures"))]
pub struct LegacyWriter {
    dir: PathBuf,
    files: std::collections::HashMap<String, FrameLog>,
}

#[cfg(any(test, feature = "fixtures"))]
impl LegacyWriter {
    /// Starts writing legacy tables into `dir`, which must exist.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            files: std::collections::HashMap::new(),
        }
    }

    fn file(&mut self, table: &str) -> StorageResult<&mut FrameLog> {
        crate::backend::validate_table_name(table)?;
        if !self.files.contains_key(table) {
            let log = FrameLog::append_to(&self.dir.join(table_file(table)), LEGACY_MAGIC)?;
            self.files.insert(table.to_string(), log);
        }
        self.files
            .get_mut(table)
            .ok_or_else(|| StorageError::query(format!("no such table: {table}")))
    }

    /// Records `key -> blob` in `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table file cannot be written.
    pub fn put(&mut self, table: &str, key: &str, blob: &[u8]) -> StorageResult<()> {
        let payload = encode_entry(key, blob)?;
        self.file(table)?.append(FRAME_PUT, &payload)?;
        Ok(())
    }

    /// Records the removal of `key` from `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table file cannot be written.
    pub fn delete(&mut self, table: &str, key: &str) -> StorageResult<()> {
        let payload = encode_entry(key, &[])?;
        self.file(table)?.append(FRAME_DELETE, &payload)?;
        Ok(())
    }

    /// Flushes and syncs every table file.
    ///
    /// # Errors
    ///
    /// Returns an error if a sync fails.
    pub fn finish(mut self) -> StorageResult<()> {
        for log in self.files.values_mut() {
            log.sync()?;
        }
        Ok(())
    }
}
