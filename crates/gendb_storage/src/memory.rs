//! In-memory row backend for tests and scratch stores.

use crate::backend::{validate_table_name, BackendKind, RowIter, SqlValue, StorageBackend};
use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;

type Tables = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// A backend whose tables live in process memory.
///
/// `begin` snapshots every table; `rollback` restores the snapshot. Raw SQL
/// is not available.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: Tables,
    snapshot: Option<Tables>,
    closed: bool,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn table(&self, name: &str) -> StorageResult<&BTreeMap<String, Vec<u8>>> {
        self.ensure_open()?;
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::query(format!("no such table: {name}")))
    }

    fn table_mut(&mut self, name: &str) -> StorageResult<&mut BTreeMap<String, Vec<u8>>> {
        self.ensure_open()?;
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::query(format!("no such table: {name}")))
    }
}

impl StorageBackend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table(table)?.get(key).cloned())
    }

    fn put(&mut self, table: &str, key: &str, blob: &[u8]) -> StorageResult<()> {
        self.table_mut(table)?.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &str) -> StorageResult<bool> {
        Ok(self.table_mut(table)?.remove(key).is_some())
    }

    fn scan(&self, table: &str) -> StorageResult<RowIter> {
        let rows: Vec<_> = self
            .table(table)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(rows.into_iter())
    }

    fn keys(&self, table: &str) -> StorageResult<Vec<String>> {
        Ok(self.table(table)?.keys().cloned().collect())
    }

    fn count(&self, table: &str) -> StorageResult<u64> {
        Ok(self.table(table)?.len() as u64)
    }

    fn execute_raw(&mut self, _sql: &str, _params: &[SqlValue]) -> StorageResult<usize> {
        Err(StorageError::Unsupported {
            backend: BackendKind::InMemory.display_name(),
            operation: "raw SQL",
        })
    }

    fn query_raw(&self, _sql: &str, _params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        Err(StorageError::Unsupported {
            backend: BackendKind::InMemory.display_name(),
            operation: "raw SQL",
        })
    }

    fn begin(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.snapshot.is_some() {
            return Err(StorageError::transaction("transaction already open"));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::transaction("commit without open transaction"))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StorageError::transaction("rollback without open transaction"))?;
        self.tables = snapshot;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.tables.contains_key(name))
    }

    fn create_table(&mut self, name: &str) -> StorageResult<()> {
        validate_table_name(name)?;
        self.ensure_open()?;
        self.tables.entry(name.to_string()).or_default();
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.snapshot = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_snapshot() {
        let mut backend = InMemoryBackend::new();
        backend.create_table("person").unwrap();
        backend.put("person", "a", b"1").unwrap();

        backend.begin().unwrap();
        backend.put("person", "b", b"2").unwrap();
        backend.put("person", "a", b"changed").unwrap();
        backend.rollback().unwrap();

        assert_eq!(backend.get("person", "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get("person", "b").unwrap(), None);
    }

    #[test]
    fn commit_keeps_writes() {
        let mut backend = InMemoryBackend::new();
        backend.create_table("family").unwrap();
        backend.begin().unwrap();
        backend.put("family", "f", b"x").unwrap();
        backend.commit().unwrap();
        assert!(backend.commit().is_err());
        assert_eq!(backend.count("family").unwrap(), 1);
    }

    #[test]
    fn missing_table_is_query_error() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            backend.get("nope", "k"),
            Err(StorageError::Query { .. })
        ));
        assert!(backend.query_raw("SELECT 1", &[]).is_err());
    }
}
