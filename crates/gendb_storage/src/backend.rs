//! Row-level backend trait and shared types.

use crate::error::{StorageError, StorageResult};

/// Rows returned by a table scan, in key order.
pub type RowIter = std::vec::IntoIter<(String, Vec<u8>)>;

/// The closed set of physical engines a family tree can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// Embedded single-file SQL engine (the default).
    Sqlite,
    /// PostgreSQL client/server engine.
    Postgresql,
    /// MySQL client/server engine.
    Mysql,
    /// Legacy page-cache engine; readable only, as an upgrade source.
    Legacy,
    /// Process-local tables for tests and scratch stores.
    InMemory,
}

impl BackendKind {
    /// Every backend, in registry order.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Sqlite,
        BackendKind::Postgresql,
        BackendKind::Mysql,
        BackendKind::Legacy,
        BackendKind::InMemory,
    ];

    /// Identifier written to `database.txt`.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgresql => "postgresql",
            BackendKind::Mysql => "mysql",
            BackendKind::Legacy => "bsddb",
            BackendKind::InMemory => "memory",
        }
    }

    /// Resolves a `database.txt` identifier.
    ///
    /// `"embedded"` is accepted as an alias for the embedded engine and
    /// `"legacy"` for the page-cache engine.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "embedded" => Some(BackendKind::Sqlite),
            "postgresql" | "postgres" => Some(BackendKind::Postgresql),
            "mysql" => Some(BackendKind::Mysql),
            "bsddb" | "legacy" => Some(BackendKind::Legacy),
            "memory" | "inmemory" => Some(BackendKind::InMemory),
            _ => None,
        }
    }

    /// Human-readable engine name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            BackendKind::Sqlite => "SQLite",
            BackendKind::Postgresql => "PostgreSQL",
            BackendKind::Mysql => "MySQL",
            BackendKind::Legacy => "BSDDB",
            BackendKind::InMemory => "In-memory",
        }
    }

    /// Whether new trees may be created on this engine.
    #[must_use]
    pub const fn is_write_target(self) -> bool {
        !matches!(self, BackendKind::Legacy)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A parameter or result cell for raw SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Integer cell.
    Integer(i64),
    /// Floating-point cell.
    Real(f64),
    /// Text cell.
    Text(String),
    /// Blob cell.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the integer if this is an integer cell.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text if this is a text cell.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Integer(n)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(b: &[u8]) -> Self {
        SqlValue::Blob(b.to_vec())
    }
}

/// A key/blob table store over one physical engine.
///
/// Every table has the same two-column shape: a text key and an opaque blob.
/// The object store above never sees engine differences; raw SQL passed to
/// [`StorageBackend::execute_raw`] is written once in the canonical dialect
/// and rewritten by the backend.
///
/// Writes outside an explicit [`begin`](StorageBackend::begin) /
/// [`commit`](StorageBackend::commit) pair are applied immediately.
pub trait StorageBackend: Send {
    /// Which engine this is.
    fn kind(&self) -> BackendKind;

    /// Fetches the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the engine fails.
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Inserts or replaces the blob under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is read-only or the write fails.
    fn put(&mut self, table: &str, key: &str, blob: &[u8]) -> StorageResult<()>;

    /// Removes `key`; returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is read-only or the write fails.
    fn delete(&mut self, table: &str, key: &str) -> StorageResult<bool>;

    /// Returns every row of `table` in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the engine fails.
    fn scan(&self, table: &str) -> StorageResult<RowIter>;

    /// Returns every key of `table` in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the engine fails.
    fn keys(&self, table: &str) -> StorageResult<Vec<String>> {
        Ok(self.scan(table)?.map(|(key, _)| key).collect())
    }

    /// Number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the engine fails.
    fn count(&self, table: &str) -> StorageResult<u64> {
        Ok(self.scan(table)?.len() as u64)
    }

    /// Executes a statement written in the canonical dialect.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] for engines without SQL.
    fn execute_raw(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<usize>;

    /// Runs a query written in the canonical dialect and collects its rows.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] for engines without SQL.
    fn query_raw(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>>;

    /// Opens a physical transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the open physical transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the commit fails.
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back the open physical transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn rollback(&mut self) -> StorageResult<()>;

    /// Whether a physical transaction is open.
    fn in_transaction(&self) -> bool;

    /// Whether `name` exists as a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn table_exists(&self, name: &str) -> StorageResult<bool>;

    /// Creates a key/blob table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is read-only or the DDL fails.
    fn create_table(&mut self, name: &str) -> StorageResult<()>;

    /// Runs the engine's own consistency check.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] when the engine reports damage.
    fn check_integrity(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Whether writes are rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Releases the engine. Further calls fail with [`StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if pending work cannot be flushed.
    fn close(&mut self) -> StorageResult<()>;
}

/// Ensures a table name is a plain lowercase identifier.
///
/// Table names are interpolated into SQL, so anything else is refused.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] otherwise.
pub fn validate_table_name(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_ids_resolve() {
        for kind in BackendKind::ALL {
            assert_eq!(BackendKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(BackendKind::from_id("embedded"), Some(BackendKind::Sqlite));
        assert_eq!(BackendKind::from_id(" SQLite\n"), Some(BackendKind::Sqlite));
        assert_eq!(BackendKind::from_id("dbm"), None);
        assert!(!BackendKind::Legacy.is_write_target());
    }

    #[test]
    fn table_names() {
        assert!(validate_table_name("person").is_ok());
        assert!(validate_table_name("reference_map2").is_ok());
        assert!(validate_table_name("Person").is_err());
        assert!(validate_table_name("person; DROP").is_err());
        assert!(validate_table_name("").is_err());
    }
}
