//! Embedded engine: SQLite through `rusqlite`.

use crate::backend::{BackendKind, SqlValue};
use crate::dialect::SqlDialect;
use crate::error::{StorageError, StorageResult};
use crate::sql::{SqlBackend, SqlConnection};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// File name of the embedded engine inside a tree directory.
pub const SQLITE_FILE: &str = "sqlite.db";

/// How long a reader waits on a busy writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for opening the embedded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
    /// Put the database in write-ahead-log mode (one writer, many readers).
    pub wal: bool,
    /// Open without write access; the file must already exist.
    pub read_only: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            wal: true,
            read_only: false,
        }
    }
}

/// A single SQLite connection.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// Opens (or creates, unless read-only) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the file cannot be opened.
    pub fn open(path: &Path, options: SqliteOptions) -> StorageResult<Self> {
        let conn = if options.read_only {
            if !path.exists() {
                return Err(StorageError::connection(format!(
                    "database file not found: {}",
                    path.display()
                )));
            }
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::connection(format!("{}: {e}", path.display())))?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        if !options.read_only {
            let pragmas = if options.wal {
                "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;"
            } else {
                "PRAGMA journal_mode = DELETE; PRAGMA synchronous = FULL;"
            };
            conn.execute_batch(pragmas)?;
        }

        tracing::debug!(path = %path.display(), wal = options.wal, read_only = options.read_only, "opened sqlite connection");
        Ok(Self { conn })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if SQLite cannot allocate it.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl SqlConnection for SqliteConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns);
            for i in 0..columns {
                cells.push(match row.get_ref(i)? {
                    ValueRef::Null => SqlValue::Null,
                    ValueRef::Integer(n) => SqlValue::Integer(n),
                    ValueRef::Real(f) => SqlValue::Real(f),
                    ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
                });
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn integrity_check(&self) -> StorageResult<()> {
        let verdict: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if verdict == "ok" {
            Ok(())
        } else {
            Err(StorageError::Corrupted(verdict))
        }
    }
}

/// Opens the embedded engine file inside a tree directory.
///
/// # Errors
///
/// Returns [`StorageError::Connection`] if the file cannot be opened.
pub fn open_sqlite(
    tree_dir: &Path,
    options: SqliteOptions,
) -> StorageResult<SqlBackend<SqliteConnection>> {
    let conn = SqliteConnection::open(&tree_dir.join(SQLITE_FILE), options)?;
    Ok(SqlBackend::new(BackendKind::Sqlite, conn, options.read_only))
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(n) => ToSqlOutput::from(*n),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
            SqlValue::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => StorageError::Constraint {
                    message: err.to_string(),
                },
                rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::NotADatabase
                | rusqlite::ErrorCode::PermissionDenied => StorageError::connection(err.to_string()),
                rusqlite::ErrorCode::DatabaseCorrupt => StorageError::Corrupted(err.to_string()),
                rusqlite::ErrorCode::ReadOnly => StorageError::ReadOnly,
                _ => StorageError::query(err.to_string()),
            },
            _ => StorageError::query(err.to_string()),
        }
    }
}
