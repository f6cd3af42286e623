//! Generic key/blob backend over any SQL connection.

use crate::backend::{validate_table_name, BackendKind, RowIter, SqlValue, StorageBackend};
use crate::dialect::SqlDialect;
use crate::error::{StorageError, StorageResult};

/// A live connection to a SQL engine.
///
/// Implementations receive statements already rewritten for their dialect.
pub trait SqlConnection: Send {
    /// The dialect statements must be rewritten into.
    fn dialect(&self) -> SqlDialect;

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns a typed storage error on engine failure.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<usize>;

    /// Runs a query and collects every row.
    ///
    /// # Errors
    ///
    /// Returns a typed storage error on engine failure.
    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>>;

    /// Runs the engine's integrity check, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if damage is reported.
    fn integrity_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Row backend that speaks SQL through a [`SqlConnection`].
///
/// Every statement is authored once, in the canonical dialect, and rewritten
/// through [`SqlDialect::rewrite`] before it reaches the connection.
pub struct SqlBackend<C: SqlConnection> {
    kind: BackendKind,
    conn: Option<C>,
    in_txn: bool,
    read_only: bool,
}

impl<C: SqlConnection> SqlBackend<C> {
    /// Wraps an open connection.
    pub fn new(kind: BackendKind, conn: C, read_only: bool) -> Self {
        Self {
            kind,
            conn: Some(conn),
            in_txn: false,
            read_only,
        }
    }

    fn conn(&self) -> StorageResult<&C> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    fn conn_mut(&mut self) -> StorageResult<&mut C> {
        self.conn.as_mut().ok_or(StorageError::Closed)
    }

    fn writable(&mut self) -> StorageResult<&mut C> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.conn_mut()
    }

    fn run(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
        let conn = self.conn_mut()?;
        let rewritten = conn.dialect().rewrite(sql);
        conn.execute(&rewritten, params)
    }

    fn select(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        let conn = self.conn()?;
        let rewritten = conn.dialect().rewrite(sql);
        conn.query(&rewritten, params)
    }
}

fn row_key(row: &[SqlValue]) -> StorageResult<String> {
    match row.first() {
        Some(SqlValue::Text(key)) => Ok(key.clone()),
        other => Err(StorageError::Corrupted(format!(
            "expected text key column, found {other:?}"
        ))),
    }
}

fn row_blob(row: &[SqlValue], index: usize) -> StorageResult<Vec<u8>> {
    match row.get(index) {
        Some(SqlValue::Blob(blob)) => Ok(blob.clone()),
        other => Err(StorageError::Corrupted(format!(
            "expected blob column, found {other:?}"
        ))),
    }
}

impl<C: SqlConnection> StorageBackend for SqlBackend<C> {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_table_name(table)?;
        let sql = format!("SELECT \"blob\" FROM \"{table}\" WHERE \"handle\" = ?");
        let rows = self.select(&sql, &[SqlValue::from(key)])?;
        rows.first().map(|row| row_blob(row, 0)).transpose()
    }

    fn put(&mut self, table: &str, key: &str, blob: &[u8]) -> StorageResult<()> {
        validate_table_name(table)?;
        self.writable()?;
        let sql = format!(
            "INSERT INTO \"{table}\" (\"handle\", \"blob\") VALUES (?, ?) {}",
            self.conn()?.dialect().upsert_clause()
        );
        self.run(&sql, &[SqlValue::from(key), SqlValue::from(blob)])?;
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &str) -> StorageResult<bool> {
        validate_table_name(table)?;
        self.writable()?;
        let sql = format!("DELETE FROM \"{table}\" WHERE \"handle\" = ?");
        Ok(self.run(&sql, &[SqlValue::from(key)])? > 0)
    }

    fn scan(&self, table: &str) -> StorageResult<RowIter> {
        validate_table_name(table)?;
        let sql = format!("SELECT \"handle\", \"blob\" FROM \"{table}\" ORDER BY \"handle\"");
        let rows = self
            .select(&sql, &[])?
            .iter()
            .map(|row| Ok((row_key(row)?, row_blob(row, 1)?)))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(rows.into_iter())
    }

    fn keys(&self, table: &str) -> StorageResult<Vec<String>> {
        validate_table_name(table)?;
        let sql = format!("SELECT \"handle\" FROM \"{table}\" ORDER BY \"handle\"");
        self.select(&sql, &[])?
            .iter()
            .map(|row| row_key(row))
            .collect()
    }

    fn count(&self, table: &str) -> StorageResult<u64> {
        validate_table_name(table)?;
        let sql = format!("SELECT COUNT(*) FROM \"{table}\"");
        let rows = self.select(&sql, &[])?;
        let n = rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_integer)
            .unwrap_or(0);
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn execute_raw(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
        self.writable()?;
        self.run(sql, params)
    }

    fn query_raw(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        self.select(sql, params)
    }

    fn begin(&mut self) -> StorageResult<()> {
        if self.in_txn {
            return Err(StorageError::transaction("transaction already open"));
        }
        let conn = self.conn_mut()?;
        let stmt = conn.dialect().begin_statement();
        conn.execute(stmt, &[])?;
        self.in_txn = true;
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        if !self.in_txn {
            return Err(StorageError::transaction("commit without open transaction"));
        }
        self.conn_mut()?.execute("COMMIT", &[])?;
        self.in_txn = false;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if !self.in_txn {
            return Err(StorageError::transaction("rollback without open transaction"));
        }
        self.in_txn = false;
        self.conn_mut()?.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        let dialect = self.conn()?.dialect();
        let rows = self.select(dialect.table_exists_query(), &[SqlValue::from(name)])?;
        Ok(!rows.is_empty())
    }

    fn create_table(&mut self, name: &str) -> StorageResult<()> {
        validate_table_name(name)?;
        self.writable()?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{name}\" (\"handle\" TEXT PRIMARY KEY NOT NULL, \"blob\" BLOB)"
        );
        self.run(&ddl, &[])?;
        Ok(())
    }

    fn check_integrity(&self) -> StorageResult<()> {
        self.conn()?.integrity_check()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.in_txn {
            self.rollback()?;
        }
        if self.conn.take().is_some() {
            tracing::debug!(backend = %self.kind, "closed SQL backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Behaves like MySQL: affected-row counts are zero when an update leaves
    /// the row unchanged, and a plain insert of an existing key fails.
    #[derive(Default)]
    struct MysqlLike {
        rows: HashMap<String, Vec<u8>>,
        statements: Vec<String>,
    }

    impl SqlConnection for MysqlLike {
        fn dialect(&self) -> SqlDialect {
            SqlDialect::Mysql
        }

        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
            self.statements.push(sql.to_string());
            let [SqlValue::Text(key), SqlValue::Blob(blob)] = params else {
                return Ok(0);
            };
            let exists = self.rows.contains_key(key);
            if exists && !sql.contains("ON DUPLICATE KEY UPDATE") {
                return Err(StorageError::Constraint {
                    message: format!("Duplicate entry '{key}' for key 'PRIMARY'"),
                });
            }
            let changed = self.rows.get(key) != Some(blob);
            self.rows.insert(key.clone(), blob.clone());
            Ok(match (exists, changed) {
                (false, _) => 1,
                (true, true) => 2,
                (true, false) => 0,
            })
        }

        fn query(&self, _sql: &str, _params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn rewriting_an_unchanged_blob_is_not_a_duplicate() {
        let mut backend = SqlBackend::new(BackendKind::Mysql, MysqlLike::default(), false);
        backend.put("person", "h1", b"same").unwrap();
        backend.put("person", "h1", b"same").unwrap();
        backend.put("person", "h1", b"changed").unwrap();

        let conn = backend.conn().unwrap();
        assert_eq!(conn.statements.len(), 3);
        assert!(conn
            .statements
            .iter()
            .all(|s| s.starts_with("INSERT INTO `person`") && s.contains("ON DUPLICATE KEY UPDATE")));
        assert_eq!(conn.rows.get("h1"), Some(&b"changed".to_vec()));
    }
}
