//! Per-engine SQL rewriting.
//!
//! Statements are authored once in a canonical, SQLite-flavoured dialect:
//! `?` placeholders, double-quoted identifiers, `LIMIT -1` for "no limit" and
//! `BLOB` / `TEXT PRIMARY KEY` column types. [`SqlDialect::rewrite`] turns
//! such a statement into what the target engine accepts. Single-quoted string
//! literals are copied through untouched.

/// SQL dialect of a client/server or embedded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// SQLite; the canonical dialect itself.
    Sqlite,
    /// PostgreSQL: `$n` placeholders, `LIMIT ALL`, `BYTEA`.
    Postgres,
    /// MySQL: `%s` placeholders, backtick identifiers, `LONGBLOB`.
    Mysql,
}

impl SqlDialect {
    /// Rewrites a canonical statement for this dialect.
    #[must_use]
    pub fn rewrite(self, sql: &str) -> String {
        if self == SqlDialect::Sqlite {
            return sql.to_string();
        }

        let mut out = String::with_capacity(sql.len() + 16);
        let mut placeholder = 0usize;
        let mut in_literal = false;
        let mut in_ident = false;
        let mut word = String::new();
        let mut chars = sql.chars().peekable();

        while let Some(c) = chars.next() {
            if in_literal {
                out.push(c);
                if c == '\'' {
                    in_literal = false;
                }
                continue;
            }
            if in_ident {
                if c == '"' {
                    in_ident = false;
                    out.push(self.identifier_quote());
                } else {
                    out.push(c);
                }
                continue;
            }
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                if chars
                    .peek()
                    .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_')
                {
                    continue;
                }
                out.push_str(self.map_word(&word));
                word.clear();
                continue;
            }
            match c {
                '\'' => {
                    in_literal = true;
                    out.push(c);
                }
                '?' => {
                    placeholder += 1;
                    match self {
                        SqlDialect::Postgres => {
                            out.push('$');
                            out.push_str(&placeholder.to_string());
                        }
                        _ => out.push_str("%s"),
                    }
                }
                '"' => {
                    in_ident = true;
                    out.push(self.identifier_quote());
                }
                _ => out.push(c),
            }
        }

        self.rewrite_phrases(out)
    }

    const fn identifier_quote(self) -> char {
        match self {
            SqlDialect::Mysql => '`',
            _ => '"',
        }
    }

    fn map_word<'a>(self, word: &'a str) -> &'a str {
        if word.eq_ignore_ascii_case("BLOB") {
            return match self {
                SqlDialect::Postgres => "BYTEA",
                SqlDialect::Mysql => "LONGBLOB",
                SqlDialect::Sqlite => word,
            };
        }
        word
    }

    fn rewrite_phrases(self, sql: String) -> String {
        match self {
            SqlDialect::Sqlite => sql,
            SqlDialect::Postgres => sql.replace("LIMIT -1", "LIMIT ALL"),
            SqlDialect::Mysql => sql
                .replace("LIMIT -1", "LIMIT 18446744073709551615")
                .replace("TEXT PRIMARY KEY", "VARCHAR(255) PRIMARY KEY"),
        }
    }

    /// Canonical query that returns one row when table `?` exists.
    #[must_use]
    pub const fn table_exists_query(self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            SqlDialect::Postgres => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = ?"
            }
            SqlDialect::Mysql => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
        }
    }

    /// Canonical clause that turns an insert of `("handle", "blob")` into an
    /// upsert keyed on the handle.
    #[must_use]
    pub const fn upsert_clause(self) -> &'static str {
        match self {
            SqlDialect::Sqlite | SqlDialect::Postgres => {
                "ON CONFLICT (\"handle\") DO UPDATE SET \"blob\" = excluded.\"blob\""
            }
            SqlDialect::Mysql => "ON DUPLICATE KEY UPDATE \"blob\" = VALUES(\"blob\")",
        }
    }

    /// Statement that opens a transaction.
    #[must_use]
    pub const fn begin_statement(self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "BEGIN IMMEDIATE",
            SqlDialect::Postgres => "BEGIN",
            SqlDialect::Mysql => "START TRANSACTION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELECT: &str = "SELECT \"blob\" FROM \"person\" WHERE \"handle\" = ? AND x = ? LIMIT -1";

    #[test]
    fn sqlite_is_identity() {
        assert_eq!(SqlDialect::Sqlite.rewrite(SELECT), SELECT);
    }

    #[test]
    fn postgres_numbers_placeholders() {
        assert_eq!(
            SqlDialect::Postgres.rewrite(SELECT),
            "SELECT \"blob\" FROM \"person\" WHERE \"handle\" = $1 AND x = $2 LIMIT ALL"
        );
    }

    #[test]
    fn mysql_quotes_with_backticks() {
        assert_eq!(
            SqlDialect::Mysql.rewrite(SELECT),
            "SELECT `blob` FROM `person` WHERE `handle` = %s AND x = %s LIMIT 18446744073709551615"
        );
    }

    #[test]
    fn column_types_are_mapped() {
        let ddl = "CREATE TABLE IF NOT EXISTS \"note\" (\"handle\" TEXT PRIMARY KEY NOT NULL, \"blob\" BLOB)";
        assert!(SqlDialect::Postgres.rewrite(ddl).ends_with("\"blob\" BYTEA)"));
        let mysql = SqlDialect::Mysql.rewrite(ddl);
        assert!(mysql.contains("`handle` VARCHAR(255) PRIMARY KEY"));
        assert!(mysql.ends_with("`blob` LONGBLOB)"));
    }

    #[test]
    fn upsert_follows_the_engine() {
        let insert = |d: SqlDialect| {
            d.rewrite(&format!(
                "INSERT INTO \"note\" (\"handle\", \"blob\") VALUES (?, ?) {}",
                d.upsert_clause()
            ))
        };
        assert!(insert(SqlDialect::Sqlite)
            .ends_with("ON CONFLICT (\"handle\") DO UPDATE SET \"blob\" = excluded.\"blob\""));
        assert!(insert(SqlDialect::Postgres).contains("VALUES ($1, $2) ON CONFLICT"));
        assert!(insert(SqlDialect::Mysql)
            .ends_with("VALUES (%s, %s) ON DUPLICATE KEY UPDATE `blob` = VALUES(`blob`)"));
    }

    #[test]
    fn literals_are_untouched() {
        let sql = "UPDATE \"note\" SET x = 'what? \"quoted\" blob' WHERE y = ?";
        assert_eq!(
            SqlDialect::Postgres.rewrite(sql),
            "UPDATE \"note\" SET x = 'what? \"quoted\" blob' WHERE y = $1"
        );
        assert_eq!(
            SqlDialect::Mysql.rewrite(sql),
            "UPDATE `note` SET x = 'what? \"quoted\" blob' WHERE y = %s"
        );
    }
}
