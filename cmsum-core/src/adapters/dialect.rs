//! SQL dialect differences between the supported backends.
//!
//! Queries are written once against the sqlx `Any` driver; the few places
//! where MySQL, PostgreSQL and SQLite disagree are rendered here.

use crate::error::CmsError;
use crate::models::DatabaseFamily;
use crate::Result;

/// Backend SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    MySql,
    Postgres,
    /// Local fixtures and tests
    Sqlite,
}

impl SqlDialect {
    /// Dialect spoken by a database family
    pub fn for_family(family: DatabaseFamily) -> Self {
        match family {
            DatabaseFamily::MySql => Self::MySql,
            DatabaseFamily::Postgres => Self::Postgres,
        }
    }

    /// Detects the dialect from a connection URL scheme.
    ///
    /// # Errors
    /// Returns `UnsupportedFamily` for any other scheme
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(CmsError::unsupported_family(scheme)),
        }
    }

    /// Quotes an identifier that has already passed prefix validation.
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Starts a placeholder sequence for one statement.
    pub fn params(self) -> Placeholders {
        Placeholders {
            dialect: self,
            next: 0,
        }
    }

    /// Casts an integer expression to a signed 64-bit value.
    ///
    /// WordPress ids are `BIGINT UNSIGNED` on MySQL, which the `Any` driver
    /// cannot decode as `i64`. SQLite keeps the bare column so its declared
    /// type stays visible to the driver.
    pub fn cast_int(self, expr: &str) -> String {
        match self {
            Self::MySql => format!("CAST({} AS SIGNED)", expr),
            Self::Postgres => format!("CAST({} AS BIGINT)", expr),
            Self::Sqlite => expr.to_string(),
        }
    }

    /// Casts a string expression to a character type.
    ///
    /// MySQL reports `TEXT`/`LONGTEXT` columns (WordPress `meta_value`) with
    /// blob column types, which the `Any` driver will not decode as `String`.
    pub fn cast_text(self, expr: &str) -> String {
        match self {
            Self::MySql => format!("CAST({} AS CHAR)", expr),
            Self::Postgres => format!("CAST({} AS TEXT)", expr),
            Self::Sqlite => expr.to_string(),
        }
    }

    /// Statement returning one text column with every table name in the current database.
    pub fn list_tables_sql(self) -> &'static str {
        match self {
            Self::MySql => {
                "SELECT CAST(table_name AS CHAR) AS table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE()"
            }
            Self::Postgres => {
                "SELECT CAST(tablename AS TEXT) AS table_name FROM pg_catalog.pg_tables \
                 WHERE schemaname NOT IN ('pg_catalog', 'information_schema')"
            }
            Self::Sqlite => {
                "SELECT name AS table_name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            }
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Numbered placeholder sequence for one statement
#[derive(Debug)]
pub struct Placeholders {
    dialect: SqlDialect,
    next: usize,
}

impl Placeholders {
    /// Next placeholder, in bind order
    pub fn next_param(&mut self) -> String {
        self.next += 1;
        self.dialect.placeholder(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        assert_eq!(
            SqlDialect::from_url("mysql://root@localhost/wp").unwrap(),
            SqlDialect::MySql
        );
        assert_eq!(
            SqlDialect::from_url("postgresql://localhost/j").unwrap(),
            SqlDialect::Postgres
        );
        assert_eq!(
            SqlDialect::from_url("sqlite::memory:").unwrap(),
            SqlDialect::Sqlite
        );
        assert!(SqlDialect::from_url("mssql://localhost").is_err());
    }

    #[test]
    fn test_placeholders() {
        let mut pg = SqlDialect::Postgres.params();
        assert_eq!(pg.next_param(), "$1");
        assert_eq!(pg.next_param(), "$2");

        let mut mysql = SqlDialect::MySql.params();
        assert_eq!(mysql.next_param(), "?");
        assert_eq!(mysql.next_param(), "?");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(SqlDialect::MySql.quote_ident("wp_users"), "`wp_users`");
        assert_eq!(SqlDialect::Postgres.quote_ident("jos_users"), "\"jos_users\"");
        assert_eq!(SqlDialect::Sqlite.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_cast_int() {
        assert_eq!(SqlDialect::MySql.cast_int("u.ID"), "CAST(u.ID AS SIGNED)");
        assert_eq!(SqlDialect::Postgres.cast_int("id"), "CAST(id AS BIGINT)");
        assert_eq!(SqlDialect::Sqlite.cast_int("m.user_id"), "m.user_id");
    }

    #[test]
    fn test_cast_text() {
        assert_eq!(SqlDialect::MySql.cast_text("m.meta_value"), "CAST(m.meta_value AS CHAR)");
        assert_eq!(SqlDialect::Postgres.cast_text("g.title"), "CAST(g.title AS TEXT)");
        assert_eq!(SqlDialect::Sqlite.cast_text("u.email"), "u.email");
    }
}
