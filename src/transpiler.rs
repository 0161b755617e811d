//! Statement transpiler.
//!
//! Turns the handful of administrative statements dbtools issues into SQL
//! text for the target dialect.

use crate::error::{DbToolsError, DbToolsResult};
use std::fmt;
use std::path::Path;

/// SQL dialect of the connected server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Microsoft SQL Server, driven through `sqlcmd`.
    SqlServer,
    Postgres,
    MySql,
}

impl Dialect {
    /// Guess the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split("://").next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "mssql" | "sqlserver" => Some(Dialect::SqlServer),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An administrative statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement<'a> {
    /// List databases on the server.
    ListDatabases,
    /// List stored procedure names of one database.
    ListProcedures { database: &'a str },
    /// Name of the database the connection is bound to.
    CurrentDatabase,
    /// Back up a database to a file on the server.
    Backup { database: &'a str, path: &'a Path },
    /// Restore a database from a backup file on the server.
    Restore { database: &'a str, path: &'a Path },
}

impl Statement<'_> {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Statement::ListDatabases => "LIST DATABASES",
            Statement::ListProcedures { .. } => "LIST PROCEDURES",
            Statement::CurrentDatabase => "CURRENT DATABASE",
            Statement::Backup { .. } => "BACKUP DATABASE",
            Statement::Restore { .. } => "RESTORE DATABASE",
        }
    }
}

/// Trait for converting statements to SQL.
pub trait ToSql {
    /// Render this statement for `dialect`.
    fn to_sql(&self, dialect: Dialect) -> DbToolsResult<String>;
}

impl ToSql for Statement<'_> {
    fn to_sql(&self, dialect: Dialect) -> DbToolsResult<String> {
        match (dialect, self) {
            (Dialect::SqlServer, Statement::ListDatabases) => Ok("sp_databases".to_string()),
            // The database is selected by the client (`sqlcmd -d`), so the
            // output starts directly with the column header.
            (Dialect::SqlServer, Statement::ListProcedures { .. }) => Ok(
                "SELECT ROUTINE_NAME FROM information_schema.routines \
                 WHERE ROUTINE_TYPE = 'PROCEDURE'"
                    .to_string(),
            ),
            (Dialect::SqlServer, Statement::CurrentDatabase) => Ok("SELECT DB_NAME()".to_string()),
            (Dialect::Postgres, Statement::CurrentDatabase) => {
                Ok("SELECT CAST(current_database() AS TEXT)".to_string())
            }
            (Dialect::MySql, Statement::CurrentDatabase) => {
                Ok("SELECT CAST(DATABASE() AS CHAR)".to_string())
            }
            (Dialect::SqlServer, Statement::Backup { database, path }) => Ok(format!(
                "BACKUP DATABASE {} TO DISK={}",
                quote_ident(database),
                quote_literal(&path.to_string_lossy())
            )),
            (Dialect::SqlServer, Statement::Restore { database, path }) => Ok(format!(
                "RESTORE DATABASE {} FROM DISK={}",
                quote_ident(database),
                quote_literal(&path.to_string_lossy())
            )),
            // Catalog columns are cast to text: the Any driver only decodes
            // plain string types.
            (Dialect::Postgres, Statement::ListDatabases) => Ok(
                "SELECT CAST(datname AS TEXT) FROM pg_database \
                 WHERE datistemplate = false ORDER BY 1"
                    .to_string(),
            ),
            (Dialect::MySql, Statement::ListDatabases) => Ok(
                "SELECT CAST(schema_name AS CHAR) FROM information_schema.schemata ORDER BY 1"
                    .to_string(),
            ),
            // Postgres names the database in routine_catalog, MySQL in routine_schema.
            (Dialect::Postgres | Dialect::MySql, Statement::ListProcedures { database }) => {
                let text = if dialect == Dialect::Postgres { "TEXT" } else { "CHAR" };
                let db = quote_literal(database);
                Ok(format!(
                    "SELECT CAST(routine_name AS {text}) FROM information_schema.routines \
                     WHERE routine_type = 'PROCEDURE' \
                     AND (routine_catalog = {db} OR routine_schema = {db}) \
                     ORDER BY 1"
                ))
            }
            (_, stmt) => Err(DbToolsError::unsupported(dialect.name(), stmt.label())),
        }
    }
}

/// Quote a SQL Server identifier in brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_sqlserver_list_procedures() {
        let sql = Statement::ListProcedures { database: "Sales" }
            .to_sql(Dialect::SqlServer)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT ROUTINE_NAME FROM information_schema.routines WHERE ROUTINE_TYPE = 'PROCEDURE'"
        );
    }

    #[test]
    fn test_backup_quotes_name_and_path() {
        let path = PathBuf::from("/backups/O'Brien_202401011200.bak");
        let sql = Statement::Backup {
            database: "weird]db",
            path: &path,
        }
        .to_sql(Dialect::SqlServer)
        .unwrap();
        assert_eq!(
            sql,
            "BACKUP DATABASE [weird]]db] TO DISK='/backups/O''Brien_202401011200.bak'"
        );
    }

    #[test]
    fn test_restore() {
        let path = PathBuf::from("C:\\backups\\Sales_202401011200.bak");
        let sql = Statement::Restore {
            database: "Sales",
            path: &path,
        }
        .to_sql(Dialect::SqlServer)
        .unwrap();
        assert_eq!(
            sql,
            "RESTORE DATABASE [Sales] FROM DISK='C:\\backups\\Sales_202401011200.bak'"
        );
    }

    #[test]
    fn test_postgres_procedures_filter_database() {
        let sql = Statement::ListProcedures { database: "app" }
            .to_sql(Dialect::Postgres)
            .unwrap();
        assert!(sql.contains("routine_catalog = 'app'"));
        assert!(sql.contains("routine_type = 'PROCEDURE'"));
    }

    #[test]
    fn test_backup_unsupported_on_postgres() {
        let path = PathBuf::from("/tmp/x.bak");
        let err = Statement::Backup {
            database: "app",
            path: &path,
        }
        .to_sql(Dialect::Postgres)
        .unwrap_err();
        assert!(matches!(err, DbToolsError::Unsupported { .. }));
    }

    #[test]
    fn test_current_database() {
        assert_eq!(
            Statement::CurrentDatabase.to_sql(Dialect::Postgres).unwrap(),
            "SELECT CAST(current_database() AS TEXT)"
        );
        assert_eq!(
            Statement::CurrentDatabase.to_sql(Dialect::SqlServer).unwrap(),
            "SELECT DB_NAME()"
        );
    }

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("postgres://localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("mysql://root@localhost/db"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_url("sqlite::memory:"), None);
    }
}
