//! Connections to the media database and log table preparation
//!
//! SQLite goes through one shared rusqlite connection driven from blocking
//! tasks. PostgreSQL goes through an sqlx pool.

mod postgres;
mod sqlite;

pub use postgres::column_value;
pub(crate) use postgres::connect as connect_postgres;
pub use sqlite::open_connection;

use crate::config::{DatabaseConfig, DbKind};
use crate::models::ColumnValue;
use rusqlite::Connection;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Column {column:?} has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("Database task failed: {0}")]
    Task(String),
}

/// Bind parameter syntax of the connected engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Placeholder for the `n`th bound value, starting at 1
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", n),
            Dialect::Postgres => format!("${}", n),
        }
    }
}

/// Handle to the configured database, cheap to clone
#[derive(Clone)]
pub enum Database {
    Sqlite(Arc<Mutex<Connection>>),
    Postgres(PgPool),
}

impl Database {
    /// Open the database named by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        match config.db_type {
            DbKind::Sqlite => {
                let path = config.path.clone();
                let conn = tokio::task::spawn_blocking(move || open_connection(&path))
                    .await
                    .map_err(|e| DatabaseError::Task(e.to_string()))??;
                Ok(Database::Sqlite(Arc::new(Mutex::new(conn))))
            }
            DbKind::Postgres => Ok(Database::Postgres(postgres::connect(config, 4).await?)),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Database::Sqlite(_) => Dialect::Sqlite,
            Database::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Create `table` if needed and add any of `columns` it lacks as TEXT
    pub async fn prepare_log_table(&self, table: &str, columns: &[String]) -> Result<(), DatabaseError> {
        match self {
            Database::Sqlite(conn) => {
                let conn = conn.clone();
                let table = table.to_string();
                let columns = columns.to_vec();
                run_blocking(conn, move |conn| sqlite::prepare_log_table(conn, &table, &columns)).await
            }
            Database::Postgres(pool) => Ok(postgres::prepare_log_table(pool, table, columns).await?),
        }
    }

    /// Run one statement with positional values, returning the rows changed
    pub async fn execute(&self, sql: String, values: Vec<ColumnValue>) -> Result<u64, DatabaseError> {
        match self {
            Database::Sqlite(conn) => {
                run_blocking(conn.clone(), move |conn| {
                    let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
                    Ok(changed as u64)
                })
                .await
            }
            Database::Postgres(pool) => Ok(postgres::execute(pool, &sql, values).await?),
        }
    }
}

async fn run_blocking<T, F>(conn: Arc<Mutex<Connection>>, f: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let guard = conn.lock().map_err(|_| DatabaseError::Poisoned)?;
        f(&guard).map_err(DatabaseError::from)
    })
    .await
    .map_err(|e| DatabaseError::Task(e.to_string()))?
}

/// Quote a table or column name for interpolation into SQL
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
