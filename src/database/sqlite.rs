use super::quote_identifier;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Open a connection that tolerates a second connection to the same file
pub fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(10))?;
    // journal_mode returns the resulting mode as a row
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    Ok(conn)
}

/// Column names of `table`, empty when the table does not exist
pub(super) fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

pub(super) fn prepare_log_table(conn: &Connection, table: &str, columns: &[String]) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (log_id INTEGER PRIMARY KEY AUTOINCREMENT)",
        quote_identifier(table)
    ))?;

    let mut existing = table_columns(conn, table)?;
    for column in columns {
        if existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote_identifier(table),
            quote_identifier(column)
        ))?;
        tracing::info!(target: "sink", table, column = %column, "Added log column");
        existing.push(column.clone());
    }
    Ok(())
}
