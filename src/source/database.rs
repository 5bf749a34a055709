use super::{ExtensionFilter, MediaSource, SourceError, derive_title, modified_time};
use crate::config::{DatabaseConfig, DbKind};
use crate::database::{column_value, connect_postgres, open_connection, quote_identifier};
use crate::models::{ColumnValue, MediaItem, SourceRecord};
use async_trait::async_trait;
use futures::TryStreamExt;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Rows of a database table, one record per row
pub struct DatabaseSource {
    config: DatabaseConfig,
    filter: ExtensionFilter,
}

impl DatabaseSource {
    pub fn new(config: DatabaseConfig, filter: ExtensionFilter) -> Self {
        Self { config, filter }
    }

    /// Title, description and path columns followed by the identifier columns
    fn selected_columns(&self) -> Vec<String> {
        let mut columns = vec![
            self.config.title.clone(),
            self.config.description.clone(),
            self.config.file_path.clone(),
        ];
        for identifier in &self.config.media_identifier {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(identifier)) {
                columns.push(identifier.clone());
            }
        }
        columns
    }

    fn query(&self) -> String {
        let columns = self
            .selected_columns()
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {}",
            columns,
            quote_identifier(&self.config.table_name)
        )
    }

    fn read_rows(&self, tx: &mpsc::Sender<SourceRecord>) -> Result<usize, SourceError> {
        // A connection of our own, so a blocked send never holds the sink's lock
        let conn = open_connection(&self.config.path).map_err(|e| {
            SourceError::Fatal(format!(
                "cannot open database {}: {}",
                self.config.path.display(),
                e
            ))
        })?;
        self.stream_rows(&conn, tx)
    }

    async fn read_postgres_rows(&self, tx: &mpsc::Sender<SourceRecord>) -> Result<usize, SourceError> {
        // A pool of our own, so a blocked send never starves the sink
        let pool = connect_postgres(&self.config, 1).await.map_err(|e| {
            SourceError::Fatal(format!(
                "cannot connect to {}/{}: {}",
                self.config.host, self.config.dbname, e
            ))
        })?;
        let fatal = |e: String| {
            SourceError::Fatal(format!("query on {} failed: {}", self.config.table_name, e))
        };

        let columns = self.selected_columns();
        let sql = self.query();
        let mut rows = sqlx::query(&sql).fetch(&pool);

        let mut produced = 0;
        while let Some(row) = rows.try_next().await.map_err(|e| fatal(e.to_string()))? {
            let mut identifiers = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = column_value(&row, idx).map_err(|e| fatal(e.to_string()))?;
                identifiers.push((name.clone(), value));
            }

            let Some(record) = self.to_record(identifiers) else {
                continue;
            };

            if tx.send(record).await.is_err() {
                debug!(target: "source", "Receiver closed, stopping table read");
                break;
            }
            produced += 1;
        }
        Ok(produced)
    }

    fn stream_rows(
        &self,
        conn: &Connection,
        tx: &mpsc::Sender<SourceRecord>,
    ) -> Result<usize, SourceError> {
        let fatal = |e: rusqlite::Error| {
            SourceError::Fatal(format!("query on {} failed: {}", self.config.table_name, e))
        };

        let columns = self.selected_columns();
        let mut stmt = conn.prepare(&self.query()).map_err(fatal)?;
        let mut rows = stmt.query([]).map_err(fatal)?;

        let mut produced = 0;
        while let Some(row) = rows.next().map_err(fatal)? {
            let mut identifiers = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = ColumnValue::from(row.get_ref(idx).map_err(fatal)?);
                identifiers.push((name.clone(), value));
            }

            let Some(record) = self.to_record(identifiers) else {
                continue;
            };

            if tx.blocking_send(record).is_err() {
                debug!(target: "source", "Receiver closed, stopping table read");
                break;
            }
            produced += 1;
        }
        Ok(produced)
    }

    /// Build the record for one row; None when the row has no usable path or is filtered out
    fn to_record(&self, identifiers: Vec<(String, ColumnValue)>) -> Option<SourceRecord> {
        let text_at = |idx: usize| identifiers.get(idx).and_then(|(_, v)| v.as_text());

        let Some(file_path) = text_at(2).filter(|p| !p.trim().is_empty()) else {
            warn!(target: "source", row = ?identifiers, "Row has no file path, skipping");
            return None;
        };
        let file_path = PathBuf::from(file_path);

        let basename = file_path.file_name().map(Path::new).unwrap_or(file_path.as_path());
        if !self.filter.accepts(basename) {
            debug!(target: "source", path = %file_path.display(), "Skipping filtered row");
            return None;
        }

        let title = text_at(0)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| derive_title(&file_path, self.filter.is_enabled()));
        let description = text_at(1).unwrap_or_default();

        let item = MediaItem {
            title,
            description,
            created_at: modified_time(&file_path),
            file_path,
        };
        Some(SourceRecord { item, identifiers })
    }
}

#[async_trait]
impl MediaSource for DatabaseSource {
    async fn produce(self: Box<Self>, tx: mpsc::Sender<SourceRecord>) -> Result<(), SourceError> {
        info!(
            target: "source",
            db_type = ?self.config.db_type,
            table = %self.config.table_name,
            "Reading media table"
        );
        let produced = match self.config.db_type {
            DbKind::Sqlite => tokio::task::spawn_blocking(move || self.read_rows(&tx))
                .await
                .map_err(|e| SourceError::Fatal(format!("table read panicked: {}", e)))??,
            DbKind::Postgres => self.read_postgres_rows(&tx).await?,
        };
        info!(target: "source", produced, "Media table read finished");
        Ok(())
    }
}
