use super::mapping::{ColumnMapping, ResolvedColumns};
use super::{ResultSink, SinkError};
use crate::config::{DatabaseConfig, SourceKind};
use crate::database::{Database, quote_identifier};
use crate::models::{ColumnValue, SourceRecord, UploadResult};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// New row in the log table
    Insert,
    /// Reference columns set on the matching source row
    UpdateSource,
}

/// Writes each upload outcome to a database table
pub struct DatabaseSink {
    db: Database,
    table: String,
    mapping: ColumnMapping,
    mode: WriteMode,
}

impl DatabaseSink {
    /// Open the database and prepare the log table described by `config`
    pub async fn from_config(config: &DatabaseConfig, source: SourceKind) -> Result<Self, SinkError> {
        let db = Database::connect(config).await?;
        let mapping = ColumnMapping::new(&config.reference_columns, &config.media_identifier);
        let table = config.log_table_name(source);
        let mode = if config.update_same_table {
            WriteMode::UpdateSource
        } else {
            WriteMode::Insert
        };

        let sink = Self {
            db,
            table,
            mapping,
            mode,
        };
        if mode == WriteMode::Insert {
            sink.prepare().await?;
        }
        Ok(sink)
    }

    /// Sink over an already open database; the table must exist
    pub fn new(db: Database, table: String, mapping: ColumnMapping) -> Self {
        Self {
            db,
            table,
            mapping,
            mode: WriteMode::Insert,
        }
    }

    /// Create the log table and any missing columns
    pub async fn prepare(&self) -> Result<(), SinkError> {
        let columns = self.mapping.column_names();
        self.db.prepare_log_table(&self.table, &columns).await?;
        Ok(())
    }

    fn insert_statement(&self, columns: &[(String, ColumnValue)]) -> String {
        let names = columns
            .iter()
            .map(|(c, _)| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let dialect = self.db.dialect();
        let placeholders = (1..=columns.len())
            .map(|i| dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            names,
            placeholders
        )
    }

    fn update_statement(&self, resolved: &ResolvedColumns) -> String {
        let dialect = self.db.dialect();
        let mut idx = 0;
        let mut next = || {
            idx += 1;
            dialect.placeholder(idx)
        };
        let assignments = resolved
            .references
            .iter()
            .map(|(c, _)| format!("{} = {}", quote_identifier(c), next()))
            .collect::<Vec<_>>()
            .join(", ");
        let conditions = resolved
            .identifiers
            .iter()
            .map(|(c, _)| format!("{} = {}", quote_identifier(c), next()))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(&self.table),
            assignments,
            conditions
        )
    }
}

#[async_trait]
impl ResultSink for DatabaseSink {
    async fn record(&self, result: &UploadResult, record: &SourceRecord) -> Result<(), SinkError> {
        // Every column must resolve before anything touches the table
        let resolved = self.mapping.resolve(result, record)?;

        let (sql, values) = match self.mode {
            WriteMode::Insert => {
                let columns = resolved.combined();
                let sql = self.insert_statement(&columns);
                (sql, columns.into_iter().map(|(_, v)| v).collect::<Vec<_>>())
            }
            WriteMode::UpdateSource => {
                if resolved.identifiers.is_empty() || resolved.references.is_empty() {
                    return Err(SinkError::MissingColumn(
                        "media_identifier or reference_columns".to_string(),
                    ));
                }
                let sql = self.update_statement(&resolved);
                let values = resolved
                    .references
                    .into_iter()
                    .chain(resolved.identifiers)
                    .map(|(_, v)| v)
                    .collect::<Vec<_>>();
                (sql, values)
            }
        };

        let changed = self.db.execute(sql, values).await?;

        if changed == 0 {
            tracing::warn!(
                target: "sink",
                table = %self.table,
                path = %record.item.file_path.display(),
                "No row matched the media identifiers"
            );
        } else {
            tracing::debug!(
                target: "sink",
                table = %self.table,
                video_id = result.remote_id,
                "Upload recorded"
            );
        }
        Ok(())
    }
}
