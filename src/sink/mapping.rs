//! Resolution of configured log columns to values

use super::SinkError;
use crate::models::{ColumnValue, SourceRecord, UploadResult};

/// Where the value of one log column comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    RemoteId,
    Uuid,
    ShortId,
    Title,
    Description,
    FilePath,
    CreatedAt,
    /// Column of the source row, matched case-insensitively
    Identifier(String),
}

impl ColumnSource {
    /// Reference column names with a fixed meaning
    fn for_reference(column: &str) -> Self {
        match column.to_lowercase().as_str() {
            "peertube_id" | "remote_id" | "video_id" => ColumnSource::RemoteId,
            "uuid" => ColumnSource::Uuid,
            "shortuuid" | "short_uuid" | "short_id" => ColumnSource::ShortId,
            "title" => ColumnSource::Title,
            "description" => ColumnSource::Description,
            "file_path" => ColumnSource::FilePath,
            "created_at" => ColumnSource::CreatedAt,
            _ => ColumnSource::Identifier(column.to_string()),
        }
    }

    fn resolve(&self, result: &UploadResult, record: &SourceRecord) -> Option<ColumnValue> {
        let item = &record.item;
        Some(match self {
            ColumnSource::RemoteId => ColumnValue::Integer(result.remote_id),
            ColumnSource::Uuid => ColumnValue::from(result.uuid.as_str()),
            ColumnSource::ShortId => ColumnValue::from(result.short_id.as_str()),
            ColumnSource::Title => ColumnValue::from(item.title.as_str()),
            ColumnSource::Description => ColumnValue::from(item.description.as_str()),
            ColumnSource::FilePath => ColumnValue::from(item.file_path.to_string_lossy().into_owned()),
            ColumnSource::CreatedAt => ColumnValue::from(item.created_at.to_rfc3339()),
            ColumnSource::Identifier(name) => return record.identifier(name).cloned(),
        })
    }
}

/// Resolved values for one record
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumns {
    pub references: Vec<(String, ColumnValue)>,
    pub identifiers: Vec<(String, ColumnValue)>,
}

impl ResolvedColumns {
    /// References then identifiers, skipping identifier names already written
    pub fn combined(&self) -> Vec<(String, ColumnValue)> {
        let mut columns = self.references.clone();
        for (name, value) in &self.identifiers {
            if !columns.iter().any(|(c, _)| c.eq_ignore_ascii_case(name)) {
                columns.push((name.clone(), value.clone()));
            }
        }
        columns
    }
}

/// Log columns built once from configuration
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    references: Vec<(String, ColumnSource)>,
    identifiers: Vec<String>,
}

impl ColumnMapping {
    pub fn new(reference_columns: &[String], media_identifiers: &[String]) -> Self {
        Self {
            references: reference_columns
                .iter()
                .map(|c| (c.clone(), ColumnSource::for_reference(c)))
                .collect(),
            identifiers: media_identifiers.to_vec(),
        }
    }

    /// Every column name the sink writes
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.references.iter().map(|(c, _)| c.clone()).collect();
        for identifier in &self.identifiers {
            if !names.iter().any(|c| c.eq_ignore_ascii_case(identifier)) {
                names.push(identifier.clone());
            }
        }
        names
    }

    /// Values for every configured column, or the first column without one
    pub fn resolve(
        &self,
        result: &UploadResult,
        record: &SourceRecord,
    ) -> Result<ResolvedColumns, SinkError> {
        let references = self
            .references
            .iter()
            .map(|(name, source)| {
                source
                    .resolve(result, record)
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| SinkError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let identifiers = self
            .identifiers
            .iter()
            .map(|name| {
                record
                    .identifier(name)
                    .cloned()
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| SinkError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResolvedColumns {
            references,
            identifiers,
        })
    }
}
