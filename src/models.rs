//! Records passed between the source, the workers and the sinks

use chrono::{DateTime, Utc};
use peertube_api::models::video::VideoCreated;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use serde::Serialize;
use std::path::PathBuf;

/// One file to upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaItem {
    pub title: String,
    pub description: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Dynamic value of one source column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ColumnValue {
    /// Text rendering used for titles, descriptions and paths
    pub fn as_text(&self) -> Option<String> {
        match self {
            ColumnValue::Null => None,
            ColumnValue::Integer(v) => Some(v.to_string()),
            ColumnValue::Real(v) => Some(v.to_string()),
            ColumnValue::Text(v) => Some(v.clone()),
        }
    }
}

impl From<ValueRef<'_>> for ColumnValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => ColumnValue::Null,
            ValueRef::Integer(v) => ColumnValue::Integer(v),
            ValueRef::Real(v) => ColumnValue::Real(v),
            ValueRef::Text(v) => ColumnValue::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => ColumnValue::Text(String::from_utf8_lossy(v).into_owned()),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl ToSql for ColumnValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ColumnValue::Null => ToSqlOutput::Owned(Value::Null),
            ColumnValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            ColumnValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            ColumnValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// A media item plus the source columns that identify it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub item: MediaItem,
    /// Column name to value, in selection order. Empty for folder sources.
    pub identifiers: Vec<(String, ColumnValue)>,
}

impl SourceRecord {
    pub fn from_item(item: MediaItem) -> Self {
        Self {
            item,
            identifiers: Vec::new(),
        }
    }

    /// Case-insensitive identifier lookup
    pub fn identifier(&self, column: &str) -> Option<&ColumnValue> {
        self.identifiers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }
}

/// Identifiers of a created video
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    #[serde(rename = "id")]
    pub remote_id: i64,
    pub uuid: String,
    #[serde(rename = "shortUUID")]
    pub short_id: String,
}

impl From<VideoCreated> for UploadResult {
    fn from(created: VideoCreated) -> Self {
        Self {
            remote_id: created.video.id,
            uuid: created.video.uuid,
            short_id: created.video.short_uuid,
        }
    }
}
