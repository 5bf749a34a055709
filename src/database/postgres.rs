use super::{DatabaseError, quote_identifier};
use crate::config::DatabaseConfig;
use crate::models::ColumnValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Duration;

pub(super) fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .database(&config.dbname);
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    options
}

/// Pool over the configured server; fails if no connection can be made
pub(crate) async fn connect(config: &DatabaseConfig, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options(config))
        .await?;
    tracing::info!(
        target: "database",
        host = %config.host,
        dbname = %config.dbname,
        max_connections,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Column names of `table` in the current schema, empty when it does not exist
async fn table_columns(pool: &PgPool, table: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT column_name::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await
}

pub(super) async fn prepare_log_table(
    pool: &PgPool,
    table: &str,
    columns: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (log_id BIGSERIAL PRIMARY KEY)",
        quote_identifier(table)
    ))
    .execute(pool)
    .await?;

    let mut existing = table_columns(pool, table).await?;
    for column in columns {
        if existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            continue;
        }
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} TEXT",
            quote_identifier(table),
            quote_identifier(column)
        ))
        .execute(pool)
        .await?;
        tracing::info!(target: "sink", table, column = %column, "Added log column");
        existing.push(column.clone());
    }
    Ok(())
}

pub(super) async fn execute(pool: &PgPool, sql: &str, values: Vec<ColumnValue>) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(sql);
    for value in values {
        query = match value {
            ColumnValue::Null => query.bind(None::<String>),
            ColumnValue::Integer(v) => query.bind(v),
            ColumnValue::Real(v) => query.bind(v),
            ColumnValue::Text(v) => query.bind(v),
        };
    }
    Ok(query.execute(pool).await?.rows_affected())
}

/// How a PostgreSQL column type maps onto [`ColumnValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Text,
    Uuid,
    TimestampTz,
    Timestamp,
    Date,
}

impl ColumnKind {
    fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "INT2" => ColumnKind::Int2,
            "INT4" => ColumnKind::Int4,
            "INT8" => ColumnKind::Int8,
            "FLOAT4" => ColumnKind::Float4,
            "FLOAT8" => ColumnKind::Float8,
            "BOOL" => ColumnKind::Bool,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
            "UUID" => ColumnKind::Uuid,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "DATE" => ColumnKind::Date,
            _ => return None,
        };
        Some(kind)
    }
}

/// Value of column `idx` of a fetched row
pub fn column_value(row: &PgRow, idx: usize) -> Result<ColumnValue, DatabaseError> {
    let (is_null, type_name) = {
        let raw = row.try_get_raw(idx)?;
        (raw.is_null(), raw.type_info().name().to_string())
    };
    if is_null {
        return Ok(ColumnValue::Null);
    }

    let Some(kind) = ColumnKind::from_type_name(&type_name) else {
        let column = row
            .columns()
            .get(idx)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| idx.to_string());
        return Err(DatabaseError::UnsupportedType { column, type_name });
    };

    let value = match kind {
        ColumnKind::Int2 => ColumnValue::Integer(row.try_get::<i16, _>(idx)?.into()),
        ColumnKind::Int4 => ColumnValue::Integer(row.try_get::<i32, _>(idx)?.into()),
        ColumnKind::Int8 => ColumnValue::Integer(row.try_get::<i64, _>(idx)?),
        ColumnKind::Float4 => ColumnValue::Real(row.try_get::<f32, _>(idx)?.into()),
        ColumnKind::Float8 => ColumnValue::Real(row.try_get::<f64, _>(idx)?),
        ColumnKind::Bool => ColumnValue::Integer(row.try_get::<bool, _>(idx)?.into()),
        ColumnKind::Text => ColumnValue::Text(row.try_get::<String, _>(idx)?),
        ColumnKind::Uuid => ColumnValue::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        ColumnKind::TimestampTz => {
            ColumnValue::Text(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339())
        }
        ColumnKind::Timestamp => {
            ColumnValue::Text(row.try_get::<NaiveDateTime, _>(idx)?.to_string())
        }
        ColumnKind::Date => ColumnValue::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
    };
    Ok(value)
}
