//! Row store seam and its PostgreSQL implementation
//!
//! The engine talks to the database only through [`RowStore`]: driver
//! metadata, parameterized queries with `?` placeholders, statements, and the
//! unfiltered row count.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgPool, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::{Column, Either, Executor, Postgres, Row as _, Statement, Type, TypeInfo};

use crate::error::{GridError, Result};
use crate::format::{parse_date, scalar_text};
use crate::sql::placeholder::rewrite_placeholders;
use crate::sql::sanitize::validate_identifier;
use crate::types::{DriverColumn, PostgresColumn, Row};

/// Access to the underlying tables
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Column metadata of a table, in ordinal order
    async fn columns(&self, table: &str) -> Result<Vec<DriverColumn>>;

    /// Run a query with positional `?` arguments and return every row
    async fn query(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the affected row count
    async fn execute(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<u64>;

    /// Unfiltered row count of a table
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// First row of a query, if any
    async fn query_one(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, arguments).await?.into_iter().next())
    }
}

const COLUMNS_QUERY: &str = r#"
SELECT
    c.column_name::text AS name,
    c.data_type::text AS data_type,
    c.udt_name::text AS udt_name,
    c.is_nullable::text = 'YES' AS nullable,
    c.character_maximum_length::int4 AS character_maximum_length,
    c.numeric_precision::int4 AS numeric_precision,
    c.numeric_scale::int4 AS numeric_scale,
    COALESCE(col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, c.ordinal_position::int4), '') AS comment,
    COALESCE((
        SELECT CASE WHEN tc.constraint_type = 'PRIMARY KEY' THEN 'PRI' ELSE 'UNI' END
        FROM information_schema.key_column_usage k
        JOIN information_schema.table_constraints tc
          ON tc.constraint_name = k.constraint_name
         AND tc.table_schema = k.table_schema
         AND tc.table_name = k.table_name
        WHERE k.table_schema = c.table_schema
          AND k.table_name = c.table_name
          AND k.column_name = c.column_name
          AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
        ORDER BY CASE WHEN tc.constraint_type = 'PRIMARY KEY' THEN 0 ELSE 1 END
        LIMIT 1
    ), '') AS key,
    COALESCE((
        SELECT array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        WHERE t.typname = c.udt_name
    ), ARRAY[]::text[]) AS enum_labels
FROM information_schema.columns c
WHERE c.table_schema = COALESCE($1, current_schema())
  AND c.table_name = $2
ORDER BY c.ordinal_position
"#;

/// A query argument converted for the parameter it is bound to
#[derive(Debug, Clone, PartialEq)]
enum Argument {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(rust_decimal::Decimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Timestamptz(DateTime<Utc>),
    Time(NaiveTime),
    Json(serde_json::Value),
}

impl Argument {
    /// Shape of a value when the parameter type is unknown
    fn infer(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Argument::Null,
            serde_json::Value::Bool(b) => Argument::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(int) => Argument::Int(int),
                None => Argument::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Argument::Text(s.clone()),
            json => Argument::Json(json.clone()),
        }
    }

    /// Convert a value for a parameter of the named type
    ///
    /// Values that do not fit the type keep their JSON shape and are left to
    /// the server to reject.
    fn convert(value: &serde_json::Value, type_name: &str) -> Self {
        if value.is_null() {
            return Argument::Null;
        }
        let text = scalar_text(value);
        let text = text.trim();
        let converted = match type_name {
            "BOOL" => match value {
                serde_json::Value::Bool(b) => Some(Argument::Bool(*b)),
                _ => match text.to_ascii_lowercase().as_str() {
                    "1" | "t" | "true" | "yes" | "on" => Some(Argument::Bool(true)),
                    "0" | "f" | "false" | "no" | "off" => Some(Argument::Bool(false)),
                    _ => None,
                },
            },
            "INT2" | "INT4" | "INT8" => match value {
                serde_json::Value::Bool(b) => Some(Argument::Int(i64::from(*b))),
                _ => text.parse::<i64>().ok().map(Argument::Int),
            },
            "NUMERIC" => match value {
                serde_json::Value::Bool(b) => Some(Argument::Int(i64::from(*b))),
                _ => rust_decimal::Decimal::from_str(text)
                    .or_else(|_| rust_decimal::Decimal::from_scientific(text))
                    .ok()
                    .map(Argument::Decimal),
            },
            "FLOAT4" | "FLOAT8" => text.parse::<f64>().ok().map(Argument::Float),
            "DATE" => parse_date(text).map(|parsed| Argument::Date(parsed.date())),
            "TIMESTAMP" => parse_date(text).map(Argument::Timestamp),
            "TIMESTAMPTZ" => DateTime::parse_from_rfc3339(text)
                .map(|parsed| parsed.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_date(text).map(|parsed| parsed.and_utc()))
                .map(Argument::Timestamptz),
            "TIME" => NaiveTime::parse_from_str(text, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                .ok()
                .map(Argument::Time),
            "JSON" | "JSONB" => Some(match value {
                serde_json::Value::String(s) => {
                    serde_json::from_str(s).map_or_else(|_| Argument::Json(value.clone()), Argument::Json)
                }
                json => Argument::Json(json.clone()),
            }),
            _ => match value {
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => None,
                _ => Some(Argument::Text(scalar_text(value))),
            },
        };
        converted.unwrap_or_else(|| Self::infer(value))
    }
}

/// Text or NULL sent under a parameter type resolved by the server
///
/// Used where the wire form is the text itself (enum labels) or empty (NULL).
struct Declared {
    text: Option<String>,
    type_info: PgTypeInfo,
}

impl Declared {
    fn null(type_info: &PgTypeInfo) -> Self {
        Self {
            text: None,
            type_info: type_info.clone(),
        }
    }

    fn text(text: String, type_info: &PgTypeInfo) -> Self {
        Self {
            text: Some(text),
            type_info: type_info.clone(),
        }
    }
}

impl Type<Postgres> for Declared {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl Encode<'_, Postgres> for Declared {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> std::result::Result<IsNull, BoxDynError> {
        match &self.text {
            None => Ok(IsNull::Yes),
            Some(text) => <&str as Encode<Postgres>>::encode(text.as_str(), buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }
}

/// PostgreSQL row store on a sqlx connection pool
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    /// Connect to the database
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| GridError::Connection(format!("Database connection failed: {}", e)))?;
        Ok(Self { pool })
    }

    /// Use an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Parameter types the server infers for a statement
    async fn parameter_types(&self, sql: &str, count: usize) -> Result<Vec<PgTypeInfo>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let statement = self.pool.prepare(sql).await?;
        Ok(match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        })
    }

    fn bind_argument<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &serde_json::Value,
        target: Option<&PgTypeInfo>,
    ) -> Query<'q, Postgres, PgArguments> {
        let argument = match target {
            Some(target) => Argument::convert(value, target.name()),
            None => Argument::infer(value),
        };
        match argument {
            Argument::Null => match target {
                Some(target) => query.bind(Declared::null(target)),
                None => query.bind(None::<String>),
            },
            Argument::Bool(b) => query.bind(b),
            Argument::Int(int) => query.bind(int),
            Argument::Float(float) => query.bind(float),
            Argument::Decimal(decimal) => query.bind(decimal),
            Argument::Date(date) => query.bind(date),
            Argument::Timestamp(timestamp) => query.bind(timestamp),
            Argument::Timestamptz(timestamp) => query.bind(timestamp),
            Argument::Time(time) => query.bind(time),
            Argument::Json(json) => query.bind(json),
            Argument::Text(text) => match target {
                Some(target) if matches!(target.kind(), PgTypeKind::Enum(_)) => {
                    query.bind(Declared::text(text, target))
                }
                _ => query.bind(text),
            },
        }
    }

    fn decode_row(row: &PgRow) -> Row {
        row.columns()
            .iter()
            .map(|column| {
                let value = Self::extract_column_value(row, column.ordinal(), column.type_info().name());
                (column.name().to_string(), value)
            })
            .collect()
    }

    fn extract_column_value(row: &PgRow, index: usize, type_name: &str) -> serde_json::Value {
        use rust_decimal::prelude::ToPrimitive;

        let value = match type_name {
            "INT2" => row
                .try_get::<Option<i16>, _>(index)
                .ok()
                .flatten()
                .map(|v| serde_json::Value::from(i64::from(v))),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)
                .ok()
                .flatten()
                .map(|v| serde_json::Value::from(i64::from(v))),
            "INT8" => row
                .try_get::<Option<i64>, _>(index)
                .ok()
                .flatten()
                .map(serde_json::Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)
                .ok()
                .flatten()
                .and_then(|v| serde_json::Number::from_f64(f64::from(v)))
                .map(serde_json::Value::Number),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(index)
                .ok()
                .flatten()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number),
            "NUMERIC" => row
                .try_get::<Option<rust_decimal::Decimal>, _>(index)
                .ok()
                .flatten()
                .and_then(|d| d.to_f64())
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number),
            "BOOL" => row
                .try_get::<Option<bool>, _>(index)
                .ok()
                .flatten()
                .map(serde_json::Value::Bool),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(index)
                .ok()
                .flatten()
                .map(|v| serde_json::Value::String(v.format("%Y-%m-%d").to_string())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)
                .ok()
                .flatten()
                .map(|v| serde_json::Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
                .ok()
                .flatten()
                .map(|v| serde_json::Value::String(v.to_rfc3339())),
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(index)
                .ok()
                .flatten(),
            // Text-like and user-defined (enum) types decode as UTF-8
            _ => row
                .try_get_unchecked::<Option<String>, _>(index)
                .ok()
                .flatten()
                .map(serde_json::Value::String),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    fn build_query<'q>(
        sql: &'q str,
        params: &[serde_json::Value],
        types: &[PgTypeInfo],
    ) -> Query<'q, Postgres, PgArguments> {
        params
            .iter()
            .enumerate()
            .fold(sqlx::query(sql), |query, (index, value)| {
                Self::bind_argument(query, value, types.get(index))
            })
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn columns(&self, table: &str) -> Result<Vec<DriverColumn>> {
        validate_identifier(table).map_err(GridError::configuration)?;
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
            None => (None, table.to_string()),
        };

        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(schema)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(GridError::configuration(format!(
                "Table '{}' does not exist or has no columns",
                table
            )));
        }

        rows.iter()
            .map(|row| -> Result<DriverColumn> {
                Ok(PostgresColumn {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
                    udt_name: row.try_get("udt_name")?,
                    nullable: row.try_get("nullable")?,
                    character_maximum_length: row.try_get("character_maximum_length")?,
                    numeric_precision: row.try_get("numeric_precision")?,
                    numeric_scale: row.try_get("numeric_scale")?,
                    key: row.try_get("key")?,
                    comment: row.try_get("comment")?,
                    enum_labels: row.try_get("enum_labels")?,
                }
                .into_driver())
            })
            .collect()
    }

    async fn query(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<Vec<Row>> {
        let (sql, params) = rewrite_placeholders(sql, arguments)?;
        tracing::debug!(sql = %sql, params = params.len(), "Running query");
        let types = self.parameter_types(&sql, params.len()).await?;
        let rows = Self::build_query(&sql, &params, &types)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::decode_row).collect())
    }

    async fn execute(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<u64> {
        let (sql, params) = rewrite_placeholders(sql, arguments)?;
        tracing::debug!(sql = %sql, params = params.len(), "Running statement");
        let types = self.parameter_types(&sql, params.len()).await?;
        let result = Self::build_query(&sql, &params, &types)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        validate_identifier(table).map_err(GridError::configuration)?;
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
