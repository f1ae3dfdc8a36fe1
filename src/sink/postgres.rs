//! PostgreSQL sink over sqlx.
//!
//! Each file task writes inside its own transaction, so closing a handle is
//! the commit point and a failed file leaves nothing behind. Values are
//! bound with native types where Postgres accepts them directly; decimals
//! and nested JSON go through an explicit CAST because text binding is the
//! only lossless route for them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Transaction};
use tracing::info;

use super::{IfExists, SinkHandle, SinkWriter};
use crate::batch::{ColumnData, RowBatch, format_decimal};
use crate::config::MAX_INSERT_PARAMETERS;
use crate::error::WriteError;
use crate::schema::{Column, LogicalType, ReconciledSchema, TimeUnit};

pub struct PostgresSink {
    pool: PgPool,
    table: String,
    if_exists: IfExists,
    write_timeout: Duration,
}

impl PostgresSink {
    /// Create a sink for `table` behind the given connection string.
    ///
    /// The pool connects lazily; an unreachable server surfaces at prepare
    /// or write time, where it is handled like any other sink failure.
    pub fn connect(
        dsn: &str,
        table: impl Into<String>,
        if_exists: IfExists,
        write_timeout: Duration,
    ) -> Result<Self, WriteError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect_lazy(dsn)
            .map_err(|e| WriteError::Unavailable {
                reason: e.to_string(),
            })?;

        Ok(Self {
            pool,
            table: table.into(),
            if_exists,
            write_timeout,
        })
    }

    async fn execute(&self, sql: &str) -> Result<(), WriteError> {
        match tokio::time::timeout(self.write_timeout, sqlx::query(sql).execute(&self.pool)).await {
            Err(_) => Err(WriteError::Timeout(self.write_timeout)),
            Ok(Err(e)) => Err(write_error(e)),
            Ok(Ok(_)) => Ok(()),
        }
    }
}

#[async_trait]
impl SinkWriter for PostgresSink {
    async fn prepare(&self, schema: &ReconciledSchema) -> Result<(), WriteError> {
        match self.if_exists {
            IfExists::Fail => {
                // Plain CREATE TABLE: an existing table errors atomically.
                self.execute(&table_ddl(&self.table, schema, false))
                    .await
                    .map_err(|e| match e {
                        WriteError::Rejected { reason } if reason.contains("already exists") => {
                            WriteError::Rejected {
                                reason: format!(
                                    "table \"{}\" already exists and if-exists is 'fail'",
                                    self.table
                                ),
                            }
                        }
                        other => other,
                    })?;
            }
            IfExists::Replace => {
                self.execute(&format!("DROP TABLE IF EXISTS \"{}\"", self.table))
                    .await?;
                self.execute(&table_ddl(&self.table, schema, false)).await?;
            }
            IfExists::Append => {
                self.execute(&table_ddl(&self.table, schema, true)).await?;
            }
        }

        info!(table = %self.table, columns = schema.len(), "destination table ready");
        Ok(())
    }

    async fn open(&self, schema: &ReconciledSchema) -> Result<Box<dyn SinkHandle>, WriteError> {
        let tx = match tokio::time::timeout(self.write_timeout, self.pool.begin()).await {
            Err(_) => return Err(WriteError::Timeout(self.write_timeout)),
            Ok(Err(e)) => return Err(write_error(e)),
            Ok(Ok(tx)) => tx,
        };

        Ok(Box::new(PostgresSinkHandle {
            tx,
            table: self.table.clone(),
            columns: Arc::new(schema.schema().columns().to_vec()),
            write_timeout: self.write_timeout,
        }))
    }
}

struct PostgresSinkHandle {
    tx: Transaction<'static, Postgres>,
    table: String,
    columns: Arc<Vec<Column>>,
    write_timeout: Duration,
}

#[async_trait]
impl SinkHandle for PostgresSinkHandle {
    async fn write_batch(&mut self, batch: RowBatch) -> Result<(), WriteError> {
        if batch.num_rows() == 0 || self.columns.is_empty() {
            return Ok(());
        }

        // Stay under the protocol's bind-parameter limit by splitting wide
        // batches into several INSERT statements.
        let rows_per_insert = (MAX_INSERT_PARAMETERS / self.columns.len()).max(1);
        let mut offset = 0;

        while offset < batch.num_rows() {
            let count = rows_per_insert.min(batch.num_rows() - offset);
            let sql = insert_sql(&self.table, &self.columns, count);

            let mut query = sqlx::query(&sql);
            for row in offset..offset + count {
                for (column, data) in self.columns.iter().zip(batch.columns()) {
                    query = bind_value(query, column, data, row)?;
                }
            }

            match tokio::time::timeout(self.write_timeout, query.execute(&mut *self.tx)).await {
                Err(_) => return Err(WriteError::Timeout(self.write_timeout)),
                Ok(Err(e)) => return Err(write_error(e)),
                Ok(Ok(_)) => {}
            }

            offset += count;
        }

        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), WriteError> {
        match tokio::time::timeout(self.write_timeout, self.tx.commit()).await {
            Err(_) => Err(WriteError::Timeout(self.write_timeout)),
            Ok(Err(e)) => Err(write_error(e)),
            Ok(Ok(())) => Ok(()),
        }
    }
}

fn write_error(e: sqlx::Error) -> WriteError {
    match e {
        sqlx::Error::Io(io) => WriteError::Io(io),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => WriteError::Unavailable {
            reason: e.to_string(),
        },
        other => WriteError::Rejected {
            reason: other.to_string(),
        },
    }
}

/// CREATE TABLE statement for the reconciled schema.
pub(crate) fn table_ddl(table: &str, schema: &ReconciledSchema, if_not_exists: bool) -> String {
    let columns: Vec<String> = schema
        .columns()
        .iter()
        .map(|rc| {
            let nullability = if rc.column.nullable { "" } else { " NOT NULL" };
            format!(
                "\"{}\" {}{}",
                rc.column.name,
                sql_type(&rc.column.data_type),
                nullability
            )
        })
        .collect();

    format!(
        "CREATE TABLE{} \"{}\" ({})",
        if if_not_exists { " IF NOT EXISTS" } else { "" },
        table,
        columns.join(", ")
    )
}

fn sql_type(data_type: &LogicalType) -> String {
    match data_type {
        // A column observed only as nulls has no value type to declare.
        LogicalType::Null => "TEXT".to_string(),
        LogicalType::Boolean => "BOOLEAN".to_string(),
        LogicalType::Int8 | LogicalType::Int16 => "SMALLINT".to_string(),
        LogicalType::Int32 => "INTEGER".to_string(),
        LogicalType::Int64 => "BIGINT".to_string(),
        LogicalType::Float32 => "REAL".to_string(),
        LogicalType::Float64 => "DOUBLE PRECISION".to_string(),
        LogicalType::Utf8 => "TEXT".to_string(),
        LogicalType::Binary => "BYTEA".to_string(),
        LogicalType::Timestamp(_) => "TIMESTAMP".to_string(),
        LogicalType::Decimal { precision, scale } => format!("NUMERIC({},{})", precision, scale),
        LogicalType::List(_) | LogicalType::Struct(_) => "JSONB".to_string(),
    }
}

/// Multi-row INSERT with one placeholder per value. Decimal and JSON values
/// are bound as text and cast server-side.
fn insert_sql(table: &str, columns: &[Column], rows: usize) -> String {
    let column_list: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect();

    let mut groups = Vec::with_capacity(rows);
    let mut param = 1usize;
    for _ in 0..rows {
        let placeholders: Vec<String> = columns
            .iter()
            .map(|c| {
                let p = placeholder(param, &c.data_type);
                param += 1;
                p
            })
            .collect();
        groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        table,
        column_list.join(", "),
        groups.join(", ")
    )
}

fn placeholder(index: usize, data_type: &LogicalType) -> String {
    match data_type {
        LogicalType::Decimal { precision, scale } => {
            format!("CAST(${} AS NUMERIC({},{}))", index, precision, scale)
        }
        LogicalType::List(_) | LogicalType::Struct(_) => format!("CAST(${} AS JSONB)", index),
        _ => format!("${}", index),
    }
}

/// Bind one value with the native sqlx type for its column.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    column: &Column,
    data: &ColumnData,
    row: usize,
) -> Result<Query<'q, Postgres, PgArguments>, WriteError> {
    let query = match data {
        ColumnData::Null(_) => query.bind(None::<String>),
        ColumnData::Boolean(v) => query.bind(v[row]),
        ColumnData::Int8(v) => query.bind(v[row].map(i16::from)),
        ColumnData::Int16(v) => query.bind(v[row]),
        ColumnData::Int32(v) => query.bind(v[row]),
        ColumnData::Int64(v) => query.bind(v[row]),
        ColumnData::Float32(v) => query.bind(v[row]),
        ColumnData::Float64(v) => query.bind(v[row]),
        ColumnData::Utf8(v) => query.bind(v[row].clone()),
        ColumnData::Binary(v) => query.bind(v[row].clone()),
        ColumnData::Timestamp(unit, v) => {
            let value = match v[row] {
                None => None,
                Some(ticks) => Some(naive_timestamp(*unit, ticks).ok_or_else(|| {
                    WriteError::Rejected {
                        reason: format!(
                            "column '{}': timestamp {} out of range",
                            column.name, ticks
                        ),
                    }
                })?),
            };
            query.bind(value)
        }
        ColumnData::Decimal { scale, values, .. } => {
            query.bind(values[row].map(|x| format_decimal(x, *scale)))
        }
        ColumnData::Nested(v) => query.bind(v[row].as_ref().map(|x| x.to_string())),
    };
    Ok(query)
}

fn naive_timestamp(unit: TimeUnit, ticks: i64) -> Option<chrono::NaiveDateTime> {
    let datetime = match unit {
        TimeUnit::Seconds => chrono::DateTime::from_timestamp(ticks, 0),
        TimeUnit::Millis => chrono::DateTime::from_timestamp_millis(ticks),
        TimeUnit::Micros => chrono::DateTime::from_timestamp_micros(ticks),
        TimeUnit::Nanos => Some(chrono::DateTime::from_timestamp_nanos(ticks)),
    };
    datetime.map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PromotionPolicy, Schema, reconcile};

    fn reconciled(columns: Vec<Column>) -> ReconciledSchema {
        let schema = Schema::new(columns).unwrap();
        reconcile(&[("f".to_string(), schema)], PromotionPolicy::default()).unwrap()
    }

    #[test]
    fn test_table_ddl_maps_types_and_nullability() {
        let schema = reconciled(vec![
            Column::new("id", LogicalType::Int64, false),
            Column::new("name", LogicalType::Utf8, true),
            Column::new(
                "amount",
                LogicalType::Decimal {
                    precision: 12,
                    scale: 2,
                },
                true,
            ),
            Column::new("tags", LogicalType::List(Box::new(LogicalType::Utf8)), true),
        ]);

        let ddl = table_ddl("events", &schema, false);
        assert_eq!(
            ddl,
            "CREATE TABLE \"events\" (\"id\" BIGINT NOT NULL, \"name\" TEXT, \
             \"amount\" NUMERIC(12,2), \"tags\" JSONB)"
        );
    }

    #[test]
    fn test_table_ddl_if_not_exists() {
        let schema = reconciled(vec![Column::new("x", LogicalType::Int32, true)]);
        let ddl = table_ddl("t", &schema, true);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"t\""));
    }

    #[test]
    fn test_insert_sql_casts_decimal_and_json() {
        let columns = vec![
            Column::new("id", LogicalType::Int64, false),
            Column::new(
                "amount",
                LogicalType::Decimal {
                    precision: 10,
                    scale: 2,
                },
                true,
            ),
            Column::new("meta", LogicalType::Struct(vec![]), true),
        ];

        let sql = insert_sql("t", &columns, 2);
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"id\", \"amount\", \"meta\") VALUES \
             ($1, CAST($2 AS NUMERIC(10,2)), CAST($3 AS JSONB)), \
             ($4, CAST($5 AS NUMERIC(10,2)), CAST($6 AS JSONB))"
        );
    }

    #[test]
    fn test_naive_timestamp_units() {
        let dt = naive_timestamp(TimeUnit::Seconds, 86_400).unwrap();
        assert_eq!(dt.to_string(), "1970-01-02 00:00:00");

        let dt = naive_timestamp(TimeUnit::Micros, 1_000_000).unwrap();
        assert_eq!(dt.to_string(), "1970-01-01 00:00:01");
    }
}
