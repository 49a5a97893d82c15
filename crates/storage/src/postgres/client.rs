use crate::SqlApi;
use async_trait::async_trait;
use rndsearch_core::config::DatabaseConfig;
use rndsearch_core::{Error, Result, SqlResult};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Pool, Postgres, Row, TypeInfo};
use std::time::Instant;
use tracing::{debug, info};

/// PostgreSQL client over a shared connection pool
///
/// Every statement runs inside a transaction that sets a local statement
/// timeout, so a runaway query cannot hold a pooled connection hostage.
pub struct PostgresClient {
    pool: Pool<Postgres>,
    statement_timeout_ms: u64,
}

impl PostgresClient {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| Error::storage(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self {
            pool,
            statement_timeout_ms: config.statement_timeout_secs * 1000,
        })
    }

    fn row_to_values(row: &PgRow) -> Vec<serde_json::Value> {
        (0..row.columns().len())
            .map(|i| Self::column_to_value(row, i))
            .collect()
    }

    /// Decode one column into a JSON value by Postgres type name, falling
    /// back to a string representation for exotic types
    fn column_to_value(row: &PgRow, idx: usize) -> serde_json::Value {
        let type_name = row.columns()[idx].type_info().name().to_uppercase();
        match type_name.as_str() {
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .ok()
                .flatten()
                .map(|v| serde_json::json!(v)),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .ok()
                .flatten()
                .map(|v| serde_json::json!(v)),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| serde_json::json!(v)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .ok()
                .flatten()
                .map(|v| serde_json::json!(v)),
            "FLOAT8" | "NUMERIC" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| serde_json::json!(v)),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(|v| serde_json::json!(v)),
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(idx)
                .ok()
                .flatten(),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(serde_json::Value::String),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl SqlApi for PostgresClient {
    async fn execute(&self, sql: &str) -> Result<SqlResult> {
        let start = Instant::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::storage(format!("Failed to begin transaction: {e}")))?;

        let timeout_stmt = format!("SET LOCAL statement_timeout = '{}ms'", self.statement_timeout_ms);
        sqlx::query(&timeout_stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::storage(format!("Failed to set statement timeout: {e}")))?;

        let rows = match sqlx::query(sql).fetch_all(&mut *tx).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("SQL execution failed: {e}");
                return Ok(SqlResult {
                    success: false,
                    error: Some(e.to_string()),
                    execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                    ..Default::default()
                });
            }
        };

        tx.commit()
            .await
            .map_err(|e| Error::storage(format!("Failed to commit: {e}")))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let values: Vec<Vec<serde_json::Value>> = rows.iter().map(Self::row_to_values).collect();
        let row_count = values.len();

        debug!("SQL returned {row_count} rows in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

        Ok(SqlResult {
            success: true,
            columns,
            rows: values,
            row_count,
            error: None,
            execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            generated_sql: None,
        })
    }
}
