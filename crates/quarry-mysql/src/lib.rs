//! # quarry-mysql
//!
//! The default [`Repository`] implementation for the quarry query engine,
//! backed by a pooled sqlx MySQL connection. Connection parameters arrive as
//! an explicit [`DbConfig`] value; nothing is held as ambient state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use quarry_orm::{CellValue, ExecOutcome, Orm, Repository, Result, Row};

/// MySQL connection configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DbConfig {
    /// `host` or `host:port`.
    pub server: String,
    pub user: String,
    pub password: String,
    pub db_name: String,
    /// Connection lifetime in minutes.
    pub conn_max_lifetime: u64,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    /// Transport security: `skip-verify`, `true`, or empty/`false`.
    pub tls: String,
}

impl DbConfig {
    fn connect_options(&self) -> MySqlConnectOptions {
        let (host, port) = match self.server.split_once(':') {
            Some((host, port)) => (host, port.parse().unwrap_or(3306)),
            None => (self.server.as_str(), 3306),
        };

        let ssl_mode = match self.tls.as_str() {
            "skip-verify" => MySqlSslMode::Required,
            "true" => MySqlSslMode::VerifyIdentity,
            _ => MySqlSslMode::Preferred,
        };

        MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.db_name)
            .ssl_mode(ssl_mode)
    }
}

/// A [`Repository`] over a pooled MySQL connection.
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Connects a pool with the configured limits.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        info!(server = %config.server, db = %config.db_name, "connecting to mysql server");
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_open_conns.max(1))
            .min_connections(config.max_idle_conns)
            .max_lifetime(Duration::from_secs(config.conn_max_lifetime * 60))
            .connect_with(config.connect_options())
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an already-connected pool.
    #[must_use]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Convenience: connect and wrap into an [`Orm`].
    pub async fn into_orm(config: &DbConfig) -> Result<Orm> {
        let repo = Self::connect(config).await?;
        Ok(Orm::new(Arc::new(repo)))
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "executing read statement");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> Result<Vec<ExecOutcome>> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            // Escape backslashes so literal ones survive the server's
            // string parsing.
            let statement = statement.replace('\\', "\\\\");
            debug!(sql = %statement, "executing write statement");
            let done = sqlx::query(&statement).execute(&mut *tx).await?;
            outcomes.push(ExecOutcome {
                last_insert_id: done.last_insert_id(),
                rows_affected: done.rows_affected(),
            });
        }
        tx.commit().await?;
        Ok(outcomes)
    }
}

fn row_to_map(row: &MySqlRow) -> Result<Row> {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(
            column.name().to_string(),
            CellValue::Scalar(cell_value(row, index)?),
        );
    }
    Ok(map)
}

/// Decodes one cell: integers and floats keep their numeric form, binary
/// columns are surfaced as text, everything else decodes as text.
fn cell_value(row: &MySqlRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name();
    let value = match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::from(row.try_get::<i64, _>(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => Value::from(row.try_get::<u64, _>(index)?),
        "FLOAT" => Value::from(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => Value::from(row.try_get::<f64, _>(index)?),
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            let bytes = row.try_get::<Vec<u8>, _>(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => {
                let bytes = row.try_get::<Vec<u8>, _>(index)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };
    Ok(value)
}
