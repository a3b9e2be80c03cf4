//! 연결 계층 모듈
//!
//! 엔진이 물리 데이터베이스에 접근하는 계약(`Endpoint`, `Session`)과
//! sqlx MySQL 연결 풀 기반 구현을 제공합니다.
//! 커넥션 풀링과 타임아웃은 이 계층의 책임입니다.

use crate::service::db::core::config::QueryConfig;
use crate::service::db::core::types::{ExecOutcome, QueryRow, SqlValue};
use crate::tool::error::{map_sqlx_error, BadgerError, BadgerResult};
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlRow};
use sqlx::{Column, MySql, Row, Transaction, TypeInfo};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// 하나의 물리 데이터베이스 엔드포인트 (master 또는 slave)
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// 로그와 진단에 쓰이는 식별자
    fn id(&self) -> &str;

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome>;

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>>;

    /// 이 엔드포인트에 고정된 트랜잭션 세션을 시작합니다.
    async fn begin(&self) -> BadgerResult<Box<dyn Session>>;
}

/// A transaction pinned to one endpoint.
///
/// Dropping a session without `commit` must roll it back.
#[async_trait]
pub trait Session: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome>;

    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>>;

    async fn commit(self: Box<Self>) -> BadgerResult<()>;

    async fn rollback(self: Box<Self>) -> BadgerResult<()>;
}

/// sqlx MySQL 연결 풀 기반 엔드포인트
#[derive(Clone)]
pub struct MySqlEndpoint {
    id: String,
    pool: MySqlPool,
    timeout: Duration,
}

impl MySqlEndpoint {
    pub fn new(id: impl Into<String>, pool: MySqlPool, config: &QueryConfig) -> Self {
        Self {
            id: id.into(),
            pool,
            timeout: config.default_timeout,
        }
    }

    /// 연결 풀 참조 가져오기
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Gracefully close all connections
    pub async fn close(&self) {
        info!("Closing database connection pool {}", self.id);
        self.pool.close().await;
    }
}

#[async_trait]
impl Endpoint for MySqlEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome> {
        let result = with_timeout(self.timeout, sql, bind(sql, params).execute(&self.pool)).await?;
        Ok(ExecOutcome {
            affected_rows: result.rows_affected(),
            last_insert_id: Some(result.last_insert_id()).filter(|id| *id > 0),
        })
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>> {
        let rows = with_timeout(self.timeout, sql, bind(sql, params).fetch_all(&self.pool)).await?;
        debug!("Query returned {} rows from {}", rows.len(), self.id);
        rows.iter().map(row_to_map).collect()
    }

    async fn begin(&self) -> BadgerResult<Box<dyn Session>> {
        let tx = self.pool.begin().await.map_err(|e| {
            BadgerError::Transaction(format!("failed to begin on {}: {}", self.id, e))
        })?;
        debug!("Transaction started on {}", self.id);
        Ok(Box::new(MySqlSession {
            tx,
            timeout: self.timeout,
        }))
    }
}

/// sqlx 트랜잭션 세션. drop 시 sqlx가 롤백합니다.
pub struct MySqlSession {
    tx: Transaction<'static, MySql>,
    timeout: Duration,
}

#[async_trait]
impl Session for MySqlSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome> {
        let result = with_timeout(self.timeout, sql, bind(sql, params).execute(&mut *self.tx)).await?;
        Ok(ExecOutcome {
            affected_rows: result.rows_affected(),
            last_insert_id: Some(result.last_insert_id()).filter(|id| *id > 0),
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>> {
        let rows = with_timeout(self.timeout, sql, bind(sql, params).fetch_all(&mut *self.tx)).await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn commit(self: Box<Self>) -> BadgerResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| BadgerError::Transaction(format!("commit failed: {e}")))
    }

    async fn rollback(self: Box<Self>) -> BadgerResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| BadgerError::Transaction(format!("rollback failed: {e}")))
    }
}

async fn with_timeout<T, F>(timeout: Duration, sql: &str, call: F) -> BadgerResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| map_sqlx_error(e, sql)),
        Err(_) => Err(BadgerError::Timeout(format!(
            "statement exceeded {:?}: {}",
            timeout, sql
        ))),
    }
}

/// 순서가 있는 파라미터를 `?` 위치에 바인딩
fn bind<'q>(
    sql: &'q str,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);

    for value in params {
        query = match value {
            SqlValue::String(s) => query.bind(s.clone()),
            SqlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(u) = n.as_u64() {
                    query.bind(u)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    query.bind(n.to_string())
                }
            }
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Null => query.bind(Option::<String>::None),
            other => query.bind(other.to_string()),
        };
    }

    query
}

/// 컬럼 디코딩 결과를 정리합니다. NULL은 None, 디코딩 실패는 컬럼 이름을 담은 매핑 오류.
fn decoded<T>(column: &str, result: Result<Option<T>, sqlx::Error>) -> BadgerResult<Option<T>> {
    result.map_err(|e| BadgerError::mapping(format!("cannot decode column '{column}': {e}")))
}

/// Convert database row to a column map
fn row_to_map(row: &MySqlRow) -> BadgerResult<QueryRow> {
    let mut result = HashMap::new();

    for column in row.columns() {
        let name = column.name();
        let ordinal = column.ordinal();

        let value = match column.type_info().name() {
            "BIGINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED" | "SMALLINT UNSIGNED"
            | "TINYINT UNSIGNED" => {
                decoded(name, row.try_get::<Option<u64>, _>(ordinal))?.map(SqlValue::from)
            }
            "INT" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "YEAR" => {
                decoded(name, row.try_get::<Option<i64>, _>(ordinal))?.map(SqlValue::from)
            }
            "BOOLEAN" | "BOOL" => decoded(name, row.try_get::<Option<bool>, _>(ordinal))?.map(SqlValue::Bool),
            "FLOAT" => decoded(name, row.try_get::<Option<f32>, _>(ordinal))?
                .and_then(|v| serde_json::Number::from_f64(f64::from(v)))
                .map(SqlValue::Number),
            "DOUBLE" => decoded(name, row.try_get::<Option<f64>, _>(ordinal))?
                .and_then(serde_json::Number::from_f64)
                .map(SqlValue::Number),
            "DATETIME" | "TIMESTAMP" => decoded(name, row.try_get::<Option<chrono::NaiveDateTime>, _>(ordinal))?
                .map(|v| SqlValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "DATE" => decoded(name, row.try_get::<Option<chrono::NaiveDate>, _>(ordinal))?
                .map(|v| SqlValue::String(v.to_string())),
            "TIME" => decoded(name, row.try_get::<Option<chrono::NaiveTime>, _>(ordinal))?
                .map(|v| SqlValue::String(v.to_string())),
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
                decoded(name, row.try_get::<Option<Vec<u8>>, _>(ordinal))?
                    .map(|bytes| SqlValue::Array(bytes.into_iter().map(SqlValue::from).collect()))
            }
            "JSON" => decoded(name, row.try_get::<Option<serde_json::Value>, _>(ordinal))?,
            // DECIMAL and text-like columns arrive as strings
            _ => decoded(name, row.try_get_unchecked::<Option<String>, _>(ordinal))?.map(SqlValue::String),
        };

        result.insert(name.to_string(), value.unwrap_or(SqlValue::Null));
    }

    Ok(result)
}
