//! 문장 실행 모듈
//!
//! 선택된 엔드포인트(또는 트랜잭션 세션)에서 문장을 실행하고,
//! 모든 물리 실행을 인터셉터 체인으로 감싸며, 결과 행을 엔티티로 변환합니다.

use crate::service::db::core::config::QueryConfig;
use crate::service::db::core::datasource::DataSourceRegistry;
use crate::service::db::core::interceptor::InterceptorChain;
use crate::service::db::core::metadata::{Entity, EntityDescriptor};
use crate::service::db::core::transaction::SessionSet;
use crate::service::db::core::types::{BoundStatement, ExecOutcome, QueryRow, RouteTarget, SqlValue};
use crate::tool::error::{BadgerError, BadgerResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// 데이터베이스 작업을 위한 문장 실행기
pub struct StatementExecutor {
    /// 데이터소스 레지스트리
    registry: Arc<DataSourceRegistry>,

    /// 물리 실행 훅
    interceptors: InterceptorChain,

    /// 쿼리 설정
    config: QueryConfig,
}

impl StatementExecutor {
    pub fn new(
        registry: Arc<DataSourceRegistry>,
        interceptors: InterceptorChain,
        config: QueryConfig,
    ) -> Self {
        Self {
            registry,
            interceptors,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<DataSourceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Execute INSERT/UPDATE/DELETE on the master (or the scope's pinned session)
    pub async fn execute(
        &self,
        target: &RouteTarget,
        stmt: &BoundStatement,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<ExecOutcome> {
        let start = Instant::now();

        let outcome = match tx {
            Some(sessions) => {
                self.registry.master_endpoint(&target.data_source)?;
                self.log_query(stmt, "transaction");
                let registry = &self.registry;
                // 세션 시작(begin)도 물리 실행이므로 훅 안에서 수행
                self.interceptors
                    .around(&stmt.sql, async move {
                        let session = sessions.acquire(registry, &target.data_source).await?;
                        session.execute(&stmt.sql, &stmt.params).await
                    })
                    .await
            }
            None => {
                let endpoint = self.registry.select(&target.data_source, true, true)?;
                self.log_query(stmt, endpoint.id());
                self.interceptors
                    .around(&stmt.sql, endpoint.execute(&stmt.sql, &stmt.params))
                    .await
            }
        };

        self.check_slow_query(&stmt.sql, start.elapsed().as_millis() as u64);
        if let Err(e) = &outcome {
            e.log(&format!("Statement on '{}' failed", target.data_source));
        }
        outcome
    }

    /// Execute SELECT and return raw rows
    pub async fn fetch(
        &self,
        target: &RouteTarget,
        stmt: &BoundStatement,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<Vec<QueryRow>> {
        let start = Instant::now();

        let rows = match tx {
            Some(sessions) => {
                self.registry.master_endpoint(&target.data_source)?;
                self.log_query(stmt, "transaction");
                let registry = &self.registry;
                self.interceptors
                    .around(&stmt.sql, async move {
                        let session = sessions.acquire(registry, &target.data_source).await?;
                        session.fetch_all(&stmt.sql, &stmt.params).await
                    })
                    .await
            }
            None => {
                let endpoint =
                    self.registry
                        .select(&target.data_source, false, target.use_master)?;
                self.log_query(stmt, endpoint.id());
                self.interceptors
                    .around(&stmt.sql, endpoint.fetch_all(&stmt.sql, &stmt.params))
                    .await
            }
        };

        let elapsed = start.elapsed();
        self.check_slow_query(&stmt.sql, elapsed.as_millis() as u64);
        match &rows {
            Ok(rows) => debug!("Query returned {} rows in {:?}", rows.len(), elapsed),
            Err(e) => e.log(&format!("Query on '{}' failed", target.data_source)),
        }
        rows
    }

    /// Log query if enabled
    fn log_query(&self, stmt: &BoundStatement, endpoint: &str) {
        if self.config.enable_query_logging {
            debug!(
                "Executing on {}: {} | Params: {:?}",
                endpoint, stmt.sql, stmt.params
            );
        }
    }

    /// Check for slow queries
    fn check_slow_query(&self, sql: &str, elapsed_ms: u64) {
        if elapsed_ms > self.config.slow_query_threshold_ms {
            warn!(
                "Slow query detected ({} ms): {}",
                elapsed_ms,
                sql.chars().take(200).collect::<String>()
            );
        }
    }
}

/// 결과 행 하나를 새 엔티티로 변환합니다.
///
/// 매핑되지 않은 컬럼은 무시합니다. NULL 값을 받을 수 없는 필드는 기본값을 유지합니다.
pub fn map_row<E: Entity>(desc: &EntityDescriptor<E>, row: QueryRow) -> BadgerResult<E> {
    let mut entity = E::default();

    for (name, value) in row {
        let Some(column) = desc.column(&name) else {
            continue;
        };
        if value.is_null() {
            let _ = column.set(&mut entity, value);
            continue;
        }
        column.set(&mut entity, value)?;
    }

    Ok(entity)
}

pub fn map_rows<E: Entity>(desc: &EntityDescriptor<E>, rows: Vec<QueryRow>) -> BadgerResult<Vec<E>> {
    rows.into_iter().map(|row| map_row(desc, row)).collect()
}

/// COUNT(*) 결과에서 개수를 읽습니다.
pub fn read_count(rows: &[QueryRow]) -> BadgerResult<u64> {
    let Some(row) = rows.first() else {
        return Ok(0);
    };

    let value = row
        .get("total")
        .or_else(|| row.values().next())
        .unwrap_or(&SqlValue::Null);

    match value {
        SqlValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .ok_or_else(|| BadgerError::mapping(format!("invalid count value: {n}"))),
        SqlValue::String(s) => s
            .parse::<u64>()
            .map_err(|_| BadgerError::mapping(format!("invalid count value: {s}"))),
        SqlValue::Null => Ok(0),
        other => Err(BadgerError::mapping(format!("invalid count value: {other}"))),
    }
}
