//! Badger 에러 정의
//!
//! 엔진의 모든 실패를 네 가지 축으로 분류합니다.
//! 설정 오류, 매핑 오류, 실행 실패, 그리고 문장 구성 오류입니다.
//! "찾을 수 없음"은 에러가 아니며 `Option::None`으로 표현됩니다.

use thiserror::Error;
use tracing::{error, warn};

/// Badger 결과 타입 별칭
pub type BadgerResult<T> = Result<T, BadgerError>;

/// 공통 Badger 에러 정의
#[derive(Error, Debug, Clone)]
pub enum BadgerError {
    /// 등록되지 않은 데이터소스 이름 등 설정 문제. 재시도하지 않습니다.
    #[error("설정 오류: {0}")]
    Configuration(String),

    /// 엔티티 메타데이터를 만들 수 없거나 샤드 키를 결정할 수 없는 경우
    #[error("매핑 오류: {0}")]
    Mapping(String),

    /// 플레이스홀더와 파라미터 개수 불일치 등 실행 전에 발견되는 문장 오류
    #[error("문장 오류: {0}")]
    Statement(String),

    /// 물리 실행 실패 (제약 조건 위반, 연결 문제 등)
    #[error("실행 실패 [{sql}]: {message}")]
    Execution { sql: String, message: String },

    #[error("타임아웃: {0}")]
    Timeout(String),

    #[error("트랜잭션 실패: {0}")]
    Transaction(String),
}

impl BadgerError {
    pub fn mapping(msg: impl Into<String>) -> Self {
        BadgerError::Mapping(msg.into())
    }

    pub fn statement(msg: impl Into<String>) -> Self {
        BadgerError::Statement(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        BadgerError::Configuration(msg.into())
    }

    pub fn execution(sql: &str, msg: impl Into<String>) -> Self {
        BadgerError::Execution {
            sql: sql.to_string(),
            message: msg.into(),
        }
    }

    /// 에러의 심각도를 반환합니다.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical: 물리 계층 장애
            BadgerError::Execution { .. } | BadgerError::Timeout(_) => ErrorSeverity::Critical,

            // High: 사용 방식 결함
            BadgerError::Mapping(_) | BadgerError::Configuration(_) => ErrorSeverity::High,

            BadgerError::Transaction(_) => ErrorSeverity::High,

            // Medium: 호출자 입력 오류
            BadgerError::Statement(_) => ErrorSeverity::Medium,
        }
    }

    /// 실행 단계에서 발생한 실패인지 여부. 라우팅/매핑 실패는 false.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            BadgerError::Execution { .. } | BadgerError::Timeout(_) | BadgerError::Transaction(_)
        )
    }

    /// 에러를 로깅합니다.
    ///
    /// 심각도에 따라 적절한 로깅 레벨을 사용합니다.
    pub fn log(&self, context: &str) {
        match self.severity() {
            ErrorSeverity::Critical => error!("[CRITICAL] {} - {}", context, self),
            ErrorSeverity::High => error!("[HIGH] {} - {}", context, self),
            ErrorSeverity::Medium => warn!("[MEDIUM] {} - {}", context, self),
        }
    }
}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    Critical, // 물리 계층 장애
    High,     // 사용 방식 결함
    Medium,   // 입력 오류
}

/// SQLx 에러를 BadgerError로 변환하는 헬퍼 함수
///
/// # Arguments
/// * `err` - SQLx 에러
/// * `sql` - 실패한 SQL 문장
pub fn map_sqlx_error(err: sqlx::Error, sql: &str) -> BadgerError {
    match err {
        sqlx::Error::PoolTimedOut => {
            BadgerError::Timeout(format!("connection pool timed out while running: {sql}"))
        }
        sqlx::Error::PoolClosed => BadgerError::execution(sql, "database pool is closed"),
        sqlx::Error::Configuration(e) => BadgerError::Configuration(e.to_string()),
        sqlx::Error::Database(db_err) => {
            let message = match db_err.code() {
                Some(code) => format!("[{code}] {db_err}"),
                None => db_err.to_string(),
            };
            BadgerError::execution(sql, message)
        }
        other => BadgerError::execution(sql, other.to_string()),
    }
}
