//! 쿼리 실행 설정 모듈
//!
//! 빌더 패턴으로 문장 실행 관련 설정을 관리

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 쿼리 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// 쿼리 로깅 활성화
    pub enable_query_logging: bool,

    /// 느린 쿼리 로깅 (임계값: ms)
    pub slow_query_threshold_ms: u64,

    /// 물리 실행 타임아웃. 초과하면 실행 실패로 처리됩니다.
    pub default_timeout: Duration,
}

impl QueryConfig {
    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.enable_query_logging = enabled;
        self
    }

    pub fn with_slow_query_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.slow_query_threshold_ms = threshold_ms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enable_query_logging: true,
            slow_query_threshold_ms: 1000,
            default_timeout: Duration::from_secs(30),
        }
    }
}
