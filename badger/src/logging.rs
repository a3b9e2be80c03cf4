//! tracing 기반 로깅 초기화

use tracing_subscriber::EnvFilter;

/// 전역 tracing 구독자를 설치합니다.
///
/// `RUST_LOG`가 설정되어 있으면 그 값을, 아니면 `default_directive`를 사용합니다.
/// 이미 구독자가 설치되어 있으면 `false`를 반환합니다.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .try_init()
        .is_ok()
}
