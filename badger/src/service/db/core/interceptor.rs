//! SQL 인터셉터 모듈
//!
//! 모든 물리 실행 전후에 호출되는 훅입니다.
//! 컨텍스트는 실행 한 번마다 새로 만들어져 `before` → `after`/`error`로 전달되고 버려집니다.

use crate::tool::error::{BadgerError, BadgerResult};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Per-execution key/value store threaded from `before` to `after`/`error`.
#[derive(Default)]
pub struct InterceptorContext {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl InterceptorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// 타입이 다르거나 키가 없으면 None
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        let value = self.values.remove(key)?;
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for InterceptorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorContext")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// SQL 실행 훅
///
/// 훅의 실패나 패닉은 로그로만 남고 실행 결과를 바꾸지 않습니다.
pub trait SqlInterceptor: Send + Sync {
    fn before(&self, _sql: &str, _ctx: &mut InterceptorContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn after(&self, _sql: &str, _ctx: &mut InterceptorContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn error(
        &self,
        _sql: &str,
        _failure: &BadgerError,
        _ctx: &mut InterceptorContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 등록 순서대로 호출되는 인터셉터 체인
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn SqlInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn SqlInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// 물리 실행 하나를 before/after/error 훅으로 감쌉니다.
    pub async fn around<T, F>(&self, sql: &str, call: F) -> BadgerResult<T>
    where
        F: Future<Output = BadgerResult<T>>,
    {
        if self.interceptors.is_empty() {
            return call.await;
        }

        let mut ctx = InterceptorContext::new();
        for interceptor in &self.interceptors {
            guarded("before", sql, || interceptor.before(sql, &mut ctx));
        }

        let outcome = call.await;

        match &outcome {
            Ok(_) => {
                for interceptor in &self.interceptors {
                    guarded("after", sql, || interceptor.after(sql, &mut ctx));
                }
            }
            Err(failure) => {
                for interceptor in &self.interceptors {
                    guarded("error", sql, || interceptor.error(sql, failure, &mut ctx));
                }
            }
        }

        outcome
    }
}

/// 훅 하나를 실행합니다. 실패나 패닉은 로그만 남깁니다.
fn guarded(stage: &str, sql: &str, hook: impl FnOnce() -> anyhow::Result<()>) {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Interceptor {} hook failed for `{}`: {:#}", stage, sql, e),
        Err(_) => warn!("Interceptor {} hook panicked for `{}`", stage, sql),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl SqlInterceptor for Recorder {
        fn before(&self, sql: &str, ctx: &mut InterceptorContext) -> anyhow::Result<()> {
            ctx.put("marker", sql.len());
            self.events.lock().push(format!("before:{sql}"));
            Ok(())
        }

        fn after(&self, sql: &str, ctx: &mut InterceptorContext) -> anyhow::Result<()> {
            let marker = ctx.get::<usize>("marker").copied();
            self.events.lock().push(format!("after:{sql}:{marker:?}"));
            Ok(())
        }

        fn error(
            &self,
            sql: &str,
            failure: &BadgerError,
            _ctx: &mut InterceptorContext,
        ) -> anyhow::Result<()> {
            self.events.lock().push(format!("error:{sql}:{failure}"));
            Ok(())
        }
    }

    struct Failing;

    impl SqlInterceptor for Failing {
        fn before(&self, _sql: &str, _ctx: &mut InterceptorContext) -> anyhow::Result<()> {
            anyhow::bail!("before exploded")
        }

        fn after(&self, _sql: &str, _ctx: &mut InterceptorContext) -> anyhow::Result<()> {
            anyhow::bail!("after exploded")
        }
    }

    #[test]
    fn test_context_typed_access() {
        let mut ctx = InterceptorContext::new();
        ctx.put("startTime", 42u64);
        assert_eq!(ctx.get::<u64>("startTime"), Some(&42));
        assert_eq!(ctx.get::<String>("startTime"), None);
        assert_eq!(ctx.remove::<u64>("startTime"), Some(42));
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_success_runs_before_then_after() {
        let recorder = Arc::new(Recorder::default());
        let mut chain = InterceptorChain::new();
        chain.push(recorder.clone());

        let result = chain.around("SELECT 1", async { Ok(7) }).await.unwrap();
        assert_eq!(result, 7);
        assert_eq!(
            *recorder.events.lock(),
            vec!["before:SELECT 1".to_string(), "after:SELECT 1:Some(8)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failure_runs_before_then_error() {
        let recorder = Arc::new(Recorder::default());
        let mut chain = InterceptorChain::new();
        chain.push(recorder.clone());

        let err = chain
            .around::<(), _>("DELETE", async { Err(BadgerError::execution("DELETE", "boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, BadgerError::Execution { .. }));

        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], "before:DELETE");
        assert!(events[1].starts_with("error:DELETE"));
    }

    #[tokio::test]
    async fn test_hook_failures_do_not_mask_outcome() {
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(Failing));
        let value = chain.around("SELECT 1", async { Ok("rows") }).await.unwrap();
        assert_eq!(value, "rows");
    }

    struct Panicking;

    impl SqlInterceptor for Panicking {
        fn before(&self, _sql: &str, _ctx: &mut InterceptorContext) -> anyhow::Result<()> {
            panic!("before panicked")
        }

        fn error(
            &self,
            _sql: &str,
            _failure: &BadgerError,
            _ctx: &mut InterceptorContext,
        ) -> anyhow::Result<()> {
            panic!("error panicked")
        }
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_mask_outcome() {
        let recorder = Arc::new(Recorder::default());
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(Panicking));
        chain.push(recorder.clone());

        let value = chain.around("SELECT 1", async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);

        let err = chain
            .around::<(), _>("DELETE", async { Err(BadgerError::execution("DELETE", "boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, BadgerError::Execution { .. }));

        // 패닉한 훅 뒤의 훅도 계속 호출됨
        assert_eq!(recorder.events.lock().len(), 4);
    }
}
