//! Transaction management module
//!
//! A transaction scope pins one master session per data source for its whole
//! lifetime. Sessions are begun lazily on first use.

use crate::service::db::core::connection::Session;
use crate::service::db::core::datasource::DataSourceRegistry;
use crate::tool::error::{BadgerError, BadgerResult};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// 데이터소스 이름별로 고정된 master 세션 묶음
#[derive(Default)]
pub struct SessionSet {
    sessions: HashMap<String, Box<dyn Session>>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터소스의 세션을 가져오고, 없으면 master에서 새로 시작합니다.
    pub async fn acquire(
        &mut self,
        registry: &DataSourceRegistry,
        data_source: &str,
    ) -> BadgerResult<&mut Box<dyn Session>> {
        if !self.sessions.contains_key(data_source) {
            let master = registry.master_endpoint(data_source)?;
            let session = master.begin().await?;
            debug!("Pinned master {} for data source '{}'", master.id(), data_source);
            self.sessions.insert(data_source.to_string(), session);
        }

        self.sessions.get_mut(data_source).ok_or_else(|| {
            BadgerError::Transaction(format!("no session for data source '{data_source}'"))
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 모든 세션 커밋. 하나라도 실패하면 남은 세션은 롤백합니다.
    pub async fn commit(self) -> BadgerResult<()> {
        let mut pending = self.sessions.into_iter();

        while let Some((name, session)) = pending.next() {
            if let Err(e) = session.commit().await {
                error!("Commit failed on data source '{}': {}", name, e);
                for (rest, session) in pending.by_ref() {
                    if let Err(rollback_err) = session.rollback().await {
                        warn!("Rollback after failed commit on '{}' failed: {}", rest, rollback_err);
                    }
                }
                return Err(e);
            }
        }

        info!("Transaction committed successfully");
        Ok(())
    }

    /// 모든 세션 롤백. 첫 번째 실패를 반환합니다.
    pub async fn rollback(self) -> BadgerResult<()> {
        let mut first_failure = None;

        for (name, session) in self.sessions {
            if let Err(e) = session.rollback().await {
                error!("Rollback failed on data source '{}': {}", name, e);
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => {
                warn!("Transaction rolled back");
                Ok(())
            }
        }
    }
}
