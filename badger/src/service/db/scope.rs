//! 트랜잭션 범위
//!
//! 범위 안의 연산은 데이터소스마다 하나의 master 세션을 공유합니다.
//! 라우팅/매핑 실패는 그 연산의 문장이 실행되기 전에 호출자에게 전달되며,
//! 호출자는 범위를 롤백하거나 버립니다 (drop = rollback).

use crate::service::db::badger::Badger;
use crate::service::db::core::builder::InsertMode;
use crate::service::db::core::metadata::Entity;
use crate::service::db::core::transaction::SessionSet;
use crate::service::db::core::types::SqlValue;
use crate::tool::error::BadgerResult;

/// Caller-controlled transaction scope.
pub struct Transaction<'b> {
    badger: &'b Badger,
    sessions: SessionSet,
}

impl<'b> Transaction<'b> {
    pub(crate) fn new(badger: &'b Badger) -> Self {
        Self {
            badger,
            sessions: SessionSet::new(),
        }
    }

    pub(crate) fn sessions(&mut self) -> &mut SessionSet {
        &mut self.sessions
    }

    pub fn badger(&self) -> &'b Badger {
        self.badger
    }

    /// 지금까지 고정된 데이터소스 세션 수
    pub fn pinned_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub async fn save<E: Entity>(&mut self, entity: &mut E) -> BadgerResult<u64> {
        self.badger
            .insert(entity, InsertMode::default(), Some(&mut self.sessions))
            .await
    }

    pub async fn save_ignore<E: Entity>(&mut self, entity: &mut E) -> BadgerResult<u64> {
        let mode = InsertMode { ignore_conflict: true, ..InsertMode::default() };
        self.badger.insert(entity, mode, Some(&mut self.sessions)).await
    }

    pub async fn save_not_null<E: Entity>(&mut self, entity: &mut E) -> BadgerResult<u64> {
        let mode = InsertMode { not_null_only: true, ..InsertMode::default() };
        self.badger.insert(entity, mode, Some(&mut self.sessions)).await
    }

    pub async fn save_not_null_ignore<E: Entity>(&mut self, entity: &mut E) -> BadgerResult<u64> {
        let mode = InsertMode { not_null_only: true, ignore_conflict: true };
        self.badger.insert(entity, mode, Some(&mut self.sessions)).await
    }

    pub async fn update<E: Entity>(&mut self, entity: &E) -> BadgerResult<u64> {
        self.badger.update_entity(entity, Some(&mut self.sessions)).await
    }

    pub async fn delete<E: Entity>(&mut self, id: impl Into<SqlValue>) -> BadgerResult<u64> {
        self.badger
            .delete_by_id::<E>(id.into(), Some(&mut self.sessions))
            .await
    }

    /// 범위 안의 조회는 항상 고정된 master 세션을 사용합니다.
    pub async fn get<E: Entity>(&mut self, id: impl Into<SqlValue>) -> BadgerResult<Option<E>> {
        self.badger
            .get_by_id(id.into(), true, Some(&mut self.sessions))
            .await
    }

    pub async fn commit(self) -> BadgerResult<()> {
        self.sessions.commit().await
    }

    pub async fn rollback(self) -> BadgerResult<()> {
        self.sessions.rollback().await
    }
}
