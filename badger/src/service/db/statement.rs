//! 호출자가 파라미터를 채워 실행하는 문장들
//!
//! 파라미터는 `add_param` 호출 순서 그대로 `?` 위치에 대응합니다.
//! 쓰기 문장은 `execute(self)`로 소비되므로 실행 후 다시 실행할 수 없습니다.

use crate::service::db::badger::{Badger, QuerySpec};
use crate::service::db::core::metadata::Entity;
use crate::service::db::core::types::{Page, SqlValue, DEFAULT_DATA_SOURCE};
use crate::service::db::scope::Transaction;
use crate::tool::error::BadgerResult;
use std::marker::PhantomData;

/// 조건 기반 삭제
pub struct DeleteStatement<'b, E> {
    badger: &'b Badger,
    condition: String,
    params: Vec<SqlValue>,
    _entity: PhantomData<fn() -> E>,
}

impl<'b, E: Entity> DeleteStatement<'b, E> {
    pub(crate) fn new(badger: &'b Badger, condition: String) -> Self {
        Self {
            badger,
            condition,
            params: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn add_param(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        self
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub async fn execute(self) -> BadgerResult<u64> {
        self.badger
            .delete_by_condition::<E>(&self.condition, &self.params, None)
            .await
    }

    pub async fn execute_in(self, tx: &mut Transaction<'_>) -> BadgerResult<u64> {
        self.badger
            .delete_by_condition::<E>(&self.condition, &self.params, Some(tx.sessions()))
            .await
    }
}

/// 조건 기반 수정. SET 조각의 파라미터를 먼저, 조건의 파라미터를 뒤에 추가합니다.
pub struct UpdateStatement<'b, E> {
    badger: &'b Badger,
    assignment: String,
    condition: String,
    params: Vec<SqlValue>,
    _entity: PhantomData<fn() -> E>,
}

impl<'b, E: Entity> UpdateStatement<'b, E> {
    pub(crate) fn new(badger: &'b Badger, assignment: String, condition: String) -> Self {
        Self {
            badger,
            assignment,
            condition,
            params: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn add_param(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        self
    }

    pub async fn execute(self) -> BadgerResult<u64> {
        self.badger
            .update_by_condition::<E>(&self.assignment, &self.condition, &self.params, None)
            .await
    }

    pub async fn execute_in(self, tx: &mut Transaction<'_>) -> BadgerResult<u64> {
        self.badger
            .update_by_condition::<E>(
                &self.assignment,
                &self.condition,
                &self.params,
                Some(tx.sessions()),
            )
            .await
    }
}

/// 사용자 정의 쓰기 SQL (라우팅 없음)
pub struct UpdateSqlStatement<'b> {
    badger: &'b Badger,
    sql: String,
    data_source: String,
    params: Vec<SqlValue>,
}

impl<'b> UpdateSqlStatement<'b> {
    pub(crate) fn new(badger: &'b Badger, sql: String) -> Self {
        Self {
            badger,
            sql,
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            params: Vec::new(),
        }
    }

    pub fn data_source(&mut self, name: impl Into<String>) -> &mut Self {
        self.data_source = name.into();
        self
    }

    pub fn add_param(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        self
    }

    pub async fn execute(self) -> BadgerResult<u64> {
        self.badger
            .update_raw(&self.data_source, &self.sql, &self.params, None)
            .await
    }

    pub async fn execute_in(self, tx: &mut Transaction<'_>) -> BadgerResult<u64> {
        self.badger
            .update_raw(&self.data_source, &self.sql, &self.params, Some(tx.sessions()))
            .await
    }
}

/// 조건 조회
///
/// `list`/`count`는 호출 시점의 파라미터로 매번 새 문장을 만듭니다.
pub struct Query<'b, E> {
    badger: &'b Badger,
    columns: Option<String>,
    condition: String,
    params: Vec<SqlValue>,
    page_index: u64,
    page_size: Option<u64>,
    use_master: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<'b, E: Entity> Query<'b, E> {
    pub(crate) fn new(badger: &'b Badger, columns: Option<String>, condition: String) -> Self {
        Self {
            badger,
            columns,
            condition,
            params: Vec::new(),
            page_index: 0,
            page_size: None,
            use_master: false,
            _entity: PhantomData,
        }
    }

    pub fn add_param(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        self
    }

    pub fn set_page_index(&mut self, page_index: u64) -> &mut Self {
        self.page_index = page_index;
        self
    }

    /// 0이면 페이지 범위를 적용하지 않습니다.
    pub fn set_page_size(&mut self, page_size: u64) -> &mut Self {
        self.page_size = Some(page_size).filter(|size| *size > 0);
        self
    }

    pub fn use_master(&mut self, use_master: bool) -> &mut Self {
        self.use_master = use_master;
        self
    }

    fn spec(&self, paged: bool) -> QuerySpec<'_> {
        QuerySpec {
            columns: self.columns.as_deref(),
            condition: &self.condition,
            params: &self.params,
            page: self
                .page_size
                .filter(|_| paged)
                .map(|size| Page { index: self.page_index, size }),
            use_master: self.use_master,
        }
    }

    pub async fn list(&self) -> BadgerResult<Vec<E>> {
        self.badger.list::<E>(self.spec(true), None).await
    }

    pub async fn list_in(&self, tx: &mut Transaction<'_>) -> BadgerResult<Vec<E>> {
        self.badger.list::<E>(self.spec(true), Some(tx.sessions())).await
    }

    /// 첫 번째 행 (페이지 설정과 무관하게 한 건만 가져옴)
    pub async fn first(&self) -> BadgerResult<Option<E>> {
        let mut spec = self.spec(false);
        spec.page = Some(Page { index: 0, size: 1 });
        Ok(self.badger.list::<E>(spec, None).await?.into_iter().next())
    }

    pub async fn first_in(&self, tx: &mut Transaction<'_>) -> BadgerResult<Option<E>> {
        let mut spec = self.spec(false);
        spec.page = Some(Page { index: 0, size: 1 });
        Ok(self.badger.list::<E>(spec, Some(tx.sessions())).await?.into_iter().next())
    }

    /// 같은 조건의 전체 행 수 (페이지 범위 미적용)
    pub async fn count(&self) -> BadgerResult<u64> {
        self.badger.count::<E>(self.spec(false), None).await
    }

    pub async fn count_in(&self, tx: &mut Transaction<'_>) -> BadgerResult<u64> {
        self.badger.count::<E>(self.spec(false), Some(tx.sessions())).await
    }
}

/// 사용자 정의 조회 SQL (라우팅 없음)
pub struct SqlQuery<'b, E> {
    badger: &'b Badger,
    sql: String,
    data_source: String,
    params: Vec<SqlValue>,
    use_master: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<'b, E: Entity> SqlQuery<'b, E> {
    pub(crate) fn new(badger: &'b Badger, sql: String) -> Self {
        Self {
            badger,
            sql,
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            params: Vec::new(),
            use_master: false,
            _entity: PhantomData,
        }
    }

    pub fn data_source(&mut self, name: impl Into<String>) -> &mut Self {
        self.data_source = name.into();
        self
    }

    pub fn add_param(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        self
    }

    pub fn use_master(&mut self, use_master: bool) -> &mut Self {
        self.use_master = use_master;
        self
    }

    pub async fn list(&self) -> BadgerResult<Vec<E>> {
        self.badger
            .list_raw::<E>(&self.data_source, &self.sql, &self.params, self.use_master, None)
            .await
    }

    pub async fn list_in(&self, tx: &mut Transaction<'_>) -> BadgerResult<Vec<E>> {
        self.badger
            .list_raw::<E>(
                &self.data_source,
                &self.sql,
                &self.params,
                true,
                Some(tx.sessions()),
            )
            .await
    }

    pub async fn first(&self) -> BadgerResult<Option<E>> {
        Ok(self.list().await?.into_iter().next())
    }

    pub async fn first_in(&self, tx: &mut Transaction<'_>) -> BadgerResult<Option<E>> {
        Ok(self.list_in(tx).await?.into_iter().next())
    }
}
