//! Badger 인스턴스
//!
//! 엔티티 단위 CRUD와 조건 문장 생성을 제공하는 진입점입니다.
//! 모든 연산은 메타데이터 → 라우팅 → 문장 생성 → 실행 순서로 진행되며,
//! 라우팅에 실패한 문장은 절대 실행 단계에 도달하지 않습니다.

use crate::service::db::core::builder::{count_placeholders, InsertMode, StatementBuilder};
use crate::service::db::core::config::QueryConfig;
use crate::service::db::core::connection::Endpoint;
use crate::service::db::core::datasource::{
    DataSourceFactory, DataSourceRegistry, SingleDataSourceFactory,
};
use crate::service::db::core::executor::{map_row, map_rows, read_count, StatementExecutor};
use crate::service::db::core::interceptor::{InterceptorChain, SqlInterceptor};
use crate::service::db::core::metadata::{Entity, EntityDescriptor, MetadataResolver};
use crate::service::db::core::router::{RouteContext, ShardRouter};
use crate::service::db::core::transaction::SessionSet;
use crate::service::db::core::types::{OperationKind, Page, RouteTarget, SqlValue};
use crate::service::db::scope::Transaction;
use crate::service::db::statement::{
    DeleteStatement, Query, SqlQuery, UpdateSqlStatement, UpdateStatement,
};
use crate::tool::error::BadgerResult;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Badger 생성 빌더
#[derive(Default)]
pub struct BadgerBuilder {
    factories: Vec<Arc<dyn DataSourceFactory>>,
    interceptors: InterceptorChain,
    config: QueryConfig,
}

impl BadgerBuilder {
    pub fn data_source_factory(mut self, factory: Arc<dyn DataSourceFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// 단일 데이터베이스를 기본 이름("default")으로 등록
    pub fn data_source(self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.data_source_factory(Arc::new(SingleDataSourceFactory::new(endpoint)))
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn SqlInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn query_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Badger {
        let registry = Arc::new(DataSourceRegistry::new());
        for factory in self.factories {
            registry.register(factory);
        }

        Badger {
            metadata: MetadataResolver::new(),
            router: ShardRouter::new(),
            builder: StatementBuilder::new(),
            executor: StatementExecutor::new(registry, self.interceptors, self.config),
        }
    }
}

/// Long-lived, shareable data access instance.
pub struct Badger {
    metadata: MetadataResolver,
    router: ShardRouter,
    builder: StatementBuilder,
    executor: StatementExecutor,
}

impl Badger {
    pub fn builder() -> BadgerBuilder {
        BadgerBuilder::default()
    }

    pub fn new(factory: Arc<dyn DataSourceFactory>) -> Self {
        Self::builder().data_source_factory(factory).build()
    }

    pub fn with_data_source(endpoint: Arc<dyn Endpoint>) -> Self {
        Self::builder().data_source(endpoint).build()
    }

    pub fn with_factories(factories: Vec<Arc<dyn DataSourceFactory>>) -> Self {
        factories
            .into_iter()
            .fold(Self::builder(), |builder, factory| builder.data_source_factory(factory))
            .build()
    }

    /// 데이터소스 레지스트리 (등록/교체/조회)
    pub fn data_sources(&self) -> &DataSourceRegistry {
        self.executor.registry()
    }

    pub fn register_data_source_factory(&self, factory: Arc<dyn DataSourceFactory>) {
        self.data_sources().register(factory);
    }

    pub fn master_endpoint(&self, name: &str) -> BadgerResult<Arc<dyn Endpoint>> {
        self.data_sources().master_endpoint(name)
    }

    pub fn slave_endpoint(&self, name: &str) -> BadgerResult<Arc<dyn Endpoint>> {
        self.data_sources().slave_endpoint(name)
    }

    pub fn describe<E: Entity>(&self) -> BadgerResult<Arc<EntityDescriptor<E>>> {
        self.metadata.resolve::<E>()
    }

    // ---------------------------------------------------------------------
    // 저장
    // ---------------------------------------------------------------------

    /// 모든 컬럼 저장. 자동 생성 키는 성공 시 엔티티에 채워집니다.
    pub async fn save<E: Entity>(&self, entity: &mut E) -> BadgerResult<u64> {
        self.insert(entity, InsertMode::default(), None).await
    }

    /// 모든 컬럼 저장, 유니크 인덱스 충돌 무시
    pub async fn save_ignore<E: Entity>(&self, entity: &mut E) -> BadgerResult<u64> {
        let mode = InsertMode { ignore_conflict: true, ..InsertMode::default() };
        self.insert(entity, mode, None).await
    }

    /// NULL이 아닌 컬럼만 저장
    pub async fn save_not_null<E: Entity>(&self, entity: &mut E) -> BadgerResult<u64> {
        let mode = InsertMode { not_null_only: true, ..InsertMode::default() };
        self.insert(entity, mode, None).await
    }

    /// NULL이 아닌 컬럼만 저장, 유니크 인덱스 충돌 무시
    pub async fn save_not_null_ignore<E: Entity>(&self, entity: &mut E) -> BadgerResult<u64> {
        let mode = InsertMode { not_null_only: true, ignore_conflict: true };
        self.insert(entity, mode, None).await
    }

    // ---------------------------------------------------------------------
    // 삭제 / 수정
    // ---------------------------------------------------------------------

    /// 기본 키로 삭제. 샤드 키가 기본 키와 다른 엔티티는 매핑 오류입니다.
    pub async fn delete<E: Entity>(&self, id: impl Into<SqlValue>) -> BadgerResult<u64> {
        self.delete_by_id::<E>(id.into(), None).await
    }

    pub fn create_delete_statement<E: Entity>(&self, condition: impl Into<String>) -> DeleteStatement<'_, E> {
        DeleteStatement::new(self, condition.into())
    }

    /// 기본 키를 제외한 모든 컬럼 수정
    pub async fn update<E: Entity>(&self, entity: &E) -> BadgerResult<u64> {
        self.update_entity(entity, None).await
    }

    pub fn create_update_statement<E: Entity>(
        &self,
        assignment: impl Into<String>,
        condition: impl Into<String>,
    ) -> UpdateStatement<'_, E> {
        UpdateStatement::new(self, assignment.into(), condition.into())
    }

    /// 사용자 정의 SQL. 샤딩 정합성은 호출자 책임입니다.
    pub fn create_update_sql_statement(&self, sql: impl Into<String>) -> UpdateSqlStatement<'_> {
        UpdateSqlStatement::new(self, sql.into())
    }

    // ---------------------------------------------------------------------
    // 조회
    // ---------------------------------------------------------------------

    /// 기본 키로 조회. 없으면 `Ok(None)`.
    pub async fn get<E: Entity>(&self, id: impl Into<SqlValue>) -> BadgerResult<Option<E>> {
        self.get_by_id(id.into(), false, None).await
    }

    /// 기본 키로 조회하되 master 강제 여부를 지정
    pub async fn get_with_master<E: Entity>(
        &self,
        id: impl Into<SqlValue>,
        use_master: bool,
    ) -> BadgerResult<Option<E>> {
        self.get_by_id(id.into(), use_master, None).await
    }

    /// 조건으로 매핑된 모든 컬럼 조회
    pub fn create_query<E: Entity>(&self, condition: impl Into<String>) -> Query<'_, E> {
        Query::new(self, None, condition.into())
    }

    /// 조건으로 지정한 컬럼만 조회
    pub fn create_query_with_columns<E: Entity>(
        &self,
        columns: impl Into<String>,
        condition: impl Into<String>,
    ) -> Query<'_, E> {
        Query::new(self, Some(columns.into()), condition.into())
    }

    /// 사용자 정의 조회. 샤딩 정합성은 호출자 책임입니다.
    pub fn create_sql_query<E: Entity>(&self, sql: impl Into<String>) -> SqlQuery<'_, E> {
        SqlQuery::new(self, sql.into())
    }

    /// 트랜잭션 범위 시작
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    // ---------------------------------------------------------------------
    // 내부 연산 (트랜잭션 공용)
    // ---------------------------------------------------------------------

    pub(crate) async fn insert<E: Entity>(
        &self,
        entity: &mut E,
        mode: InsertMode,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let desc = self.metadata.resolve::<E>()?;
        let shard_value = desc.shard_value(entity).unwrap_or(SqlValue::Null);
        let target = self
            .router
            .route(desc.meta(), RouteContext::Entity(&shard_value), OperationKind::Write)?;
        let stmt = self.builder.insert(&desc, &target, entity, mode)?;

        let outcome = self.executor.execute(&target, &stmt, tx).await?;

        let pk = desc.primary_key();
        if desc.is_generated_key() && outcome.affected_rows > 0 && pk.get(entity).is_null() {
            if let Some(id) = outcome.last_insert_id {
                pk.set(entity, SqlValue::from(id))?;
                debug!("Back-filled generated key {}={} into {}", pk.name(), id, desc.meta().entity);
            }
        }

        Ok(outcome.affected_rows)
    }

    pub(crate) async fn update_entity<E: Entity>(
        &self,
        entity: &E,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let desc = self.metadata.resolve::<E>()?;
        let shard_value = desc.shard_value(entity).unwrap_or(SqlValue::Null);
        let target = self
            .router
            .route(desc.meta(), RouteContext::Entity(&shard_value), OperationKind::Write)?;
        let stmt = self.builder.update_entity(&desc, &target, entity)?;
        Ok(self.executor.execute(&target, &stmt, tx).await?.affected_rows)
    }

    pub(crate) async fn delete_by_id<E: Entity>(
        &self,
        id: SqlValue,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let desc = self.metadata.resolve::<E>()?;
        let target = self
            .router
            .route(desc.meta(), RouteContext::PrimaryKey(&id), OperationKind::Write)?;
        let stmt = self.builder.delete_by_id(&desc, &target, id)?;
        Ok(self.executor.execute(&target, &stmt, tx).await?.affected_rows)
    }

    pub(crate) async fn get_by_id<E: Entity>(
        &self,
        id: SqlValue,
        use_master: bool,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<Option<E>> {
        let desc = self.metadata.resolve::<E>()?;
        let target = self.router.route(
            desc.meta(),
            RouteContext::PrimaryKey(&id),
            OperationKind::Read { use_master },
        )?;
        let stmt = self.builder.select_by_id(&desc, &target, id)?;
        let rows = self.executor.fetch(&target, &stmt, tx).await?;

        let pk = desc.primary_key().name();
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let found = row
            .iter()
            .any(|(name, value)| name.eq_ignore_ascii_case(pk) && !value.is_null());
        if !found {
            return Ok(None);
        }
        map_row(&desc, row).map(Some)
    }

    pub(crate) async fn delete_by_condition<E: Entity>(
        &self,
        condition: &str,
        params: &[SqlValue],
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let desc = self.metadata.resolve::<E>()?;
        let target = self.router.route(
            desc.meta(),
            RouteContext::Condition { fragment: condition, params },
            OperationKind::Write,
        )?;
        let stmt = self.builder.delete_by_condition(&target, condition, params)?;
        Ok(self.executor.execute(&target, &stmt, tx).await?.affected_rows)
    }

    pub(crate) async fn update_by_condition<E: Entity>(
        &self,
        assignment: &str,
        condition: &str,
        params: &[SqlValue],
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let desc = self.metadata.resolve::<E>()?;
        let assignment_params = count_placeholders(assignment)?;
        let condition_params = params.get(assignment_params..).unwrap_or(&[]);
        let target = self.router.route(
            desc.meta(),
            RouteContext::Condition { fragment: condition, params: condition_params },
            OperationKind::Write,
        )?;
        let stmt = self
            .builder
            .update_by_condition(&target, assignment, condition, params)?;
        Ok(self.executor.execute(&target, &stmt, tx).await?.affected_rows)
    }

    pub(crate) async fn update_raw(
        &self,
        data_source: &str,
        sql: &str,
        params: &[SqlValue],
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let target = raw_target(data_source, true);
        let stmt = self.builder.raw(sql, params)?;
        Ok(self.executor.execute(&target, &stmt, tx).await?.affected_rows)
    }

    pub(crate) async fn list<E: Entity>(
        &self,
        spec: QuerySpec<'_>,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<Vec<E>> {
        let desc = self.metadata.resolve::<E>()?;
        let target = self.route_query(&desc, &spec)?;
        let stmt = self.builder.select(
            &desc,
            &target,
            spec.columns,
            spec.condition,
            spec.params,
            spec.page,
        )?;
        let rows = self.executor.fetch(&target, &stmt, tx).await?;
        map_rows(&desc, rows)
    }

    pub(crate) async fn count<E: Entity>(
        &self,
        spec: QuerySpec<'_>,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<u64> {
        let desc = self.metadata.resolve::<E>()?;
        let target = self.route_query(&desc, &spec)?;
        let stmt = self.builder.count(&target, spec.condition, spec.params)?;
        let rows = self.executor.fetch(&target, &stmt, tx).await?;
        read_count(&rows)
    }

    pub(crate) async fn list_raw<E: Entity>(
        &self,
        data_source: &str,
        sql: &str,
        params: &[SqlValue],
        use_master: bool,
        tx: Option<&mut SessionSet>,
    ) -> BadgerResult<Vec<E>> {
        let desc = self.metadata.resolve::<E>()?;
        let target = raw_target(data_source, use_master);
        let stmt = self.builder.raw(sql, params)?;
        let rows = self.executor.fetch(&target, &stmt, tx).await?;
        map_rows(&desc, rows)
    }

    fn route_query<E: Entity>(
        &self,
        desc: &EntityDescriptor<E>,
        spec: &QuerySpec<'_>,
    ) -> BadgerResult<RouteTarget> {
        self.router.route(
            desc.meta(),
            RouteContext::Condition { fragment: spec.condition, params: spec.params },
            OperationKind::Read { use_master: spec.use_master },
        )
    }
}

/// 조건 조회 한 번에 필요한 입력
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuerySpec<'a> {
    pub columns: Option<&'a str>,
    pub condition: &'a str,
    pub params: &'a [SqlValue],
    pub page: Option<Page>,
    pub use_master: bool,
}

fn raw_target(data_source: &str, use_master: bool) -> RouteTarget {
    RouteTarget {
        data_source: data_source.to_string(),
        table: String::new(),
        use_master,
    }
}

/// 애플리케이션이 소유하는 Badger 인스턴스 레지스트리
///
/// 인스턴스는 하나만 두는 것을 권장하며, 두 번째 등록부터 경고를 남깁니다.
#[derive(Default)]
pub struct BadgerRegistry {
    instances: RwLock<Vec<Arc<Badger>>>,
}

impl BadgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, badger: Badger) -> Arc<Badger> {
        let badger = Arc::new(badger);
        let mut instances = self.instances.write();
        if !instances.is_empty() {
            warn!("Find out more badger instances, it is recommended to use only one");
        }
        instances.push(badger.clone());
        badger
    }

    /// 등록된 인스턴스 스냅샷
    pub fn instances(&self) -> Vec<Arc<Badger>> {
        self.instances.read().clone()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}
