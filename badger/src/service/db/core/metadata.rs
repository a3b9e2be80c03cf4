//! 엔티티 메타데이터 모듈
//!
//! 엔티티 타입별 테이블, 컬럼 접근자, 기본 키, 샤드 규칙을 한 번만 계산해 캐시합니다.
//! 필드 접근은 컬럼 이름 → (getter, setter) 테이블로만 노출됩니다.

use crate::service::db::core::types::{SqlValue, DEFAULT_DATA_SOURCE};
use crate::tool::error::{BadgerError, BadgerResult};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// 컬럼 값 읽기 함수
pub type Getter<E> = fn(&E) -> SqlValue;

/// 컬럼 값 쓰기 함수
pub type Setter<E> = fn(&mut E, SqlValue) -> Result<(), serde_json::Error>;

/// 샤드 인덱스 → 물리 테이블 이름
pub type TableNaming = fn(&str, u32) -> String;

/// 샤드 인덱스 → 데이터소스 이름
pub type DataSourceNaming = fn(u32) -> String;

/// Entities persisted through Badger.
///
/// The mapping is evaluated once per type by [`MetadataResolver`].
pub trait Entity: Default + Send + Sync + 'static {
    fn mapping() -> EntityMapping<Self>;
}

/// Declares a column backed by a struct field, using serde for the value conversion.
///
/// ```ignore
/// column!(Driver, driver_name)              // column "driver_name"
/// column!(Driver, kind, "type")             // column "type"
/// ```
#[macro_export]
macro_rules! column {
    ($entity:ty, $field:ident) => {
        $crate::column!($entity, $field, stringify!($field))
    };
    ($entity:ty, $field:ident, $name:expr) => {
        $crate::ColumnMapping::<$entity>::new(
            $name,
            |e: &$entity| {
                $crate::serde_json::to_value(&e.$field).unwrap_or($crate::serde_json::Value::Null)
            },
            |e: &mut $entity, v: $crate::serde_json::Value| {
                e.$field = $crate::serde_json::from_value(v)?;
                Ok(())
            },
        )
    };
}

/// 컬럼 매핑 (컬럼 이름, 접근자, nullable)
pub struct ColumnMapping<E> {
    name: String,
    getter: Getter<E>,
    setter: Setter<E>,
    nullable: bool,
}

impl<E> ColumnMapping<E> {
    pub fn new(name: impl Into<String>, getter: Getter<E>, setter: Setter<E>) -> Self {
        Self {
            name: name.into(),
            getter,
            setter,
            nullable: true,
        }
    }

    /// NULL 값 저장을 허용하지 않는 컬럼으로 표시
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn get(&self, entity: &E) -> SqlValue {
        (self.getter)(entity)
    }

    pub fn set(&self, entity: &mut E, value: SqlValue) -> BadgerResult<()> {
        (self.setter)(entity, value)
            .map_err(|e| BadgerError::mapping(format!("column '{}': {}", self.name, e)))
    }
}

impl<E> std::fmt::Debug for ColumnMapping<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnMapping")
            .field("name", &self.name)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// 샤딩 규칙
#[derive(Clone)]
pub struct ShardSpec {
    column: String,
    shard_count: u32,
    table_naming: TableNaming,
    data_source_naming: Option<DataSourceNaming>,
}

fn suffixed_table(table: &str, index: u32) -> String {
    format!("{table}_{index}")
}

impl ShardSpec {
    pub fn new(column: impl Into<String>, shard_count: u32) -> Self {
        Self {
            column: column.into(),
            shard_count,
            table_naming: suffixed_table,
            data_source_naming: None,
        }
    }

    pub fn table_naming(mut self, naming: TableNaming) -> Self {
        self.table_naming = naming;
        self
    }

    pub fn data_source_naming(mut self, naming: DataSourceNaming) -> Self {
        self.data_source_naming = Some(naming);
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn table_name(&self, table: &str, index: u32) -> String {
        (self.table_naming)(table, index)
    }

    pub fn data_source_name(&self, index: u32) -> Option<String> {
        self.data_source_naming.map(|naming| naming(index))
    }
}

impl std::fmt::Debug for ShardSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSpec")
            .field("column", &self.column)
            .field("shard_count", &self.shard_count)
            .field("routes_data_source", &self.data_source_naming.is_some())
            .finish()
    }
}

/// Non-generic part of a descriptor: everything the router needs.
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub entity: &'static str,
    pub table: String,
    pub data_source: String,
    pub primary_key: String,
    pub shard: Option<ShardSpec>,
}

impl TableMeta {
    /// N == 1 이면 샤딩되지 않은 엔티티로 취급
    pub fn effective_shard(&self) -> Option<&ShardSpec> {
        self.shard.as_ref().filter(|s| s.shard_count > 1)
    }
}

/// 엔티티 매핑 선언 (빌더)
pub struct EntityMapping<E> {
    table: String,
    data_source: String,
    columns: Vec<ColumnMapping<E>>,
    primary_key: Option<String>,
    generated_key: bool,
    shard: Option<ShardSpec>,
}

impl<E> EntityMapping<E> {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            columns: Vec::new(),
            primary_key: None,
            generated_key: false,
            shard: None,
        }
    }

    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = name.into();
        self
    }

    pub fn column(mut self, column: ColumnMapping<E>) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// 기본 키가 DB에서 자동 생성됨 (auto increment)
    pub fn generated_key(mut self) -> Self {
        self.generated_key = true;
        self
    }

    pub fn shard(mut self, spec: ShardSpec) -> Self {
        self.shard = Some(spec);
        self
    }
}

/// Immutable, cached description of one entity type.
pub struct EntityDescriptor<E> {
    meta: TableMeta,
    columns: Vec<ColumnMapping<E>>,
    primary_key: usize,
    generated_key: bool,
}

impl<E: 'static> EntityDescriptor<E> {
    /// 매핑 선언을 검증하여 디스크립터를 만듭니다.
    pub fn build(mapping: EntityMapping<E>) -> BadgerResult<Self> {
        let entity = std::any::type_name::<E>();

        if mapping.columns.is_empty() {
            return Err(BadgerError::mapping(format!("{entity} declares no columns")));
        }

        let mut seen = HashSet::new();
        for column in &mapping.columns {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(BadgerError::mapping(format!(
                    "{entity} maps column '{}' more than once",
                    column.name
                )));
            }
        }

        let pk_name = mapping
            .primary_key
            .ok_or_else(|| BadgerError::mapping(format!("{entity} has no primary key column")))?;
        let primary_key = mapping
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(&pk_name))
            .ok_or_else(|| {
                BadgerError::mapping(format!(
                    "{entity} primary key '{pk_name}' is not a mapped column"
                ))
            })?;

        if let Some(shard) = &mapping.shard {
            if shard.shard_count == 0 {
                return Err(BadgerError::mapping(format!(
                    "{entity} shard count must be at least 1"
                )));
            }
            if !mapping
                .columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&shard.column))
            {
                return Err(BadgerError::mapping(format!(
                    "{entity} shard column '{}' is not a mapped column",
                    shard.column
                )));
            }
        }

        let meta = TableMeta {
            entity,
            table: mapping.table,
            data_source: mapping.data_source,
            primary_key: mapping.columns[primary_key].name.clone(),
            shard: mapping.shard,
        };

        Ok(Self {
            meta,
            columns: mapping.columns,
            primary_key,
            generated_key: mapping.generated_key,
        })
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn table(&self) -> &str {
        &self.meta.table
    }

    pub fn columns(&self) -> &[ColumnMapping<E>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMapping<E>> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> &ColumnMapping<E> {
        &self.columns[self.primary_key]
    }

    pub fn is_generated_key(&self) -> bool {
        self.generated_key
    }

    /// 엔티티 인스턴스에서 샤드 키 값을 읽습니다. 샤딩되지 않은 경우 None.
    pub fn shard_value(&self, entity: &E) -> Option<SqlValue> {
        let shard = self.meta.effective_shard()?;
        self.column(shard.column()).map(|c| c.get(entity))
    }

    /// 모든 매핑 컬럼을 쉼표로 이어 붙인 SELECT 목록
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 엔티티 타입별 디스크립터 캐시
///
/// 동시에 처음 조회되더라도 한 개의 디스크립터로 수렴합니다.
#[derive(Default)]
pub struct MetadataResolver {
    cache: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl MetadataResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<E: Entity>(&self) -> BadgerResult<Arc<EntityDescriptor<E>>> {
        let type_id = TypeId::of::<E>();

        if let Some(cached) = self.cache.get(&type_id) {
            return downcast::<E>(cached.value().clone());
        }

        let built: Arc<dyn Any + Send + Sync> = Arc::new(EntityDescriptor::build(E::mapping())?);
        let winner = self
            .cache
            .entry(type_id)
            .or_insert_with(|| {
                debug!("Resolved entity metadata for {}", std::any::type_name::<E>());
                built
            })
            .value()
            .clone();

        downcast::<E>(winner)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn downcast<E: Entity>(value: Arc<dyn Any + Send + Sync>) -> BadgerResult<Arc<EntityDescriptor<E>>> {
    value.downcast::<EntityDescriptor<E>>().map_err(|_| {
        BadgerError::mapping(format!(
            "cached metadata for {} has an unexpected type",
            std::any::type_name::<E>()
        ))
    })
}
