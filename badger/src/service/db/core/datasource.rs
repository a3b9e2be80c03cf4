//! 데이터소스 모듈
//!
//! 이름이 붙은 데이터소스 팩토리(master 1개 + slave 0개 이상)를 등록하고,
//! 연산 종류에 따라 사용할 엔드포인트를 고릅니다.
//! 쓰기와 master 강제 읽기는 항상 master, 일반 읽기는 slave가 있으면 slave입니다.

use crate::service::db::core::connection::Endpoint;
use crate::service::db::core::types::DEFAULT_DATA_SOURCE;
use crate::tool::error::{BadgerError, BadgerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Named provider of a master endpoint and optional replicas.
pub trait DataSourceFactory: Send + Sync {
    fn name(&self) -> &str;

    fn master(&self) -> Arc<dyn Endpoint>;

    /// 읽기용 slave. 없으면 None (선택기가 master로 대체).
    fn slave(&self) -> Option<Arc<dyn Endpoint>>;
}

/// 단일 데이터베이스 팩토리. master가 읽기도 처리합니다.
pub struct SingleDataSourceFactory {
    name: String,
    endpoint: Arc<dyn Endpoint>,
}

impl SingleDataSourceFactory {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self::named(DEFAULT_DATA_SOURCE, endpoint)
    }

    pub fn named(name: impl Into<String>, endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }
}

impl DataSourceFactory for SingleDataSourceFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn master(&self) -> Arc<dyn Endpoint> {
        self.endpoint.clone()
    }

    fn slave(&self) -> Option<Arc<dyn Endpoint>> {
        None
    }
}

/// master/slave 팩토리. slave는 라운드 로빈으로 고릅니다.
pub struct MasterSlaveDataSourceFactory {
    name: String,
    master: Arc<dyn Endpoint>,
    slaves: Vec<Arc<dyn Endpoint>>,
    cursor: AtomicUsize,
}

impl MasterSlaveDataSourceFactory {
    pub fn new(
        name: impl Into<String>,
        master: Arc<dyn Endpoint>,
        slaves: Vec<Arc<dyn Endpoint>>,
    ) -> Self {
        Self {
            name: name.into(),
            master,
            slaves,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn slave_count(&self) -> usize {
        self.slaves.len()
    }
}

impl DataSourceFactory for MasterSlaveDataSourceFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn master(&self) -> Arc<dyn Endpoint> {
        self.master.clone()
    }

    fn slave(&self) -> Option<Arc<dyn Endpoint>> {
        if self.slaves.is_empty() {
            return None;
        }
        let next = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(self.slaves[next % self.slaves.len()].clone())
    }
}

/// 데이터소스 레지스트리
///
/// 등록은 팩토리 단위로 통째로 교체되므로 조회 중인 호출자는
/// 이전 팩토리 또는 새 팩토리 중 하나만 보게 됩니다.
#[derive(Default)]
pub struct DataSourceRegistry {
    factories: RwLock<HashMap<String, Arc<dyn DataSourceFactory>>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 팩토리 등록. 같은 이름이 있으면 교체하고 이전 팩토리를 반환합니다.
    pub fn register(&self, factory: Arc<dyn DataSourceFactory>) -> Option<Arc<dyn DataSourceFactory>> {
        let name = factory.name().to_string();
        let previous = self.factories.write().insert(name.clone(), factory);
        if previous.is_some() {
            warn!("Data source '{}' was already registered and has been replaced", name);
        } else {
            info!("Registered data source '{}'", name);
        }
        previous
    }

    /// 전체 팩토리 집합을 한 번에 교체합니다 (데이터소스 갱신).
    pub fn replace_all(&self, factories: Vec<Arc<dyn DataSourceFactory>>) {
        let fresh: HashMap<_, _> = factories
            .into_iter()
            .map(|f| (f.name().to_string(), f))
            .collect();
        info!("Refreshing data sources: {} registered", fresh.len());
        *self.factories.write() = fresh;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn factory(&self, name: &str) -> BadgerResult<Arc<dyn DataSourceFactory>> {
        self.factories.read().get(name).cloned().ok_or_else(|| {
            BadgerError::configuration(format!("dataSource name:{name} is not registered"))
        })
    }

    pub fn master_endpoint(&self, name: &str) -> BadgerResult<Arc<dyn Endpoint>> {
        Ok(self.factory(name)?.master())
    }

    pub fn slave_endpoint(&self, name: &str) -> BadgerResult<Arc<dyn Endpoint>> {
        let factory = self.factory(name)?;
        Ok(factory.slave().unwrap_or_else(|| factory.master()))
    }

    /// 연산 종류에 맞는 엔드포인트 선택
    pub fn select(
        &self,
        name: &str,
        for_write: bool,
        explicit_master: bool,
    ) -> BadgerResult<Arc<dyn Endpoint>> {
        if for_write || explicit_master {
            self.master_endpoint(name)
        } else {
            self.slave_endpoint(name)
        }
    }
}
