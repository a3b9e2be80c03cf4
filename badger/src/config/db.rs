//! MySQL Data Source Configuration
//!
//! .env 파일과 환경 변수에서 데이터소스(master + slave) 연결 정보를 읽어
//! 연결 풀과 데이터소스 팩토리를 만듭니다.
//!
//! 기본 데이터소스는 `db_host` 형태, 이름이 있는 데이터소스는
//! `{name}_db_host` 형태의 키를 사용합니다.

use crate::service::db::core::config::QueryConfig;
use crate::service::db::core::connection::{Endpoint, MySqlEndpoint};
use crate::service::db::core::datasource::MasterSlaveDataSourceFactory;
use crate::service::db::core::types::DEFAULT_DATA_SOURCE;
use crate::tool::error::{map_sqlx_error, BadgerError, BadgerResult};
use sqlx::mysql::MySqlPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 하나의 MySQL 호스트 주소
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

/// 데이터소스 연결 설정
#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    pub name: String,
    pub master: HostAddr,
    pub slaves: Vec<HostAddr>,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DataSourceConfig {
    /// .env 파일을 로드한 뒤 환경 변수에서 설정을 읽습니다.
    ///
    /// # Arguments
    /// * `name` - 데이터소스 이름. `"default"`이면 접두사 없이 읽습니다.
    pub fn from_env(name: &str) -> BadgerResult<Self> {
        if dotenv::dotenv().is_err() {
            warn!(".env 파일을 찾을 수 없어서 환경 변수를 직접 사용합니다.");
        }
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(name, &vars)
    }

    /// 주어진 변수 맵에서 설정을 읽습니다.
    pub fn from_vars(name: &str, vars: &HashMap<String, String>) -> BadgerResult<Self> {
        let key = |suffix: &str| {
            if name == DEFAULT_DATA_SOURCE {
                suffix.to_string()
            } else {
                format!("{name}_{suffix}")
            }
        };
        let lookup = |suffix: &str| vars.get(&key(suffix)).cloned();

        let host = lookup("db_host").unwrap_or_else(|| {
            warn!("{} 환경변수가 없어서 localhost를 사용합니다.", key("db_host"));
            "localhost".to_string()
        });
        let port = match lookup("db_port") {
            Some(raw) => parse_number::<u16>(&key("db_port"), &raw)?,
            None => 3306,
        };
        let user = lookup("db_id").unwrap_or_else(|| "root".to_string());
        let password = lookup("db_password").unwrap_or_default();
        let database = lookup("db_name").ok_or_else(|| {
            BadgerError::configuration(format!("{} 환경변수가 필요합니다.", key("db_name")))
        })?;
        let max_connections = match lookup("db_max_connections") {
            Some(raw) => parse_number::<u32>(&key("db_max_connections"), &raw)?,
            None => 10,
        };
        let acquire_timeout = match lookup("db_acquire_timeout_ms") {
            Some(raw) => Duration::from_millis(parse_number::<u64>(
                &key("db_acquire_timeout_ms"),
                &raw,
            )?),
            None => Duration::from_secs(10),
        };
        let slaves = match lookup("db_slave_hosts") {
            Some(raw) => parse_hosts(&key("db_slave_hosts"), &raw, port)?,
            None => Vec::new(),
        };

        Ok(Self {
            name: name.to_string(),
            master: HostAddr { host, port },
            slaves,
            user,
            password,
            database,
            max_connections,
            acquire_timeout,
        })
    }

    fn url(&self, addr: &HostAddr) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, addr.host, addr.port, self.database
        )
    }

    async fn connect_endpoint(
        &self,
        role: &str,
        addr: &HostAddr,
        query_config: &QueryConfig,
    ) -> BadgerResult<Arc<dyn Endpoint>> {
        info!(
            "데이터베이스 연결 시도 [{}/{}]: {}:{}@{}:{}/{}",
            self.name, role, self.user, "***", addr.host, addr.port, self.database
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url(addr))
            .await
            .map_err(|e| map_sqlx_error(e, "CONNECT"))?;

        let id = format!("{}/{}@{}:{}", self.name, role, addr.host, addr.port);
        Ok(Arc::new(MySqlEndpoint::new(id, pool, query_config)))
    }

    /// master와 slave 연결 풀을 만들고 데이터소스 팩토리로 묶습니다.
    pub async fn connect(
        &self,
        query_config: &QueryConfig,
    ) -> BadgerResult<MasterSlaveDataSourceFactory> {
        let master = self
            .connect_endpoint("master", &self.master, query_config)
            .await?;

        let mut slaves = Vec::with_capacity(self.slaves.len());
        for (index, addr) in self.slaves.iter().enumerate() {
            let role = format!("slave-{index}");
            slaves.push(self.connect_endpoint(&role, addr, query_config).await?);
        }

        info!(
            "데이터소스 '{}' 준비 완료: master 1, slave {}",
            self.name,
            slaves.len()
        );
        Ok(MasterSlaveDataSourceFactory::new(
            self.name.clone(),
            master,
            slaves,
        ))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> BadgerResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| BadgerError::configuration(format!("{key}는 숫자여야 합니다: {raw}")))
}

/// `host[:port]` 목록 (쉼표 구분)
fn parse_hosts(key: &str, raw: &str, default_port: u16) -> BadgerResult<Vec<HostAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((host, port)) => Ok(HostAddr {
                host: host.to_string(),
                port: parse_number::<u16>(key, port)?,
            }),
            None => Ok(HostAddr {
                host: entry.to_string(),
                port: default_port,
            }),
        })
        .collect()
}
