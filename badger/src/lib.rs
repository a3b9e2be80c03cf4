//! # badger
//!
//! 샤딩을 지원하는 MySQL 데이터 액세스 미들웨어.
//!
//! 엔티티 매핑으로 SQL을 만들고, 샤드 키로 물리 테이블과 데이터소스를 고르고,
//! master/slave 엔드포인트에서 실행한 뒤 결과를 엔티티로 되돌립니다.

pub mod config;
pub mod logging;
pub mod service;
pub mod tool;

pub use serde_json;

pub use config::{DataSourceConfig, HostAddr};
pub use service::db::{
    Badger, BadgerBuilder, BadgerRegistry, ColumnMapping, DataSourceFactory, DataSourceRegistry,
    DeleteStatement, Endpoint, Entity, EntityDescriptor, EntityMapping, ExecOutcome,
    InterceptorContext, MasterSlaveDataSourceFactory, MySqlEndpoint, OperationKind, Query,
    QueryConfig, QueryRow, RouteTarget, Session, ShardSpec, SingleDataSourceFactory, SqlInterceptor,
    SqlQuery, SqlValue, Transaction, UpdateSqlStatement, UpdateStatement, DEFAULT_DATA_SOURCE,
};
pub use tool::error::{BadgerError, BadgerResult, ErrorSeverity};
