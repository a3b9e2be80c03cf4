//! 데이터베이스 서비스 모듈
//!
//! 샤딩과 master/slave 복제를 고려한 엔티티 CRUD 엔진입니다.

pub mod badger;
pub mod core;
pub mod scope;
pub mod statement;

pub use badger::{Badger, BadgerBuilder, BadgerRegistry};
pub use scope::Transaction;
pub use statement::{DeleteStatement, Query, SqlQuery, UpdateSqlStatement, UpdateStatement};

pub use self::core::{
    // 설정
    config::QueryConfig,
    // 연결 계층
    connection::{Endpoint, MySqlEndpoint, Session},
    // 데이터소스
    datasource::{
        DataSourceFactory, DataSourceRegistry, MasterSlaveDataSourceFactory,
        SingleDataSourceFactory,
    },
    // 인터셉터
    interceptor::{InterceptorContext, SqlInterceptor},
    // 메타데이터
    metadata::{ColumnMapping, Entity, EntityDescriptor, EntityMapping, ShardSpec},
    // 데이터 타입들
    types::{ExecOutcome, OperationKind, QueryRow, RouteTarget, SqlValue, DEFAULT_DATA_SOURCE},
};
