//! Core engine modules
//!
//! Metadata → routing → data source selection → statement building → execution

pub mod builder;
pub mod config;
pub mod connection;
pub mod datasource;
pub mod executor;
pub mod interceptor;
pub mod metadata;
pub mod router;
pub mod transaction;
pub mod types;

pub use builder::{InsertMode, StatementBuilder};
pub use config::QueryConfig;
pub use connection::{Endpoint, MySqlEndpoint, Session};
pub use datasource::{
    DataSourceFactory, DataSourceRegistry, MasterSlaveDataSourceFactory, SingleDataSourceFactory,
};
pub use executor::StatementExecutor;
pub use interceptor::{InterceptorChain, InterceptorContext, SqlInterceptor};
pub use metadata::{ColumnMapping, Entity, EntityDescriptor, EntityMapping, MetadataResolver, ShardSpec};
pub use router::{RouteContext, ShardRouter};
pub use types::*;
