pub mod db;

pub use db::{DataSourceConfig, HostAddr};
