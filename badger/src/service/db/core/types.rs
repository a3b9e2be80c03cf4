//! Common type definitions for the engine
//!
//! Shared types used across metadata, routing, building and execution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bound parameter / result cell value
pub type SqlValue = serde_json::Value;

/// Query result row type - column name to value
pub type QueryRow = HashMap<String, SqlValue>;

/// 데이터소스 이름을 지정하지 않았을 때 사용하는 기본 이름
pub const DEFAULT_DATA_SOURCE: &str = "default";

/// Physical write outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

/// 연산 종류. 라우터와 데이터소스 선택기가 master/slave 결정을 내릴 때 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Write,
    Read { use_master: bool },
}

impl OperationKind {
    pub fn is_write(&self) -> bool {
        matches!(self, OperationKind::Write)
    }

    pub fn use_master(&self) -> bool {
        match self {
            OperationKind::Write => true,
            OperationKind::Read { use_master } => *use_master,
        }
    }
}

/// Resolved physical destination for one operation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub data_source: String,
    pub table: String,
    pub use_master: bool,
}

/// Row window for paginated reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: u64,
    pub size: u64,
}

impl Page {
    pub fn offset(&self) -> u64 {
        self.index.saturating_mul(self.size)
    }
}

/// SQL text plus the ordered values bound to its `?` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}
