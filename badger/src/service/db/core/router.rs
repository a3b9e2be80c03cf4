//! 샤드 라우팅 모듈
//!
//! 엔티티 메타데이터와 연산 컨텍스트(엔티티 인스턴스, 기본 키, 조건 + 파라미터)로부터
//! 물리 데이터소스와 테이블을 결정합니다.
//!
//! 샤딩된 엔티티는 샤드 키 값을 알 수 없으면 절대 라우팅하지 않습니다.
//! 기본 키만으로 삭제하려 해도 샤드 키가 기본 키와 다르면 매핑 오류입니다.

use crate::service::db::core::builder::parse_condition;
use crate::service::db::core::metadata::{ShardSpec, TableMeta};
use crate::service::db::core::types::{OperationKind, RouteTarget, SqlValue};
use crate::tool::error::{BadgerError, BadgerResult};
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use tracing::debug;

/// 샤드 키를 찾을 위치
#[derive(Debug, Clone, Copy)]
pub enum RouteContext<'a> {
    /// 엔티티 인스턴스에서 읽은 샤드 키 값
    Entity(&'a SqlValue),
    /// 기본 키 값만 주어진 연산 (get/delete by id)
    PrimaryKey(&'a SqlValue),
    /// 조건 조각과 그 조각의 `?`에 대응하는 파라미터
    Condition {
        fragment: &'a str,
        params: &'a [SqlValue],
    },
}

/// 샤드 라우터. 상태가 없습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShardRouter;

impl ShardRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(
        &self,
        meta: &TableMeta,
        context: RouteContext<'_>,
        kind: OperationKind,
    ) -> BadgerResult<RouteTarget> {
        let use_master = kind.use_master();

        let Some(shard) = meta.effective_shard() else {
            return Ok(RouteTarget {
                data_source: meta.data_source.clone(),
                table: meta.table.clone(),
                use_master,
            });
        };

        let key = self.locate_shard_key(meta, shard, context)?;
        let index = shard_index(&key, shard.shard_count()).ok_or_else(|| {
            BadgerError::mapping(format!(
                "{}: shard key '{}' is null",
                meta.entity,
                shard.column()
            ))
        })?;

        let target = RouteTarget {
            data_source: shard
                .data_source_name(index)
                .unwrap_or_else(|| meta.data_source.clone()),
            table: shard.table_name(&meta.table, index),
            use_master,
        };
        debug!(
            "Routed {} (shard key {}={}) to {}.{}",
            meta.entity,
            shard.column(),
            key,
            target.data_source,
            target.table
        );
        Ok(target)
    }

    fn locate_shard_key(
        &self,
        meta: &TableMeta,
        shard: &ShardSpec,
        context: RouteContext<'_>,
    ) -> BadgerResult<SqlValue> {
        match context {
            RouteContext::Entity(value) => Ok(value.clone()),
            RouteContext::PrimaryKey(id) => {
                if shard.column().eq_ignore_ascii_case(&meta.primary_key) {
                    Ok(id.clone())
                } else {
                    Err(BadgerError::mapping(format!(
                        "{} is sharded by '{}', which cannot be derived from primary key '{}'",
                        meta.entity,
                        shard.column(),
                        meta.primary_key
                    )))
                }
            }
            RouteContext::Condition { fragment, params } => {
                match extract_equality(fragment, shard.column())? {
                    Some(Operand::Placeholder(index)) => params.get(index).cloned().ok_or_else(|| {
                        BadgerError::statement(format!(
                            "shard key placeholder #{} of `{}` has no bound parameter",
                            index + 1,
                            fragment
                        ))
                    }),
                    Some(Operand::Literal(value)) => Ok(value),
                    None => Err(BadgerError::mapping(format!(
                        "{} is sharded by '{}'; condition `{}` must pin it with an equality",
                        meta.entity,
                        shard.column(),
                        fragment
                    ))),
                }
            }
        }
    }
}

/// 샤드 인덱스 계산. NULL 키는 None.
///
/// 키는 먼저 정규화됩니다: 정수로 읽히는 문자열과 소수부가 없는 실수는 정수로 취급하므로
/// `13`과 `"13"`은 같은 샤드로 갑니다. 정수는 모듈러, 나머지는 CRC-32 해시를 사용합니다.
pub fn shard_index(key: &SqlValue, shard_count: u32) -> Option<u32> {
    let n = u64::from(shard_count.max(1));
    let index = match canonical_key(key)? {
        CanonicalKey::Signed(i) => i.rem_euclid(n as i64) as u64,
        CanonicalKey::Unsigned(u) => u % n,
        CanonicalKey::Text(text) => u64::from(crc32fast::hash(text.as_bytes())) % n,
    };
    Some(index as u32)
}

enum CanonicalKey {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

fn canonical_key(key: &SqlValue) -> Option<CanonicalKey> {
    let canonical = match key {
        SqlValue::Null => return None,
        SqlValue::Bool(b) => CanonicalKey::Signed(i64::from(*b)),
        SqlValue::Number(num) => {
            if let Some(i) = num.as_i64() {
                CanonicalKey::Signed(i)
            } else if let Some(u) = num.as_u64() {
                CanonicalKey::Unsigned(u)
            } else {
                match num.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        CanonicalKey::Signed(f as i64)
                    }
                    _ => CanonicalKey::Text(num.to_string()),
                }
            }
        }
        SqlValue::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                CanonicalKey::Signed(i)
            } else if let Ok(u) = trimmed.parse::<u64>() {
                CanonicalKey::Unsigned(u)
            } else {
                CanonicalKey::Text(s.clone())
            }
        }
        other => CanonicalKey::Text(other.to_string()),
    };
    Some(canonical)
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Placeholder(usize),
    Literal(SqlValue),
}

fn matches_column(expr: &Expr, column: &str) -> bool {
    let ident = match expr {
        Expr::Identifier(ident) => ident,
        Expr::CompoundIdentifier(parts) => match parts.last() {
            Some(ident) => ident,
            None => return false,
        },
        Expr::Nested(inner) => return matches_column(inner, column),
        _ => return false,
    };
    ident.value.eq_ignore_ascii_case(column)
}

fn number(text: &str, negative: bool) -> Option<SqlValue> {
    let text = if negative { format!("-{text}") } else { text.to_string() };
    text.parse::<i64>()
        .map(SqlValue::from)
        .or_else(|_| text.parse::<u64>().map(SqlValue::from))
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(SqlValue::from))
}

fn operand(expr: &Expr) -> Option<Operand> {
    match expr {
        Expr::Value(v) => match &v.value {
            Value::Placeholder(p) => p
                .strip_prefix('?')
                .and_then(|n| n.parse().ok())
                .map(Operand::Placeholder),
            Value::Number(n, _) => number(n, false).map(Operand::Literal),
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
                Some(Operand::Literal(SqlValue::String(s.clone())))
            }
            _ => None,
        },
        Expr::UnaryOp { op, expr } => match (op, expr.as_ref()) {
            (UnaryOperator::Minus, Expr::Value(v)) => match &v.value {
                Value::Number(n, _) => number(n, true).map(Operand::Literal),
                _ => None,
            },
            (UnaryOperator::Plus, inner) => operand(inner),
            _ => None,
        },
        Expr::Nested(inner) => operand(inner),
        _ => None,
    }
}

/// AND로만 이어진 등식에서 샤드 키를 찾습니다.
/// OR, XOR, `||` 등 다른 연산자 아래의 등식은 샤드를 고정하지 못하므로 보지 않습니다.
fn find_equality(expr: &Expr, column: &str) -> Option<Operand> {
    match expr {
        Expr::Nested(inner) => find_equality(inner, column),
        Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
            find_equality(left, column).or_else(|| find_equality(right, column))
        }
        Expr::BinaryOp { left, op: BinaryOperator::Eq, right } => {
            if matches_column(left, column) {
                operand(right)
            } else if matches_column(right, column) {
                operand(left)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// 조건에서 `column = ?` / `? = column` / `column = 리터럴` 형태를 찾습니다.
fn extract_equality(fragment: &str, column: &str) -> BadgerResult<Option<Operand>> {
    Ok(parse_condition(fragment)?.and_then(|expr| find_equality(&expr, column)))
}
