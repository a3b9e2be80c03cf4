//! SQL 문장 빌더 모듈
//!
//! 엔티티 디스크립터와 라우팅 결과, 호출자가 넘긴 조건 조각으로부터
//! INSERT/UPDATE/DELETE/SELECT 문장과 순서가 보장된 파라미터 목록을 만듭니다.
//! 조각 안의 `?` 개수와 파라미터 개수가 맞지 않으면 실행 전에 실패합니다.

use crate::service::db::core::metadata::EntityDescriptor;
use crate::service::db::core::types::{BoundStatement, Page, RouteTarget, SqlValue};
use crate::tool::error::{BadgerError, BadgerResult};
use sqlparser::ast::Expr;
use sqlparser::dialect::MySqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// INSERT 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertMode {
    /// NULL 값인 컬럼은 제외
    pub not_null_only: bool,
    /// 유니크 인덱스 충돌 무시 (INSERT IGNORE)
    pub ignore_conflict: bool,
}

fn lex(fragment: &str) -> BadgerResult<Vec<Token>> {
    Tokenizer::new(&MySqlDialect {}, fragment)
        .tokenize()
        .map_err(|e| BadgerError::statement(format!("cannot tokenize fragment `{fragment}`: {e}")))
}

/// Number of `?` placeholders in a fragment.
///
/// 문자열 리터럴과 주석 안의 `?`는 세지 않습니다.
pub fn count_placeholders(fragment: &str) -> BadgerResult<usize> {
    Ok(lex(fragment)?
        .iter()
        .filter(|t| matches!(t, Token::Placeholder(p) if p == "?"))
        .count())
}

/// 조건 조각을 식 트리로 파싱합니다. 빈 조각은 None.
///
/// `?`는 등장 순서대로 `?0`, `?1`, ... 로 번호가 매겨지므로 파라미터 위치를 그대로 찾을 수 있습니다.
pub(crate) fn parse_condition(fragment: &str) -> BadgerResult<Option<Expr>> {
    if fragment.trim().is_empty() {
        return Ok(None);
    }

    let mut next = 0usize;
    let tokens = lex(fragment)?
        .into_iter()
        .map(|token| match token {
            Token::Placeholder(p) if p == "?" => {
                let numbered = Token::Placeholder(format!("?{next}"));
                next += 1;
                numbered
            }
            other => other,
        })
        .collect();

    let dialect = MySqlDialect {};
    let mut parser = Parser::new(&dialect).with_tokens(tokens);
    let expr = parser
        .parse_expr()
        .map_err(|e| BadgerError::statement(format!("cannot parse condition `{fragment}`: {e}")))?;

    // 식 뒤에는 절 키워드만 올 수 있음
    match parser.peek_token().token {
        Token::EOF => Ok(Some(expr)),
        Token::Word(word)
            if matches!(
                word.keyword,
                Keyword::ORDER | Keyword::GROUP | Keyword::HAVING | Keyword::LIMIT | Keyword::FOR | Keyword::LOCK
            ) =>
        {
            Ok(Some(expr))
        }
        other => Err(BadgerError::statement(format!(
            "cannot parse condition `{fragment}`: unexpected `{other}`"
        ))),
    }
}

fn ensure_param_count(fragment: &str, expected: usize, supplied: usize) -> BadgerResult<()> {
    if expected != supplied {
        return Err(BadgerError::statement(format!(
            "fragment `{fragment}` has {expected} placeholder(s) but {supplied} parameter(s) were added"
        )));
    }
    Ok(())
}

fn where_clause(condition: &str) -> BadgerResult<String> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Ok(String::new());
    }
    // 한 줄 주석으로 끝나면 뒤에 붙는 LIMIT 등이 주석에 묻히지 않도록 줄을 바꿈
    let line_comment = lex(condition)?
        .iter()
        .any(|t| matches!(t, Token::Whitespace(Whitespace::SingleLineComment { .. })));
    Ok(if line_comment {
        format!(" WHERE {condition}\n")
    } else {
        format!(" WHERE {condition}")
    })
}

/// 문장 빌더. 상태가 없으므로 여러 호출자가 동시에 사용할 수 있습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatementBuilder;

impl StatementBuilder {
    pub fn new() -> Self {
        Self
    }

    /// INSERT 문장 생성
    ///
    /// 자동 생성 키가 NULL이면 컬럼 목록에서 제외하여 DB가 값을 채우게 합니다.
    pub fn insert<E: 'static>(
        &self,
        desc: &EntityDescriptor<E>,
        target: &RouteTarget,
        entity: &E,
        mode: InsertMode,
    ) -> BadgerResult<BoundStatement> {
        let pk = desc.primary_key().name();
        let mut columns = Vec::new();
        let mut params = Vec::new();

        for column in desc.columns() {
            let value = column.get(entity);
            let is_null = value.is_null();

            if is_null && desc.is_generated_key() && column.name() == pk {
                continue;
            }
            if is_null && mode.not_null_only {
                continue;
            }
            if is_null && !column.is_nullable() {
                return Err(BadgerError::mapping(format!(
                    "column '{}' of {} is not nullable",
                    column.name(),
                    desc.meta().entity
                )));
            }

            columns.push(column.name());
            params.push(value);
        }

        if columns.is_empty() {
            return Err(BadgerError::statement(format!(
                "nothing to insert into {}",
                target.table
            )));
        }

        let verb = if mode.ignore_conflict {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "{} {} ({}) VALUES ({})",
            verb,
            target.table,
            columns.join(", "),
            placeholders
        );

        Ok(BoundStatement::new(sql, params))
    }

    /// 기본 키를 제외한 모든 컬럼을 갱신하는 UPDATE 문장
    pub fn update_entity<E: 'static>(
        &self,
        desc: &EntityDescriptor<E>,
        target: &RouteTarget,
        entity: &E,
    ) -> BadgerResult<BoundStatement> {
        let pk = desc.primary_key();
        let id = pk.get(entity);
        if id.is_null() {
            return Err(BadgerError::mapping(format!(
                "cannot update {} without a primary key value",
                desc.meta().entity
            )));
        }

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for column in desc.columns().iter().filter(|c| c.name() != pk.name()) {
            let value = column.get(entity);
            if value.is_null() && !column.is_nullable() {
                return Err(BadgerError::mapping(format!(
                    "column '{}' of {} is not nullable",
                    column.name(),
                    desc.meta().entity
                )));
            }
            assignments.push(format!("{} = ?", column.name()));
            params.push(value);
        }

        if assignments.is_empty() {
            return Err(BadgerError::statement(format!(
                "{} has no columns to update besides its primary key",
                desc.meta().entity
            )));
        }

        params.push(id);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            target.table,
            assignments.join(", "),
            pk.name()
        );
        Ok(BoundStatement::new(sql, params))
    }

    /// 조건 기반 UPDATE. 파라미터는 SET 조각의 것이 먼저, 조건의 것이 뒤에 옵니다.
    pub fn update_by_condition(
        &self,
        target: &RouteTarget,
        assignment: &str,
        condition: &str,
        params: &[SqlValue],
    ) -> BadgerResult<BoundStatement> {
        if assignment.trim().is_empty() {
            return Err(BadgerError::statement("update assignment fragment is empty"));
        }
        let expected = count_placeholders(assignment)? + count_placeholders(condition)?;
        ensure_param_count(
            &format!("{assignment} / {condition}"),
            expected,
            params.len(),
        )?;

        let sql = format!(
            "UPDATE {} SET {}{}",
            target.table,
            assignment.trim(),
            where_clause(condition)?
        );
        Ok(BoundStatement::new(sql, params.to_vec()))
    }

    pub fn delete_by_id<E: 'static>(
        &self,
        desc: &EntityDescriptor<E>,
        target: &RouteTarget,
        id: SqlValue,
    ) -> BadgerResult<BoundStatement> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            target.table,
            desc.primary_key().name()
        );
        Ok(BoundStatement::new(sql, vec![id]))
    }

    pub fn delete_by_condition(
        &self,
        target: &RouteTarget,
        condition: &str,
        params: &[SqlValue],
    ) -> BadgerResult<BoundStatement> {
        ensure_param_count(condition, count_placeholders(condition)?, params.len())?;
        let sql = format!("DELETE FROM {}{}", target.table, where_clause(condition)?);
        Ok(BoundStatement::new(sql, params.to_vec()))
    }

    pub fn select_by_id<E: 'static>(
        &self,
        desc: &EntityDescriptor<E>,
        target: &RouteTarget,
        id: SqlValue,
    ) -> BadgerResult<BoundStatement> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            desc.column_list(),
            target.table,
            desc.primary_key().name()
        );
        Ok(BoundStatement::new(sql, vec![id]))
    }

    /// SELECT 문장. `columns`가 없으면 매핑된 모든 컬럼을 조회합니다.
    pub fn select<E: 'static>(
        &self,
        desc: &EntityDescriptor<E>,
        target: &RouteTarget,
        columns: Option<&str>,
        condition: &str,
        params: &[SqlValue],
        page: Option<Page>,
    ) -> BadgerResult<BoundStatement> {
        ensure_param_count(condition, count_placeholders(condition)?, params.len())?;

        let columns = match columns.map(str::trim) {
            Some(list) if !list.is_empty() => list.to_string(),
            _ => desc.column_list(),
        };
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            columns,
            target.table,
            where_clause(condition)?
        );
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.size, page.offset()));
        }
        Ok(BoundStatement::new(sql, params.to_vec()))
    }

    /// 같은 조건에 대한 COUNT(*) 문장 (페이지 범위는 적용하지 않음)
    pub fn count(
        &self,
        target: &RouteTarget,
        condition: &str,
        params: &[SqlValue],
    ) -> BadgerResult<BoundStatement> {
        ensure_param_count(condition, count_placeholders(condition)?, params.len())?;
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {}{}",
            target.table,
            where_clause(condition)?
        );
        Ok(BoundStatement::new(sql, params.to_vec()))
    }

    /// 사용자 정의 SQL. 라우팅 없이 플레이스홀더 개수만 검증합니다.
    pub fn raw(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<BoundStatement> {
        ensure_param_count(sql, count_placeholders(sql)?, params.len())?;
        Ok(BoundStatement::new(sql.trim(), params.to_vec()))
    }
}
