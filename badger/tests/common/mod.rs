//! 통합 테스트용 인메모리 데이터베이스
//!
//! Badger가 만드는 SQL 형태(INSERT / UPDATE .. SET .. WHERE / DELETE /
//! SELECT .. LIMIT .. OFFSET / SELECT COUNT(*) AS total)만 해석하는 작은 엔진입니다.
//! 여러 엔드포인트가 같은 저장소를 공유하므로 master/slave 복제가 즉시 반영된 것처럼 동작하며,
//! 실행 기록에는 엔드포인트 id가 남아 라우팅을 검증할 수 있습니다.

#![allow(dead_code)]

use async_trait::async_trait;
use badger::{
    column, Badger, BadgerError, BadgerResult, Endpoint, Entity, EntityMapping, ExecOutcome,
    MasterSlaveDataSourceFactory, QueryRow, Session, ShardSpec, SqlValue,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// 테스트 엔티티
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_id: Option<i64>,
    pub name: String,
    pub age: i32,
}

impl Entity for Driver {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new("driver")
            .column(column!(Driver, driver_id))
            .column(column!(Driver, name).not_null())
            .column(column!(Driver, age))
            .primary_key("driver_id")
            .generated_key()
    }
}

impl Driver {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            driver_id: None,
            name: name.to_string(),
            age,
        }
    }
}

/// driver_id 기준 4개 테이블로 분할
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverOrder {
    pub order_id: Option<i64>,
    pub driver_id: i64,
    pub amount: i64,
    pub status: String,
}

impl Entity for DriverOrder {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new("driver_order")
            .column(column!(DriverOrder, order_id))
            .column(column!(DriverOrder, driver_id))
            .column(column!(DriverOrder, amount))
            .column(column!(DriverOrder, status))
            .primary_key("order_id")
            .generated_key()
            .shard(ShardSpec::new("driver_id", 4))
    }
}

impl DriverOrder {
    pub fn new(driver_id: i64, amount: i64) -> Self {
        Self {
            order_id: None,
            driver_id,
            amount,
            status: "NEW".to_string(),
        }
    }
}

/// 샤드 키가 곧 기본 키이고, 샤드마다 다른 데이터소스에 저장
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub driver_id: i64,
    pub nickname: String,
}

fn profile_data_source(index: u32) -> String {
    format!("profile_{index}")
}

impl Entity for DriverProfile {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new("driver_profile")
            .column(column!(DriverProfile, driver_id))
            .column(column!(DriverProfile, nickname))
            .primary_key("driver_id")
            .shard(ShardSpec::new("driver_id", 2).data_source_naming(profile_data_source))
    }
}

// ---------------------------------------------------------------------------
// 저장소
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Table {
    primary_key: String,
    rows: Vec<QueryRow>,
    auto_increment: i64,
}

type Tables = HashMap<String, Table>;

/// 실행 기록 한 건
#[derive(Debug, Clone)]
pub struct Executed {
    pub endpoint: String,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<Tables>,
    executed: Mutex<Vec<Executed>>,
    fail_on: Mutex<Option<String>>,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_table(&self, name: &str, primary_key: &str) {
        self.tables.lock().insert(
            name.to_string(),
            Table {
                primary_key: primary_key.to_string(),
                rows: Vec::new(),
                auto_increment: 0,
            },
        );
    }

    /// driver, driver_order_0..3, driver_profile_0..1 테이블 생성
    pub fn with_test_tables() -> Arc<Self> {
        let db = Self::new();
        db.create_table("driver", "driver_id");
        for index in 0..4 {
            db.create_table(&format!("driver_order_{index}"), "order_id");
        }
        for index in 0..2 {
            db.create_table(&format!("driver_profile_{index}"), "driver_id");
        }
        db
    }

    pub fn endpoint(self: &Arc<Self>, id: &str) -> Arc<MemoryEndpoint> {
        Arc::new(MemoryEndpoint {
            id: id.to_string(),
            db: self.clone(),
        })
    }

    /// SQL에 `needle`이 포함된 다음 실행 한 번을 실패시킵니다.
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock() = Some(needle.to_string());
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().iter().map(|e| e.sql.clone()).collect()
    }

    pub fn clear_log(&self) {
        self.executed.lock().clear();
    }

    pub fn rows(&self, table: &str) -> Vec<QueryRow> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn record(&self, endpoint: &str, sql: &str, params: &[SqlValue]) -> BadgerResult<()> {
        self.executed.lock().push(Executed {
            endpoint: endpoint.to_string(),
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let mut fail_on = self.fail_on.lock();
        if fail_on.as_deref().is_some_and(|needle| sql.contains(needle)) {
            *fail_on = None;
            return Err(BadgerError::execution(sql, "injected failure"));
        }
        Ok(())
    }
}

pub struct MemoryEndpoint {
    id: String,
    db: Arc<MemoryDb>,
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome> {
        self.db.record(&self.id, sql, params)?;
        let mut tables = self.db.tables.lock();
        apply_write(&mut tables, sql, params)
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>> {
        self.db.record(&self.id, sql, params)?;
        let tables = self.db.tables.lock();
        apply_read(&tables, sql, params)
    }

    async fn begin(&self) -> BadgerResult<Box<dyn Session>> {
        let working = self.db.tables.lock().clone();
        Ok(Box::new(MemorySession {
            id: format!("{}#tx", self.id),
            db: self.db.clone(),
            working,
        }))
    }
}

/// 작업 사본에 쓰고 커밋 시에만 저장소에 반영하는 세션
pub struct MemorySession {
    id: String,
    db: Arc<MemoryDb>,
    working: Tables,
}

#[async_trait]
impl Session for MemorySession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome> {
        self.db.record(&self.id, sql, params)?;
        apply_write(&mut self.working, sql, params)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>> {
        self.db.record(&self.id, sql, params)?;
        apply_read(&self.working, sql, params)
    }

    async fn commit(self: Box<Self>) -> BadgerResult<()> {
        let MemorySession { db, working, .. } = *self;
        *db.tables.lock() = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BadgerResult<()> {
        Ok(())
    }
}

/// 모든 호출이 제한 시간을 넘기는 엔드포인트
pub struct StalledEndpoint {
    id: String,
}

impl StalledEndpoint {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string() })
    }

    fn timed_out(&self, what: &str) -> BadgerError {
        BadgerError::Timeout(format!("{what} on {} exceeded 5s", self.id))
    }
}

#[async_trait]
impl Endpoint for StalledEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, sql: &str, _params: &[SqlValue]) -> BadgerResult<ExecOutcome> {
        Err(self.timed_out(sql))
    }

    async fn fetch_all(&self, sql: &str, _params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>> {
        Err(self.timed_out(sql))
    }

    async fn begin(&self) -> BadgerResult<Box<dyn Session>> {
        Err(self.timed_out("BEGIN"))
    }
}

/// 기본 데이터소스 하나(master만)로 구성된 Badger
pub fn single_badger(db: &Arc<MemoryDb>) -> Badger {
    Badger::with_data_source(db.endpoint("default/master"))
}

/// `{name}/master` + `{name}/slave-N` 엔드포인트로 구성된 데이터소스
pub fn replicated(db: &Arc<MemoryDb>, name: &str, slaves: usize) -> Arc<MasterSlaveDataSourceFactory> {
    let master: Arc<dyn Endpoint> = db.endpoint(&format!("{name}/master"));
    let slaves = (0..slaves)
        .map(|index| db.endpoint(&format!("{name}/slave-{index}")) as Arc<dyn Endpoint>)
        .collect();
    Arc::new(MasterSlaveDataSourceFactory::new(name, master, slaves))
}

// ---------------------------------------------------------------------------
// SQL 해석
// ---------------------------------------------------------------------------

struct Params<'a> {
    values: &'a [SqlValue],
    next: usize,
}

impl<'a> Params<'a> {
    fn new(values: &'a [SqlValue]) -> Self {
        Self { values, next: 0 }
    }

    fn take(&mut self, sql: &str) -> BadgerResult<SqlValue> {
        let value = self
            .values
            .get(self.next)
            .cloned()
            .ok_or_else(|| BadgerError::execution(sql, "missing parameter"))?;
        self.next += 1;
        Ok(value)
    }
}

struct Predicate {
    column: String,
    op: &'static str,
    value: SqlValue,
}

const OPERATORS: [&str; 6] = [">=", "<=", "!=", "=", ">", "<"];

fn operand(token: &str, params: &mut Params<'_>, sql: &str) -> BadgerResult<SqlValue> {
    let token = token.trim();
    if token == "?" {
        return params.take(sql);
    }
    if let Some(text) = token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(SqlValue::String(text.to_string()));
    }
    if token.eq_ignore_ascii_case("null") {
        return Ok(SqlValue::Null);
    }
    if let Ok(n) = token.parse::<i64>() {
        return Ok(SqlValue::from(n));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Ok(SqlValue::from(f));
    }
    Err(BadgerError::execution(sql, format!("unsupported operand `{token}`")))
}

fn parse_condition(
    condition: Option<&str>,
    params: &mut Params<'_>,
    sql: &str,
) -> BadgerResult<Vec<Predicate>> {
    let Some(condition) = condition else {
        return Ok(Vec::new());
    };
    let condition = condition.split(" -- ").next().unwrap_or(condition).trim();

    let mut predicates = Vec::new();
    for part in condition.split(" AND ") {
        if part.replace(' ', "") == "1=1" {
            continue;
        }
        let (op, pos) = OPERATORS
            .iter()
            .find_map(|op| part.find(op).map(|pos| (*op, pos)))
            .ok_or_else(|| BadgerError::execution(sql, format!("unsupported predicate `{part}`")))?;
        predicates.push(Predicate {
            column: part[..pos].trim().to_string(),
            op,
            value: operand(&part[pos + op.len()..], params, sql)?,
        });
    }
    Ok(predicates)
}

fn compare(left: &SqlValue, right: &SqlValue) -> Option<Ordering> {
    match (left, right) {
        (SqlValue::Number(a), SqlValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (SqlValue::String(a), SqlValue::String(b)) => Some(a.cmp(b)),
        // MySQL처럼 숫자와 숫자 문자열은 숫자로 비교
        (SqlValue::Number(a), SqlValue::String(b)) => a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?),
        (SqlValue::String(a), SqlValue::Number(b)) => a.trim().parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (SqlValue::Bool(a), SqlValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn matches(row: &QueryRow, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| {
        let value = row.get(&p.column).unwrap_or(&SqlValue::Null);
        match compare(value, &p.value) {
            Some(ordering) => match p.op {
                "=" => ordering == Ordering::Equal,
                "!=" => ordering != Ordering::Equal,
                ">=" => ordering != Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                "<" => ordering == Ordering::Less,
                _ => false,
            },
            None => false,
        }
    })
}

fn split_where(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once(" WHERE ") {
        Some((head, condition)) => (head.trim(), Some(condition.trim())),
        None => (rest.trim(), None),
    }
}

fn table_mut<'t>(tables: &'t mut Tables, name: &str, sql: &str) -> BadgerResult<&'t mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| BadgerError::execution(sql, format!("Table '{name}' doesn't exist")))
}

fn table<'t>(tables: &'t Tables, name: &str, sql: &str) -> BadgerResult<&'t Table> {
    tables
        .get(name)
        .ok_or_else(|| BadgerError::execution(sql, format!("Table '{name}' doesn't exist")))
}

fn apply_write(tables: &mut Tables, sql: &str, params: &[SqlValue]) -> BadgerResult<ExecOutcome> {
    let mut params = Params::new(params);

    let insert = sql
        .strip_prefix("INSERT IGNORE INTO ")
        .map(|rest| (rest, true))
        .or_else(|| sql.strip_prefix("INSERT INTO ").map(|rest| (rest, false)));
    if let Some((rest, ignore)) = insert {
        return insert_row(tables, sql, rest, ignore, &mut params);
    }

    if let Some(rest) = sql.strip_prefix("UPDATE ") {
        let (table_name, rest) = rest
            .split_once(" SET ")
            .ok_or_else(|| BadgerError::execution(sql, "malformed UPDATE"))?;
        let (assignment, condition) = split_where(rest);

        let mut changes = Vec::new();
        for part in assignment.split(", ") {
            let (column, value) = part
                .split_once('=')
                .ok_or_else(|| BadgerError::execution(sql, "malformed SET"))?;
            changes.push((column.trim().to_string(), operand(value, &mut params, sql)?));
        }
        let predicates = parse_condition(condition, &mut params, sql)?;

        let table = table_mut(tables, table_name.trim(), sql)?;
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|row| matches(row, &predicates)) {
            for (column, value) in &changes {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        return Ok(ExecOutcome {
            affected_rows: affected,
            last_insert_id: None,
        });
    }

    if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
        let (table_name, condition) = split_where(rest);
        let predicates = parse_condition(condition, &mut params, sql)?;
        let table = table_mut(tables, table_name, sql)?;
        let before = table.rows.len();
        table.rows.retain(|row| !matches(row, &predicates));
        return Ok(ExecOutcome {
            affected_rows: (before - table.rows.len()) as u64,
            last_insert_id: None,
        });
    }

    Err(BadgerError::execution(sql, "unsupported write statement"))
}

fn insert_row(
    tables: &mut Tables,
    sql: &str,
    rest: &str,
    ignore: bool,
    params: &mut Params<'_>,
) -> BadgerResult<ExecOutcome> {
    let (table_name, rest) = rest
        .split_once(" (")
        .ok_or_else(|| BadgerError::execution(sql, "malformed INSERT"))?;
    let (columns, _) = rest
        .split_once(')')
        .ok_or_else(|| BadgerError::execution(sql, "malformed INSERT"))?;

    let mut row = QueryRow::new();
    for column in columns.split(", ") {
        row.insert(column.trim().to_string(), params.take(sql)?);
    }

    let table = table_mut(tables, table_name.trim(), sql)?;
    let pk = table.primary_key.clone();
    let mut generated = None;

    match row.get(&pk).filter(|v| !v.is_null()).cloned() {
        Some(given) => {
            if let Some(id) = given.as_i64() {
                table.auto_increment = table.auto_increment.max(id);
            }
        }
        None => {
            table.auto_increment += 1;
            generated = Some(table.auto_increment as u64);
            row.insert(pk.clone(), SqlValue::from(table.auto_increment));
        }
    }

    let id = row.get(&pk).cloned().unwrap_or(SqlValue::Null);
    if table.rows.iter().any(|r| r.get(&pk) == Some(&id)) {
        if ignore {
            return Ok(ExecOutcome::default());
        }
        return Err(BadgerError::execution(sql, format!("Duplicate entry '{id}' for key 'PRIMARY'")));
    }

    table.rows.push(row);
    Ok(ExecOutcome {
        affected_rows: 1,
        last_insert_id: generated,
    })
}

fn apply_read(tables: &Tables, sql: &str, params: &[SqlValue]) -> BadgerResult<Vec<QueryRow>> {
    let mut params = Params::new(params);

    let rest = sql
        .strip_prefix("SELECT ")
        .ok_or_else(|| BadgerError::execution(sql, "unsupported read statement"))?;
    let (projection, rest) = rest
        .split_once(" FROM ")
        .ok_or_else(|| BadgerError::execution(sql, "malformed SELECT"))?;

    let (rest, page) = match rest.split_once(" LIMIT ") {
        Some((head, limit)) => {
            let (size, offset) = limit.split_once(" OFFSET ").unwrap_or((limit, "0"));
            let size: usize = size.trim().parse().map_err(|_| BadgerError::execution(sql, "bad LIMIT"))?;
            let offset: usize = offset.trim().parse().map_err(|_| BadgerError::execution(sql, "bad OFFSET"))?;
            (head, Some((size, offset)))
        }
        None => (rest, None),
    };

    let (table_name, condition) = split_where(rest);
    let predicates = parse_condition(condition, &mut params, sql)?;
    let table = table(tables, table_name, sql)?;
    let matched = table.rows.iter().filter(|row| matches(row, &predicates));

    if projection.trim() == "COUNT(*) AS total" {
        let total = matched.count() as u64;
        return Ok(vec![[("total".to_string(), SqlValue::from(total))].into_iter().collect()]);
    }

    let (size, offset) = page.unwrap_or((usize::MAX, 0));
    let columns: Vec<&str> = projection.split(',').map(str::trim).collect();
    Ok(matched
        .skip(offset)
        .take(size)
        .map(|row| {
            if columns == ["*"] {
                return row.clone();
            }
            columns
                .iter()
                .map(|c| (c.to_string(), row.get(*c).cloned().unwrap_or(SqlValue::Null)))
                .collect()
        })
        .collect())
}
