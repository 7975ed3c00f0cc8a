//! In-memory adapter for integration tests. Understands the statement shapes the query
//! builder produces, records every statement, and counts transaction control calls.

#![allow(dead_code)]

use async_trait::async_trait;
use regex::Regex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use tenant_crud::adapter::{Connection, ConnectionAdapter, Executed, Executor};
use tenant_crud::sql::QueryBuf;
use tenant_crud::{PersistError, Row, Value};

type Tables = HashMap<String, Vec<Row>>;

static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^INSERT INTO "(\w+)"(?: \((.+)\) VALUES \((.+)\)| DEFAULT VALUES)(?: RETURNING "(\w+)")?$"#)
        .unwrap()
});
static UPDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^UPDATE "(\w+)" SET (.+) WHERE (.+)$"#).unwrap());
static DELETE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^DELETE FROM "(\w+)"(?: WHERE (.+))?$"#).unwrap());
static SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^SELECT (\*|COUNT\(\*\) AS "count"|1 AS "exists") FROM "(\w+)"(?: WHERE (.+?))?(?: ORDER BY "(\w+)" (ASC|DESC))?(?: LIMIT (\$\d+|\d+))?(?: OFFSET (\$\d+))?$"#,
    )
    .unwrap()
});

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    log: Mutex<Vec<QueryBuf>>,
    fail_when: Mutex<Option<String>>,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Cheap to clone; clones share tables, log and counters.
#[derive(Clone, Default)]
pub struct MockDb {
    inner: Arc<Inner>,
}

fn injected(what: &str) -> PersistError {
    PersistError::Persistence(sqlx::Error::Protocol(format!("injected failure: {}", what)))
}

fn operand(token: &str, params: &[Value]) -> Value {
    let token = token.trim();
    if token == "NULL" {
        return Value::Null;
    }
    if let Some(n) = token.strip_prefix('$').and_then(|n| n.parse::<usize>().ok()) {
        return params.get(n - 1).cloned().unwrap_or(Value::Null);
    }
    token.parse::<i64>().map(Value::Int).unwrap_or(Value::Null)
}

fn ident(token: &str) -> String {
    token.trim().trim_matches('"').to_string()
}

fn conditions(clause: Option<&str>, params: &[Value]) -> Vec<(String, Value)> {
    let Some(clause) = clause else {
        return Vec::new();
    };
    clause
        .split(" AND ")
        .map(|part| match part.strip_suffix(" IS NULL") {
            Some(col) => (ident(col), Value::Null),
            None => {
                let (col, val) = part.split_once(" = ").unwrap();
                (ident(col), operand(val, params))
            }
        })
        .collect()
}

fn matches(row: &Row, conds: &[(String, Value)]) -> bool {
    conds
        .iter()
        .all(|(c, v)| row.get(c).unwrap_or(&Value::Null) == v)
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Timestamp(x)), Some(Value::Timestamp(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

struct Outcome {
    rows: Vec<Row>,
    affected: u64,
    returned: Option<Value>,
}

impl Outcome {
    fn rows(rows: Vec<Row>) -> Self {
        Outcome {
            rows,
            affected: 0,
            returned: None,
        }
    }

    fn affected(affected: u64) -> Self {
        Outcome {
            rows: Vec::new(),
            affected,
            returned: None,
        }
    }
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement run so far, pooled or transactional.
    pub fn statements(&self) -> Vec<QueryBuf> {
        self.inner.log.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|q| q.sql).collect()
    }

    pub fn clear_log(&self) {
        self.inner.log.lock().unwrap().clear();
    }

    /// Fail any statement whose SQL contains `fragment`.
    pub fn fail_when(&self, fragment: &str) {
        *self.inner.fail_when.lock().unwrap() = Some(fragment.to_string());
    }

    pub fn fail_commit(&self) {
        self.inner.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self) {
        self.inner.fail_rollback.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed(&self, table: &str, row: Row) {
        self.inner
            .tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn acquires(&self) -> usize {
        self.inner.acquires.load(Ordering::SeqCst)
    }
    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }
    pub fn begins(&self) -> usize {
        self.inner.begins.load(Ordering::SeqCst)
    }
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }
    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Tables {
        self.inner.tables.lock().unwrap().clone()
    }

    fn restore(&self, tables: Tables) {
        *self.inner.tables.lock().unwrap() = tables;
    }

    fn run(&self, q: &QueryBuf) -> Result<Outcome, PersistError> {
        self.inner.log.lock().unwrap().push(q.clone());
        if let Some(fragment) = self.inner.fail_when.lock().unwrap().as_deref() {
            if q.sql.contains(fragment) {
                return Err(injected(&q.sql));
            }
        }
        let sql = q.sql.as_str();
        let params = q.params.as_slice();
        let mut tables = self.inner.tables.lock().unwrap();

        if sql.starts_with("CREATE TABLE") || sql == "SELECT 1" {
            return Ok(Outcome::affected(0));
        }
        if let Some(c) = INSERT.captures(sql) {
            let mut row = Row::new();
            if let (Some(cols), Some(vals)) = (c.get(2), c.get(3)) {
                for (col, val) in cols.as_str().split(", ").zip(vals.as_str().split(", ")) {
                    row.insert(ident(col), operand(val, params));
                }
            }
            let returned = c.get(4).map(|pk| {
                row.entry(pk.as_str().to_string())
                    .or_insert_with(|| Value::Uuid(uuid::Uuid::new_v4()))
                    .clone()
            });
            tables.entry(c[1].to_string()).or_default().push(row);
            return Ok(Outcome {
                rows: Vec::new(),
                affected: 1,
                returned,
            });
        }
        if let Some(c) = UPDATE.captures(sql) {
            let conds = conditions(Some(&c[3]), params);
            let sets: Vec<(String, Value)> = c[2]
                .split(", ")
                .map(|s| {
                    let (col, val) = s.split_once(" = ").unwrap();
                    (ident(col), operand(val, params))
                })
                .collect();
            let mut affected = 0;
            for row in tables.entry(c[1].to_string()).or_default().iter_mut() {
                if matches(row, &conds) {
                    for (col, val) in &sets {
                        row.insert(col.clone(), val.clone());
                    }
                    affected += 1;
                }
            }
            return Ok(Outcome::affected(affected));
        }
        if let Some(c) = DELETE.captures(sql) {
            let conds = conditions(c.get(2).map(|m| m.as_str()), params);
            let rows = tables.entry(c[1].to_string()).or_default();
            let before = rows.len();
            rows.retain(|r| !matches(r, &conds));
            return Ok(Outcome::affected((before - rows.len()) as u64));
        }
        if let Some(c) = SELECT.captures(sql) {
            let conds = conditions(c.get(3).map(|m| m.as_str()), params);
            let mut rows: Vec<Row> = tables
                .get(&c[2])
                .map(|rows| rows.iter().filter(|r| matches(r, &conds)).cloned().collect())
                .unwrap_or_default();
            match &c[1] {
                "*" => {
                    if let Some(col) = c.get(4) {
                        let col = col.as_str();
                        rows.sort_by(|a, b| compare(a.get(col), b.get(col)));
                        if c.get(5).map(|m| m.as_str()) == Some("DESC") {
                            rows.reverse();
                        }
                    }
                    let offset = c
                        .get(7)
                        .and_then(|m| operand(m.as_str(), params).as_i64())
                        .unwrap_or(0) as usize;
                    let limit = c
                        .get(6)
                        .and_then(|m| operand(m.as_str(), params).as_i64())
                        .map(|n| n as usize)
                        .unwrap_or(usize::MAX);
                    let rows = rows.into_iter().skip(offset).take(limit).collect();
                    return Ok(Outcome::rows(rows));
                }
                projection if projection.starts_with("COUNT") => {
                    let count: Row = [("count".to_string(), Value::Int(rows.len() as i64))]
                        .into_iter()
                        .collect();
                    return Ok(Outcome::rows(vec![count]));
                }
                _ => {
                    let hit: Vec<Row> = rows
                        .into_iter()
                        .take(1)
                        .map(|_| [("exists".to_string(), Value::Int(1))].into_iter().collect())
                        .collect();
                    return Ok(Outcome::rows(hit));
                }
            }
        }
        panic!("mock adapter cannot interpret: {}", sql);
    }
}

#[async_trait]
impl Executor for MockDb {
    async fn execute(&self, query: &QueryBuf) -> Result<Executed, PersistError> {
        let out = self.run(query)?;
        Ok(Executed {
            rows_affected: out.affected,
            returned: out.returned,
        })
    }

    async fn fetch_one(&self, query: &QueryBuf) -> Result<Option<Row>, PersistError> {
        Ok(self.run(query)?.rows.into_iter().next())
    }

    async fn fetch_all(&self, query: &QueryBuf) -> Result<Vec<Row>, PersistError> {
        Ok(self.run(query)?.rows)
    }
}

/// A checked-out connection. Rollback restores the tables as they were at BEGIN.
pub struct MockConn {
    db: MockDb,
    snapshot: Option<Tables>,
}

#[async_trait]
impl Connection for MockConn {
    async fn begin_transaction(&mut self) -> Result<(), PersistError> {
        self.db.inner.begins.fetch_add(1, Ordering::SeqCst);
        self.snapshot = Some(self.db.snapshot());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PersistError> {
        self.db.inner.commits.fetch_add(1, Ordering::SeqCst);
        if self.db.inner.fail_commit.load(Ordering::SeqCst) {
            return Err(injected("COMMIT"));
        }
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PersistError> {
        self.db.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.db.inner.fail_rollback.load(Ordering::SeqCst) {
            return Err(injected("ROLLBACK"));
        }
        if let Some(tables) = self.snapshot.take() {
            self.db.restore(tables);
        }
        Ok(())
    }

    async fn execute(&mut self, query: &QueryBuf) -> Result<Executed, PersistError> {
        Executor::execute(&self.db, query).await
    }

    async fn fetch_one(&mut self, query: &QueryBuf) -> Result<Option<Row>, PersistError> {
        Executor::fetch_one(&self.db, query).await
    }

    async fn fetch_all(&mut self, query: &QueryBuf) -> Result<Vec<Row>, PersistError> {
        Executor::fetch_all(&self.db, query).await
    }
}

#[async_trait]
impl ConnectionAdapter for MockDb {
    type Conn = MockConn;

    async fn acquire(&self) -> Result<MockConn, PersistError> {
        self.inner.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn {
            db: self.clone(),
            snapshot: None,
        })
    }

    async fn release(&self, _conn: MockConn) {
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Attribute map from literal pairs.
pub fn row(pairs: Vec<(&str, Value)>) -> Row {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
