//! sqlx/PostgreSQL connection adapter.

use crate::adapter::{Connection, ConnectionAdapter, Executed, Executor};
use crate::error::PersistError;
use crate::sql::QueryBuf;
use crate::value::{Row, Value};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};

#[derive(Clone, Debug)]
pub struct PgAdapter {
    pool: PgPool,
}

impl PgAdapter {
    pub fn new(pool: PgPool) -> Self {
        PgAdapter { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip to the database; used by readiness checks.
    pub async fn ping(&self) -> Result<(), PersistError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

/// Pooled connection; returned to the pool when released. A connection dropped with a
/// transaction still open is closed instead of being returned.
pub struct PgConn {
    conn: PoolConnection<Postgres>,
    in_transaction: bool,
}

impl Drop for PgConn {
    fn drop(&mut self) {
        if self.in_transaction {
            tracing::warn!("connection released with an open transaction; closing it");
            self.conn.close_on_drop();
        }
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = match p {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(n) => query.bind(*n),
            Value::Float(n) => query.bind(*n),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Uuid(u) => query.bind(*u),
            Value::Timestamp(t) => query.bind(*t),
        };
    }
    query
}

async fn run_execute<'e, E>(exec: E, q: &'e QueryBuf) -> Result<Executed, PersistError>
where
    E: sqlx::Executor<'e, Database = Postgres> + 'e,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let query = bind_all(&q.sql, &q.params);
    match &q.returning {
        Some(col) => {
            let row = query.fetch_optional(exec).await?;
            let returned = match row {
                Some(r) => row_to_map(&r)?.shift_remove(col.as_str()),
                None => None,
            };
            Ok(Executed {
                rows_affected: u64::from(returned.is_some()),
                returned,
            })
        }
        None => {
            let done = query.execute(exec).await?;
            Ok(Executed {
                rows_affected: done.rows_affected(),
                returned: None,
            })
        }
    }
}

async fn run_fetch_one<'e, E>(exec: E, q: &'e QueryBuf) -> Result<Option<Row>, PersistError>
where
    E: sqlx::Executor<'e, Database = Postgres> + 'e,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_all(&q.sql, &q.params).fetch_optional(exec).await?;
    row.as_ref().map(row_to_map).transpose().map_err(Into::into)
}

async fn run_fetch_all<'e, E>(exec: E, q: &'e QueryBuf) -> Result<Vec<Row>, PersistError>
where
    E: sqlx::Executor<'e, Database = Postgres> + 'e,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bind_all(&q.sql, &q.params).fetch_all(exec).await?;
    rows.iter()
        .map(row_to_map)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

fn row_to_map(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut map = Row::with_capacity(row.columns().len());
    for col in row.columns() {
        let v = cell_to_value(row, col.ordinal(), col.type_info().name())?;
        map.insert(col.name().to_string(), v);
    }
    Ok(map)
}

fn cell_to_value(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let v = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|n| Value::Int(n.into())),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|n| Value::Int(n.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|n| Value::Float(n.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        "UUID" => row.try_get::<Option<uuid::Uuid>, _>(idx)?.map(Value::Uuid),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(Value::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(|d| Value::Timestamp(d.and_utc())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(|j| Value::Text(j.to_string())),
        _ => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
    };
    Ok(v.unwrap_or(Value::Null))
}

#[async_trait]
impl Executor for PgAdapter {
    async fn execute(&self, query: &QueryBuf) -> Result<Executed, PersistError> {
        run_execute(&self.pool, query).await
    }

    async fn fetch_one(&self, query: &QueryBuf) -> Result<Option<Row>, PersistError> {
        run_fetch_one(&self.pool, query).await
    }

    async fn fetch_all(&self, query: &QueryBuf) -> Result<Vec<Row>, PersistError> {
        run_fetch_all(&self.pool, query).await
    }
}

#[async_trait]
impl ConnectionAdapter for PgAdapter {
    type Conn = PgConn;

    async fn acquire(&self) -> Result<PgConn, PersistError> {
        Ok(PgConn {
            conn: self.pool.acquire().await?,
            in_transaction: false,
        })
    }

    async fn release(&self, conn: PgConn) {
        drop(conn);
    }
}

impl PgConn {
    async fn control(&mut self, statement: &'static str) -> Result<(), PersistError> {
        tracing::debug!(statement, "transaction control");
        sqlx::query(statement).execute(&mut *self.conn).await?;
        self.in_transaction = statement == "BEGIN";
        Ok(())
    }
}

#[async_trait]
impl Connection for PgConn {
    async fn begin_transaction(&mut self) -> Result<(), PersistError> {
        self.control("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), PersistError> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), PersistError> {
        self.control("ROLLBACK").await
    }

    async fn execute(&mut self, query: &QueryBuf) -> Result<Executed, PersistError> {
        run_execute(&mut *self.conn, query).await
    }

    async fn fetch_one(&mut self, query: &QueryBuf) -> Result<Option<Row>, PersistError> {
        run_fetch_one(&mut *self.conn, query).await
    }

    async fn fetch_all(&mut self, query: &QueryBuf) -> Result<Vec<Row>, PersistError> {
        run_fetch_all(&mut *self.conn, query).await
    }
}
