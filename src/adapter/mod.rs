//! Connection adapter contract consumed by the persistence core, and its PostgreSQL implementation.

mod pg;

pub use pg::{PgAdapter, PgConn};

use crate::error::PersistError;
use crate::sql::QueryBuf;
use crate::value::{Row, Value};
use async_trait::async_trait;

/// Outcome of an INSERT/UPDATE/DELETE.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Executed {
    pub rows_affected: u64,
    /// Value of the query's `RETURNING` column, when it had one and a row came back.
    pub returned: Option<Value>,
}

/// Statement dispatch. Implemented by the pooled adapter and by an open transaction.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, query: &QueryBuf) -> Result<Executed, PersistError>;
    async fn fetch_one(&self, query: &QueryBuf) -> Result<Option<Row>, PersistError>;
    async fn fetch_all(&self, query: &QueryBuf) -> Result<Vec<Row>, PersistError>;
}

/// A connection checked out of the adapter, used for one transaction at a time.
#[async_trait]
pub trait Connection: Send {
    async fn begin_transaction(&mut self) -> Result<(), PersistError>;
    async fn commit(&mut self) -> Result<(), PersistError>;
    async fn rollback(&mut self) -> Result<(), PersistError>;
    async fn execute(&mut self, query: &QueryBuf) -> Result<Executed, PersistError>;
    async fn fetch_one(&mut self, query: &QueryBuf) -> Result<Option<Row>, PersistError>;
    async fn fetch_all(&mut self, query: &QueryBuf) -> Result<Vec<Row>, PersistError>;
}

/// Pooled statement execution plus connection checkout for transactions.
#[async_trait]
pub trait ConnectionAdapter: Executor {
    type Conn: Connection + 'static;

    async fn acquire(&self) -> Result<Self::Conn, PersistError>;
    async fn release(&self, conn: Self::Conn);
}
