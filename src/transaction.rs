//! Transaction manager: one connection, one transaction at a time, strict begin/commit/rollback.

use crate::adapter::{Connection, ConnectionAdapter, Executed, Executor};
use crate::error::PersistError;
use crate::sql::QueryBuf;
use crate::value::Row;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

fn not_active() -> PersistError {
    PersistError::TransactionState("no active transaction".into())
}

fn already_active() -> PersistError {
    PersistError::TransactionState("transaction already active; nesting is not supported".into())
}

/// Guards exactly one connection and one in-flight transaction. `begin()` while a
/// transaction is active (or starting) fails immediately.
pub struct TransactionManager<A: ConnectionAdapter> {
    adapter: Arc<A>,
    slot: Mutex<Option<A::Conn>>,
    /// Set once BEGIN succeeds, cleared when the connection leaves the slot.
    active: AtomicBool,
}

/// Handle for running statements inside the manager's active transaction.
pub struct Transaction<'m, A: ConnectionAdapter> {
    manager: &'m TransactionManager<A>,
}

impl<A: ConnectionAdapter> TransactionManager<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        TransactionManager {
            adapter,
            slot: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// True between a successful `begin` and the end of its commit or rollback. A statement
    /// in flight does not change it.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Acquire a connection and start a transaction.
    pub async fn begin(&self) -> Result<Transaction<'_, A>, PersistError> {
        let mut slot = self.slot.try_lock().map_err(|_| already_active())?;
        if slot.is_some() {
            return Err(already_active());
        }
        let mut conn = self.adapter.acquire().await?;
        if let Err(e) = conn.begin_transaction().await {
            self.adapter.release(conn).await;
            return Err(e);
        }
        tracing::debug!("transaction started");
        *slot = Some(conn);
        self.active.store(true, Ordering::Release);
        Ok(Transaction { manager: self })
    }

    /// Handle to the current transaction. Statements through it fail if none is active.
    pub fn transaction(&self) -> Transaction<'_, A> {
        Transaction { manager: self }
    }

    pub async fn commit(&self) -> Result<(), PersistError> {
        let mut slot = self.slot.lock().await;
        let mut conn = slot.take().ok_or_else(not_active)?;
        self.active.store(false, Ordering::Release);
        let result = conn.commit().await;
        self.adapter.release(conn).await;
        tracing::debug!(ok = result.is_ok(), "transaction committed");
        result
    }

    pub async fn rollback(&self) -> Result<(), PersistError> {
        let mut slot = self.slot.lock().await;
        let mut conn = slot.take().ok_or_else(not_active)?;
        self.active.store(false, Ordering::Release);
        let result = conn.rollback().await;
        self.adapter.release(conn).await;
        tracing::debug!(ok = result.is_ok(), "transaction rolled back");
        result
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`, on a failed
    /// commit, or on panic. The connection is released exactly once either way.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T, PersistError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t Transaction<'t, A>) -> BoxFuture<'t, Result<T, PersistError>> + Send,
    {
        let tx = self.begin().await?;
        let outcome = AssertUnwindSafe(f(&tx)).catch_unwind().await;
        match outcome {
            Ok(result) => self.complete(result).await,
            Err(panic) => {
                let _ = self
                    .complete::<T>(Err(PersistError::TransactionState(
                        "transaction body panicked".into(),
                    )))
                    .await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn complete<T>(&self, outcome: Result<T, PersistError>) -> Result<T, PersistError> {
        let mut slot = self.slot.lock().await;
        let mut conn = slot.take().ok_or_else(not_active)?;
        self.active.store(false, Ordering::Release);
        let result = match outcome {
            Ok(v) => match conn.commit().await {
                Ok(()) => {
                    tracing::debug!("transaction committed");
                    Ok(v)
                }
                Err(e) => Err(rollback_after(&mut conn, e).await),
            },
            Err(e) => Err(rollback_after(&mut conn, e).await),
        };
        self.adapter.release(conn).await;
        result
    }
}

/// Roll back after `original`; a rollback failure is reported together with it.
async fn rollback_after<C: Connection>(conn: &mut C, original: PersistError) -> PersistError {
    match conn.rollback().await {
        Ok(()) => {
            tracing::debug!(error = %original, "transaction rolled back");
            original
        }
        Err(rollback) => {
            tracing::error!(error = %original, rollback_error = %rollback, "rollback failed");
            PersistError::RollbackFailed {
                original: Box::new(original),
                rollback: Box::new(rollback),
            }
        }
    }
}

impl<A: ConnectionAdapter> Drop for TransactionManager<A> {
    fn drop(&mut self) {
        if self.slot.get_mut().is_some() {
            tracing::warn!("transaction manager dropped with an open transaction; connection discarded");
        }
    }
}

#[async_trait]
impl<'m, A: ConnectionAdapter> Executor for Transaction<'m, A> {
    async fn execute(&self, query: &QueryBuf) -> Result<Executed, PersistError> {
        let mut slot = self.manager.slot.lock().await;
        slot.as_mut().ok_or_else(not_active)?.execute(query).await
    }

    async fn fetch_one(&self, query: &QueryBuf) -> Result<Option<Row>, PersistError> {
        let mut slot = self.manager.slot.lock().await;
        slot.as_mut().ok_or_else(not_active)?.fetch_one(query).await
    }

    async fn fetch_all(&self, query: &QueryBuf) -> Result<Vec<Row>, PersistError> {
        let mut slot = self.manager.slot.lock().await;
        slot.as_mut().ok_or_else(not_active)?.fetch_all(query).await
    }
}
