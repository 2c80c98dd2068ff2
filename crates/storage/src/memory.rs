//! An in-memory [`Sink`] for tests and the CLI's `--dry-run` mode. Commits
//! are visible to subsequent queries; rollbacks discard everything queued
//! since `begin`.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{QueryBatch, Row, Sink, SinkError};

/// A transaction handle for [`MemorySink`]. Carries its own statement log so
/// `send_batch` can be applied (and, on rollback, discarded) without ever
/// touching the sink's committed state.
pub struct MemoryTx {
    id: u64,
    locks_held: Vec<i64>,
    pending: Vec<(String, Vec<Value>)>,
}

/// A sink backed entirely by process memory. Every committed statement is
/// recorded verbatim (for test assertions); nothing is actually interpreted
/// as SQL.
#[derive(Default)]
pub struct MemorySink {
    next_tx_id: AtomicU64,
    locks: Mutex<BTreeSet<i64>>,
    committed: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All statements committed so far, in commit order. Intended for test
    /// assertions, not for serving `query`/`query_row`.
    pub fn committed_statements(&self) -> Vec<(String, Vec<Value>)> {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, SinkError> {
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx { id, locks_held: Vec::new(), pending: Vec::new() })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), SinkError> {
        self.committed.lock().extend(tx.pending);
        self.release_locks(&tx.locks_held);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), SinkError> {
        self.release_locks(&tx.locks_held);
        Ok(())
    }

    async fn send_batch(&self, tx: &mut Self::Tx, batch: QueryBatch) -> Result<(), SinkError> {
        tx.pending.extend(batch.statements().iter().cloned());
        Ok(())
    }

    async fn query(&self, _tx: &Self::Tx, _sql: &str, _args: &[Value]) -> Result<Vec<Row>, SinkError> {
        Ok(Vec::new())
    }

    async fn query_row(&self, _tx: &Self::Tx, _sql: &str, _args: &[Value]) -> Result<Row, SinkError> {
        Err(SinkError::NoRows)
    }

    async fn take_transaction_lock(&self, tx: &mut Self::Tx, id: i64) -> Result<(), SinkError> {
        let mut locks = self.locks.lock();
        if !locks.insert(id) {
            return Err(SinkError::LockContended(id));
        }
        tx.locks_held.push(id);
        Ok(())
    }
}

impl MemorySink {
    fn release_locks(&self, ids: &[i64]) {
        let mut locks = self.locks.lock();
        for id in ids {
            locks.remove(id);
        }
    }
}

impl MemoryTx {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_makes_statements_visible() {
        let sink = MemorySink::new();
        let mut tx = sink.begin().await.unwrap();
        let mut batch = QueryBatch::new();
        batch.queue("insert into t values ($1)", vec![Value::from(1)]);
        sink.send_batch(&mut tx, batch).await.unwrap();
        sink.commit(tx).await.unwrap();
        assert_eq!(sink.committed_statements().len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_pending_statements() {
        let sink = MemorySink::new();
        let mut tx = sink.begin().await.unwrap();
        let mut batch = QueryBatch::new();
        batch.queue("insert into t values ($1)", vec![Value::from(1)]);
        sink.send_batch(&mut tx, batch).await.unwrap();
        sink.rollback(tx).await.unwrap();
        assert!(sink.committed_statements().is_empty());
    }

    #[tokio::test]
    async fn advisory_lock_is_exclusive_until_tx_ends() {
        let sink = MemorySink::new();
        let mut tx1 = sink.begin().await.unwrap();
        sink.take_transaction_lock(&mut tx1, 42).await.unwrap();

        let mut tx2 = sink.begin().await.unwrap();
        let err = sink.take_transaction_lock(&mut tx2, 42).await.unwrap_err();
        assert!(matches!(err, SinkError::LockContended(42)));

        sink.commit(tx1).await.unwrap();
        sink.take_transaction_lock(&mut tx2, 42).await.unwrap();
        sink.rollback(tx2).await.unwrap();
    }
}
