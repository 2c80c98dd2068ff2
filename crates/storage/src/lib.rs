//! The abstract target sink the analyzer core depends on (spec.md section
//! 4.8), grounded on the original's `storage.TargetStorage`/`pgx`-backed
//! `postgres.Client`: `BeginTx`/`Commit`/`Rollback`, a `QueryBatch` of
//! `(statement, args)` pairs sent atomically, plain `Query`/`QueryRow` for
//! scheduler bookkeeping, and a `pg_advisory_xact_lock`-style per-tx lock.
//!
//! Mapping a [`indexer_primitives::changeset::ChangeSet`] into schema-specific
//! statements is out of scope here; only the contract "a single ChangeSet is
//! one atomic batch; failure leaves storage unchanged" is load-bearing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors a sink implementation may raise. Per spec.md section 7, a
/// `send_batch` failure must abort the transaction and leave storage
/// unchanged; callers (the scheduler) treat the height as unprocessed.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink connection error: {0}")]
    Connection(String),
    #[error("sink query failed: {0}")]
    Query(String),
    #[error("advisory lock {0} is already held")]
    LockContended(i64),
    #[error("no row returned for query_row")]
    NoRows,
}

/// One statement and its positional arguments, queued for atomic execution.
#[derive(Clone, Debug, Default)]
pub struct QueryBatch {
    statements: Vec<(String, Vec<Value>)>,
}

impl QueryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `statement` with `args`, to run in order with every other
    /// queued statement inside the same [`Sink::send_batch`] call.
    pub fn queue(&mut self, statement: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.statements.push((statement.into(), args));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[(String, Vec<Value>)] {
        &self.statements
    }
}

/// A single result row, keyed by column name. Schema-agnostic: the sink
/// itself never interprets the values, only stores and returns them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(pub BTreeMap<String, Value>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }
}

/// The abstract sink interface (spec.md section 4.8). Implementors own
/// their own transaction handle type; the core only ever threads it back
/// through `commit`/`rollback`/`send_batch`/`query*`/`take_transaction_lock`.
#[async_trait]
pub trait Sink: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, SinkError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), SinkError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), SinkError>;

    /// Execute every statement in `batch` atomically within `tx`. A failure
    /// partway through leaves `tx`'s visible state exactly as before the
    /// call (the implementor is responsible for this, e.g. via a savepoint).
    async fn send_batch(&self, tx: &mut Self::Tx, batch: QueryBatch) -> Result<(), SinkError>;

    async fn query(&self, tx: &Self::Tx, sql: &str, args: &[Value]) -> Result<Vec<Row>, SinkError>;
    async fn query_row(&self, tx: &Self::Tx, sql: &str, args: &[Value]) -> Result<Row, SinkError>;

    /// Take an advisory lock scoped to `tx`'s lifetime, released
    /// automatically at `commit`/`rollback`. Used by the scheduler to make
    /// height leasing atomic without a long-lived row lock.
    async fn take_transaction_lock(&self, tx: &mut Self::Tx, id: i64) -> Result<(), SinkError>;
}

pub mod memory;
pub use memory::MemorySink;
