//! The generic block scheduler (spec.md section 4.5), grounded on
//! `analyzer/block.blockBasedAnalyzer`: a `BlockProcessor` is driven over a
//! height range, coordinating exclusively through `ProcessedBlockRecord`
//! rows guarded by a well-known advisory lock.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use indexer_config::AnalyzerMode;
use indexer_primitives::{BlockRange, Height, IndexerError};
use indexer_storage::{Sink, SinkError};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffController;

/// Advisory lock id serializing the batch-picking query across instances
/// (spec.md section 4.5 step 2).
pub const BATCH_PICK_LOCK_ID: i64 = 1001;

const BACKOFF_MIN: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(6);

/// Per-block processing timeout (spec.md section 4.5 step 4).
pub const PROCESS_BLOCK_TIMEOUT: Duration = Duration::from_secs(indexer_config::PROCESS_BLOCK_TIMEOUT_SECS);

const SQL_PICK_AND_LOCK_BLOCKS: &str = "pick_and_lock_blocks";
const SQL_UNLOCK_BLOCK: &str = "unlock_block";
const SQL_FIRST_UNPROCESSED_HEIGHT: &str = "first_unprocessed_height";

/// A processor driven by the scheduler, one height at a time. Implementors
/// are responsible for committing both their own data *and*
/// `processed_at = now()` inside the same sink transaction (spec.md section
/// 4.5: "processor must update its row... inside its own commit").
#[async_trait]
pub trait BlockProcessor<S: Sink>: Send + Sync {
    /// One-time setup run before the scheduling loop starts.
    async fn pre_work(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn process_block(&self, sink: &S, height: Height) -> Result<(), IndexerError>;
}

#[async_trait]
impl<S: Sink, T: BlockProcessor<S> + ?Sized> BlockProcessor<S> for Box<T> {
    async fn pre_work(&self) -> Result<(), IndexerError> {
        (**self).pre_work().await
    }
    async fn process_block(&self, sink: &S, height: Height) -> Result<(), IndexerError> {
        (**self).process_block(sink, height).await
    }
}

/// Drives one `BlockProcessor` over a height range in either `SlowSync` or
/// `FastSync` mode (spec.md section 4.5).
pub struct Scheduler<S: Sink, P: BlockProcessor<S>> {
    name: String,
    mode: AnalyzerMode,
    range: BlockRange,
    batch_size: u64,
    lock_expiry: Duration,
    sink: Arc<S>,
    processor: P,
    cancel: CancellationToken,
}

impl<S: Sink, P: BlockProcessor<S>> Scheduler<S, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        mode: AnalyzerMode,
        range: BlockRange,
        batch_size: u64,
        lock_expiry: Duration,
        sink: Arc<S>,
        processor: P,
        cancel: CancellationToken,
    ) -> Self {
        Self { name: name.into(), mode, range, batch_size, lock_expiry, sink, processor, cancel }
    }

    /// Run the scheduling loop to completion (cancellation or range exhaustion).
    pub async fn run(&self) -> Result<(), IndexerError> {
        self.processor.pre_work().await?;
        let mut backoff = BackoffController::new(BACKOFF_MIN, BACKOFF_MAX);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(analyzer = %self.name, "shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(backoff.timeout()) => {}
            }

            info!(analyzer = %self.name, from = self.range.from, to = ?self.range.to, "picking a batch of heights");
            let heights = match self.fetch_batch().await {
                Ok(h) => h,
                Err(err) => {
                    warn!(analyzer = %self.name, error = %err, "failed to pick a batch");
                    backoff.failure();
                    continue;
                }
            };

            if heights.is_empty() {
                backoff.failure();
                if self.range_exhausted().await {
                    info!(analyzer = %self.name, "finished processing the configured range");
                    return Ok(());
                }
                continue;
            }

            debug!(analyzer = %self.name, count = heights.len(), "picked heights for processing");
            let batch_deadline = Instant::now() + self.lock_expiry;

            for height in heights {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                // Step 6: refresh the batch once its lock window can no
                // longer fit another full processing timeout.
                if Instant::now() + PROCESS_BLOCK_TIMEOUT >= batch_deadline {
                    debug!(analyzer = %self.name, "batch lock nearing expiry; refreshing batch");
                    break;
                }

                // SlowSync is (by construction) the sole instance running;
                // pacing every height through the backoff timer keeps it
                // from hammering a node that's still catching up to tip.
                if self.mode == AnalyzerMode::SlowSync {
                    tokio::select! {
                        _ = tokio::time::sleep(backoff.timeout()) => {}
                        _ = self.cancel.cancelled() => return Ok(()),
                    }
                }

                info!(analyzer = %self.name, height, "processing height");
                let outcome =
                    tokio::time::timeout(PROCESS_BLOCK_TIMEOUT, self.processor.process_block(&self.sink, height))
                        .await;

                match outcome {
                    Ok(Ok(())) => {
                        backoff.success();
                        info!(analyzer = %self.name, height, "processed height");
                    }
                    Ok(Err(err)) => {
                        backoff.failure();
                        self.handle_failure(height, &err).await;
                        if self.mode == AnalyzerMode::SlowSync {
                            break;
                        }
                    }
                    Err(_elapsed) => {
                        backoff.failure();
                        let err = IndexerError::Transient("process_block timed out".to_string());
                        self.handle_failure(height, &err).await;
                        if self.mode == AnalyzerMode::SlowSync {
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_failure(&self, height: Height, err: &IndexerError) {
        match err {
            IndexerError::OutOfRange(msg) => {
                info!(analyzer = %self.name, height, %msg, "no data available yet; will retry");
            }
            other => {
                warn!(analyzer = %self.name, height, error = %other, "error processing height");
            }
        }
        // SlowSync retains the lock so ordering is preserved on the next
        // pass; FastSync releases it immediately so another worker (or a
        // later pass of this one) can retry sooner.
        if self.mode == AnalyzerMode::FastSync {
            self.unlock(height).await;
        }
    }

    async fn fetch_batch(&self) -> Result<Vec<Height>, IndexerError> {
        let mut tx = self.sink.begin().await.map_err(sink_to_indexer_error)?;
        if let Err(err) = self.sink.take_transaction_lock(&mut tx, BATCH_PICK_LOCK_ID).await {
            let _ = self.sink.rollback(tx).await;
            return Err(sink_to_indexer_error(err));
        }

        let lock_minutes = match self.mode {
            AnalyzerMode::SlowSync => 0,
            AnalyzerMode::FastSync => (self.lock_expiry.as_secs() / 60) as i64,
        };
        let to = self.range.to.unwrap_or(Height::MAX);
        let args = vec![
            Value::from(self.name.clone()),
            Value::from(self.range.from),
            Value::from(to),
            Value::from(lock_minutes),
            Value::from(self.batch_size),
        ];

        let rows = match self.sink.query(&tx, SQL_PICK_AND_LOCK_BLOCKS, &args).await {
            Ok(rows) => rows,
            Err(err) => {
                let _ = self.sink.rollback(tx).await;
                return Err(sink_to_indexer_error(err));
            }
        };
        self.sink.commit(tx).await.map_err(sink_to_indexer_error)?;

        Ok(rows.iter().filter_map(|row| row.get("height").and_then(Value::as_u64)).collect())
    }

    async fn unlock(&self, height: Height) {
        let Ok(mut tx) = self.sink.begin().await else { return };
        let args = vec![Value::from(self.name.clone()), Value::from(height)];
        if self.sink.send_batch(&mut tx, unlock_batch(&args)).await.is_ok() {
            let _ = self.sink.commit(tx).await;
        } else {
            let _ = self.sink.rollback(tx).await;
        }
    }

    async fn range_exhausted(&self) -> bool {
        if self.range.to.is_none() {
            return false;
        }
        let Ok(tx) = self.sink.begin().await else { return false };
        let args = vec![Value::from(self.name.clone())];
        let result = self.sink.query_row(&tx, SQL_FIRST_UNPROCESSED_HEIGHT, &args).await;
        let _ = self.sink.rollback(tx).await;
        match result {
            Ok(row) => {
                row.get("height").and_then(Value::as_u64).map(|h| self.range.exhausted_at(h)).unwrap_or(false)
            }
            Err(SinkError::NoRows) => true,
            Err(_) => false,
        }
    }
}

fn unlock_batch(args: &[Value]) -> indexer_storage::QueryBatch {
    let mut batch = indexer_storage::QueryBatch::new();
    batch.queue(SQL_UNLOCK_BLOCK, args.to_vec());
    batch
}

fn sink_to_indexer_error(err: SinkError) -> IndexerError {
    IndexerError::Transient(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicU64, Ordering},
    };

    use parking_lot::Mutex;

    use super::*;

    /// A minimal scheduling-only `Sink` test double: just enough
    /// `processed_block`-table semantics for the scheduler's control flow,
    /// keyed by the literal SQL tags this module uses.
    #[derive(Default)]
    struct FakeSchedulingSink {
        next_tx: AtomicU64,
        processed: Mutex<BTreeMap<Height, bool>>,
        unprocessed_range: Mutex<(Height, Height)>,
    }

    struct FakeTx(u64);

    #[async_trait]
    impl Sink for FakeSchedulingSink {
        type Tx = FakeTx;

        async fn begin(&self) -> Result<Self::Tx, SinkError> {
            Ok(FakeTx(self.next_tx.fetch_add(1, Ordering::SeqCst)))
        }
        async fn commit(&self, _tx: Self::Tx) -> Result<(), SinkError> {
            Ok(())
        }
        async fn rollback(&self, _tx: Self::Tx) -> Result<(), SinkError> {
            Ok(())
        }
        async fn send_batch(
            &self,
            _tx: &mut Self::Tx,
            batch: indexer_storage::QueryBatch,
        ) -> Result<(), SinkError> {
            for (sql, args) in batch.statements() {
                if sql == SQL_UNLOCK_BLOCK {
                    if let Some(h) = args.get(1).and_then(Value::as_u64) {
                        self.processed.lock().remove(&h);
                    }
                }
            }
            Ok(())
        }
        async fn query(
            &self,
            _tx: &Self::Tx,
            sql: &str,
            args: &[Value],
        ) -> Result<Vec<indexer_storage::Row>, SinkError> {
            if sql == SQL_PICK_AND_LOCK_BLOCKS {
                let from = args[1].as_u64().unwrap();
                let to = args[2].as_u64().unwrap();
                let batch_size = args[4].as_u64().unwrap();
                let mut processed = self.processed.lock();
                let mut out = Vec::new();
                let mut h = from;
                while h <= to && (out.len() as u64) < batch_size {
                    if !processed.contains_key(&h) {
                        processed.insert(h, false);
                        let mut row = BTreeMap::new();
                        row.insert("height".to_string(), Value::from(h));
                        out.push(indexer_storage::Row(row));
                    }
                    h += 1;
                }
                return Ok(out);
            }
            Ok(Vec::new())
        }
        async fn query_row(
            &self,
            _tx: &Self::Tx,
            sql: &str,
            _args: &[Value],
        ) -> Result<indexer_storage::Row, SinkError> {
            if sql == SQL_FIRST_UNPROCESSED_HEIGHT {
                let processed = self.processed.lock();
                let first = processed.iter().find(|(_, done)| !**done).map(|(h, _)| *h);
                return match first {
                    Some(h) => {
                        let mut row = BTreeMap::new();
                        row.insert("height".to_string(), Value::from(h));
                        Ok(indexer_storage::Row(row))
                    }
                    None => {
                        let (_, to) = *self.unprocessed_range.lock();
                        let mut row = BTreeMap::new();
                        row.insert("height".to_string(), Value::from(to + 1));
                        Ok(indexer_storage::Row(row))
                    }
                };
            }
            Err(SinkError::NoRows)
        }
        async fn take_transaction_lock(&self, _tx: &mut Self::Tx, _id: i64) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct CountingProcessor {
        calls: AtomicU64,
        fail_heights: Vec<Height>,
    }

    #[async_trait]
    impl BlockProcessor<FakeSchedulingSink> for CountingProcessor {
        async fn process_block(&self, sink: &FakeSchedulingSink, height: Height) -> Result<(), IndexerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_heights.contains(&height) {
                return Err(IndexerError::Transient("synthetic failure".to_string()));
            }
            sink.processed.lock().insert(height, true);
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_sync_processes_the_whole_range_and_exits() {
        let sink = Arc::new(FakeSchedulingSink::default());
        *sink.unprocessed_range.lock() = (0, 4);
        let processor = CountingProcessor { calls: AtomicU64::new(0), fail_heights: vec![] };
        let scheduler = Scheduler::new(
            "test-consensus",
            AnalyzerMode::SlowSync,
            BlockRange { from: 0, to: Some(4) },
            10,
            Duration::from_secs(300),
            sink.clone(),
            processor,
            CancellationToken::new(),
        );
        scheduler.run().await.unwrap();
        assert_eq!(sink.processed.lock().len(), 5);
        assert!(sink.processed.lock().values().all(|done| *done));
    }

    struct FlakyProcessor {
        attempted: Mutex<BTreeMap<Height, u32>>,
    }

    #[async_trait]
    impl BlockProcessor<FakeSchedulingSink> for FlakyProcessor {
        async fn process_block(&self, sink: &FakeSchedulingSink, height: Height) -> Result<(), IndexerError> {
            let mut attempted = self.attempted.lock();
            let count = attempted.entry(height).or_insert(0);
            *count += 1;
            if *count == 1 && height == 2 {
                return Err(IndexerError::Transient("flaky".to_string()));
            }
            sink.processed.lock().insert(height, true);
            Ok(())
        }
    }

    #[tokio::test]
    async fn fast_sync_retries_a_failed_height_after_unlocking_it() {
        let sink = Arc::new(FakeSchedulingSink::default());
        *sink.unprocessed_range.lock() = (0, 4);
        let processor = FlakyProcessor { attempted: Mutex::new(BTreeMap::new()) };
        let scheduler = Scheduler::new(
            "test-consensus",
            AnalyzerMode::FastSync,
            BlockRange { from: 0, to: Some(4) },
            10,
            Duration::from_secs(300),
            sink.clone(),
            processor,
            CancellationToken::new(),
        );
        scheduler.run().await.unwrap();
        assert_eq!(sink.processed.lock().len(), 5);
        assert!(sink.processed.lock().values().all(|done| *done));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let sink = Arc::new(FakeSchedulingSink::default());
        *sink.unprocessed_range.lock() = (0, 100);
        let processor = CountingProcessor { calls: AtomicU64::new(0), fail_heights: vec![] };
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            "test-consensus",
            AnalyzerMode::FastSync,
            BlockRange { from: 0, to: None },
            5,
            Duration::from_secs(300),
            sink,
            processor,
            cancel.clone(),
        );
        cancel.cancel();
        scheduler.run().await.unwrap();
    }
}
