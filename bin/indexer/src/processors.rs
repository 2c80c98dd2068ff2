//! Concrete [`BlockProcessor`] implementations wiring the consensus and
//! runtime extractors into the scheduler. Mapping a `ChangeSet` into
//! schema-specific statements is out of scope (spec.md section 1; see
//! `indexer-storage`'s doc comment), so both processors hand the sink a
//! single opaque JSON-serialized statement per height -- the seam a real
//! schema-aware writer would replace.

use async_trait::async_trait;
use indexer_analyzer::BlockProcessor;
use indexer_config::AnalyzerMode;
use indexer_consensus::ConsensusExtractor;
use indexer_nodeapi::{ConsensusApi, RuntimeApi};
use indexer_primitives::{block::ParatimeDescriptor, Height, IndexerError};
use indexer_storage::{QueryBatch, Sink};
use serde::Serialize;

const SQL_APPLY_CONSENSUS_CHANGESET: &str = "apply_consensus_changeset";
const SQL_APPLY_RUNTIME_CHANGESET: &str = "apply_runtime_changeset";

/// Drives [`ConsensusExtractor`] over one height per `process_block` call.
pub struct ConsensusProcessor<A> {
    api: A,
    mode: AnalyzerMode,
}

impl<A: ConsensusApi + Clone> ConsensusProcessor<A> {
    pub fn new(api: A, mode: AnalyzerMode) -> Self {
        Self { api, mode }
    }
}

#[async_trait]
impl<S: Sink, A: ConsensusApi + Clone> BlockProcessor<S> for ConsensusProcessor<A> {
    async fn process_block(&self, sink: &S, height: Height) -> Result<(), IndexerError> {
        let extractor = ConsensusExtractor::new(self.api.clone());
        let changeset = extractor.extract(height, self.mode).await?;
        apply(sink, SQL_APPLY_CONSENSUS_CHANGESET, &changeset).await
    }
}

/// Drives [`indexer_runtime::extract_round`] over one round per `process_block` call.
pub struct RuntimeProcessor<A> {
    api: A,
    paratime: ParatimeDescriptor,
}

impl<A: RuntimeApi + Clone> RuntimeProcessor<A> {
    pub fn new(api: A, paratime: ParatimeDescriptor) -> Self {
        Self { api, paratime }
    }
}

#[async_trait]
impl<S: Sink, A: RuntimeApi + Clone> BlockProcessor<S> for RuntimeProcessor<A> {
    async fn process_block(&self, sink: &S, round: Height) -> Result<(), IndexerError> {
        let (header, transactions, raw_events) = tokio::try_join!(
            self.api.get_block_header(round),
            self.api.get_transactions_with_results(round),
            self.api.get_events_raw(round),
        )
        .map_err(IndexerError::from)?;

        let changeset = indexer_runtime::extract_round(header, transactions, raw_events, &self.paratime);
        apply(sink, SQL_APPLY_RUNTIME_CHANGESET, &changeset).await
    }
}

async fn apply<S: Sink>(sink: &S, statement: &'static str, changeset: &impl Serialize) -> Result<(), IndexerError> {
    let mut tx = sink.begin().await.map_err(|e| IndexerError::Transient(e.to_string()))?;
    let mut batch = QueryBatch::new();
    batch.queue(statement, vec![serde_json::to_value(changeset).unwrap_or(serde_json::Value::Null)]);
    if let Err(err) = sink.send_batch(&mut tx, batch).await {
        let _ = sink.rollback(tx).await;
        return Err(IndexerError::Transient(err.to_string()));
    }
    sink.commit(tx).await.map_err(|e| IndexerError::Transient(e.to_string()))
}
