//! Errors specific to the node-API layer, converting into
//! [`indexer_primitives::IndexerError`] at the boundary.

use indexer_primitives::{DeterministicRpcFailure, IndexerError};
use thiserror::Error;

/// Errors raised while routing a call to an era-specific adapter (spec.md section 4.3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The requested height/round precedes the earliest configured era.
    #[error("no configured era covers height/round {0}")]
    NoEra(u64),
    /// The era that should handle this height/round has no configured endpoint.
    #[error("era {0:?} has no configured node endpoint")]
    EraMissing(String),
}

impl From<HistoryError> for IndexerError {
    fn from(e: HistoryError) -> Self {
        // Routing failures are a configuration problem, not a transient one:
        // no amount of retrying will make a missing era appear.
        IndexerError::Fatal(e.to_string())
    }
}

/// Errors raised by an era adapter's transport.
#[derive(Error, Debug)]
pub enum NodeApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Deterministic(#[from] DeterministicRpcFailure),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("cache error: {0}")]
    Cache(#[from] indexer_cache::CacheError),
    #[error("requested height/round not yet available: {0}")]
    OutOfRange(String),
}

impl From<NodeApiError> for IndexerError {
    fn from(e: NodeApiError) -> Self {
        match e {
            NodeApiError::OutOfRange(msg) => IndexerError::OutOfRange(msg),
            NodeApiError::Deterministic(d) => IndexerError::DeterministicRpc(d),
            NodeApiError::History(h) => h.into(),
            other => IndexerError::Transient(other.to_string()),
        }
    }
}
