//! The error taxonomy shared across the indexer (spec.md section 7).
//!
//! Individual crates are free to define their own `thiserror` enums for
//! crate-local detail (the way the teacher's own `reth-interfaces` crate
//! aggregates `BlockValidationError`, `ProviderError`, etc. into
//! `RethError`) and convert into [`IndexerError`] at the boundary between
//! a component and its caller.

use thiserror::Error;

/// Top-level error classification every component boundary converts into.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Transport, timeout, or node-temporarily-unavailable: retry with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// The requested height/round has not been produced yet. Behaves like
    /// [`IndexerError::Transient`] but is logged at `info` level and, in
    /// `SlowSync`, retains the lease rather than releasing it.
    #[error("requested height/round not yet available: {0}")]
    OutOfRange(String),

    /// A deterministic RPC failure (EVM revert, EVM execution failure, or a
    /// deterministic decode failure at the transport layer). Must never be
    /// retried.
    #[error("deterministic rpc failure: {0}")]
    DeterministicRpc(#[from] DeterministicRpcFailure),

    /// The on-chain input could not be decoded: undecodable transaction
    /// body or unknown call format. Extractors downgrade to a minimal
    /// record and continue instead of propagating this further; it exists
    /// to give that downgrade path a typed, loggable classification.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Configuration invalid, schema mismatch, or sink unavailable at
    /// startup. Aborts the analyzer that raised it.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl IndexerError {
    /// True if this error should pace retries rather than abort the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::OutOfRange(_))
    }
}

/// A deterministic failure surfaced by [`crate::Error`]-shaped EVM calls.
///
/// Distinguished from transport failures so callers know not to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeterministicRpcFailure {
    /// The EVM call reverted with an (optionally present) reason.
    #[error("reverted: {0:?}")]
    Reverted(Option<String>),
    /// The EVM call failed during execution (not a revert).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Convenience alias used throughout the indexer crates.
pub type Result<T> = std::result::Result<T, IndexerError>;
