//! Configuration structs for the Oasis indexer (spec.md section 6).
//!
//! Loading — locating the file, merging environment overrides — is named an
//! external collaborator by spec.md ("configuration loading"); this crate
//! only defines the shape of a valid configuration and a boring
//! `from_toml_str` deserializer, mirroring how the teacher's own
//! `node/core/args` crate defines typed config/CLI args without being the
//! orchestrator that reads them off disk.

use std::collections::BTreeMap;

use indexer_primitives::{height::Height, Round};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The block-processing timeout wrapping one `ProcessBlock` call (spec.md section 4.5).
pub const PROCESS_BLOCK_TIMEOUT_SECS: u64 = 61;

/// Default batch size for an analyzer, if unspecified.
pub const DEFAULT_BATCH_SIZE: u64 = 1_000;

/// Default lock expiry, in minutes, for a leased height.
pub const DEFAULT_LOCK_EXPIRY_MINUTES: u64 = 5;

/// Top-level configuration (spec.md section 6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network identifier, e.g. `"mainnet"` or `"testnet"`.
    pub chain_name: String,
    /// Declares the ordered eras the history router dispatches across.
    pub history: HistoryConfig,
    /// Upstream node endpoints, keyed by archive name.
    pub nodes: BTreeMap<String, NodeConfig>,
    /// Persistent KV cache settings. Absent means "no cache, always hit the node".
    pub cache: Option<CacheConfig>,
    /// Whether analyzers should skip expensive startup reconciliation.
    #[serde(default)]
    pub fast_startup: bool,
    /// One entry per scheduler instance to run.
    pub analyzers: Vec<AnalyzerConfig>,
    /// Target sink connection settings.
    pub storage: StorageConfig,
}

impl Config {
    /// Parse a TOML document into a [`Config`].
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }

    /// Validate cross-field invariants that `serde` alone cannot express.
    ///
    /// Resolves the open question in spec.md section 9 ("if batch size > 50,
    /// lock may expire mid-batch is a documented constraint") by rejecting
    /// configurations where a full batch could not possibly finish inside its
    /// lock window, rather than silently tolerating it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for analyzer in &self.analyzers {
            let lock_expiry_secs = analyzer.lock_expiry_minutes.unwrap_or(DEFAULT_LOCK_EXPIRY_MINUTES) * 60;
            let max_batch = lock_expiry_secs / PROCESS_BLOCK_TIMEOUT_SECS;
            if analyzer.batch_size > max_batch {
                return Err(ConfigError::Invalid(format!(
                    "analyzer {:?}: batch_size {} cannot safely finish within its {}-minute lock window (max {max_batch})",
                    analyzer.name, analyzer.batch_size, lock_expiry_secs / 60,
                )));
            }
            if let Some(to) = analyzer.block_range.to {
                if to < analyzer.block_range.from {
                    return Err(ConfigError::Invalid(format!(
                        "analyzer {:?}: block_range.to < block_range.from",
                        analyzer.name
                    )));
                }
            }
        }
        if self.history.records.is_empty() {
            return Err(ConfigError::Invalid("history.records must not be empty".into()));
        }
        Ok(())
    }
}

/// Errors surfaced while loading or validating a [`Config`]. These are all
/// `IndexerError::Fatal` at the orchestrator boundary.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `history.records[]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub records: Vec<HistoryRecord>,
}

/// One era's configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The archive (upstream node) this era's calls route to.
    pub archive_name: String,
    /// Chain context / genesis hash this era signs with.
    pub chain_context: String,
    /// First consensus height this era is valid for.
    pub from_height: Height,
    /// Per-runtime starting round, for runtimes whose era boundary differs
    /// from the consensus height boundary.
    #[serde(default)]
    pub runtimes: Vec<RuntimeHistoryEntry>,
}

/// A single runtime's era starting round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeHistoryEntry {
    /// Runtime name, e.g. `"emerald"`.
    pub name: String,
    /// First round of this runtime that this era is valid for.
    pub from_round: Round,
}

/// `nodes{archive_name -> ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// gRPC/JSON-RPC endpoint for this archive.
    pub rpc_endpoint: String,
    /// Whether to use TLS when connecting.
    #[serde(default)]
    pub tls: bool,
}

/// `cache?`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory the embedded KV store lives in.
    pub dir: String,
    /// If `false` and the cache already has an answer, never contact the node
    /// even for a miss — effectively "replay only" mode.
    #[serde(default = "default_true")]
    pub query_on_cache_miss: bool,
}

fn default_true() -> bool {
    true
}

/// `analyzers[]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Unique analyzer name, used as the `ProcessedBlockRecord` namespace.
    pub name: String,
    /// Scheduling mode.
    pub mode: AnalyzerMode,
    /// Height/round range this analyzer is responsible for.
    pub block_range: indexer_primitives::BlockRange,
    /// Heights reserved per scheduling pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Minutes a lease on a height is held for (`FastSync` only).
    pub lock_expiry_minutes: Option<u64>,
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

/// Scheduling mode (spec.md section 4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerMode {
    /// Exactly one instance; ignores locks; strictly ascending commit order.
    SlowSync,
    /// Multiple instances; advisory-locked leases; no cross-height ordering.
    FastSync,
}

/// `storage`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sink connection string. The concrete driver is out of scope (spec.md section 1).
    pub connection_string: String,
    /// If `true`, wipe all indexer-owned tables before starting.
    #[serde(default)]
    pub wipe: bool,
    /// Path to migration sources. Running them is out of scope.
    pub migrations: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        chain_name = "mainnet"
        fast_startup = false

        [history]
        records = [
            { archive_name = "archive-a", chain_context = "ctx-a", from_height = 0 },
        ]

        [nodes.archive-a]
        rpc_endpoint = "https://node.example/rpc"

        [storage]
        connection_string = "postgres://localhost/nexus"
        migrations = "migrations/"

        [[analyzers]]
        name = "consensus"
        mode = "slow_sync"
        batch_size = 100
        [analyzers.block_range]
        from = 0
    "#;

    #[test]
    fn parses_sample_config() {
        let cfg = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.chain_name, "mainnet");
        assert_eq!(cfg.analyzers.len(), 1);
        assert_eq!(cfg.analyzers[0].mode, AnalyzerMode::SlowSync);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_batch_too_large_for_lock_window() {
        let mut cfg = Config::from_toml_str(SAMPLE).unwrap();
        cfg.analyzers[0].batch_size = 10_000;
        cfg.analyzers[0].lock_expiry_minutes = Some(1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_history() {
        let mut cfg = Config::from_toml_str(SAMPLE).unwrap();
        cfg.history.records.clear();
        assert!(cfg.validate().is_err());
    }
}
