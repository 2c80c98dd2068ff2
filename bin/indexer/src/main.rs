//! CLI entry point for the Oasis indexer (spec.md section 6), grounded on
//! the teacher's own `bin/reth`: `clap`-derived subcommands, `eyre` for
//! top-level error context, `tracing-subscriber` for structured logging.

mod processors;

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use eyre::{eyre, Context, Result};
use indexer_analyzer::{BlockProcessor, Orchestrator};
use indexer_cache::KvCache;
use indexer_config::Config;
use indexer_nodeapi::{
    consensus_api::{ConsensusApi, ConsensusBlock},
    era::{EraKind, GenericJsonRpcAdapter},
    error::NodeApiError,
    history::{HistoryRouter, HEIGHT_LATEST},
    runtime_api::{RawRuntimeEvent, RuntimeApi},
    types::{CommitteeInfo, Epoch, GenesisDocument, SimulateCallOutcome, ValidatorInfo},
    CachedApi, JsonRpcTransport,
};
use indexer_primitives::{
    block::{ParatimeDescriptor, RuntimeBlockHeader},
    consensus::{GovernanceEvent, ProposalBody, RegistryEvent, RoothashEvent, StakingEvent},
    tx::TransactionWithResults,
    Address, Height, Round,
};
use indexer_storage::MemorySink;
use tracing_subscriber::EnvFilter;

/// Either a plain era adapter or one layered with the persistent response
/// cache (spec.md section 4.1, C1), chosen once at startup by whether
/// `config.cache` is present. A closed tagged union rather than a trait
/// object: `HistoryRouter` needs one concrete type implementing both
/// [`ConsensusApi`] and [`RuntimeApi`], and there are exactly two shapes.
enum RouterApi {
    Plain(GenericJsonRpcAdapter),
    Cached(CachedApi<GenericJsonRpcAdapter>),
}

#[async_trait]
impl ConsensusApi for RouterApi {
    async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_genesis_document().await,
            Self::Cached(a) => a.get_genesis_document().await,
        }
    }

    async fn state_to_genesis(&self, height: Height) -> Result<GenesisDocument, NodeApiError> {
        match self {
            Self::Plain(a) => a.state_to_genesis(height).await,
            Self::Cached(a) => a.state_to_genesis(height).await,
        }
    }

    async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_block(height).await,
            Self::Cached(a) => a.get_block(height).await,
        }
    }

    async fn get_transactions_with_results(&self, height: Height) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        match self {
            Self::Plain(a) => ConsensusApi::get_transactions_with_results(a, height).await,
            Self::Cached(a) => ConsensusApi::get_transactions_with_results(a, height).await,
        }
    }

    async fn get_epoch(&self, height: Height) -> Result<Epoch, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_epoch(height).await,
            Self::Cached(a) => a.get_epoch(height).await,
        }
    }

    async fn registry_events(&self, height: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
        match self {
            Self::Plain(a) => a.registry_events(height).await,
            Self::Cached(a) => a.registry_events(height).await,
        }
    }

    async fn staking_events(&self, height: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
        match self {
            Self::Plain(a) => a.staking_events(height).await,
            Self::Cached(a) => a.staking_events(height).await,
        }
    }

    async fn governance_events(&self, height: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
        match self {
            Self::Plain(a) => a.governance_events(height).await,
            Self::Cached(a) => a.governance_events(height).await,
        }
    }

    async fn roothash_events(&self, height: Height) -> Result<Vec<RoothashEvent>, NodeApiError> {
        match self {
            Self::Plain(a) => a.roothash_events(height).await,
            Self::Cached(a) => a.roothash_events(height).await,
        }
    }

    async fn get_validators(&self, height: Height) -> Result<Vec<ValidatorInfo>, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_validators(height).await,
            Self::Cached(a) => a.get_validators(height).await,
        }
    }

    async fn get_committees(&self, height: Height, runtime_id: &str) -> Result<Vec<CommitteeInfo>, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_committees(height, runtime_id).await,
            Self::Cached(a) => a.get_committees(height, runtime_id).await,
        }
    }

    async fn get_proposal(&self, height: Height, id: u64) -> Result<ProposalBody, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_proposal(height, id).await,
            Self::Cached(a) => a.get_proposal(height, id).await,
        }
    }
}

#[async_trait]
impl RuntimeApi for RouterApi {
    async fn get_block_header(&self, round: Round) -> Result<RuntimeBlockHeader, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_block_header(round).await,
            Self::Cached(a) => a.get_block_header(round).await,
        }
    }

    async fn get_transactions_with_results(&self, round: Round) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        match self {
            Self::Plain(a) => RuntimeApi::get_transactions_with_results(a, round).await,
            Self::Cached(a) => RuntimeApi::get_transactions_with_results(a, round).await,
        }
    }

    async fn get_events_raw(&self, round: Round) -> Result<Vec<RawRuntimeEvent>, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_events_raw(round).await,
            Self::Cached(a) => a.get_events_raw(round).await,
        }
    }

    async fn get_native_balance(&self, round: Round, address: Address) -> Result<String, NodeApiError> {
        match self {
            Self::Plain(a) => a.get_native_balance(round, address).await,
            Self::Cached(a) => a.get_native_balance(round, address).await,
        }
    }

    async fn evm_simulate_call(
        &self,
        round: Round,
        gas_price: u128,
        gas_limit: u64,
        caller: Address,
        address: Address,
        value: &str,
        data: &[u8],
    ) -> Result<SimulateCallOutcome, NodeApiError> {
        match self {
            Self::Plain(a) => a.evm_simulate_call(round, gas_price, gas_limit, caller, address, value, data).await,
            Self::Cached(a) => a.evm_simulate_call(round, gas_price, gas_limit, caller, address, value, data).await,
        }
    }

    async fn evm_get_code(&self, round: Round, address: Address) -> Result<Vec<u8>, NodeApiError> {
        match self {
            Self::Plain(a) => a.evm_get_code(round, address).await,
            Self::Cached(a) => a.evm_get_code(round, address).await,
        }
    }
}

#[derive(Parser)]
#[command(name = "indexer", about = "An Oasis Network indexer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured analyzer until cancelled (Ctrl-C) or its
    /// configured range is exhausted.
    Analyze {
        /// Path to a TOML configuration file (spec.md section 6).
        #[arg(long)]
        config: PathBuf,
    },
    /// Serve the HTTP query API. Out of scope for this build (spec.md section 1).
    Serve,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { config } => analyze(config).await,
        Command::Serve => Err(eyre!("the `serve` subcommand (HTTP query API) is out of scope for this build")),
    }
}

async fn analyze(config_path: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config file {}", config_path.display()))?;
    let config = Config::from_toml_str(&raw).context("parsing configuration")?;
    config.validate().context("validating configuration")?;

    // No concrete SQL driver is in scope (spec.md section 1); `analyze`
    // always runs against the in-memory sink, the same one `indexer-storage`
    // ships for tests and the documented `--dry-run` path.
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(sink.clone());

    let shutdown = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal, draining in-flight work");
            shutdown.cancel();
        }
    });

    let router = Arc::new(build_history_router(&config).await?);

    let mut processors: HashMap<String, Box<dyn BlockProcessor<MemorySink> + Send + Sync>> = HashMap::new();
    for analyzer in &config.analyzers {
        let boxed: Box<dyn BlockProcessor<MemorySink> + Send + Sync> = if analyzer.name == "consensus" {
            Box::new(processors::ConsensusProcessor::new(router.clone(), analyzer.mode))
        } else {
            let paratime = ParatimeDescriptor {
                name: analyzer.name.clone(),
                runtime_id: analyzer.name.clone(),
                native_denom: config.chain_name.clone(),
            };
            Box::new(processors::RuntimeProcessor::new(router.clone(), paratime))
        };
        processors.insert(analyzer.name.clone(), boxed);
    }

    orchestrator.run(config.analyzers.clone(), processors).await?;
    Ok(())
}

/// Builds one [`HistoryRouter`] shared by every analyzer. Every adapter
/// implements both `ConsensusApi` and `RuntimeApi`, so the router does too.
/// When `config.cache` is set, each adapter is layered with the persistent
/// response cache (spec.md section 4.1); the cache's notion of "tip" is
/// seeded with a single `get_block_header(HEIGHT_LATEST)` call per archive
/// so heights still subject to reorg aren't cached as final.
async fn build_history_router(config: &Config) -> Result<HistoryRouter<RouterApi>> {
    let cache = config
        .cache
        .as_ref()
        .map(|cache_cfg| KvCache::open(&cache_cfg.dir).context("opening persistent node-api cache"))
        .transpose()?;

    let mut apis = BTreeMap::new();
    for record in &config.history.records {
        let Some(node) = config.nodes.get(&record.archive_name) else { continue };
        let era = EraKind::from_archive_name(&record.archive_name)
            .ok_or_else(|| eyre!("unrecognized era for archive {:?}", record.archive_name))?;
        let transport = JsonRpcTransport::new(node.rpc_endpoint.clone());
        let adapter = GenericJsonRpcAdapter::new(era, record.chain_context.clone(), transport);

        let api = match &cache {
            Some(cache) => {
                let tip = adapter.get_block_header(HEIGHT_LATEST).await.map(|h| h.round).unwrap_or(0);
                RouterApi::Cached(CachedApi::new(adapter, cache.clone(), tip))
            }
            None => RouterApi::Plain(adapter),
        };
        apis.insert(record.archive_name.clone(), Arc::new(api));
    }
    let records = config.history.records.iter().map(|r| (r.archive_name.clone(), r.from_height)).collect();
    Ok(HistoryRouter::new(records, apis))
}
