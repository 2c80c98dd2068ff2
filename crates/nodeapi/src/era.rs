//! Era-specific adapters: each wraps the generic JSON-RPC transport and
//! translates wire responses into the indexer's internal type universe
//! (spec.md section 4.2).
//!
//! Where an event variant did not exist in an older era, the adapter returns
//! the variant with unavailable fields at a documented neutral default, and
//! older eras that never introduced a capability return an empty collection
//! rather than erroring.

use async_trait::async_trait;
use indexer_primitives::{
    block::RuntimeBlockHeader,
    consensus::{GovernanceEvent, ProposalBody, RegistryEvent, RoothashEvent, StakingEvent},
    tx::TransactionWithResults,
    Address, Height, Round,
};

use crate::{
    consensus_api::{ConsensusApi, ConsensusBlock},
    error::NodeApiError,
    runtime_api::{RawRuntimeEvent, RuntimeApi},
    transport::JsonRpcTransport,
    types::{CommitteeInfo, Epoch, GenesisDocument, SimulateCallOutcome, ValidatorInfo},
};

/// Which wire-protocol generation an adapter speaks. New eras are added here
/// as the chain evolves; the history router never needs to change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraKind {
    /// The earliest supported era. Predates governance and per-runtime events.
    Cobalt,
    /// Introduced governance events and the modern event envelope.
    Damask,
}

impl EraKind {
    /// Resolve an archive name (as configured in `history.records[].archive_name`)
    /// to the era generation it speaks.
    pub fn from_archive_name(name: &str) -> Option<Self> {
        match name {
            "cobalt" => Some(Self::Cobalt),
            "damask" => Some(Self::Damask),
            _ => None,
        }
    }

    /// Whether this era's wire protocol exposes governance events at all.
    fn supports_governance(self) -> bool {
        matches!(self, Self::Damask)
    }
}

/// An era adapter backed by a plain JSON-RPC transport.
pub struct GenericJsonRpcAdapter {
    era: EraKind,
    chain_context: String,
    transport: JsonRpcTransport,
}

impl GenericJsonRpcAdapter {
    pub fn new(era: EraKind, chain_context: impl Into<String>, transport: JsonRpcTransport) -> Self {
        Self { era, chain_context: chain_context.into(), transport }
    }

    /// The chain context (signature domain) this adapter was constructed
    /// with. Initialized once at construction and never mutated thereafter
    /// (spec.md section 9: "Global state (chain-context signature domain)").
    pub fn chain_context(&self) -> &str {
        &self.chain_context
    }
}

#[async_trait]
impl ConsensusApi for GenericJsonRpcAdapter {
    async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError> {
        self.transport.call("consensus_getGenesisDocument", ()).await
    }

    async fn state_to_genesis(&self, height: Height) -> Result<GenesisDocument, NodeApiError> {
        self.transport.call("consensus_stateToGenesis", [height]).await
    }

    async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
        self.transport.call("consensus_getBlock", [height]).await
    }

    async fn get_transactions_with_results(
        &self,
        height: Height,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        self.transport.call("consensus_getTransactionsWithResults", [height]).await
    }

    async fn get_epoch(&self, height: Height) -> Result<Epoch, NodeApiError> {
        self.transport.call("beacon_getEpoch", [height]).await
    }

    async fn registry_events(&self, height: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
        self.transport.call("registry_getEvents", [height]).await
    }

    async fn staking_events(&self, height: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
        self.transport.call("staking_getEvents", [height]).await
    }

    async fn governance_events(&self, height: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
        if !self.era.supports_governance() {
            // Neutral default: this era's wire protocol has no governance module.
            return Ok(Vec::new());
        }
        self.transport.call("governance_getEvents", [height]).await
    }

    async fn roothash_events(&self, height: Height) -> Result<Vec<RoothashEvent>, NodeApiError> {
        self.transport.call("roothash_getEvents", [height]).await
    }

    async fn get_validators(&self, height: Height) -> Result<Vec<ValidatorInfo>, NodeApiError> {
        self.transport.call("scheduler_getValidators", [height]).await
    }

    async fn get_committees(
        &self,
        height: Height,
        runtime_id: &str,
    ) -> Result<Vec<CommitteeInfo>, NodeApiError> {
        self.transport.call("scheduler_getCommittees", (height, runtime_id)).await
    }

    async fn get_proposal(&self, height: Height, id: u64) -> Result<ProposalBody, NodeApiError> {
        self.transport.call("governance_getProposal", (height, id)).await
    }
}

#[async_trait]
impl RuntimeApi for GenericJsonRpcAdapter {
    async fn get_block_header(&self, round: Round) -> Result<RuntimeBlockHeader, NodeApiError> {
        self.transport.call("runtime_getBlockHeader", [round]).await
    }

    async fn get_transactions_with_results(
        &self,
        round: Round,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        self.transport.call("runtime_getTransactionsWithResults", [round]).await
    }

    async fn get_events_raw(&self, round: Round) -> Result<Vec<RawRuntimeEvent>, NodeApiError> {
        self.transport.call("runtime_getEventsRaw", [round]).await
    }

    async fn get_native_balance(&self, round: Round, address: Address) -> Result<String, NodeApiError> {
        self.transport.call("runtime_getNativeBalance", (round, address.to_string())).await
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
        self.transport
            .call(
                "evm_simulateCall",
                (round, gas_price, gas_limit, caller.to_string(), address.to_string(), value, data),
            )
            .await
    }

    async fn evm_get_code(&self, round: Round, address: Address) -> Result<Vec<u8>, NodeApiError> {
        self.transport.call("evm_getCode", (round, address.to_string())).await
    }
}
