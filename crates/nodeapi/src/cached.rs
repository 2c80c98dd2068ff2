//! Wraps a [`ConsensusApi`]/[`RuntimeApi`] implementation with the persistent
//! response cache (spec.md section 4.1).
//!
//! Calls against a height/round that is still subject to re-org (the chain's
//! current tip and a small margin below it) are volatile and bypass the
//! cache; everything else is finalized and cacheable forever.

use async_trait::async_trait;
use indexer_cache::{cache_key, KvCache};
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
    types::{CommitteeInfo, Epoch, GenesisDocument, SimulateCallOutcome, ValidatorInfo},
};

/// How many blocks below the chain tip are still considered volatile
/// (subject to rollback) and therefore excluded from caching.
pub const VOLATILE_MARGIN: u64 = 10;

/// A cache-layering decorator around any era adapter.
pub struct CachedApi<A> {
    inner: A,
    cache: KvCache,
    tip: Height,
}

impl<A> CachedApi<A> {
    /// `tip` is the latest known height/round; calls at or above
    /// `tip.saturating_sub(VOLATILE_MARGIN)` are treated as volatile.
    pub fn new(inner: A, cache: KvCache, tip: Height) -> Self {
        Self { inner, cache, tip }
    }

    pub fn set_tip(&mut self, tip: Height) {
        self.tip = tip;
    }

    fn is_volatile(&self, height: Height) -> bool {
        height + VOLATILE_MARGIN > self.tip
    }
}

#[async_trait]
impl<A: ConsensusApi> ConsensusApi for CachedApi<A> {
    async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError> {
        // The genesis document never changes; always non-volatile.
        let key = cache_key("get_genesis_document", &());
        self.cache
            .get_or_compute(&key, false, || self.inner.get_genesis_document())
            .await
    }

    async fn state_to_genesis(&self, height: Height) -> Result<GenesisDocument, NodeApiError> {
        let key = cache_key("state_to_genesis", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.state_to_genesis(height))
            .await
    }

    async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
        let key = cache_key("get_block", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_block(height))
            .await
    }

    async fn get_transactions_with_results(
        &self,
        height: Height,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        let key = cache_key("consensus_get_transactions_with_results", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_transactions_with_results(height))
            .await
    }

    async fn get_epoch(&self, height: Height) -> Result<Epoch, NodeApiError> {
        let key = cache_key("get_epoch", &height);
        let volatile = self.is_volatile(height);
        self.cache.get_or_compute(&key, volatile, || self.inner.get_epoch(height)).await
    }

    async fn registry_events(&self, height: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
        let key = cache_key("registry_events", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.registry_events(height))
            .await
    }

    async fn staking_events(&self, height: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
        let key = cache_key("staking_events", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.staking_events(height))
            .await
    }

    async fn governance_events(&self, height: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
        let key = cache_key("governance_events", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.governance_events(height))
            .await
    }

    async fn roothash_events(&self, height: Height) -> Result<Vec<RoothashEvent>, NodeApiError> {
        let key = cache_key("roothash_events", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.roothash_events(height))
            .await
    }

    async fn get_validators(&self, height: Height) -> Result<Vec<ValidatorInfo>, NodeApiError> {
        let key = cache_key("get_validators", &height);
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_validators(height))
            .await
    }

    async fn get_committees(
        &self,
        height: Height,
        runtime_id: &str,
    ) -> Result<Vec<CommitteeInfo>, NodeApiError> {
        let key = cache_key("get_committees", &(height, runtime_id));
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_committees(height, runtime_id))
            .await
    }

    async fn get_proposal(&self, height: Height, id: u64) -> Result<ProposalBody, NodeApiError> {
        let key = cache_key("get_proposal", &(height, id));
        let volatile = self.is_volatile(height);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_proposal(height, id))
            .await
    }
}

#[async_trait]
impl<A: RuntimeApi> RuntimeApi for CachedApi<A> {
    async fn get_block_header(&self, round: Round) -> Result<RuntimeBlockHeader, NodeApiError> {
        let key = cache_key("get_block_header", &round);
        let volatile = self.is_volatile(round);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_block_header(round))
            .await
    }

    async fn get_transactions_with_results(
        &self,
        round: Round,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        let key = cache_key("runtime_get_transactions_with_results", &round);
        let volatile = self.is_volatile(round);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_transactions_with_results(round))
            .await
    }

    async fn get_events_raw(&self, round: Round) -> Result<Vec<RawRuntimeEvent>, NodeApiError> {
        let key = cache_key("get_events_raw", &round);
        let volatile = self.is_volatile(round);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.get_events_raw(round))
            .await
    }

    async fn get_native_balance(&self, round: Round, address: Address) -> Result<String, NodeApiError> {
        // Balances are a live projection, not an immutable wire response:
        // always volatile, never stored.
        let key = cache_key("get_native_balance", &(round, address));
        self.cache
            .get_or_compute(&key, true, || self.inner.get_native_balance(round, address))
            .await
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
        // Simulation results depend on caller-supplied gas parameters that
        // vary call to call; never worth caching.
        self.inner
            .evm_simulate_call(round, gas_price, gas_limit, caller, address, value, data)
            .await
    }

    async fn evm_get_code(&self, round: Round, address: Address) -> Result<Vec<u8>, NodeApiError> {
        let key = cache_key("evm_get_code", &(round, address));
        let volatile = self.is_volatile(round);
        self.cache
            .get_or_compute(&key, volatile, || self.inner.evm_get_code(round, address))
            .await
    }
}
