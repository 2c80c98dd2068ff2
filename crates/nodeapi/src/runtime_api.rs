//! The runtime-layer capability set (spec.md section 4.2).

use async_trait::async_trait;
use indexer_primitives::{block::RuntimeBlockHeader, tx::TransactionWithResults, Address, Round};

use crate::{
    error::NodeApiError,
    types::SimulateCallOutcome,
};

/// A raw, non-transaction runtime event (spec.md section 3: events with zero
/// tx-hash are non-tx).
pub type RawRuntimeEvent = indexer_primitives::tx::RuntimeEvent;

/// The read-only runtime-layer capability set every era adapter implements
/// (spec.md section 4.2).
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    async fn get_block_header(&self, round: Round) -> Result<RuntimeBlockHeader, NodeApiError>;
    async fn get_transactions_with_results(
        &self,
        round: Round,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError>;
    async fn get_events_raw(&self, round: Round) -> Result<Vec<RawRuntimeEvent>, NodeApiError>;
    async fn get_native_balance(&self, round: Round, address: Address) -> Result<String, NodeApiError>;

    /// Deterministic failures (`Reverted`/`ExecutionFailed`) are returned as
    /// `Ok(SimulateCallOutcome::{Reverted,ExecutionFailed})`, not as `Err`, so
    /// that callers never retry them (spec.md section 4.2).
    #[allow(clippy::too_many_arguments)]
    async fn evm_simulate_call(
        &self,
        round: Round,
        gas_price: u128,
        gas_limit: u64,
        caller: Address,
        address: Address,
        value: &str,
        data: &[u8],
    ) -> Result<SimulateCallOutcome, NodeApiError>;

    async fn evm_get_code(&self, round: Round, address: Address) -> Result<Vec<u8>, NodeApiError>;
}

#[async_trait]
impl<A: RuntimeApi + ?Sized> RuntimeApi for std::sync::Arc<A> {
    async fn get_block_header(&self, round: Round) -> Result<RuntimeBlockHeader, NodeApiError> {
        (**self).get_block_header(round).await
    }
    async fn get_transactions_with_results(
        &self,
        round: Round,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        (**self).get_transactions_with_results(round).await
    }
    async fn get_events_raw(&self, round: Round) -> Result<Vec<RawRuntimeEvent>, NodeApiError> {
        (**self).get_events_raw(round).await
    }
    async fn get_native_balance(&self, round: Round, address: Address) -> Result<String, NodeApiError> {
        (**self).get_native_balance(round, address).await
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
        (**self).evm_simulate_call(round, gas_price, gas_limit, caller, address, value, data).await
    }
    async fn evm_get_code(&self, round: Round, address: Address) -> Result<Vec<u8>, NodeApiError> {
        (**self).evm_get_code(round, address).await
    }
}
