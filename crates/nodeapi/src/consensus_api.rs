//! The consensus-layer capability set (spec.md section 4.2).

use async_trait::async_trait;
use indexer_primitives::{
    consensus::{GovernanceEvent, ProposalBody, RegistryEvent, RoothashEvent, StakingEvent},
    Height,
};

use crate::{
    error::NodeApiError,
    types::{CommitteeInfo, Epoch, GenesisDocument, ValidatorInfo},
};

/// A consensus-layer block header. Only the fields the extractor needs.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsensusBlock {
    pub height: Height,
    pub hash: indexer_primitives::Hash,
    pub timestamp: u64,
}

/// The read-only consensus-layer capability set every era adapter implements
/// (spec.md section 4.2). Adapters must preserve `{tx_hash, height, type_tag}`
/// on every event, even when an era predates a given event variant (in which
/// case unavailable fields get a documented neutral default).
#[async_trait]
pub trait ConsensusApi: Send + Sync {
    async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError>;
    async fn state_to_genesis(&self, height: Height) -> Result<GenesisDocument, NodeApiError>;
    async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError>;
    async fn get_transactions_with_results(
        &self,
        height: Height,
    ) -> Result<Vec<indexer_primitives::tx::TransactionWithResults>, NodeApiError>;
    async fn get_epoch(&self, height: Height) -> Result<Epoch, NodeApiError>;
    async fn registry_events(&self, height: Height) -> Result<Vec<RegistryEvent>, NodeApiError>;
    async fn staking_events(&self, height: Height) -> Result<Vec<StakingEvent>, NodeApiError>;
    async fn governance_events(&self, height: Height) -> Result<Vec<GovernanceEvent>, NodeApiError>;
    async fn roothash_events(&self, height: Height) -> Result<Vec<RoothashEvent>, NodeApiError>;
    async fn get_validators(&self, height: Height) -> Result<Vec<ValidatorInfo>, NodeApiError>;
    async fn get_committees(
        &self,
        height: Height,
        runtime_id: &str,
    ) -> Result<Vec<CommitteeInfo>, NodeApiError>;
    async fn get_proposal(&self, height: Height, id: u64) -> Result<ProposalBody, NodeApiError>;
}

#[async_trait]
impl<A: ConsensusApi + ?Sized> ConsensusApi for std::sync::Arc<A> {
    async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError> {
        (**self).get_genesis_document().await
    }
    async fn state_to_genesis(&self, height: Height) -> Result<GenesisDocument, NodeApiError> {
        (**self).state_to_genesis(height).await
    }
    async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
        (**self).get_block(height).await
    }
    async fn get_transactions_with_results(
        &self,
        height: Height,
    ) -> Result<Vec<indexer_primitives::tx::TransactionWithResults>, NodeApiError> {
        (**self).get_transactions_with_results(height).await
    }
    async fn get_epoch(&self, height: Height) -> Result<Epoch, NodeApiError> {
        (**self).get_epoch(height).await
    }
    async fn registry_events(&self, height: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
        (**self).registry_events(height).await
    }
    async fn staking_events(&self, height: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
        (**self).staking_events(height).await
    }
    async fn governance_events(&self, height: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
        (**self).governance_events(height).await
    }
    async fn roothash_events(&self, height: Height) -> Result<Vec<RoothashEvent>, NodeApiError> {
        (**self).roothash_events(height).await
    }
    async fn get_validators(&self, height: Height) -> Result<Vec<ValidatorInfo>, NodeApiError> {
        (**self).get_validators(height).await
    }
    async fn get_committees(
        &self,
        height: Height,
        runtime_id: &str,
    ) -> Result<Vec<CommitteeInfo>, NodeApiError> {
        (**self).get_committees(height, runtime_id).await
    }
    async fn get_proposal(&self, height: Height, id: u64) -> Result<ProposalBody, NodeApiError> {
        (**self).get_proposal(height, id).await
    }
}
