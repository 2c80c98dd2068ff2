//! The consensus-layer extractor (spec.md section 4.6).
//!
//! Fetches every event family for a consensus height concurrently, buckets
//! staking/governance events by kind, and follows up proposal submission and
//! finalization events with a `GetProposal` call to recover the full body --
//! grounded on `analyzer/consensus/data_fetch.go`'s `fetchAllData` and its
//! per-family `fetch*Data` helpers.

use indexer_config::AnalyzerMode;
use indexer_nodeapi::ConsensusApi;
use indexer_primitives::{
    consensus::{ConsensusChangeSet, ConsensusEventBuckets, GovernanceEvent, RegistryEvent, StakingEvent},
    error::IndexerError,
    Height,
};

/// Extracts a [`ConsensusChangeSet`] for a single height.
pub struct ConsensusExtractor<A> {
    api: A,
}

impl<A: ConsensusApi> ConsensusExtractor<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Fetch and bucket every event family for `height`.
    ///
    /// `mode` mirrors the original's `fastSync` flag: scheduler data
    /// (validators/committees) is a full snapshot, not an event stream, so
    /// slow-sync height-by-height replay would refetch the same snapshot
    /// over and over for no benefit -- the original skips it outright during
    /// fast sync. This extractor only ever buckets events, so there is no
    /// scheduler-snapshot analogue here; the flag is threaded through so a
    /// caller wiring in scheduler data later has the right seam.
    pub async fn extract(&self, height: Height, mode: AnalyzerMode) -> Result<ConsensusChangeSet, IndexerError> {
        let _ = mode; // reserved: see doc comment above.

        let (block, transactions, registry_events, staking_events, governance_events, roothash_events) = tokio::try_join!(
            self.api.get_block(height),
            self.api.get_transactions_with_results(height),
            self.api.registry_events(height),
            self.api.staking_events(height),
            self.api.governance_events(height),
            self.api.roothash_events(height),
        )
        .map_err(Into::<IndexerError>::into)?;

        let mut buckets = ConsensusEventBuckets::default();

        for event in registry_events {
            buckets.registry.push(event);
        }

        for event in staking_events {
            match event {
                StakingEvent::Transfer(t) => buckets.transfers.push(t),
                StakingEvent::Burn(b) => buckets.burns.push(b),
                StakingEvent::AddEscrow { owner, escrow, amount } => {
                    buckets.escrow.push(indexer_primitives::consensus::EscrowEvent::Add { owner, escrow, amount })
                }
                StakingEvent::TakeEscrow { owner, amount } => {
                    buckets.escrow.push(indexer_primitives::consensus::EscrowEvent::Take { owner, amount })
                }
                StakingEvent::DebondingStart { owner, escrow, amount } => buckets
                    .escrow
                    .push(indexer_primitives::consensus::EscrowEvent::DebondingStart { owner, escrow, amount }),
                StakingEvent::AllowanceChange { owner, beneficiary, allowance } => buckets.escrow.push(
                    indexer_primitives::consensus::EscrowEvent::AllowanceChange { owner, beneficiary, allowance },
                ),
            }
        }

        for event in governance_events {
            let resolved = self.resolve_proposal_body(height, event).await?;
            buckets.governance.push(resolved);
        }

        for event in roothash_events {
            buckets.roothash.push(event);
        }

        // `block` is fetched (and its presence validated via try_join! above)
        // for parity with the original's `consensusBlockData`, but this
        // extractor's output doesn't carry header fields yet -- only height
        // and event buckets. A future header-aware consumer plugs in here.
        let _ = block;

        Ok(ConsensusChangeSet { height, num_transactions: transactions.len() as u32, events: buckets })
    }

    /// Proposal submissions and finalizations carry only the event's own
    /// fields on the wire; the full proposal body is a separate follow-up
    /// call (`fetchGovernanceData`'s `cc.GetProposal`).
    async fn resolve_proposal_body(
        &self,
        height: Height,
        event: GovernanceEvent,
    ) -> Result<GovernanceEvent, IndexerError> {
        match event {
            GovernanceEvent::ProposalSubmitted { proposal_id, proposal: None } => {
                let body = self.api.get_proposal(height, proposal_id).await.map_err(Into::<IndexerError>::into)?;
                Ok(GovernanceEvent::ProposalSubmitted { proposal_id, proposal: Some(body) })
            }
            GovernanceEvent::ProposalFinalized { proposal_id, proposal: None } => {
                let body = self.api.get_proposal(height, proposal_id).await.map_err(Into::<IndexerError>::into)?;
                Ok(GovernanceEvent::ProposalFinalized { proposal_id, proposal: Some(body) })
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use indexer_nodeapi::{ConsensusBlock, NodeApiError};
    use indexer_primitives::consensus::{BurnEvent, ProposalBody, TransferEvent};

    struct FixtureApi;

    #[async_trait]
    impl ConsensusApi for FixtureApi {
        async fn get_genesis_document(
            &self,
        ) -> Result<indexer_nodeapi::types::GenesisDocument, NodeApiError> {
            unimplemented!()
        }
        async fn state_to_genesis(
            &self,
            _h: Height,
        ) -> Result<indexer_nodeapi::types::GenesisDocument, NodeApiError> {
            unimplemented!()
        }
        async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
            Ok(ConsensusBlock { height, hash: indexer_primitives::Hash::ZERO, timestamp: 1000 })
        }
        async fn get_transactions_with_results(
            &self,
            _h: Height,
        ) -> Result<Vec<indexer_primitives::tx::TransactionWithResults>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_epoch(&self, _h: Height) -> Result<u64, NodeApiError> {
            Ok(5)
        }
        async fn registry_events(&self, _h: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
            Ok(vec![RegistryEvent::NodeUnfrozen { node_id: "node-1".into() }])
        }
        async fn staking_events(&self, _h: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
            Ok(vec![
                StakingEvent::Transfer(TransferEvent {
                    from: indexer_primitives::Address::from_eth(&[1u8; 20]),
                    to: indexer_primitives::Address::from_eth(&[2u8; 20]),
                    amount: "100".into(),
                }),
                StakingEvent::Burn(BurnEvent { owner: indexer_primitives::Address::from_eth(&[1u8; 20]), amount: "5".into() }),
            ])
        }
        async fn governance_events(&self, _h: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
            Ok(vec![GovernanceEvent::ProposalSubmitted { proposal_id: 7, proposal: None }])
        }
        async fn roothash_events(&self, _h: Height) -> Result<Vec<indexer_primitives::consensus::RoothashEvent>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_validators(
            &self,
            _h: Height,
        ) -> Result<Vec<indexer_nodeapi::types::ValidatorInfo>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_committees(
            &self,
            _h: Height,
            _r: &str,
        ) -> Result<Vec<indexer_nodeapi::types::CommitteeInfo>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_proposal(&self, _h: Height, id: u64) -> Result<ProposalBody, NodeApiError> {
            Ok(ProposalBody { id, submitter: indexer_primitives::Address::from_eth(&[9u8; 20]), state: "active".into() })
        }
    }

    #[tokio::test]
    async fn buckets_events_by_kind() {
        let extractor = ConsensusExtractor::new(FixtureApi);
        let changeset = extractor.extract(123, AnalyzerMode::SlowSync).await.unwrap();
        assert_eq!(changeset.height, 123);
        assert_eq!(changeset.events.transfers.len(), 1);
        assert_eq!(changeset.events.burns.len(), 1);
        assert_eq!(changeset.events.registry.len(), 1);
    }

    #[tokio::test]
    async fn proposal_submission_gets_full_body_attached() {
        let extractor = ConsensusExtractor::new(FixtureApi);
        let changeset = extractor.extract(123, AnalyzerMode::SlowSync).await.unwrap();
        match &changeset.events.governance[0] {
            GovernanceEvent::ProposalSubmitted { proposal_id, proposal } => {
                assert_eq!(*proposal_id, 7);
                assert_eq!(proposal.as_ref().unwrap().state, "active");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
