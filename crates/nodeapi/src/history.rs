//! Routes a height/round to the era adapter responsible for it (spec.md
//! section 4.3), grounded on the original `HistoryConsensusApiLite`: a map of
//! archive name to constructed adapter, looked up by locating the history
//! record whose range covers the requested height/round.
//!
//! A request below the earliest configured record's `from_height` fails with
//! [`HistoryError::NoEra`]; a request whose covering record names an archive
//! with no adapter constructed for it (no matching node endpoint configured)
//! fails with [`HistoryError::EraMissing`]. `HeightLatest` (height 0) always
//! routes to the most recently configured era.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use indexer_primitives::{
    block::RuntimeBlockHeader,
    consensus::{GovernanceEvent, ProposalBody, RegistryEvent, RoothashEvent, StakingEvent},
    tx::TransactionWithResults,
    Address, Height, Round,
};

use crate::{
    consensus_api::{ConsensusApi, ConsensusBlock},
    error::{HistoryError, NodeApiError},
    runtime_api::{RawRuntimeEvent, RuntimeApi},
    types::{CommitteeInfo, Epoch, GenesisDocument, SimulateCallOutcome, ValidatorInfo},
};

/// Sentinel requesting the latest height/round, mirroring the upstream
/// node's own `HeightLatest = 0` convention.
pub const HEIGHT_LATEST: Height = 0;

/// One entry in the routing table: the archive's name and the first
/// height/round it is responsible for. Entries are kept sorted by
/// `from` ascending; the record covering a height is the last one whose
/// `from` does not exceed it.
#[derive(Clone, Debug)]
struct HistoryRecord {
    archive_name: String,
    from: Height,
}

/// Routes consensus-layer calls to the correct era adapter by height.
pub struct HistoryRouter<A> {
    records: Vec<HistoryRecord>,
    apis: BTreeMap<String, Arc<A>>,
}

impl<A> HistoryRouter<A> {
    /// `records` must be given oldest-first; `apis` maps archive name to a
    /// constructed adapter for every record with a configured node endpoint
    /// (records naming an archive absent from `apis` resolve to
    /// `EraMissing` lazily, only if a call actually lands on them).
    pub fn new(records: Vec<(String, Height)>, apis: BTreeMap<String, Arc<A>>) -> Self {
        let mut records: Vec<HistoryRecord> =
            records.into_iter().map(|(archive_name, from)| HistoryRecord { archive_name, from }).collect();
        records.sort_by_key(|r| r.from);
        Self { records, apis }
    }

    /// Resolve the adapter responsible for `height`. `HEIGHT_LATEST` always
    /// resolves to the most recently configured record.
    fn api_for_height(&self, height: Height) -> Result<&Arc<A>, HistoryError> {
        let record = if height == HEIGHT_LATEST {
            self.records.last()
        } else {
            self.records.iter().rev().find(|r| r.from <= height)
        }
        .ok_or(HistoryError::NoEra(height))?;

        self.apis.get(&record.archive_name).ok_or_else(|| HistoryError::EraMissing(record.archive_name.clone()))
    }
}

#[async_trait]
impl<A: ConsensusApi> ConsensusApi for HistoryRouter<A> {
    async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError> {
        self.api_for_height(HEIGHT_LATEST)?.get_genesis_document().await
    }

    async fn state_to_genesis(&self, height: Height) -> Result<GenesisDocument, NodeApiError> {
        self.api_for_height(height)?.state_to_genesis(height).await
    }

    async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
        self.api_for_height(height)?.get_block(height).await
    }

    async fn get_transactions_with_results(
        &self,
        height: Height,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        self.api_for_height(height)?.get_transactions_with_results(height).await
    }

    async fn get_epoch(&self, height: Height) -> Result<Epoch, NodeApiError> {
        self.api_for_height(height)?.get_epoch(height).await
    }

    async fn registry_events(&self, height: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
        self.api_for_height(height)?.registry_events(height).await
    }

    async fn staking_events(&self, height: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
        self.api_for_height(height)?.staking_events(height).await
    }

    async fn governance_events(&self, height: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
        self.api_for_height(height)?.governance_events(height).await
    }

    async fn roothash_events(&self, height: Height) -> Result<Vec<RoothashEvent>, NodeApiError> {
        self.api_for_height(height)?.roothash_events(height).await
    }

    async fn get_validators(&self, height: Height) -> Result<Vec<ValidatorInfo>, NodeApiError> {
        self.api_for_height(height)?.get_validators(height).await
    }

    async fn get_committees(
        &self,
        height: Height,
        runtime_id: &str,
    ) -> Result<Vec<CommitteeInfo>, NodeApiError> {
        self.api_for_height(height)?.get_committees(height, runtime_id).await
    }

    async fn get_proposal(&self, height: Height, id: u64) -> Result<ProposalBody, NodeApiError> {
        self.api_for_height(height)?.get_proposal(height, id).await
    }
}

#[async_trait]
impl<A: RuntimeApi> RuntimeApi for HistoryRouter<A> {
    async fn get_block_header(&self, round: Round) -> Result<RuntimeBlockHeader, NodeApiError> {
        self.api_for_height(round)?.get_block_header(round).await
    }

    async fn get_transactions_with_results(
        &self,
        round: Round,
    ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
        self.api_for_height(round)?.get_transactions_with_results(round).await
    }

    async fn get_events_raw(&self, round: Round) -> Result<Vec<RawRuntimeEvent>, NodeApiError> {
        self.api_for_height(round)?.get_events_raw(round).await
    }

    async fn get_native_balance(&self, round: Round, address: Address) -> Result<String, NodeApiError> {
        self.api_for_height(round)?.get_native_balance(round, address).await
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
        self.api_for_height(round)?
            .evm_simulate_call(round, gas_price, gas_limit, caller, address, value, data)
            .await
    }

    async fn evm_get_code(&self, round: Round, address: Address) -> Result<Vec<u8>, NodeApiError> {
        self.api_for_height(round)?.evm_get_code(round, address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{era::EraKind, types::SimulateCallRequest};
    use std::sync::Mutex;

    /// A fake adapter recording which archive it was constructed as, so
    /// tests can assert the router picked the right one.
    struct FakeAdapter {
        name: &'static str,
        calls: Mutex<Vec<Height>>,
    }

    #[async_trait]
    impl ConsensusApi for FakeAdapter {
        async fn get_genesis_document(&self) -> Result<GenesisDocument, NodeApiError> {
            unimplemented!()
        }
        async fn state_to_genesis(&self, _h: Height) -> Result<GenesisDocument, NodeApiError> {
            unimplemented!()
        }
        async fn get_block(&self, height: Height) -> Result<ConsensusBlock, NodeApiError> {
            self.calls.lock().unwrap().push(height);
            Ok(ConsensusBlock { height, hash: indexer_primitives::Hash::ZERO, timestamp: 0 })
        }
        async fn get_transactions_with_results(
            &self,
            _h: Height,
        ) -> Result<Vec<TransactionWithResults>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_epoch(&self, _h: Height) -> Result<Epoch, NodeApiError> {
            Ok(0)
        }
        async fn registry_events(&self, _h: Height) -> Result<Vec<RegistryEvent>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn staking_events(&self, _h: Height) -> Result<Vec<StakingEvent>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn governance_events(&self, _h: Height) -> Result<Vec<GovernanceEvent>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn roothash_events(&self, _h: Height) -> Result<Vec<RoothashEvent>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_validators(&self, _h: Height) -> Result<Vec<ValidatorInfo>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_committees(
            &self,
            _h: Height,
            _r: &str,
        ) -> Result<Vec<CommitteeInfo>, NodeApiError> {
            Ok(Vec::new())
        }
        async fn get_proposal(&self, _h: Height, _id: u64) -> Result<ProposalBody, NodeApiError> {
            unimplemented!()
        }
    }

    fn router() -> HistoryRouter<FakeAdapter> {
        let mut apis = BTreeMap::new();
        apis.insert("cobalt".to_string(), Arc::new(FakeAdapter { name: "cobalt", calls: Mutex::new(vec![]) }));
        apis.insert("damask".to_string(), Arc::new(FakeAdapter { name: "damask", calls: Mutex::new(vec![]) }));
        HistoryRouter::new(vec![("cobalt".to_string(), 1), ("damask".to_string(), 8_048_956)], apis)
    }

    #[tokio::test]
    async fn routes_below_era_boundary_to_older_era() {
        let r = router();
        let block = r.get_block(100).await.unwrap();
        assert_eq!(block.height, 100);
        assert_eq!(r.api_for_height(100).unwrap().name, "cobalt");
    }

    #[tokio::test]
    async fn routes_above_boundary_to_newer_era() {
        let r = router();
        assert_eq!(r.api_for_height(9_000_000).unwrap().name, "damask");
    }

    #[tokio::test]
    async fn latest_routes_to_newest_era() {
        let r = router();
        assert_eq!(r.api_for_height(HEIGHT_LATEST).unwrap().name, "damask");
    }

    #[tokio::test]
    async fn height_before_first_era_is_no_era() {
        let mut apis = BTreeMap::new();
        apis.insert("damask".to_string(), Arc::new(FakeAdapter { name: "damask", calls: Mutex::new(vec![]) }));
        let r = HistoryRouter::new(vec![("damask".to_string(), 100)], apis);
        let err = r.api_for_height(50).unwrap_err();
        assert!(matches!(err, HistoryError::NoEra(50)));
    }

    #[tokio::test]
    async fn era_without_configured_node_is_era_missing() {
        let apis: BTreeMap<String, Arc<FakeAdapter>> = BTreeMap::new();
        let r = HistoryRouter::new(vec![("cobalt".to_string(), 1)], apis);
        let err = r.api_for_height(5).unwrap_err();
        assert!(matches!(err, HistoryError::EraMissing(name) if name == "cobalt"));
    }

    // Silence unused-import warnings for items only referenced to keep the
    // test module self-documenting about what a real wiring looks like.
    #[allow(dead_code)]
    fn _type_check(_: EraKind, _: SimulateCallRequest) {}
}
