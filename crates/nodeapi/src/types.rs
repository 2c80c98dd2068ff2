//! Result types for node-API calls that are not already covered by
//! `indexer_primitives` (spec.md section 4.2).

use indexer_primitives::{Address, Height};
use serde::{Deserialize, Serialize};

/// The chain's genesis document. Only the fields the indexer actually needs
/// are modelled; everything else the node returns is out of scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisDocument {
    pub chain_id: String,
    pub genesis_height: Height,
}

/// A consensus epoch identifier.
pub type Epoch = u64;

/// A validator's identity and voting power at a given height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub node_id: String,
    pub voting_power: u64,
}

/// A single committee member's role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitteeInfo {
    pub runtime_id: String,
    pub kind: String,
    pub members: Vec<String>,
}

/// The outcome of `EVMSimulateCall` (spec.md section 4.2).
///
/// Deterministic failures (`Reverted`/`ExecutionFailed`) are distinguishable
/// from transport failures (which surface as `Err(NodeApiError::Transport)`)
/// and must never be retried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulateCallOutcome {
    /// The call succeeded, returning ABI-encoded output bytes.
    Success(Vec<u8>),
    /// The call reverted, with an optional human-readable reason.
    Reverted(Option<String>),
    /// The call failed during execution (not a revert), e.g. ran out of gas.
    ExecutionFailed(String),
}

/// A callable EVM simulation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulateCallRequest {
    pub gas_price: u128,
    pub gas_limit: u64,
    pub caller: Address,
    pub address: Address,
    pub value: String,
    pub data: Vec<u8>,
}
