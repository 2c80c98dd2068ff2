//! Consensus-layer event types (spec.md section 4.6).
//!
//! The consensus extractor is the structural (and much simpler) twin of the
//! runtime extractor: it buckets a height's events by kind instead of
//! decoding EVM logs, and has no dead-reckoning to perform.

use serde::{Deserialize, Serialize};

use crate::{address::Address, height::Height};

/// A staking transfer event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount, as a base-10 string.
    pub amount: String,
}

/// A staking burn event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    /// Account whose balance was burned.
    pub owner: Address,
    /// Amount burned.
    pub amount: String,
}

/// An escrow (delegation) lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// Stake added to an escrow account.
    Add { owner: Address, escrow: Address, amount: String },
    /// Stake removed (reclaimed) from an escrow account.
    Take { owner: Address, amount: String },
    /// Debonding started for a reclaim request.
    DebondingStart { owner: Address, escrow: Address, amount: String },
    /// An allowance for `beneficiary` to spend from `owner`'s escrow changed.
    AllowanceChange { owner: Address, beneficiary: Address, allowance: String },
}

/// One raw staking-module event, as a node reports it (spec.md section 4.6;
/// grounded on `nodeapi.Event`'s staking union, which carries transfers,
/// burns, and every escrow lifecycle event as sibling optional fields).
/// The consensus extractor sorts these into [`ConsensusEventBuckets`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingEvent {
    Transfer(TransferEvent),
    Burn(BurnEvent),
    AddEscrow { owner: Address, escrow: Address, amount: String },
    TakeEscrow { owner: Address, amount: String },
    DebondingStart { owner: Address, escrow: Address, amount: String },
    AllowanceChange { owner: Address, beneficiary: Address, allowance: String },
}

/// A registry event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// An entity was (re-)registered.
    EntityRegistered { entity_id: String },
    /// A node was (re-)registered.
    NodeRegistered { node_id: String },
    /// A runtime was (re-)registered.
    RuntimeRegistered { runtime_id: String },
    /// A node was unfrozen after a slashing event.
    NodeUnfrozen { node_id: String },
    /// A runtime resumed after being suspended.
    RuntimeStarted { runtime_id: String },
    /// A runtime was suspended (e.g. for insufficient stake).
    RuntimeSuspended { runtime_id: String },
}

/// A governance event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceEvent {
    /// A new proposal was submitted.
    ProposalSubmitted {
        proposal_id: u64,
        /// Full proposal body, attached via a follow-up `GetProposal` call.
        proposal: Option<ProposalBody>,
    },
    /// A proposal was executed.
    ProposalExecuted { proposal_id: u64 },
    /// A proposal reached a final state.
    ProposalFinalized {
        proposal_id: u64,
        /// Full proposal body, attached via a follow-up `GetProposal` call.
        proposal: Option<ProposalBody>,
    },
    /// A vote was cast.
    Vote { proposal_id: u64, submitter: Address, vote: String },
}

/// A governance proposal's full body, fetched via `GetProposal(height, id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalBody {
    /// Proposal identifier.
    pub id: u64,
    /// Submitting account.
    pub submitter: Address,
    /// Current state, e.g. `"active"`, `"passed"`, `"rejected"`.
    pub state: String,
}

/// A roothash (runtime-commitment) event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoothashEvent {
    /// The runtime this event concerns.
    pub runtime_id: String,
    /// Kind tag, e.g. `"executor_error"`, `"finalized"`.
    pub kind: String,
}

/// Events from one consensus height, bucketed by kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusEventBuckets {
    pub transfers: Vec<TransferEvent>,
    pub burns: Vec<BurnEvent>,
    pub escrow: Vec<EscrowEvent>,
    pub registry: Vec<RegistryEvent>,
    pub governance: Vec<GovernanceEvent>,
    pub roothash: Vec<RoothashEvent>,
}

/// The consensus-layer analogue of [`crate::changeset::ChangeSet`]: everything
/// derived from a single consensus height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusChangeSet {
    /// The height this change set covers.
    pub height: Height,
    /// Number of transactions in the block.
    pub num_transactions: u32,
    /// Bucketed events.
    pub events: ConsensusEventBuckets,
}
