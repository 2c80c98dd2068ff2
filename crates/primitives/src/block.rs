//! Block headers for both layers.

use serde::{Deserialize, Serialize};

use crate::{hash::Hash, height::Round};

/// A runtime round's header (spec.md section 3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeBlockHeader {
    /// The round number.
    pub round: Round,
    /// This block's hash.
    pub hash: Hash,
    /// Unix timestamp (seconds) the block was produced at.
    pub timestamp: u64,
    /// Hash of the previous round's block.
    pub previous_hash: Hash,
    /// Root of the I/O tree (transactions and their results).
    pub io_root: Hash,
    /// Root of the application state tree after this round.
    pub state_root: Hash,
    /// Root of the outgoing-messages tree.
    pub messages_hash: Hash,
    /// Root of the incoming-messages tree.
    pub in_messages_hash: Hash,
}

/// Identifies a single ParaTime that the indexer tracks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParatimeDescriptor {
    /// Human-readable runtime name, e.g. `"emerald"` or `"sapphire"`.
    pub name: String,
    /// Hex-encoded 32-byte runtime identifier.
    pub runtime_id: String,
    /// Native token symbol for this runtime (used for dead-reckoned native deltas).
    pub native_denom: String,
}
