//! The per-round `ChangeSet` (spec.md section 3): the complete, typed set of
//! mutations derived from a single round's inputs, produced exactly once and
//! consumed exactly once by the sink.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, PreimageSet},
    block::RuntimeBlockHeader,
    hash::Hash,
    tx::{Fee, SignerInfo},
};

/// One decoded ABI parameter from an EVM log or error payload.
///
/// `uint256`-and-larger values are rendered as decimal strings (spec.md
/// section 4.7 step 6) so JSON consumers do not silently lose precision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmAbiParam {
    /// Parameter name from the ABI, if named.
    pub name: String,
    /// Solidity type, e.g. `"address"`, `"uint256"`.
    pub evm_type: String,
    /// The value, rendered as a string (decimal for integers, `0x`-hex for bytes/addresses).
    pub value: String,
}

/// A fully decoded EVM log: its signature (first topic) and ABI parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmLogDecoded {
    /// The event's signature hash (first topic).
    pub signature: Hash,
    /// Decoded parameters in declaration order.
    pub params: Vec<EvmAbiParam>,
}

/// A Sapphire-style `CallEnvelopeX25519DeoxysII` (spec.md section 4.7, `evm.Call`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Caller's ephemeral x25519 public key.
    pub pk: Vec<u8>,
    /// Nonce used for the Deoxys-II AEAD.
    pub nonce: Vec<u8>,
    /// Encrypted call data.
    pub data: Vec<u8>,
}

/// The encrypted result envelope mirroring [`CallEnvelope`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Nonce used for the Deoxys-II AEAD.
    pub nonce: Vec<u8>,
    /// Encrypted result data, or a plaintext `FailedCallResult` if decryption was not needed.
    pub data: Vec<u8>,
}

/// A sanitized, typed transaction error (spec.md section 4.7.3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxError {
    /// Module that raised the error.
    pub module: String,
    /// Module-specific error code.
    pub code: u32,
    /// Human-readable message, if one could be derived. `None` means a later
    /// ABI-aware pass is needed to decode a custom EVM error type.
    pub message: Option<String>,
    /// The sanitized (but undecoded) raw message, always present when the node
    /// supplied one.
    pub raw_message: Option<String>,
}

/// A newly created EVM contract, recorded on a successful `evm.Create`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmContractCreated {
    /// The created contract's derived address.
    pub address: Address,
    /// The bytecode used to create the contract.
    pub creation_bytecode: Vec<u8>,
    /// Hash of the transaction that created it.
    pub creating_tx_hash: Hash,
}

/// Per-transaction normalized record (spec.md section 3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxChangeRecord {
    /// Position within the round.
    pub index: u32,
    /// `core_hash` of the raw transaction bytes.
    pub hash: Hash,
    /// `keccak256` of the raw body, present only for `evm.ethereum.v0`-signed transactions.
    pub eth_hash: Option<Hash>,
    /// Every signer and the nonce it used.
    pub signers: Vec<SignerInfo>,
    /// The transaction's fee.
    pub fee: Fee,
    /// Gas actually used, derived from `core.GasUsed` events or the section 4.7 step 5 fallback.
    pub gas_used: u64,
    /// Decoded method name, if decoding succeeded.
    pub method: Option<String>,
    /// Decoded method body.
    pub body: Option<serde_json::Value>,
    /// `Some(true)`/`Some(false)`/`None` mirroring [`crate::tx::TxResult::success`].
    pub success: Option<bool>,
    /// Typed error, present iff `success == Some(false)`.
    pub error: Option<TxError>,
    /// The decrypted (or attempted) Sapphire-style call envelope, if this was an `evm.Call`.
    pub evm_call_envelope: Option<CallEnvelope>,
    /// The matching result envelope, if any.
    pub evm_result_envelope: Option<ResultEnvelope>,
    /// Contract creation record, present iff this was a successful `evm.Create`.
    pub evm_contract_created: Option<EvmContractCreated>,
    /// Recipient, if the method has an unambiguous one.
    pub to: Option<Address>,
    /// Amount moved, as a base-10 string.
    pub amount: Option<String>,
    /// Symbol/denomination of `amount`.
    pub amount_symbol: Option<String>,
    /// Every address this transaction touched.
    pub related_addresses: BTreeSet<Address>,
}

/// Ordered event record (spec.md section 3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Index of the owning transaction within the round, if this is a tx event.
    pub tx_index: Option<u32>,
    /// Hash of the owning transaction, if this is a tx event.
    pub tx_hash: Option<Hash>,
    /// Ethereum-style hash of the owning transaction, if applicable.
    pub tx_eth_hash: Option<Hash>,
    /// The event's scope (`"core"`, `"accounts"`, `"consensusaccounts"`, `"evm"`) and code.
    pub module: String,
    /// Module-specific event code.
    pub code: u32,
    /// Raw event body (opaque per-module payload).
    pub body: serde_json::Value,
    /// Every address this event touched.
    pub related_addresses: BTreeSet<Address>,
    /// Decoded EVM log parameters, present iff `module == "evm"` and the first topic matched
    /// a known signature.
    pub evm_log: Option<EvmLogDecoded>,
}

/// A newly observed Uniswap-V2-compatible pair creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapCreation {
    /// Factory contract that emitted `PairCreated`.
    pub factory: Address,
    /// First token of the pair.
    pub token0: Address,
    /// Second token of the pair.
    pub token1: Address,
    /// The created pair contract's address.
    pub pair: Address,
}

/// A Uniswap-V2-compatible pair's reserve snapshot from a `Sync` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSync {
    /// The pair contract address.
    pub pair: Address,
    /// Reserve of `token0` after this sync.
    pub reserve0: U256,
    /// Reserve of `token1` after this sync.
    pub reserve1: U256,
}

/// Flags accumulated for a newly seen EVM contract address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCandidateFlags {
    /// Whether this round contained a mint-or-burn transfer for this token.
    pub mutated: bool,
    /// Net change in observed transfer count this round.
    pub num_transfers_change: i64,
    /// Net change in total supply this round (ERC-721 mint/burn only; zero for ERC-20).
    pub total_supply_change: I256,
}

/// Sightings accumulated for a `(collection, token_id)` pair this round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftSighting {
    /// Number of transfer events involving this token id this round.
    pub num_transfers: u64,
    /// Whether this round burned the token (transfer to the zero address).
    pub burned: bool,
    /// The token's new owner, if unambiguous from this round's events.
    pub new_owner: Option<Address>,
}

/// The complete set of typed mutations derived from one round (spec.md section 3).
///
/// Created during extraction of a single round, consumed exactly once by the
/// sink during commit (spec.md section 3, "Ownership and lifecycle"), and
/// then discarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// This round's header.
    pub header: RuntimeBlockHeader,
    /// Number of transactions in the round.
    pub num_transactions: u32,
    /// Total gas used by the round.
    pub gas_used: u64,
    /// Size, in bytes, of the round's serialized block.
    pub size: u64,
    /// Normalized per-transaction records, in round order.
    pub transactions: Vec<TxChangeRecord>,
    /// Ordered event records.
    pub events: Vec<EventRecord>,
    /// Newly discovered address preimages.
    pub preimages: PreimageSet,
    /// Dead-reckoned `(token, account) -> signed delta` balance changes.
    pub token_balance_changes: BTreeMap<(Address, Address), I256>,
    /// Newly seen EVM contract addresses and their accumulated flags.
    pub possible_tokens: BTreeMap<Address, TokenCandidateFlags>,
    /// Newly seen `(collection, token_id)` sightings.
    pub possible_nfts: BTreeMap<(Address, U256), NftSighting>,
    /// New Uniswap-V2-compatible pairs.
    pub swap_creations: Vec<SwapCreation>,
    /// New reserve snapshots for existing pairs.
    pub swap_syncs: Vec<SwapSync>,
}

impl ChangeSet {
    /// Start an empty change set for `header`; extraction fills it in incrementally.
    pub fn new(header: RuntimeBlockHeader) -> Self {
        Self {
            header,
            num_transactions: 0,
            gas_used: 0,
            size: 0,
            transactions: Vec::new(),
            events: Vec::new(),
            preimages: PreimageSet::new(),
            token_balance_changes: BTreeMap::new(),
            possible_tokens: BTreeMap::new(),
            possible_nfts: BTreeMap::new(),
            swap_creations: Vec::new(),
            swap_syncs: Vec::new(),
        }
    }

    /// Accumulate a dead-reckoned balance delta for `(token, account)`.
    ///
    /// Deltas are additive: repeated calls for the same key sum, which is
    /// exactly the "mass conservation" testable property from spec.md
    /// section 8 (sum of per-event deltas equals the recorded total).
    pub fn add_balance_delta(&mut self, token: Address, account: Address, delta: I256) {
        if delta.is_zero() {
            self.token_balance_changes.entry((token, account)).or_insert(I256::ZERO);
            return;
        }
        let entry = self.token_balance_changes.entry((token, account)).or_insert(I256::ZERO);
        *entry = entry.checked_add(delta).expect("balance delta overflow");
    }

    /// Record that `token` was seen as a transfer emitter, updating its flags.
    pub fn touch_token(&mut self, token: Address, mutated: bool, transfers_delta: i64) {
        let flags = self.possible_tokens.entry(token).or_default();
        flags.mutated |= mutated;
        flags.num_transfers_change += transfers_delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    fn sample_header() -> RuntimeBlockHeader {
        RuntimeBlockHeader {
            round: 1,
            hash: Hash::ZERO,
            timestamp: 0,
            previous_hash: Hash::ZERO,
            io_root: Hash::ZERO,
            state_root: Hash::ZERO,
            messages_hash: Hash::ZERO,
            in_messages_hash: Hash::ZERO,
        }
    }

    #[test]
    fn balance_deltas_accumulate() {
        let mut cs = ChangeSet::new(sample_header());
        let a = Address::from_eth(&[1; 20]);
        let t = Address::from_eth(&[2; 20]);
        cs.add_balance_delta(t, a, I256::try_from(100).unwrap());
        cs.add_balance_delta(t, a, I256::try_from(-30).unwrap());
        assert_eq!(cs.token_balance_changes[&(t, a)], I256::try_from(70).unwrap());
    }

    #[test]
    fn zero_delta_still_marks_account_stale() {
        let mut cs = ChangeSet::new(sample_header());
        let a = Address::from_eth(&[3; 20]);
        let t = Address::from_eth(&[4; 20]);
        cs.add_balance_delta(t, a, I256::ZERO);
        assert!(cs.token_balance_changes.contains_key(&(t, a)));
        assert_eq!(cs.token_balance_changes[&(t, a)], I256::ZERO);
    }
}
