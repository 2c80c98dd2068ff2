//! Runtime transactions, their results, and the events they emit.

use serde::{Deserialize, Serialize};

use crate::{address::Address, hash::Hash};

/// A signer's address and the nonce it used for this transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// The signer's derived address.
    pub address: Address,
    /// The nonce consumed by this transaction.
    pub nonce: u64,
}

/// Optional fee-payer indirection: a third party covers the transaction fee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeProxy {
    /// Module that interprets `id`.
    pub module: String,
    /// Opaque identifier within `module`'s namespace.
    pub id: Vec<u8>,
}

/// A transaction fee: amount, denomination symbol, and optional proxy payer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Fee amount, as a base-10 string (arbitrary precision).
    pub amount: String,
    /// Denomination symbol, e.g. `"ROSE"` or a token ticker.
    pub denom: String,
    /// If set, a third party is responsible for paying this fee.
    pub proxy: Option<FeeProxy>,
}

/// The structured method call carried by a transaction body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Dotted method name, e.g. `"accounts.Transfer"` or `"evm.Call"`.
    pub method: String,
    /// Method-specific structured arguments.
    pub body: serde_json::Value,
}

/// An auth proof module name, e.g. `"evm.ethereum.v0"` for Ethereum-format transactions.
pub type AuthProofModule = String;

/// A signed transaction as exposed by the node API: opaque bytes plus the
/// already-decoded envelope fields the extractor needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeTransaction {
    /// The raw (CBOR/RLP-whatever-the-wire-format-is) signed transaction bytes.
    pub raw: Vec<u8>,
    /// The auth proof modules used to sign this transaction, in order.
    pub auth_proofs: Vec<AuthProofModule>,
    /// Per-signer address + nonce.
    pub signer_infos: Vec<SignerInfo>,
    /// The transaction's fee.
    pub fee: Fee,
    /// The transaction's gas limit.
    pub gas_limit: u64,
    /// The decoded call, if decoding succeeded.
    pub call: Option<Call>,
}

/// The on-chain outcome of executing a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxResult {
    /// The call completed without error. Carries the method's raw return
    /// value, if any (e.g. the 20-byte created address for `evm.Create`).
    Ok(Option<Vec<u8>>),
    /// The call failed with a typed module error.
    Failed {
        /// Module that raised the error (e.g. `"evm"`).
        module: String,
        /// Module-specific error code.
        code: u32,
        /// Raw (unsanitized) error message, if the node provided one.
        message: Option<String>,
    },
    /// The result could not be classified (e.g. an era that doesn't expose results).
    Unknown,
}

impl TxResult {
    /// `success` field per spec.md's ChangeSet: `true`/`false`/`null`.
    pub fn success(&self) -> Option<bool> {
        match self {
            Self::Ok(_) => Some(true),
            Self::Failed { .. } => Some(false),
            Self::Unknown => None,
        }
    }
}

/// A runtime event: the module/code scope it belongs to, its raw topics and
/// data (used for EVM log parsing), and the transaction it belongs to, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    /// Event scope, e.g. `"evm"`, `"accounts"`, `"consensusaccounts"`, `"core"`.
    pub module: String,
    /// Module-specific event code.
    pub code: u32,
    /// Raw log topics (EVM events only; empty otherwise).
    pub topics: Vec<Vec<u8>>,
    /// Raw log/event data.
    pub data: Vec<u8>,
    /// The contract that emitted this log (EVM events only).
    pub address: Option<[u8; 20]>,
    /// The transaction this event belongs to. `None` marks a non-tx event
    /// (spec.md section 4.7 step 1: events with a zero tx-hash are non-tx).
    pub tx_hash: Option<Hash>,
}

/// A single transaction paired with its execution result and emitted events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWithResults {
    /// The transaction itself. Always present: raw bytes, auth proofs, and
    /// signer infos are known regardless of whether the body decoded; a
    /// decode failure only clears `tx.call` (spec.md section 4.7 step 2's
    /// minimal record).
    pub tx: RuntimeTransaction,
    /// The execution result.
    pub result: TxResult,
    /// Events emitted while executing this transaction.
    pub events: Vec<RuntimeEvent>,
}
