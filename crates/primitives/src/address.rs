//! On-chain addresses and their preimages.
//!
//! Oasis addresses are derived from a `(context identifier, context version,
//! raw bytes)` triple by hashing the triple down to a fixed-width digest.
//! Everything downstream only ever sees the derived [`Address`]; the raw
//! bytes and derivation context are retained separately as the address's
//! [`AddressPreimage`] so that e.g. an Ethereum-style caller can be mapped
//! back to its original 20-byte representation.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length in bytes of the derived address payload (not counting the version byte).
pub const ADDRESS_DATA_LEN: usize = 20;

/// Version byte used by every derivation context this indexer knows about.
pub const ADDRESS_V0_VERSION: u8 = 0;

/// Context identifier for addresses derived from an Ed25519 staking key.
pub const CONTEXT_ED25519: &str = "oasis-core/address: staking";
/// Context identifier for addresses derived from an Sr25519 staking key.
pub const CONTEXT_SR25519: &str = "oasis-core/address: sr25519";
/// Context identifier for multisig accounts.
pub const CONTEXT_MULTISIG: &str = "oasis-core/address: multisig";
/// Context identifier for runtime module accounts (e.g. the common pool).
pub const CONTEXT_MODULE: &str = "oasis-core/address: module";
/// Context identifier for a runtime's own account.
pub const CONTEXT_RUNTIME: &str = "oasis-core/address: runtime";
/// Context identifier used for addresses derived from a secp256k1 Ethereum key.
pub const CONTEXT_SECP256K1ETH: &str = "oasis-runtime-sdk/address: secp256k1eth";

/// A derived on-chain address: one version byte followed by a 20-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_bytes")] pub [u8; 1 + ADDRESS_DATA_LEN]);

impl Address {
    /// Derive an address from a context identifier, context version, and raw key bytes.
    ///
    /// `hash = SHA-256(context_id || context_version || data)`, truncated to
    /// [`ADDRESS_DATA_LEN`] bytes and prefixed with `version`.
    pub fn derive(context_id: &str, context_version: u8, version: u8, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(context_id.as_bytes());
        hasher.update([context_version]);
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 1 + ADDRESS_DATA_LEN];
        out[0] = version;
        out[1..].copy_from_slice(&digest[..ADDRESS_DATA_LEN]);
        Self(out)
    }

    /// Derive the address of an Ethereum-style (secp256k1) account from its 20-byte
    /// Ethereum address.
    pub fn from_eth(eth_address: &[u8; 20]) -> Self {
        Self::derive(CONTEXT_SECP256K1ETH, ADDRESS_V0_VERSION, ADDRESS_V0_VERSION, eth_address)
    }

    /// Raw bytes of the derived address (version byte included).
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex_encode(&self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Real Oasis addresses are bech32("oasis", ...)-encoded; we render a
        // plain hex form here since no bech32 crate is in the dependency set
        // this workspace draws from. See DESIGN.md.
        write!(f, "oasis1{}", hex_encode(&self.0))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 21], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 21], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 21];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}

/// The raw bytes and derivation context an [`Address`] was computed from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPreimage {
    /// Derivation context identifier, e.g. [`CONTEXT_SECP256K1ETH`].
    pub context_id: String,
    /// Version of the derivation context.
    pub context_version: u8,
    /// Raw bytes the address was derived from (e.g. a 20-byte Ethereum address).
    pub raw_bytes: Vec<u8>,
}

/// A set of newly discovered `address -> preimage` mappings.
///
/// Modelled as a flat map, not a graph: addresses never reference each
/// other, so there is no cycle to worry about. Re-registering the same
/// address is a no-op (the uniqueness invariant in spec.md section 3 holds
/// by construction since the map key *is* the address).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreimageSet(BTreeMap<Address, AddressPreimage>);

impl PreimageSet {
    /// Create an empty preimage set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address's preimage. A no-op if the address is already present.
    pub fn register(&mut self, address: Address, preimage: AddressPreimage) {
        self.0.entry(address).or_insert(preimage);
    }

    /// Register the preimage for an Ethereum-derived address, returning the derived address.
    pub fn register_eth(&mut self, eth_address: [u8; 20]) -> Address {
        let address = Address::from_eth(&eth_address);
        self.register(
            address,
            AddressPreimage {
                context_id: CONTEXT_SECP256K1ETH.to_string(),
                context_version: ADDRESS_V0_VERSION,
                raw_bytes: eth_address.to_vec(),
            },
        );
        address
    }

    /// Merge another preimage set into this one.
    pub fn extend(&mut self, other: PreimageSet) {
        for (addr, preimage) in other.0 {
            self.register(addr, preimage);
        }
    }

    /// Number of distinct addresses registered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no preimages have been registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all `(address, preimage)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &AddressPreimage)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = Address::from_eth(&[0xAB; 20]);
        let b = Address::from_eth(&[0xAB; 20]);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_inputs_derive_distinct_addresses() {
        let a = Address::from_eth(&[0x01; 20]);
        let b = Address::from_eth(&[0x02; 20]);
        assert_ne!(a, b);
    }

    #[test]
    fn preimage_registration_is_idempotent() {
        let mut set = PreimageSet::new();
        let a1 = set.register_eth([0xCD; 20]);
        let a2 = set.register_eth([0xCD; 20]);
        assert_eq!(a1, a2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn address_round_trips_through_json() {
        let addr = Address::from_eth(&[0x11; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }
}
