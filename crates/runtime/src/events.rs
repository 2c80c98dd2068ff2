//! EVM event decode registry (spec.md section 4.7 step 6).
//!
//! ERC-20 and ERC-721 both declare `Transfer`/`Approval` with the same
//! Solidity signature text, so their keccak256 topic hashes collide; Solidity
//! event signatures don't encode `indexed`-ness, only indexed fields bump the
//! node's topic count, so the two are told apart by `topics.len()` instead
//! (3 for ERC-20's two-indexed-field shape, 4 for ERC-721's three).

use alloy_primitives::{Address as EthAddress, B256, U256};
use alloy_sol_types::{sol, SolEvent};

use indexer_primitives::{
    changeset::{EvmAbiParam, EvmLogDecoded, SwapCreation, SwapSync},
    hash::Hash,
    Address,
};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
    event Approval(address indexed owner, address indexed spender, uint256 value);
    event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
    event PairCreated(address indexed token0, address indexed token1, address pair, uint256);
    event Mint(address indexed sender, uint256 amount0, uint256 amount1);
    event Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to);
    event Swap(
        address indexed sender,
        uint256 amount0In,
        uint256 amount1In,
        uint256 amount0Out,
        uint256 amount1Out,
        address indexed to
    );
    event Sync(uint112 reserve0, uint112 reserve1);
    event Deposit(address indexed dst, uint256 wad);
    event Withdrawal(address indexed src, uint256 wad);
}

/// The semantic effect a decoded EVM log has on the change set, independent
/// of how it was encoded on the wire.
pub enum EvmLogEffect {
    FungibleTransfer { from: EthAddress, to: EthAddress, value: U256 },
    FungibleApproval,
    NftTransfer { from: EthAddress, to: EthAddress, token_id: U256 },
    NftApproval,
    NftApprovalForAll,
    PairCreated(SwapCreation),
    SwapActivity,
    SwapSync(SwapSync),
    WrappedDeposit { dst: EthAddress, wad: U256 },
    WrappedWithdrawal { src: EthAddress, wad: U256 },
}

fn to_topics(raw: &[Vec<u8>]) -> Option<Vec<B256>> {
    raw.iter().map(|t| (t.len() == 32).then(|| B256::from_slice(t))).collect()
}

fn param(name: &str, evm_type: &str, value: impl ToString) -> EvmAbiParam {
    EvmAbiParam { name: name.to_string(), evm_type: evm_type.to_string(), value: value.to_string() }
}

/// Decode a raw EVM log against the known signature registry. `emitter` is
/// the contract address that produced the log (not carried in the log
/// itself), needed to attribute [`SwapCreation::factory`] and
/// [`SwapSync::pair`]. Returns `None` if the first topic matches nothing
/// this indexer understands (most contract-specific events fall here, by
/// design).
pub fn decode_evm_log(
    emitter: EthAddress,
    topics: &[Vec<u8>],
    data: &[u8],
) -> Option<(EvmLogDecoded, EvmLogEffect)> {
    let topics = to_topics(topics)?;
    let sig = *topics.first()?;

    if sig == Transfer::SIGNATURE_HASH {
        return match topics.len() {
            3 => {
                let ev = Transfer::decode_raw_log(topics, data, true).ok()?;
                let decoded = EvmLogDecoded {
                    signature: Hash::from_bytes(sig.0),
                    params: vec![
                        param("from", "address", ev.from),
                        param("to", "address", ev.to),
                        param("value", "uint256", ev.value),
                    ],
                };
                Some((decoded, EvmLogEffect::FungibleTransfer { from: ev.from, to: ev.to, value: ev.value }))
            }
            4 => {
                let ev = Transfer::decode_raw_log(topics, data, true).ok()?;
                let decoded = EvmLogDecoded {
                    signature: Hash::from_bytes(sig.0),
                    params: vec![
                        param("from", "address", ev.from),
                        param("to", "address", ev.to),
                        param("tokenId", "uint256", ev.value),
                    ],
                };
                Some((decoded, EvmLogEffect::NftTransfer { from: ev.from, to: ev.to, token_id: ev.value }))
            }
            _ => None,
        };
    }

    if sig == Approval::SIGNATURE_HASH {
        return match topics.len() {
            3 => {
                let ev = Approval::decode_raw_log(topics, data, true).ok()?;
                let decoded = EvmLogDecoded {
                    signature: Hash::from_bytes(sig.0),
                    params: vec![
                        param("owner", "address", ev.owner),
                        param("spender", "address", ev.spender),
                        param("value", "uint256", ev.value),
                    ],
                };
                Some((decoded, EvmLogEffect::FungibleApproval))
            }
            4 => {
                let ev = Approval::decode_raw_log(topics, data, true).ok()?;
                let decoded = EvmLogDecoded {
                    signature: Hash::from_bytes(sig.0),
                    params: vec![
                        param("owner", "address", ev.owner),
                        param("spender", "address", ev.spender),
                        param("tokenId", "uint256", ev.value),
                    ],
                };
                Some((decoded, EvmLogEffect::NftApproval))
            }
            _ => None,
        };
    }

    if sig == ApprovalForAll::SIGNATURE_HASH {
        let ev = ApprovalForAll::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![
                param("owner", "address", ev.owner),
                param("operator", "address", ev.operator),
                param("approved", "bool", ev.approved),
            ],
        };
        return Some((decoded, EvmLogEffect::NftApprovalForAll));
    }

    if sig == PairCreated::SIGNATURE_HASH {
        let ev = PairCreated::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![
                param("token0", "address", ev.token0),
                param("token1", "address", ev.token1),
                param("pair", "address", ev.pair),
            ],
        };
        let creation = SwapCreation {
            factory: Address::from_eth(&emitter.into_array()),
            token0: Address::from_eth(&ev.token0.into_array()),
            token1: Address::from_eth(&ev.token1.into_array()),
            pair: Address::from_eth(&ev.pair.into_array()),
        };
        return Some((decoded, EvmLogEffect::PairCreated(creation)));
    }

    if sig == Mint::SIGNATURE_HASH {
        let ev = Mint::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![
                param("sender", "address", ev.sender),
                param("amount0", "uint256", ev.amount0),
                param("amount1", "uint256", ev.amount1),
            ],
        };
        return Some((decoded, EvmLogEffect::SwapActivity));
    }

    if sig == Burn::SIGNATURE_HASH {
        let ev = Burn::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![
                param("sender", "address", ev.sender),
                param("amount0", "uint256", ev.amount0),
                param("amount1", "uint256", ev.amount1),
                param("to", "address", ev.to),
            ],
        };
        return Some((decoded, EvmLogEffect::SwapActivity));
    }

    if sig == Swap::SIGNATURE_HASH {
        let ev = Swap::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![
                param("sender", "address", ev.sender),
                param("amount0In", "uint256", ev.amount0In),
                param("amount1In", "uint256", ev.amount1In),
                param("amount0Out", "uint256", ev.amount0Out),
                param("amount1Out", "uint256", ev.amount1Out),
                param("to", "address", ev.to),
            ],
        };
        return Some((decoded, EvmLogEffect::SwapActivity));
    }

    if sig == Sync::SIGNATURE_HASH {
        let ev = Sync::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![
                param("reserve0", "uint112", ev.reserve0),
                param("reserve1", "uint112", ev.reserve1),
            ],
        };
        let sync = SwapSync {
            pair: Address::from_eth(&emitter.into_array()),
            reserve0: U256::from(ev.reserve0),
            reserve1: U256::from(ev.reserve1),
        };
        return Some((decoded, EvmLogEffect::SwapSync(sync)));
    }

    if sig == Deposit::SIGNATURE_HASH {
        let ev = Deposit::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![param("dst", "address", ev.dst), param("wad", "uint256", ev.wad)],
        };
        return Some((decoded, EvmLogEffect::WrappedDeposit { dst: ev.dst, wad: ev.wad }));
    }

    if sig == Withdrawal::SIGNATURE_HASH {
        let ev = Withdrawal::decode_raw_log(topics, data, true).ok()?;
        let decoded = EvmLogDecoded {
            signature: Hash::from_bytes(sig.0),
            params: vec![param("src", "address", ev.src), param("wad", "uint256", ev.wad)],
        };
        return Some((decoded, EvmLogEffect::WrappedWithdrawal { src: ev.src, wad: ev.wad }));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::{SolEvent, SolValue};

    fn emitter() -> EthAddress {
        EthAddress::from([9u8; 20])
    }

    #[test]
    fn decodes_erc20_transfer_by_three_topics() {
        let from = EthAddress::from([1u8; 20]);
        let to = EthAddress::from([2u8; 20]);
        let value = U256::from(1000u64);
        let topics = vec![
            Transfer::SIGNATURE_HASH.0.to_vec(),
            B256::left_padding_from(from.as_slice()).0.to_vec(),
            B256::left_padding_from(to.as_slice()).0.to_vec(),
        ];
        let data = value.to_be_bytes_vec();
        let (_decoded, effect) = decode_evm_log(emitter(), &topics, &data).expect("decodes");
        assert!(matches!(effect, EvmLogEffect::FungibleTransfer { .. }));
    }

    #[test]
    fn decodes_erc721_transfer_by_four_topics_with_the_same_signature_hash() {
        let from = EthAddress::from([1u8; 20]);
        let to = EthAddress::from([2u8; 20]);
        let token_id = U256::from(7u64);
        // Same SIGNATURE_HASH as the ERC-20 case above; only the topic count differs.
        let topics = vec![
            Transfer::SIGNATURE_HASH.0.to_vec(),
            B256::left_padding_from(from.as_slice()).0.to_vec(),
            B256::left_padding_from(to.as_slice()).0.to_vec(),
            B256::from(token_id).0.to_vec(),
        ];
        let (_decoded, effect) = decode_evm_log(emitter(), &topics, &[]).expect("decodes");
        assert!(matches!(effect, EvmLogEffect::NftTransfer { .. }));
    }

    #[test]
    fn pair_created_attributes_factory_to_the_log_emitter() {
        let token0 = EthAddress::from([1u8; 20]);
        let token1 = EthAddress::from([2u8; 20]);
        let pair = EthAddress::from([3u8; 20]);
        let topics = vec![
            PairCreated::SIGNATURE_HASH.0.to_vec(),
            B256::left_padding_from(token0.as_slice()).0.to_vec(),
            B256::left_padding_from(token1.as_slice()).0.to_vec(),
        ];
        let data = (pair, U256::ZERO).abi_encode_sequence();
        let (_decoded, effect) = decode_evm_log(emitter(), &topics, &data).expect("decodes");
        let EvmLogEffect::PairCreated(creation) = effect else { panic!("wrong effect") };
        assert_eq!(creation.factory, Address::from_eth(&emitter().into_array()));
    }

    #[test]
    fn unknown_signature_returns_none() {
        let topics = vec![vec![0xffu8; 32]];
        assert!(decode_evm_log(emitter(), &topics, &[]).is_none());
    }
}
