//! The runtime (ParaTime) extractor: turns one round's raw transactions and
//! events into a [`ChangeSet`] (spec.md section 4.7). The hardest subsystem
//! in this workspace, grounded on `analyzer/runtime/extract.go`'s
//! `ExtractRound`.

pub mod error_parse;
pub mod events;
pub mod methods;

use std::collections::BTreeSet;

use alloy_primitives::{Address as EthAddress, I256};
use indexer_primitives::{
    address::{ADDRESS_V0_VERSION, CONTEXT_MODULE},
    block::{ParatimeDescriptor, RuntimeBlockHeader},
    changeset::{ChangeSet, EventRecord, TxChangeRecord},
    error::IndexerError,
    hash::Hash,
    tx::{RuntimeEvent, TransactionWithResults, TxResult},
    Address,
};

use crate::events::EvmLogEffect;

/// Bound on a sanitized transaction/revert message (spec.md section 4.7.3).
pub const MAX_SANITIZED_MESSAGE_LEN: usize = 1024;

const AUTH_PROOF_ETHEREUM: &str = "evm.ethereum.v0";
const CORE_MODULE: &str = "core";
const CORE_GAS_USED_CODE: u32 = 1;
const EVM_MODULE: &str = "evm";

/// The dead-reckoning sentinel address standing in for "the runtime's
/// native token" (spec.md section 4.7 step 6, wrapped-native rules),
/// grounded on the original's `evm.NativeRuntimeTokenAddress`. Parametrized
/// by denom so two tracked paratimes never collide on the same sentinel.
pub fn native_token_address(native_denom: &str) -> Address {
    Address::derive(
        CONTEXT_MODULE,
        ADDRESS_V0_VERSION,
        ADDRESS_V0_VERSION,
        format!("native-token:{native_denom}").as_bytes(),
    )
}

/// Extract one round's [`ChangeSet`] from its header, transactions, and the
/// raw event stream (spec.md section 4.7).
pub fn extract_round(
    header: RuntimeBlockHeader,
    transactions: Vec<TransactionWithResults>,
    raw_events: Vec<RuntimeEvent>,
    paratime: &ParatimeDescriptor,
) -> ChangeSet {
    let mut cs = ChangeSet::new(header);
    cs.num_transactions = transactions.len() as u32;

    // Step 1: events with no owning transaction are non-tx events.
    for event in raw_events.into_iter().filter(|e| e.tx_hash.is_none()) {
        let record = build_event_record(&mut cs, &paratime.native_denom, None, None, None, &event);
        cs.events.push(record);
    }

    for (i, twr) in transactions.into_iter().enumerate() {
        let index = i as u32;
        let record = extract_transaction(&mut cs, index, &twr, &paratime.native_denom);
        let tx_hash = record.hash;
        let tx_eth_hash = record.eth_hash;
        cs.gas_used += record.gas_used;
        cs.transactions.push(record);

        for event in &twr.events {
            let record = build_event_record(
                &mut cs,
                &paratime.native_denom,
                Some(index),
                Some(tx_hash),
                tx_eth_hash,
                event,
            );
            cs.events.push(record);
        }
    }

    cs
}

fn extract_transaction(
    cs: &mut ChangeSet,
    index: u32,
    twr: &TransactionWithResults,
    native_denom: &str,
) -> TxChangeRecord {
    // Step 2: `core_hash` of the opaque signed-transaction bytes.
    let hash = Hash::of_bytes(&twr.tx.raw);
    let eth_hash = (twr.tx.auth_proofs.len() == 1 && twr.tx.auth_proofs[0] == AUTH_PROOF_ETHEREUM)
        .then(|| Hash::from_bytes(alloy_primitives::keccak256(&twr.tx.raw).0));

    let success = twr.result.success();
    let error = match &twr.result {
        TxResult::Failed { module, code, message } => {
            Some(error_parse::extract_tx_error(module, *code, message.as_deref()))
        }
        _ => None,
    };

    // Step 2: an undecodable call body downgrades to a minimal record
    // (no method/body) rather than aborting the round.
    if twr.tx.call.is_none() {
        let err = IndexerError::MalformedInput(format!("tx {hash}: no decodable call body"));
        tracing::warn!(tx_hash = %hash, error = %err, "malformed transaction input, continuing with minimal record");
    }

    let gas_used = gas_used_for_tx(&twr.events, &twr.result, twr.tx.call.is_some(), twr.tx.gas_limit);

    let mut related: BTreeSet<Address> = twr.tx.signer_infos.iter().map(|s| s.address).collect();

    // Signer preimages aren't recoverable here: `SignerInfo` carries only the
    // already-derived address, never the raw public key that produced it.
    // EVM-derived preimages are registered where an eth address actually
    // surfaces, inside `methods::dispatch`.

    let mut fields = None;
    let mut success_override = None;
    if let Some(call) = &twr.tx.call {
        let signer = twr
            .tx
            .signer_infos
            .first()
            .map(|s| s.address)
            .unwrap_or_else(|| Address::from_eth(&[0u8; 20]));
        let out = methods::dispatch(
            cs,
            native_denom,
            hash,
            signer,
            twr.tx.signer_infos.len(),
            call,
            &twr.result,
        );
        success_override = out.override_success;
        related.extend(out.related_addresses.iter().copied());
        fields = Some(out);
    }

    TxChangeRecord {
        index,
        hash,
        eth_hash,
        signers: twr.tx.signer_infos.clone(),
        fee: twr.tx.fee.clone(),
        gas_used,
        method: twr.tx.call.as_ref().map(|c| c.method.clone()),
        body: twr.tx.call.as_ref().map(|c| c.body.clone()),
        success: success_override.or(success),
        error,
        evm_call_envelope: fields.as_ref().and_then(|f| f.evm_call_envelope.clone()),
        evm_result_envelope: fields.as_ref().and_then(|f| f.evm_result_envelope.clone()),
        evm_contract_created: fields.as_ref().and_then(|f| f.evm_contract_created.clone()),
        to: fields.as_ref().and_then(|f| f.to),
        amount: fields.as_ref().and_then(|f| f.amount.clone()),
        amount_symbol: fields.as_ref().and_then(|f| f.amount_symbol.clone()),
        related_addresses: related,
    }
}

/// Step 5: sum `core.GasUsed` events for this transaction; absent that,
/// assume the full gas limit was spent if the body decoded and the result
/// isn't a definite failure, else zero.
fn gas_used_for_tx(events: &[RuntimeEvent], result: &TxResult, has_body: bool, gas_limit: u64) -> u64 {
    let from_events: u64 = events
        .iter()
        .filter(|e| e.module == CORE_MODULE && e.code == CORE_GAS_USED_CODE)
        .filter_map(|e| parse_gas_used(&e.data))
        .sum();
    if from_events > 0 {
        return from_events;
    }
    match result {
        TxResult::Failed { .. } => 0,
        _ if has_body => gas_limit,
        _ => 0,
    }
}

fn parse_gas_used(data: &[u8]) -> Option<u64> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Some(amount) = value.get("amount").and_then(|v| v.as_str()) {
            return amount.parse().ok();
        }
        if let Some(n) = value.as_u64() {
            return Some(n);
        }
    }
    std::str::from_utf8(data).ok().and_then(|s| s.trim().parse().ok())
}

/// Step 6: turn one raw event into an [`EventRecord`], decoding its EVM log
/// if the module is `evm` and the signature is recognized, and applying the
/// decoded log's side effects to `cs` per the step-6 table.
#[allow(clippy::too_many_arguments)]
fn build_event_record(
    cs: &mut ChangeSet,
    native_denom: &str,
    tx_index: Option<u32>,
    tx_hash: Option<Hash>,
    tx_eth_hash: Option<Hash>,
    event: &RuntimeEvent,
) -> EventRecord {
    let mut related_addresses = BTreeSet::new();
    let evm_log = if event.module == EVM_MODULE {
        let emitter = event.address.map(EthAddress::from).unwrap_or(EthAddress::ZERO);
        events::decode_evm_log(emitter, &event.topics, &event.data).map(|(decoded, effect)| {
            apply_evm_log_effect(cs, native_denom, emitter, &effect, &mut related_addresses);
            decoded
        })
    } else {
        None
    };

    if let Some(addr) = event.address {
        related_addresses.insert(Address::from_eth(&addr));
    }

    EventRecord {
        tx_index,
        tx_hash,
        tx_eth_hash,
        module: event.module.clone(),
        code: event.code,
        body: serde_json::from_slice(&event.data).unwrap_or(serde_json::Value::Null),
        related_addresses,
        evm_log,
    }
}

/// Apply one decoded EVM log's side effects (spec.md section 4.7 step 6's
/// signature table) to the in-progress change set.
fn apply_evm_log_effect(
    cs: &mut ChangeSet,
    native_denom: &str,
    emitter: EthAddress,
    effect: &EvmLogEffect,
    related_addresses: &mut BTreeSet<Address>,
) {
    let token = Address::from_eth(&emitter.into_array());
    match effect {
        EvmLogEffect::FungibleTransfer { from, to, value } => {
            let delta = I256::from_raw(*value);
            if !from.is_zero() {
                let from_addr = Address::from_eth(&from.into_array());
                cs.add_balance_delta(token, from_addr, -delta);
                related_addresses.insert(from_addr);
            }
            if !to.is_zero() {
                let to_addr = Address::from_eth(&to.into_array());
                cs.add_balance_delta(token, to_addr, delta);
                related_addresses.insert(to_addr);
            }
            let mint_or_burn = (from.is_zero() || to.is_zero()) && !value.is_zero();
            cs.touch_token(token, mint_or_burn, 1);
        }
        EvmLogEffect::FungibleApproval => {
            cs.touch_token(token, false, 0);
        }
        EvmLogEffect::NftTransfer { from, to, token_id } => {
            let mint = from.is_zero();
            let burn = to.is_zero();
            if !mint {
                let from_addr = Address::from_eth(&from.into_array());
                cs.add_balance_delta(token, from_addr, I256::MINUS_ONE);
                related_addresses.insert(from_addr);
            }
            if !burn {
                let to_addr = Address::from_eth(&to.into_array());
                cs.add_balance_delta(token, to_addr, I256::ONE);
                related_addresses.insert(to_addr);
            }
            cs.touch_token(token, mint || burn, 1);
            let supply_delta = if mint {
                I256::ONE
            } else if burn {
                I256::MINUS_ONE
            } else {
                I256::ZERO
            };
            cs.possible_tokens.entry(token).or_default().total_supply_change += supply_delta;

            let sighting = cs.possible_nfts.entry((token, *token_id)).or_default();
            sighting.num_transfers += 1;
            if burn {
                sighting.burned = true;
            } else {
                sighting.new_owner = Some(Address::from_eth(&to.into_array()));
            }
        }
        EvmLogEffect::NftApproval | EvmLogEffect::NftApprovalForAll => {
            cs.touch_token(token, false, 0);
        }
        EvmLogEffect::PairCreated(creation) => {
            cs.swap_creations.push(creation.clone());
        }
        EvmLogEffect::SwapActivity => {
            // Related-addresses only (spec.md section 4.7 step 6); the pair
            // contract address is already recorded by the caller.
        }
        EvmLogEffect::SwapSync(sync) => {
            cs.swap_syncs.push(sync.clone());
        }
        EvmLogEffect::WrappedDeposit { dst, wad } => {
            let native = native_token_address(native_denom);
            let wrapper = token;
            let dst_addr = Address::from_eth(&dst.into_array());
            let delta = I256::from_raw(*wad);
            cs.add_balance_delta(wrapper, dst_addr, delta);
            cs.add_balance_delta(native, wrapper, delta);
            cs.add_balance_delta(native, dst_addr, -delta);
            related_addresses.insert(dst_addr);
        }
        EvmLogEffect::WrappedWithdrawal { src, wad } => {
            let native = native_token_address(native_denom);
            let wrapper = token;
            let src_addr = Address::from_eth(&src.into_array());
            let delta = I256::from_raw(*wad);
            cs.add_balance_delta(wrapper, src_addr, -delta);
            cs.add_balance_delta(native, wrapper, -delta);
            cs.add_balance_delta(native, src_addr, delta);
            related_addresses.insert(src_addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;
    use indexer_primitives::{
        hash::Hash,
        tx::{Call, Fee, RuntimeTransaction, SignerInfo},
    };

    fn header() -> RuntimeBlockHeader {
        RuntimeBlockHeader {
            round: 10,
            hash: Hash::ZERO,
            timestamp: 0,
            previous_hash: Hash::ZERO,
            io_root: Hash::ZERO,
            state_root: Hash::ZERO,
            messages_hash: Hash::ZERO,
            in_messages_hash: Hash::ZERO,
        }
    }

    fn paratime() -> ParatimeDescriptor {
        ParatimeDescriptor {
            name: "sapphire".to_string(),
            runtime_id: "000...sapphire".to_string(),
            native_denom: "ROSE".to_string(),
        }
    }

    fn fee() -> Fee {
        Fee { amount: "0".to_string(), denom: "ROSE".to_string(), proxy: None }
    }

    #[test]
    fn non_tx_events_have_no_tx_index() {
        let event = RuntimeEvent {
            module: "core".to_string(),
            code: 2,
            topics: vec![],
            data: b"{}".to_vec(),
            address: None,
            tx_hash: None,
        };
        let cs = extract_round(header(), vec![], vec![event], &paratime());
        assert_eq!(cs.events.len(), 1);
        assert!(cs.events[0].tx_index.is_none());
    }

    #[test]
    fn unknown_method_records_name_without_body_specific_fields() {
        let tx = TransactionWithResults {
            tx: RuntimeTransaction {
                raw: b"tx-bytes".to_vec(),
                auth_proofs: vec!["ed25519".to_string()],
                signer_infos: vec![SignerInfo { address: Address::from_eth(&[1u8; 20]), nonce: 0 }],
                fee: fee(),
                gas_limit: 1000,
                call: Some(Call { method: "rofl.SomeFutureMethod".to_string(), body: serde_json::json!({}) }),
            },
            result: TxResult::Ok(None),
            events: vec![],
        };
        let cs = extract_round(header(), vec![tx], vec![], &paratime());
        assert_eq!(cs.transactions[0].method.as_deref(), Some("rofl.SomeFutureMethod"));
        assert!(cs.transactions[0].to.is_none());
    }

    #[test]
    fn gas_used_falls_back_to_limit_when_no_gas_used_event() {
        let tx = TransactionWithResults {
            tx: RuntimeTransaction {
                raw: b"tx-bytes-2".to_vec(),
                auth_proofs: vec!["ed25519".to_string()],
                signer_infos: vec![SignerInfo { address: Address::from_eth(&[2u8; 20]), nonce: 1 }],
                fee: fee(),
                gas_limit: 42_000,
                call: Some(Call { method: "accounts.Transfer".to_string(), body: serde_json::json!({"amount": "1"}) }),
            },
            result: TxResult::Ok(None),
            events: vec![],
        };
        let cs = extract_round(header(), vec![tx], vec![], &paratime());
        assert_eq!(cs.transactions[0].gas_used, 42_000);
        assert_eq!(cs.gas_used, 42_000);
    }

    #[test]
    fn eth_signed_transactions_get_a_keccak_hash() {
        let tx = TransactionWithResults {
            tx: RuntimeTransaction {
                raw: b"eth-tx-bytes".to_vec(),
                auth_proofs: vec![AUTH_PROOF_ETHEREUM.to_string()],
                signer_infos: vec![SignerInfo { address: Address::from_eth(&[3u8; 20]), nonce: 0 }],
                fee: fee(),
                gas_limit: 21_000,
                call: None,
            },
            result: TxResult::Unknown,
            events: vec![],
        };
        let cs = extract_round(header(), vec![tx], vec![], &paratime());
        assert!(cs.transactions[0].eth_hash.is_some());
    }

    #[test]
    fn events_carry_their_owning_transactions_eth_hash() {
        let tx = TransactionWithResults {
            tx: RuntimeTransaction {
                raw: b"eth-tx-with-event".to_vec(),
                auth_proofs: vec![AUTH_PROOF_ETHEREUM.to_string()],
                signer_infos: vec![SignerInfo { address: Address::from_eth(&[4u8; 20]), nonce: 0 }],
                fee: fee(),
                gas_limit: 21_000,
                call: None,
            },
            result: TxResult::Unknown,
            events: vec![RuntimeEvent {
                module: "core".to_string(),
                code: CORE_GAS_USED_CODE,
                topics: vec![],
                data: b"{}".to_vec(),
                address: None,
                tx_hash: Some(Hash::ZERO),
            }],
        };
        let cs = extract_round(header(), vec![tx], vec![], &paratime());
        assert!(cs.events[0].tx_eth_hash.is_some());
        assert_eq!(cs.events[0].tx_eth_hash, cs.transactions[0].eth_hash);
    }

    #[test]
    fn undecodable_call_body_downgrades_to_minimal_record() {
        let tx = TransactionWithResults {
            tx: RuntimeTransaction {
                raw: b"opaque-tx-bytes".to_vec(),
                auth_proofs: vec!["ed25519".to_string()],
                signer_infos: vec![SignerInfo { address: Address::from_eth(&[9u8; 20]), nonce: 3 }],
                fee: fee(),
                gas_limit: 5_000,
                call: None,
            },
            result: TxResult::Unknown,
            events: vec![],
        };
        let cs = extract_round(header(), vec![tx], vec![], &paratime());
        assert!(cs.transactions[0].method.is_none());
        assert!(cs.transactions[0].body.is_none());
        assert_eq!(cs.transactions[0].signers.len(), 1);
    }

    #[test]
    fn erc20_transfer_log_dead_reckons_token_balances() {
        let from = EthAddress::from([1u8; 20]);
        let to = EthAddress::from([2u8; 20]);
        let token = EthAddress::from([7u8; 20]);
        let value = alloy_primitives::U256::from(1_000u64);
        let topics = vec![
            events::Transfer::SIGNATURE_HASH.0.to_vec(),
            alloy_primitives::B256::left_padding_from(from.as_slice()).0.to_vec(),
            alloy_primitives::B256::left_padding_from(to.as_slice()).0.to_vec(),
        ];
        let event = RuntimeEvent {
            module: EVM_MODULE.to_string(),
            code: 1,
            topics,
            data: value.to_be_bytes_vec(),
            address: Some(token.into_array()),
            tx_hash: None,
        };
        let cs = extract_round(header(), vec![], vec![event], &paratime());

        let token_addr = Address::from_eth(&token.into_array());
        let from_addr = Address::from_eth(&from.into_array());
        let to_addr = Address::from_eth(&to.into_array());
        assert_eq!(
            cs.token_balance_changes[&(token_addr, from_addr)],
            I256::try_from(-1_000i128).unwrap(),
        );
        assert_eq!(cs.token_balance_changes[&(token_addr, to_addr)], I256::try_from(1_000i128).unwrap());
        assert_eq!(cs.possible_tokens[&token_addr].num_transfers_change, 1);
        assert!(!cs.possible_tokens[&token_addr].mutated);
    }

    #[test]
    fn wrapped_native_deposit_mirrors_native_and_wrapper_balances() {
        let dst = EthAddress::from([3u8; 20]);
        let wrapper = EthAddress::from([8u8; 20]);
        let wad = alloy_primitives::U256::from(500u64);
        let topics = vec![
            events::Deposit::SIGNATURE_HASH.0.to_vec(),
            alloy_primitives::B256::left_padding_from(dst.as_slice()).0.to_vec(),
        ];
        let event = RuntimeEvent {
            module: EVM_MODULE.to_string(),
            code: 1,
            topics,
            data: wad.to_be_bytes_vec(),
            address: Some(wrapper.into_array()),
            tx_hash: None,
        };
        let cs = extract_round(header(), vec![], vec![event], &paratime());

        let wrapper_addr = Address::from_eth(&wrapper.into_array());
        let dst_addr = Address::from_eth(&dst.into_array());
        let native = native_token_address(&paratime().native_denom);
        assert_eq!(cs.token_balance_changes[&(wrapper_addr, dst_addr)], I256::try_from(500i128).unwrap());
        assert_eq!(cs.token_balance_changes[&(native, wrapper_addr)], I256::try_from(500i128).unwrap());
        assert_eq!(cs.token_balance_changes[&(native, dst_addr)], I256::try_from(-500i128).unwrap());
    }
}
