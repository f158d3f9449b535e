//! Translation of raw Geyser updates into typed upstream events.
//!
//! Account updates are decoded into bonding-curve state; transaction
//! envelopes are classified into create/buy/sell with amounts recovered
//! from balance deltas. Everything the pipeline does not track parses to
//! `Ignored`.

use super::filters::PUMP_FUN_PROGRAM;
use crate::curve::{self, BondingCurveState};
use crate::error::DecodeError;
use crate::models::TransactionKind;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};
use yellowstone_grpc_proto::geyser::{
    subscribe_update::UpdateOneof, SubscribeUpdate, SubscribeUpdateAccount,
    SubscribeUpdateTransaction,
};

const CREATE_LOG: &str = "Program log: Instruction: Create";
const BUY_LOG: &str = "Program log: Instruction: Buy";
const SELL_LOG: &str = "Program log: Instruction: Sell";
/// First-byte discriminators of the pump.fun create instruction variants.
const CREATE_DISCRIMINATORS: [u8; 2] = [181, 234];

const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// A pump.fun transaction with everything the pipeline needs extracted.
#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub signature: String,
    pub slot: u64,
    pub kind: TransactionKind,
    /// Mint of the traded/created token, when resolvable from balances.
    pub mint: Option<String>,
    /// Fee payer.
    pub user: Option<String>,
    pub sol_amount: f64,
    pub token_amount: f64,
    pub fee: u64,
}

/// One logical message from the firehose.
#[derive(Debug)]
pub enum UpstreamEvent {
    CurveUpdate {
        bonding_curve: Pubkey,
        state: BondingCurveState,
        slot: u64,
    },
    Transaction(ParsedTransaction),
    Ping {
        id: i32,
    },
    Ignored,
}

/// Classify and parse a raw subscribe update.
pub fn parse_update(update: SubscribeUpdate) -> UpstreamEvent {
    match update.update_oneof {
        Some(UpdateOneof::Account(account)) => parse_account(account),
        Some(UpdateOneof::Transaction(tx)) => match parse_transaction(tx) {
            Some(parsed) => UpstreamEvent::Transaction(parsed),
            None => UpstreamEvent::Ignored,
        },
        Some(UpdateOneof::Ping(ping)) => UpstreamEvent::Ping { id: ping.id },
        _ => UpstreamEvent::Ignored,
    }
}

fn parse_account(update: SubscribeUpdateAccount) -> UpstreamEvent {
    let Some(info) = update.account else {
        return UpstreamEvent::Ignored;
    };
    let Ok(pubkey_bytes) = <[u8; 32]>::try_from(info.pubkey.as_slice()) else {
        warn!(len = info.pubkey.len(), "account update with malformed pubkey");
        return UpstreamEvent::Ignored;
    };
    let bonding_curve = Pubkey::from(pubkey_bytes);

    match curve::decode(&info.data) {
        Ok(state) => UpstreamEvent::CurveUpdate {
            bonding_curve,
            state,
            slot: update.slot,
        },
        // The owner filter also delivers the program's global config
        // accounts; those are expected misses.
        Err(DecodeError::Discriminator) => {
            debug!(account = %bonding_curve, "skipping non-curve account");
            UpstreamEvent::Ignored
        }
        Err(err) => {
            warn!(account = %bonding_curve, %err, "bonding curve decode failed, record skipped");
            UpstreamEvent::Ignored
        }
    }
}

fn parse_transaction(update: SubscribeUpdateTransaction) -> Option<ParsedTransaction> {
    let info = update.transaction?;
    let meta = info.meta?;
    let message = info.transaction?.message?;

    let signature = bs58::encode(&info.signature).into_string();
    let account_keys: Vec<String> = message
        .account_keys
        .iter()
        .map(|key| bs58::encode(key).into_string())
        .collect();

    let pump_in_keys = account_keys.iter().any(|k| k == PUMP_FUN_PROGRAM);
    let logs = &meta.log_messages;

    // A transaction is a create iff the pump.fun create log appears with the
    // program in the account keys, or an instruction to the program carries
    // a create discriminator byte.
    let create_by_log = pump_in_keys && logs.iter().any(|l| l.contains(CREATE_LOG));
    let create_by_discriminator = message.instructions.iter().any(|ix| {
        account_keys
            .get(ix.program_id_index as usize)
            .is_some_and(|p| p == PUMP_FUN_PROGRAM)
            && ix.data.first().is_some_and(|b| CREATE_DISCRIMINATORS.contains(b))
    });

    let (mint, token_amount) = primary_token_delta(&meta);
    let fee = meta.fee;
    let user = account_keys.first().cloned();

    // Fee payer SOL delta, net of the fee, as the traded SOL amount.
    // Defaults to 0 when balances are absent.
    let fee_payer_delta = match (meta.pre_balances.first(), meta.post_balances.first()) {
        (Some(&pre), Some(&post)) => pre as i128 - post as i128,
        _ => 0,
    };
    let sol_amount =
        ((fee_payer_delta.abs() - fee as i128).max(0)) as f64 / LAMPORTS_PER_SOL;

    let kind = if create_by_log || create_by_discriminator {
        TransactionKind::Create
    } else if logs.iter().any(|l| l.contains(BUY_LOG)) {
        TransactionKind::Buy
    } else if logs.iter().any(|l| l.contains(SELL_LOG)) {
        TransactionKind::Sell
    } else if fee_payer_delta > fee as i128 {
        // No instruction log survived truncation; fall back to the flow of
        // lamports out of or into the fee payer.
        TransactionKind::Buy
    } else if fee_payer_delta < 0 {
        TransactionKind::Sell
    } else {
        return None;
    };

    Some(ParsedTransaction {
        signature,
        slot: update.slot,
        kind,
        mint,
        user,
        sol_amount,
        token_amount,
        fee,
    })
}

/// Largest-magnitude non-WSOL token balance change, as (mint, |delta|).
fn primary_token_delta(
    meta: &yellowstone_grpc_proto::solana::storage::confirmed_block::TransactionStatusMeta,
) -> (Option<String>, f64) {
    use std::collections::HashMap;

    let mut deltas: HashMap<String, f64> = HashMap::new();
    for balance in &meta.pre_token_balances {
        if let Some(amount) = &balance.ui_token_amount {
            *deltas.entry(balance.mint.clone()).or_default() -= amount.ui_amount;
        }
    }
    for balance in &meta.post_token_balances {
        if let Some(amount) = &balance.ui_token_amount {
            *deltas.entry(balance.mint.clone()).or_default() += amount.ui_amount;
        }
    }

    deltas
        .into_iter()
        .filter(|(mint, _)| mint != WSOL_MINT)
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(mint, delta)| (Some(mint), delta.abs()))
        .unwrap_or((None, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yellowstone_grpc_proto::geyser::SubscribeUpdateTransactionInfo;
    use yellowstone_grpc_proto::solana::storage::confirmed_block::{
        CompiledInstruction, Message, Transaction, TransactionStatusMeta, TokenBalance,
        UiTokenAmount,
    };

    fn keys(program_included: bool) -> Vec<Vec<u8>> {
        let user = vec![1u8; 32];
        let mut keys = vec![user];
        if program_included {
            keys.push(bs58::decode(PUMP_FUN_PROGRAM).into_vec().unwrap());
        }
        keys
    }

    fn token_balance(mint: &str, ui_amount: f64) -> TokenBalance {
        TokenBalance {
            account_index: 2,
            mint: mint.to_string(),
            ui_token_amount: Some(UiTokenAmount {
                ui_amount,
                decimals: 6,
                amount: String::new(),
                ui_amount_string: String::new(),
            }),
            owner: String::new(),
            program_id: String::new(),
        }
    }

    fn tx_update(
        logs: Vec<String>,
        instructions: Vec<CompiledInstruction>,
        program_included: bool,
    ) -> SubscribeUpdateTransaction {
        SubscribeUpdateTransaction {
            transaction: Some(SubscribeUpdateTransactionInfo {
                signature: vec![7u8; 64],
                is_vote: false,
                transaction: Some(Transaction {
                    signatures: vec![vec![7u8; 64]],
                    message: Some(Message {
                        account_keys: keys(program_included),
                        instructions,
                        ..Default::default()
                    }),
                }),
                meta: Some(TransactionStatusMeta {
                    fee: 5_000,
                    pre_balances: vec![2_000_000_000],
                    post_balances: vec![1_500_000_000],
                    log_messages: logs,
                    pre_token_balances: vec![token_balance("MintAAA", 0.0)],
                    post_token_balances: vec![token_balance("MintAAA", 1_000.0)],
                    ..Default::default()
                }),
                index: 0,
            }),
            slot: 1234,
        }
    }

    #[test]
    fn create_detected_from_program_log() {
        let update = tx_update(
            vec!["Program log: Instruction: Create".to_string()],
            vec![],
            true,
        );
        let parsed = parse_transaction(update).unwrap();
        assert_eq!(parsed.kind, TransactionKind::Create);
        assert_eq!(parsed.mint.as_deref(), Some("MintAAA"));
        assert_eq!(parsed.slot, 1234);
    }

    #[test]
    fn create_log_without_program_key_is_not_a_create() {
        let update = tx_update(
            vec!["Program log: Instruction: Create".to_string()],
            vec![],
            false,
        );
        // Falls through to the balance-delta fallback: fee payer spent SOL.
        let parsed = parse_transaction(update).unwrap();
        assert_eq!(parsed.kind, TransactionKind::Buy);
    }

    #[test]
    fn create_detected_from_discriminator_byte() {
        for disc in [181u8, 234u8] {
            let ix = CompiledInstruction {
                program_id_index: 1,
                accounts: vec![],
                data: vec![disc, 0, 0],
            };
            let update = tx_update(vec![], vec![ix], true);
            let parsed = parse_transaction(update).unwrap();
            assert_eq!(parsed.kind, TransactionKind::Create, "disc {disc}");
        }
    }

    #[test]
    fn other_discriminators_are_not_creates() {
        let ix = CompiledInstruction {
            program_id_index: 1,
            accounts: vec![],
            data: vec![102, 0, 0],
        };
        let update = tx_update(vec![], vec![ix], true);
        let parsed = parse_transaction(update).unwrap();
        assert_ne!(parsed.kind, TransactionKind::Create);
    }

    #[test]
    fn buy_and_sell_classified_from_logs() {
        let buy = tx_update(vec!["Program log: Instruction: Buy".to_string()], vec![], true);
        assert_eq!(parse_transaction(buy).unwrap().kind, TransactionKind::Buy);

        let sell = tx_update(vec!["Program log: Instruction: Sell".to_string()], vec![], true);
        assert_eq!(parse_transaction(sell).unwrap().kind, TransactionKind::Sell);
    }

    #[test]
    fn sol_amount_nets_out_the_fee() {
        let update = tx_update(vec!["Program log: Instruction: Buy".to_string()], vec![], true);
        let parsed = parse_transaction(update).unwrap();
        // 0.5 SOL spent minus the 5000-lamport fee.
        assert!((parsed.sol_amount - 0.499_995).abs() < 1e-9);
        assert_eq!(parsed.token_amount, 1_000.0);
    }

    #[test]
    fn missing_meta_is_ignored() {
        let update = SubscribeUpdateTransaction {
            transaction: Some(SubscribeUpdateTransactionInfo {
                signature: vec![7u8; 64],
                is_vote: false,
                transaction: None,
                meta: None,
                index: 0,
            }),
            slot: 1,
        };
        assert!(parse_transaction(update).is_none());
    }
}
