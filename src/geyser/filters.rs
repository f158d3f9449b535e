//! Subscription request construction for the pump.fun firehose

use std::collections::HashMap;
use yellowstone_grpc_proto::geyser::{
    CommitmentLevel, SubscribeRequest, SubscribeRequestFilterAccounts,
    SubscribeRequestFilterTransactions,
};

/// pump.fun bonding-curve program on mainnet.
pub const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

pub fn parse_commitment(s: &str) -> CommitmentLevel {
    match s.to_ascii_lowercase().as_str() {
        "processed" => CommitmentLevel::Processed,
        "finalized" => CommitmentLevel::Finalized,
        _ => CommitmentLevel::Confirmed,
    }
}

/// Server-streaming subscription covering both upstream message kinds:
/// account updates for every pump.fun-owned account, and non-vote,
/// non-failed transactions that touch the program.
pub fn subscription_request(commitment: CommitmentLevel) -> SubscribeRequest {
    let mut accounts = HashMap::new();
    accounts.insert(
        "pump_curve_accounts".to_string(),
        SubscribeRequestFilterAccounts {
            account: vec![],
            owner: vec![PUMP_FUN_PROGRAM.to_string()],
            ..Default::default()
        },
    );

    let mut transactions = HashMap::new();
    transactions.insert(
        "pump_transactions".to_string(),
        SubscribeRequestFilterTransactions {
            vote: Some(false),
            failed: Some(false),
            account_include: vec![PUMP_FUN_PROGRAM.to_string()],
            account_exclude: vec![],
            account_required: vec![],
            ..Default::default()
        },
    );

    SubscribeRequest {
        accounts,
        transactions,
        commitment: Some(commitment as i32),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_filters_on_pump_program() {
        let request = subscription_request(CommitmentLevel::Confirmed);

        let accounts = &request.accounts["pump_curve_accounts"];
        assert_eq!(accounts.owner, vec![PUMP_FUN_PROGRAM.to_string()]);
        assert!(accounts.account.is_empty());

        let txs = &request.transactions["pump_transactions"];
        assert_eq!(txs.vote, Some(false));
        assert_eq!(txs.failed, Some(false));
        assert_eq!(txs.account_include, vec![PUMP_FUN_PROGRAM.to_string()]);
    }

    #[test]
    fn commitment_parsing_defaults_to_confirmed() {
        assert_eq!(parse_commitment("processed"), CommitmentLevel::Processed);
        assert_eq!(parse_commitment("finalized"), CommitmentLevel::Finalized);
        assert_eq!(parse_commitment("confirmed"), CommitmentLevel::Confirmed);
        assert_eq!(parse_commitment("bogus"), CommitmentLevel::Confirmed);
    }
}
