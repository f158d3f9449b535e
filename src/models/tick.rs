//! Time-series row models for the price and transaction hypertables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed price point for a token. Unique on `(token_address, time)`;
/// duplicates within a flush are deduplicated keeping the highest slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub token_address: String,
    pub time: DateTime<Utc>,
    pub price_usd: f64,
    pub price_sol: f64,
    pub virtual_sol_reserves: i64,
    pub virtual_token_reserves: i64,
    pub real_sol_reserves: i64,
    pub real_token_reserves: i64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub slot: i64,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Create,
    Buy,
    Sell,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Create => "create",
            TransactionKind::Buy => "buy",
            TransactionKind::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded pump.fun transaction. Unique on
/// `(signature, token_address, time)`. `token_address` is `None` when the
/// mint could not be resolved; such rows are filtered out at flush time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransaction {
    pub signature: String,
    pub token_address: Option<String>,
    pub time: DateTime<Utc>,
    pub kind: TransactionKind,
    pub user_address: Option<String>,
    pub token_amount: f64,
    /// Defaults to 0 when the upstream payload omits it.
    pub sol_amount: f64,
    pub price_usd: Option<f64>,
    pub price_sol: Option<f64>,
    pub slot: i64,
    pub fee: i64,
}
