//! Token identity and lifecycle models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market-cap band a token currently occupies. Tokens below the entry
/// threshold are never persisted and therefore have no category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenCategory {
    Low,
    Medium,
    High,
    Aim,
    Graduated,
}

impl TokenCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenCategory::Low => "LOW",
            TokenCategory::Medium => "MEDIUM",
            TokenCategory::High => "HIGH",
            TokenCategory::Aim => "AIM",
            TokenCategory::Graduated => "GRADUATED",
        }
    }
}

impl std::fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(TokenCategory::Low),
            "MEDIUM" => Ok(TokenCategory::Medium),
            "HIGH" => Ok(TokenCategory::High),
            "AIM" => Ok(TokenCategory::Aim),
            "GRADUATED" => Ok(TokenCategory::Graduated),
            other => Err(format!("unknown token category: {other}")),
        }
    }
}

/// Persisted token row. Keyed by mint address; the address is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: TokenCategory,
    pub current_price_sol: f64,
    pub current_price_usd: f64,
    pub market_cap: f64,
    /// Real-SOL reserve liquidity.
    pub liquidity: f64,
    pub curve_progress: f64,
    pub bonding_curve: Option<String>,
    pub creator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_price_update: Option<DateTime<Utc>>,
    pub first_seen_above_threshold: Option<DateTime<Utc>>,
    pub below_threshold_since: Option<DateTime<Utc>>,
    pub holders: Option<i32>,
    pub top_10_percent: Option<f64>,
    pub top_25_percent: Option<f64>,
    pub holder_distribution: Option<String>,
    pub holder_last_updated: Option<DateTime<Utc>>,
    pub solsniffer_score: Option<i32>,
    pub solsniffer_checked_at: Option<DateTime<Utc>>,
    pub security_data: Option<serde_json::Value>,
    pub buy_attempts: i32,
}

/// A token first observed on the stream, buffered until the next flush.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub category: TokenCategory,
    pub current_price_sol: f64,
    pub current_price_usd: f64,
    pub market_cap: f64,
    pub liquidity: f64,
    pub curve_progress: f64,
    pub bonding_curve: Option<String>,
    pub creator: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Pending token-row refresh derived from the latest valid price update,
/// applied inside the flush transaction.
#[derive(Debug, Clone)]
pub struct TokenRowUpdate {
    pub address: String,
    pub category: TokenCategory,
    pub current_price_sol: f64,
    pub current_price_usd: f64,
    pub market_cap: f64,
    /// Real-SOL reserve liquidity.
    pub liquidity_sol: f64,
    pub curve_progress: f64,
    /// Set once, never cleared; `None` leaves the column untouched.
    pub first_seen_above_threshold: Option<DateTime<Utc>>,
    /// `Some` marks the token below the entry threshold (earliest timestamp
    /// wins); `None` clears the marker.
    pub below_threshold_since: Option<DateTime<Utc>>,
    pub last_price_update: DateTime<Utc>,
}

/// Append-only record of a category crossing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTransition {
    pub token_address: String,
    pub from_category: TokenCategory,
    pub to_category: TokenCategory,
    pub market_cap: f64,
    pub reason: String,
    pub time: DateTime<Utc>,
}
