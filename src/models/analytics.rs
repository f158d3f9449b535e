//! Analytics records derived by the liquidity, holder and volume subsystems.
//!
//! These are owned by their subsystem, cached in memory, and recomputable at
//! any time from the time-series store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquidityMomentum {
    High,
    Medium,
    Low,
    Declining,
}

impl LiquidityMomentum {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityMomentum::High => "HIGH",
            LiquidityMomentum::Medium => "MEDIUM",
            LiquidityMomentum::Low => "LOW",
            LiquidityMomentum::Declining => "DECLINING",
        }
    }
}

/// Liquidity growth over rolling windows, in SOL per hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityGrowthMetrics {
    pub token_address: String,
    pub rate_1h: f64,
    pub rate_6h: f64,
    pub rate_24h: f64,
    pub momentum: LiquidityMomentum,
    pub accelerating: bool,
    pub peak_liquidity_sol: f64,
    pub hours_since_peak: f64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingSuitability {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl TradingSuitability {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingSuitability::Excellent => "EXCELLENT",
            TradingSuitability::Good => "GOOD",
            TradingSuitability::Fair => "FAIR",
            TradingSuitability::Poor => "POOR",
        }
    }
}

/// Composite liquidity quality score, clamped to [0, 100].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityQualityScore {
    pub token_address: String,
    pub score: f64,
    pub grade: char,
    pub suitability: TradingSuitability,
    pub computed_at: DateTime<Utc>,
}

/// Holder concentration metrics for one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderMetrics {
    pub token_address: String,
    pub total_holders: i32,
    pub top_1_percent: f64,
    pub top_5_percent: f64,
    pub top_10_percent: f64,
    pub top_25_percent: f64,
    pub top_50_percent: f64,
    pub data_source: String,
    pub updated_at: DateTime<Utc>,
}

/// Aggregates for one rolling volume window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VolumeWindowStats {
    pub total_usd: f64,
    pub buy_usd: f64,
    pub sell_usd: f64,
    pub tx_count: u64,
    /// Buy share of total volume, 0..1. Zero when the window is empty.
    pub buy_ratio: f64,
}

/// Windowed volume aggregates for one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMetrics {
    pub token_address: String,
    pub window_1h: VolumeWindowStats,
    pub window_4h: VolumeWindowStats,
    pub window_24h: VolumeWindowStats,
    pub computed_at: DateTime<Utc>,
}
