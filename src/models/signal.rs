//! Buy-signal record emitted by the evaluator

use super::{LiquidityGrowthMetrics, LiquidityQualityScore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Result of one buy-signal evaluation. `passed == false` carries the first
/// failing gate in `reason`; this is a business outcome, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuySignal {
    pub token_address: String,
    pub passed: bool,
    pub reason: String,
    /// 0..1, raised by optional quality/momentum criteria.
    pub confidence: f64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub holders: i32,
    pub top_10_percent: f64,
    pub security_score: i32,
    pub quality: Option<LiquidityQualityScore>,
    pub growth: Option<LiquidityGrowthMetrics>,
    pub risk_level: RiskLevel,
    /// Suggested position size in SOL, only on a pass.
    pub recommended_position_sol: Option<f64>,
    pub evaluated_at: DateTime<Utc>,
}
