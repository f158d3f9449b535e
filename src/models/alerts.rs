//! Alert models persisted by the milestone and volume analytics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// The four milestone ladders tracked per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneLadder {
    UsdLiquidity,
    SolLiquidity,
    GraduationProgress,
    Velocity,
}

impl MilestoneLadder {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneLadder::UsdLiquidity => "usd_liquidity",
            MilestoneLadder::SolLiquidity => "sol_liquidity",
            MilestoneLadder::GraduationProgress => "graduation_progress",
            MilestoneLadder::Velocity => "velocity",
        }
    }
}

/// One upward ladder crossing, persisted and subject to per-token cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneAlert {
    pub token_address: String,
    pub ladder: MilestoneLadder,
    pub threshold: f64,
    pub value: f64,
    pub severity: AlertSeverity,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeAlertKind {
    Spike,
    Imbalance,
    UnusualPattern,
}

impl VolumeAlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeAlertKind::Spike => "spike",
            VolumeAlertKind::Imbalance => "imbalance",
            VolumeAlertKind::UnusualPattern => "unusual_pattern",
        }
    }
}

/// A windowed volume anomaly, persisted append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAlert {
    pub token_address: String,
    pub kind: VolumeAlertKind,
    pub severity: AlertSeverity,
    pub volume_1h_usd: f64,
    pub hourly_avg_24h_usd: f64,
    pub buy_ratio_1h: f64,
    pub tx_count_1h: u64,
    pub message: String,
    pub time: DateTime<Utc>,
}
