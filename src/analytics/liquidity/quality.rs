//! Composite liquidity quality scoring.
//!
//! The score blends liquidity depth, recent volume, price volatility and
//! holder concentration. Weights are configuration; the result is monotone
//! in liquidity and volume, inversely monotone in volatility and
//! concentration, and clamped to [0, 100].

use crate::config::QualityConfig;
use crate::models::{LiquidityQualityScore, TradingSuitability};
use chrono::Utc;

/// Volatility (coefficient of variation) at which the volatility component
/// bottoms out.
const MAX_USEFUL_VOLATILITY: f64 = 0.5;

/// Inputs assembled by the caller from the token row, price history and
/// volume windows. Missing pieces degrade to neutral values rather than
/// failing the assessment.
#[derive(Debug, Clone, Default)]
pub struct QualityInputs {
    pub liquidity_usd: f64,
    pub volume_1h_usd: f64,
    /// Coefficient of variation of recent prices; `None` when history is too
    /// short.
    pub volatility: Option<f64>,
    /// Top-10 holder concentration percentage.
    pub top_10_percent: Option<f64>,
}

pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, token_address: &str, inputs: &QualityInputs) -> LiquidityQualityScore {
        let c = &self.config;

        let liquidity_component =
            (inputs.liquidity_usd / c.full_marks_liquidity_usd).clamp(0.0, 1.0) * 100.0;
        let volume_component =
            (inputs.volume_1h_usd / c.full_marks_volume_usd).clamp(0.0, 1.0) * 100.0;
        // Neutral midpoints when the signal is missing.
        let volatility_component = match inputs.volatility {
            Some(v) => (1.0 - (v / MAX_USEFUL_VOLATILITY).clamp(0.0, 1.0)) * 100.0,
            None => 50.0,
        };
        let concentration_component = match inputs.top_10_percent {
            Some(pct) => (100.0 - pct).clamp(0.0, 100.0),
            None => 50.0,
        };

        let score = (liquidity_component * c.liquidity_weight
            + volume_component * c.volume_weight
            + volatility_component * c.volatility_weight
            + concentration_component * c.concentration_weight)
            .clamp(0.0, 100.0);

        LiquidityQualityScore {
            token_address: token_address.to_string(),
            score,
            grade: grade_for(score),
            suitability: suitability_for(score),
            computed_at: Utc::now(),
        }
    }
}

/// Coefficient of variation of a price series; `None` below two samples.
pub fn coefficient_of_variation(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean == 0.0 {
        return None;
    }
    let variance =
        prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
    Some(variance.sqrt() / mean)
}

fn grade_for(score: f64) -> char {
    match score {
        s if s >= 90.0 => 'A',
        s if s >= 75.0 => 'B',
        s if s >= 60.0 => 'C',
        s if s >= 45.0 => 'D',
        _ => 'F',
    }
}

fn suitability_for(score: f64) -> TradingSuitability {
    match score {
        s if s >= 80.0 => TradingSuitability::Excellent,
        s if s >= 60.0 => TradingSuitability::Good,
        s if s >= 40.0 => TradingSuitability::Fair,
        _ => TradingSuitability::Poor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;

    fn scorer() -> QualityScorer {
        QualityScorer::new(QualityConfig::default())
    }

    fn inputs(liquidity: f64, top10: f64) -> QualityInputs {
        QualityInputs {
            liquidity_usd: liquidity,
            volume_1h_usd: 5_000.0,
            volatility: Some(0.1),
            top_10_percent: Some(top10),
        }
    }

    #[test]
    fn score_is_monotone_in_liquidity() {
        let s = scorer();
        let low = s.assess("mint", &inputs(5_000.0, 30.0));
        let high = s.assess("mint", &inputs(40_000.0, 30.0));
        assert!(high.score > low.score);
    }

    #[test]
    fn score_is_inversely_monotone_in_concentration() {
        let s = scorer();
        let spread = s.assess("mint", &inputs(20_000.0, 15.0));
        let concentrated = s.assess("mint", &inputs(20_000.0, 80.0));
        assert!(spread.score > concentrated.score);
    }

    #[test]
    fn score_is_inversely_monotone_in_volatility() {
        let s = scorer();
        let mut calm = inputs(20_000.0, 30.0);
        calm.volatility = Some(0.05);
        let mut wild = inputs(20_000.0, 30.0);
        wild.volatility = Some(0.45);
        assert!(s.assess("mint", &calm).score > s.assess("mint", &wild).score);
    }

    #[test]
    fn score_is_clamped() {
        let s = scorer();
        let maxed = s.assess(
            "mint",
            &QualityInputs {
                liquidity_usd: 1e9,
                volume_1h_usd: 1e9,
                volatility: Some(0.0),
                top_10_percent: Some(0.0),
            },
        );
        assert!(maxed.score <= 100.0);
        assert_eq!(maxed.grade, 'A');
        assert_eq!(maxed.suitability, TradingSuitability::Excellent);

        let floored = s.assess("mint", &QualityInputs::default());
        assert!(floored.score >= 0.0);
    }

    #[test]
    fn cv_needs_two_samples() {
        assert!(coefficient_of_variation(&[1.0]).is_none());
        let cv = coefficient_of_variation(&[1.0, 1.0, 1.0]).unwrap();
        assert!(cv.abs() < 1e-12);
    }

    #[test]
    fn grades_follow_score_bands() {
        assert_eq!(grade_for(95.0), 'A');
        assert_eq!(grade_for(75.0), 'B');
        assert_eq!(grade_for(60.0), 'C');
        assert_eq!(grade_for(45.0), 'D');
        assert_eq!(grade_for(20.0), 'F');
    }
}
