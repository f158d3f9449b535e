//! Market-cap band classification.
//!
//! The lifecycle state machine is a pure function of the current USD market
//! cap; transitions fire only on a crossing. Boundary values belong to the
//! upper band, so exactly the entry threshold is LOW.

use crate::config::CategoryThresholds;
use crate::models::TokenCategory;

#[derive(Debug, Clone)]
pub struct Classifier {
    thresholds: CategoryThresholds,
}

impl Classifier {
    pub fn new(thresholds: CategoryThresholds) -> Self {
        Self { thresholds }
    }

    /// Band containing the market cap, or `None` below the entry threshold.
    pub fn classify(&self, market_cap_usd: f64) -> Option<TokenCategory> {
        let t = &self.thresholds;
        if market_cap_usd < t.entry_usd {
            None
        } else if market_cap_usd < t.medium_usd {
            Some(TokenCategory::Low)
        } else if market_cap_usd < t.high_usd {
            Some(TokenCategory::Medium)
        } else if market_cap_usd < t.aim_usd {
            Some(TokenCategory::High)
        } else if market_cap_usd < t.graduated_usd {
            Some(TokenCategory::Aim)
        } else {
            Some(TokenCategory::Graduated)
        }
    }

    /// True when the market cap sits inside the actionable AIM band.
    pub fn in_aim_band(&self, market_cap_usd: f64) -> bool {
        self.classify(market_cap_usd) == Some(TokenCategory::Aim)
    }

    pub fn entry_threshold(&self) -> f64 {
        self.thresholds.entry_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(CategoryThresholds::default())
    }

    #[test]
    fn below_entry_is_unclassified() {
        let c = classifier();
        assert_eq!(c.classify(0.0), None);
        assert_eq!(c.classify(7_999.99), None);
    }

    #[test]
    fn boundaries_belong_to_the_upper_band() {
        let c = classifier();
        assert_eq!(c.classify(8_000.0), Some(TokenCategory::Low));
        assert_eq!(c.classify(14_999.99), Some(TokenCategory::Low));
        assert_eq!(c.classify(15_000.0), Some(TokenCategory::Medium));
        assert_eq!(c.classify(25_000.0), Some(TokenCategory::High));
        assert_eq!(c.classify(35_000.0), Some(TokenCategory::Aim));
        assert_eq!(c.classify(105_000.0), Some(TokenCategory::Graduated));
    }

    #[test]
    fn interior_points_classify() {
        let c = classifier();
        assert_eq!(c.classify(10_000.0), Some(TokenCategory::Low));
        assert_eq!(c.classify(20_000.0), Some(TokenCategory::Medium));
        assert_eq!(c.classify(30_000.0), Some(TokenCategory::High));
        assert_eq!(c.classify(70_000.0), Some(TokenCategory::Aim));
        assert_eq!(c.classify(1_000_000.0), Some(TokenCategory::Graduated));
    }

    #[test]
    fn aim_band_check() {
        let c = classifier();
        assert!(c.in_aim_band(40_000.0));
        assert!(!c.in_aim_band(110_000.0));
        assert!(!c.in_aim_band(30_000.0));
    }
}
