//! Multi-criteria buy-signal evaluation.
//!
//! Only AIM tokens with holder and security data populated are evaluated;
//! everything else yields `None`, which is a business outcome rather than an
//! error. Optional quality and momentum signals raise confidence but never
//! gate.

use crate::analytics::liquidity::quality::{coefficient_of_variation, QualityInputs};
use crate::analytics::{GrowthTracker, QualityScorer, VolumeAnalytics};
use crate::config::SignalConfig;
use crate::database::Database;
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    AlertSeverity, BuySignal, LiquidityMomentum, RiskLevel, Token, TokenCategory,
    TradingSuitability,
};
use crate::sol_price::SolPriceService;
use crate::stream::Classifier;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct SignalEvaluator {
    db: Database,
    bus: EventBus,
    config: SignalConfig,
    classifier: Classifier,
    sol_price: Arc<SolPriceService>,
    growth: Arc<GrowthTracker>,
    quality: Arc<QualityScorer>,
    volume: Arc<VolumeAnalytics>,
}

impl SignalEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        bus: EventBus,
        config: SignalConfig,
        classifier: Classifier,
        sol_price: Arc<SolPriceService>,
        growth: Arc<GrowthTracker>,
        quality: Arc<QualityScorer>,
        volume: Arc<VolumeAnalytics>,
    ) -> Self {
        Self {
            db,
            bus,
            config,
            classifier,
            sol_price,
            growth,
            quality,
            volume,
        }
    }

    /// Evaluate a token. Returns `None` unless the token is in the AIM band
    /// with holders, concentration and security score all populated.
    pub async fn evaluate(&self, token_address: &str) -> Result<Option<BuySignal>> {
        let Some(token) = self.db.get_token(token_address).await? else {
            return Ok(None);
        };
        if token.category != TokenCategory::Aim {
            return Ok(None);
        }
        let (Some(holders), Some(top_10), Some(security)) =
            (token.holders, token.top_10_percent, token.solsniffer_score)
        else {
            debug!(token = %token_address, "signal inputs incomplete, skipping");
            return Ok(None);
        };

        let liquidity_usd = 2.0 * token.liquidity * self.sol_price.current();

        let quality = self.assess_quality(&token, top_10).await;
        let growth = self.growth.metrics(token_address).await.unwrap_or_else(|err| {
            warn!(token = %token_address, %err, "growth metrics unavailable");
            None
        });

        let mut signal = BuySignal {
            token_address: token_address.to_string(),
            passed: false,
            reason: String::new(),
            confidence: 0.0,
            market_cap: token.market_cap,
            liquidity_usd,
            holders,
            top_10_percent: top_10,
            security_score: security,
            quality: quality.clone(),
            growth: growth.clone(),
            risk_level: RiskLevel::Medium,
            recommended_position_sol: None,
            evaluated_at: Utc::now(),
        };

        // Hard gates, first failure wins.
        let gate_inputs = GateInputs {
            in_aim_band: self.classifier.in_aim_band(token.market_cap),
            liquidity_usd,
            top_10_percent: top_10,
            security_score: security,
            buy_attempts: token.buy_attempts,
        };
        if let Some(reason) = first_failing_gate(&self.config, &gate_inputs) {
            signal.reason = reason;
            return Ok(Some(signal));
        }

        // Optional criteria raise confidence only.
        let mut confidence: f64 = 0.5;
        if let Some(q) = &quality {
            if q.suitability >= TradingSuitability::Good {
                confidence += 0.2;
            }
        }
        if let Some(g) = &growth {
            if g.momentum == LiquidityMomentum::High {
                confidence += 0.15;
            }
            if g.accelerating {
                confidence += 0.1;
            }
        }
        let confidence = confidence.min(0.95);

        signal.passed = true;
        signal.reason = "all criteria passed".to_string();
        signal.confidence = confidence;
        signal.risk_level = risk_level(holders, top_10, quality.as_ref().map(|q| q.score));
        signal.recommended_position_sol = Some(
            self.config.min_position_sol
                + (self.config.max_position_sol - self.config.min_position_sol) * confidence,
        );

        let attempts = self.db.increment_buy_attempts(token_address).await?;
        info!(
            token = %token_address,
            confidence,
            attempts,
            "buy signal passed"
        );
        Ok(Some(signal))
    }

    async fn assess_quality(
        &self,
        token: &Token,
        top_10: f64,
    ) -> Option<crate::models::LiquidityQualityScore> {
        let volatility = match self.db.price_history(&token.address, 1.0).await {
            Ok(prices) => coefficient_of_variation(&prices),
            Err(err) => {
                warn!(token = %token.address, %err, "price history unavailable");
                None
            }
        };
        let volume_1h = self
            .volume
            .metrics(&token.address)
            .map(|m| m.window_1h.total_usd)
            .unwrap_or(0.0);

        let inputs = QualityInputs {
            liquidity_usd: 2.0 * token.liquidity * self.sol_price.current(),
            volume_1h_usd: volume_1h,
            volatility,
            top_10_percent: Some(top_10),
        };
        Some(self.quality.assess(&token.address, &inputs))
    }

    /// React to analytics events: holder updates re-evaluate AIM tokens
    /// after a short settle delay, and critical volume alerts trigger a
    /// volume-tagged re-evaluation.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rx = self.bus.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = rx.recv() => {
                    match event {
                        Ok(DomainEvent::HoldersUpdated(metrics)) => {
                            self.clone().schedule(
                                metrics.token_address,
                                Duration::from_secs(self.config.holder_reeval_delay_secs),
                                false,
                            );
                        }
                        Ok(DomainEvent::VolumeAlert(alert))
                            if alert.severity == AlertSeverity::Critical =>
                        {
                            self.clone().schedule(
                                alert.token_address,
                                Duration::from_secs(self.config.volume_reeval_delay_secs),
                                true,
                            );
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "signal evaluator lagged on the event bus");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }

    fn schedule(self: Arc<Self>, token_address: String, delay: Duration, volume_triggered: bool) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match self.evaluate(&token_address).await {
                Ok(Some(signal)) if signal.passed => {
                    let event = if volume_triggered {
                        DomainEvent::VolumeTriggeredBuySignal(signal)
                    } else {
                        DomainEvent::BuySignal(signal)
                    };
                    self.bus.publish(event);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(token = %token_address, %err, "signal evaluation failed");
                }
            }
        });
    }
}

/// Everything the hard gates look at.
#[derive(Debug, Clone)]
pub struct GateInputs {
    pub in_aim_band: bool,
    pub liquidity_usd: f64,
    pub top_10_percent: f64,
    pub security_score: i32,
    pub buy_attempts: i32,
}

/// The first gate the inputs fail, or `None` when all pass.
pub fn first_failing_gate(config: &SignalConfig, inputs: &GateInputs) -> Option<String> {
    if !inputs.in_aim_band {
        return Some("market cap outside AIM band".to_string());
    }
    if inputs.liquidity_usd < config.min_liquidity_usd {
        return Some(format!(
            "liquidity ${:.0} below ${:.0} minimum",
            inputs.liquidity_usd, config.min_liquidity_usd
        ));
    }
    if inputs.top_10_percent > config.max_top10_percent {
        return Some(format!(
            "top-10 concentration {:.1}% above {:.1}% ceiling",
            inputs.top_10_percent, config.max_top10_percent
        ));
    }
    if inputs.security_score <= config.min_security_score {
        return Some(format!(
            "security score {} at or below {} minimum",
            inputs.security_score, config.min_security_score
        ));
    }
    if inputs.security_score == config.blacklist_security_score {
        return Some(format!(
            "security score {} is the flagged value",
            inputs.security_score
        ));
    }
    if inputs.buy_attempts >= config.max_buy_attempts {
        return Some(format!(
            "buy attempts exhausted ({}/{})",
            inputs.buy_attempts, config.max_buy_attempts
        ));
    }
    None
}

fn risk_level(holders: i32, top_10: f64, quality_score: Option<f64>) -> RiskLevel {
    if top_10 > 30.0 || quality_score.is_some_and(|s| s < 50.0) {
        RiskLevel::High
    } else if holders >= 200 && top_10 < 20.0 {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aim_inputs() -> GateInputs {
        GateInputs {
            in_aim_band: true,
            liquidity_usd: 12_000.0,
            top_10_percent: 28.0,
            security_score: 72,
            buy_attempts: 0,
        }
    }

    #[test]
    fn healthy_aim_token_passes_all_gates() {
        let config = SignalConfig::default();
        assert_eq!(first_failing_gate(&config, &aim_inputs()), None);
    }

    #[test]
    fn flagged_security_score_fails() {
        let config = SignalConfig::default();
        let mut inputs = aim_inputs();
        inputs.security_score = 90;
        assert!(first_failing_gate(&config, &inputs)
            .unwrap()
            .contains("flagged"));
    }

    #[test]
    fn concentrated_supply_fails() {
        let config = SignalConfig::default();
        let mut inputs = aim_inputs();
        inputs.top_10_percent = 65.0;
        assert!(first_failing_gate(&config, &inputs)
            .unwrap()
            .contains("concentration"));
    }

    #[test]
    fn low_security_score_fails_inclusively() {
        let config = SignalConfig::default();
        let mut inputs = aim_inputs();
        inputs.security_score = 60;
        assert!(first_failing_gate(&config, &inputs).is_some());
        inputs.security_score = 61;
        assert_eq!(first_failing_gate(&config, &inputs), None);
    }

    #[test]
    fn thin_liquidity_fails() {
        let config = SignalConfig::default();
        let mut inputs = aim_inputs();
        inputs.liquidity_usd = 5_000.0;
        assert!(first_failing_gate(&config, &inputs)
            .unwrap()
            .contains("liquidity"));
    }

    #[test]
    fn exhausted_attempts_suppress_further_passes() {
        let config = SignalConfig::default();
        let mut inputs = aim_inputs();
        inputs.buy_attempts = 3;
        assert!(first_failing_gate(&config, &inputs)
            .unwrap()
            .contains("attempts"));
    }

    #[test]
    fn concentrated_supply_is_high_risk() {
        assert_eq!(risk_level(500, 45.0, Some(90.0)), RiskLevel::High);
        assert_eq!(risk_level(100, 10.0, Some(30.0)), RiskLevel::High);
    }

    #[test]
    fn broad_distribution_is_low_risk() {
        assert_eq!(risk_level(250, 15.0, Some(80.0)), RiskLevel::Low);
    }

    #[test]
    fn middling_inputs_are_medium_risk() {
        assert_eq!(risk_level(100, 25.0, Some(70.0)), RiskLevel::Medium);
    }
}
