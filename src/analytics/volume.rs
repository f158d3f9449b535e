//! Windowed buy/sell volume aggregation and anomaly detection.
//!
//! Per-token rolling windows over 1h/4h/24h, fed from the ingest path.
//! Only MEDIUM/HIGH/AIM tokens and trades of at least the configured USD
//! value are counted. Alerts are returned to the caller for persistence and
//! fan-out.

use crate::config::VolumeConfig;
use crate::models::{
    AlertSeverity, TokenCategory, TransactionKind, VolumeAlert, VolumeAlertKind, VolumeMetrics,
    VolumeWindowStats,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Per-(token, kind) alert cooldown so a burst of trades does not re-alert
/// on every tick.
const ALERT_COOLDOWN_SECS: i64 = 600;

/// A spike is only meaningful once the 24h window has history beyond the
/// hour being compared.
const SPIKE_MIN_HISTORY_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy)]
struct TradeRecord {
    kind: TransactionKind,
    usd: f64,
    time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TokenVolumeState {
    trades: VecDeque<TradeRecord>,
    imbalance_times: VecDeque<DateTime<Utc>>,
    last_alert: HashMap<VolumeAlertKind, DateTime<Utc>>,
}

pub struct VolumeAnalytics {
    config: VolumeConfig,
    state: Mutex<HashMap<String, TokenVolumeState>>,
}

impl VolumeAnalytics {
    pub fn new(config: VolumeConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Ingest one transaction; returns any alerts it triggered.
    pub fn record(
        &self,
        token_address: &str,
        kind: TransactionKind,
        usd_value: f64,
        category: TokenCategory,
        time: DateTime<Utc>,
    ) -> Vec<VolumeAlert> {
        if !matches!(
            category,
            TokenCategory::Medium | TokenCategory::High | TokenCategory::Aim
        ) {
            return Vec::new();
        }
        if usd_value < self.config.min_usd_value {
            return Vec::new();
        }
        if kind == TransactionKind::Create {
            return Vec::new();
        }

        let mut state = self.state.lock().expect("volume state poisoned");
        let entry = state.entry(token_address.to_string()).or_default();

        entry.trades.push_back(TradeRecord {
            kind,
            usd: usd_value,
            time,
        });
        let cutoff_24h = time - ChronoDuration::hours(24);
        while entry.trades.front().is_some_and(|t| t.time < cutoff_24h) {
            entry.trades.pop_front();
        }

        self.detect(token_address, entry, time)
    }

    fn detect(
        &self,
        token_address: &str,
        entry: &mut TokenVolumeState,
        now: DateTime<Utc>,
    ) -> Vec<VolumeAlert> {
        let w1h = window_stats(&entry.trades, now - ChronoDuration::hours(1));
        let w24h = window_stats(&entry.trades, now - ChronoDuration::hours(24));
        let hourly_avg = w24h.total_usd / 24.0;

        let mut alerts = Vec::new();
        let cooldown = ChronoDuration::seconds(ALERT_COOLDOWN_SECS);
        let mut fire = |entry: &mut TokenVolumeState,
                        kind: VolumeAlertKind,
                        severity: AlertSeverity,
                        message: String|
         -> bool {
            let clear = entry
                .last_alert
                .get(&kind)
                .is_none_or(|&at| now - at >= cooldown);
            if clear {
                entry.last_alert.insert(kind, now);
                alerts.push(VolumeAlert {
                    token_address: token_address.to_string(),
                    kind,
                    severity,
                    volume_1h_usd: w1h.total_usd,
                    hourly_avg_24h_usd: hourly_avg,
                    buy_ratio_1h: w1h.buy_ratio,
                    tx_count_1h: w1h.tx_count,
                    message,
                    time: now,
                });
            }
            clear
        };

        let oldest = entry.trades.front().map(|t| t.time);
        let enough_history = oldest
            .is_some_and(|t| now - t >= ChronoDuration::hours(SPIKE_MIN_HISTORY_HOURS));
        if enough_history && hourly_avg > 0.0 {
            let multiple = w1h.total_usd / hourly_avg;
            if multiple >= self.config.spike_multiplier {
                let severity = if multiple >= 3.0 * self.config.spike_multiplier {
                    AlertSeverity::Critical
                } else if multiple >= 2.0 * self.config.spike_multiplier {
                    AlertSeverity::High
                } else {
                    AlertSeverity::Medium
                };
                fire(
                    entry,
                    VolumeAlertKind::Spike,
                    severity,
                    format!("1h volume {multiple:.1}x the 24h hourly average"),
                );
            }
        }

        if w1h.tx_count >= self.config.imbalance_min_tx
            && (w1h.buy_ratio > self.config.imbalance_high_ratio
                || w1h.buy_ratio < self.config.imbalance_low_ratio)
        {
            let severity = if w1h.buy_ratio > 0.9 || w1h.buy_ratio < 0.1 {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            let side = if w1h.buy_ratio > 0.5 { "buy" } else { "sell" };
            let fired = fire(
                entry,
                VolumeAlertKind::Imbalance,
                severity,
                format!("{side}-side imbalance, buy ratio {:.0}%", w1h.buy_ratio * 100.0),
            );

            // Only fired imbalance alerts count toward the sustained-anomaly
            // detector.
            if fired {
                entry.imbalance_times.push_back(now);
            }
            let window = ChronoDuration::seconds(self.config.unusual_window_secs as i64);
            while entry
                .imbalance_times
                .front()
                .is_some_and(|&t| now - t > window)
            {
                entry.imbalance_times.pop_front();
            }

            if fired && entry.imbalance_times.len() >= self.config.unusual_imbalance_count {
                let severity = if entry.imbalance_times.len() >= 2 * self.config.unusual_imbalance_count
                {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::High
                };
                fire(
                    entry,
                    VolumeAlertKind::UnusualPattern,
                    severity,
                    format!(
                        "{} imbalance detections inside the window",
                        entry.imbalance_times.len()
                    ),
                );
            }
        }

        alerts
    }

    /// Current windowed aggregates for a token, if it has any trades.
    pub fn metrics(&self, token_address: &str) -> Option<VolumeMetrics> {
        let state = self.state.lock().expect("volume state poisoned");
        let entry = state.get(token_address)?;
        let now = Utc::now();
        Some(VolumeMetrics {
            token_address: token_address.to_string(),
            window_1h: window_stats(&entry.trades, now - ChronoDuration::hours(1)),
            window_4h: window_stats(&entry.trades, now - ChronoDuration::hours(4)),
            window_24h: window_stats(&entry.trades, now - ChronoDuration::hours(24)),
            computed_at: now,
        })
    }

    /// Top tokens by 1h volume for the periodic leaderboard display.
    pub fn leaderboard(&self, limit: usize) -> Vec<(String, VolumeWindowStats)> {
        let state = self.state.lock().expect("volume state poisoned");
        let cutoff = Utc::now() - ChronoDuration::hours(1);
        let mut entries: Vec<(String, VolumeWindowStats)> = state
            .iter()
            .map(|(address, entry)| (address.clone(), window_stats(&entry.trades, cutoff)))
            .filter(|(_, stats)| stats.tx_count > 0)
            .collect();
        entries.sort_by(|a, b| b.1.total_usd.total_cmp(&a.1.total_usd));
        entries.truncate(limit);
        entries
    }

    /// Drop tokens with no trades in the last 24 hours.
    pub fn prune(&self) {
        let cutoff = Utc::now() - ChronoDuration::hours(24);
        self.state
            .lock()
            .expect("volume state poisoned")
            .retain(|_, entry| entry.trades.back().is_some_and(|t| t.time > cutoff));
    }

    pub fn tracked_count(&self) -> usize {
        self.state.lock().expect("volume state poisoned").len()
    }
}

fn window_stats(trades: &VecDeque<TradeRecord>, cutoff: DateTime<Utc>) -> VolumeWindowStats {
    let mut stats = VolumeWindowStats::default();
    for trade in trades.iter().filter(|t| t.time >= cutoff) {
        stats.total_usd += trade.usd;
        stats.tx_count += 1;
        match trade.kind {
            TransactionKind::Buy => stats.buy_usd += trade.usd,
            TransactionKind::Sell => stats.sell_usd += trade.usd,
            TransactionKind::Create => {}
        }
    }
    if stats.total_usd > 0.0 {
        stats.buy_ratio = stats.buy_usd / stats.total_usd;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics() -> VolumeAnalytics {
        VolumeAnalytics::new(VolumeConfig::default())
    }

    #[test]
    fn below_minimum_usd_or_wrong_category_is_ignored() {
        let v = analytics();
        let now = Utc::now();
        assert!(v
            .record("mint", TransactionKind::Buy, 5.0, TokenCategory::Aim, now)
            .is_empty());
        assert!(v
            .record("mint", TransactionKind::Buy, 100.0, TokenCategory::Low, now)
            .is_empty());
        assert!(v.metrics("mint").is_none() || v.metrics("mint").unwrap().window_1h.tx_count == 0);
    }

    #[test]
    fn windows_aggregate_buys_and_sells() {
        let v = analytics();
        let now = Utc::now();
        v.record("mint", TransactionKind::Buy, 100.0, TokenCategory::Aim, now);
        v.record("mint", TransactionKind::Sell, 50.0, TokenCategory::Aim, now);

        let metrics = v.metrics("mint").unwrap();
        assert_eq!(metrics.window_1h.tx_count, 2);
        assert_eq!(metrics.window_1h.total_usd, 150.0);
        assert_eq!(metrics.window_1h.buy_usd, 100.0);
        assert!((metrics.window_1h.buy_ratio - 100.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn spike_fires_against_quiet_history() {
        let v = analytics();
        let now = Utc::now();
        // Sparse background volume over the past day.
        for hour in 3..24 {
            v.record(
                "mint",
                TransactionKind::Buy,
                20.0,
                TokenCategory::Aim,
                now - ChronoDuration::hours(hour),
            );
        }
        // Burst inside the last hour.
        let mut spiked = false;
        for _ in 0..10 {
            let alerts = v.record("mint", TransactionKind::Buy, 200.0, TokenCategory::Aim, now);
            spiked |= alerts.iter().any(|a| a.kind == VolumeAlertKind::Spike);
        }
        assert!(spiked);
    }

    #[test]
    fn young_token_does_not_spike() {
        let v = analytics();
        let now = Utc::now();
        for _ in 0..20 {
            let alerts = v.record("mint", TransactionKind::Buy, 500.0, TokenCategory::Aim, now);
            assert!(alerts.iter().all(|a| a.kind != VolumeAlertKind::Spike));
        }
    }

    #[test]
    fn one_sided_flow_raises_imbalance_then_unusual_pattern() {
        let mut config = VolumeConfig::default();
        config.unusual_imbalance_count = 2;
        config.unusual_window_secs = 3600;
        let v = VolumeAnalytics::new(config);
        let t0 = Utc::now();

        let mut kinds = Vec::new();
        // Three waves of pure buying, spaced past the alert cooldown.
        for wave in 0..3 {
            let t = t0 + ChronoDuration::seconds(wave * (ALERT_COOLDOWN_SECS + 1));
            for _ in 0..12 {
                for alert in v.record("mint", TransactionKind::Buy, 50.0, TokenCategory::Aim, t) {
                    kinds.push(alert.kind);
                }
            }
        }

        assert!(kinds.contains(&VolumeAlertKind::Imbalance));
        assert!(kinds.contains(&VolumeAlertKind::UnusualPattern));
    }

    #[test]
    fn alert_cooldown_holds_within_window() {
        let v = analytics();
        let now = Utc::now();
        let mut imbalances = 0;
        for _ in 0..30 {
            for alert in v.record("mint", TransactionKind::Buy, 50.0, TokenCategory::Aim, now) {
                if alert.kind == VolumeAlertKind::Imbalance {
                    imbalances += 1;
                }
            }
        }
        assert_eq!(imbalances, 1);
    }

    #[test]
    fn leaderboard_orders_by_hourly_volume() {
        let v = analytics();
        let now = Utc::now();
        v.record("small", TransactionKind::Buy, 100.0, TokenCategory::Aim, now);
        v.record("big", TransactionKind::Buy, 900.0, TokenCategory::Aim, now);

        let board = v.leaderboard(10);
        assert_eq!(board[0].0, "big");
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn prune_drops_stale_tokens() {
        let v = analytics();
        v.record(
            "mint",
            TransactionKind::Buy,
            100.0,
            TokenCategory::Aim,
            Utc::now() - ChronoDuration::hours(25),
        );
        v.prune();
        assert_eq!(v.tracked_count(), 0);
    }
}
