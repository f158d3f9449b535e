//! Liquidity growth tracking over rolling windows.
//!
//! Rates are average real-SOL reserve growth in SOL/hour over 1h/6h/24h,
//! read from the price hypertable. Results are cached per token and
//! recomputed lazily once older than the configured TTL.

use crate::config::GrowthConfig;
use crate::database::Database;
use crate::models::{LiquidityGrowthMetrics, LiquidityMomentum};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct GrowthTracker {
    db: Database,
    config: GrowthConfig,
    cache: Mutex<HashMap<String, LiquidityGrowthMetrics>>,
}

impl GrowthTracker {
    pub fn new(db: Database, config: GrowthConfig) -> Self {
        Self {
            db,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Growth metrics for a token, from cache when fresh enough. Returns
    /// `None` when the token has no liquidity history.
    pub async fn metrics(&self, token_address: &str) -> Result<Option<LiquidityGrowthMetrics>> {
        let now = Utc::now();
        {
            let cache = self.cache.lock().expect("growth cache poisoned");
            if let Some(cached) = cache.get(token_address) {
                let age = now - cached.computed_at;
                if age < ChronoDuration::seconds(self.config.cache_ttl_secs as i64) {
                    return Ok(Some(cached.clone()));
                }
            }
        }

        let history = self.db.liquidity_history(token_address, 24.0).await?;
        if history.is_empty() {
            return Ok(None);
        }

        let metrics = compute_metrics(token_address, &history, now);
        self.cache
            .lock()
            .expect("growth cache poisoned")
            .insert(token_address.to_string(), metrics.clone());
        Ok(Some(metrics))
    }

    /// Drop cached entries older than the given age.
    pub fn prune(&self, max_age: ChronoDuration) {
        let cutoff = Utc::now() - max_age;
        self.cache
            .lock()
            .expect("growth cache poisoned")
            .retain(|_, m| m.computed_at > cutoff);
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().expect("growth cache poisoned").len()
    }
}

fn compute_metrics(
    token_address: &str,
    history: &[(DateTime<Utc>, f64)],
    now: DateTime<Utc>,
) -> LiquidityGrowthMetrics {
    let rate_1h = window_rate(history, now, 1.0);
    let rate_6h = window_rate(history, now, 6.0);
    let rate_24h = window_rate(history, now, 24.0);

    let (peak_time, peak_liquidity_sol) = history
        .iter()
        .fold((now, 0.0f64), |(best_t, best_v), &(t, v)| {
            if v > best_v {
                (t, v)
            } else {
                (best_t, best_v)
            }
        });
    let hours_since_peak = (now - peak_time).num_seconds().max(0) as f64 / 3600.0;

    LiquidityGrowthMetrics {
        token_address: token_address.to_string(),
        rate_1h,
        rate_6h,
        rate_24h,
        momentum: classify_momentum(rate_1h, rate_6h, rate_24h),
        accelerating: rate_1h > rate_6h && rate_1h > 0.0,
        peak_liquidity_sol,
        hours_since_peak,
        computed_at: now,
    }
}

/// Average growth rate in SOL/hour across the samples inside the window.
fn window_rate(history: &[(DateTime<Utc>, f64)], now: DateTime<Utc>, hours: f64) -> f64 {
    let cutoff = now - ChronoDuration::seconds((hours * 3600.0) as i64);
    let mut window = history.iter().filter(|(t, _)| *t >= cutoff);

    let Some(&(first_t, first_v)) = window.next() else {
        return 0.0;
    };
    let Some(&(last_t, last_v)) = history.last() else {
        return 0.0;
    };

    let span_hours = (last_t - first_t).num_seconds() as f64 / 3600.0;
    if span_hours <= 0.0 {
        return 0.0;
    }
    (last_v - first_v) / span_hours
}

fn classify_momentum(rate_1h: f64, rate_6h: f64, rate_24h: f64) -> LiquidityMomentum {
    if (rate_1h > 5.0 && rate_1h > rate_6h)
        || (rate_1h > 2.0 && rate_6h > 1.0 && rate_1h > 1.5 * rate_6h)
    {
        return LiquidityMomentum::High;
    }
    if (rate_1h < 0.0 && rate_6h < 0.0)
        || (rate_1h < rate_6h && rate_6h < rate_24h && rate_1h < 1.0)
    {
        return LiquidityMomentum::Declining;
    }
    if rate_1h >= 1.0 {
        LiquidityMomentum::Medium
    } else {
        LiquidityMomentum::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_short_term_growth_is_high() {
        assert_eq!(classify_momentum(6.0, 2.0, 1.0), LiquidityMomentum::High);
        // Moderate but clearly accelerating versus the 6h window.
        assert_eq!(classify_momentum(2.5, 1.2, 0.5), LiquidityMomentum::High);
    }

    #[test]
    fn shrinking_reserves_are_declining() {
        assert_eq!(
            classify_momentum(-1.0, -0.5, 0.2),
            LiquidityMomentum::Declining
        );
        // Decelerating across all three windows.
        assert_eq!(
            classify_momentum(0.2, 0.5, 0.8),
            LiquidityMomentum::Declining
        );
    }

    #[test]
    fn modest_growth_is_medium_or_low() {
        assert_eq!(classify_momentum(1.5, 1.4, 1.0), LiquidityMomentum::Medium);
        assert_eq!(classify_momentum(0.5, 0.4, 0.3), LiquidityMomentum::Low);
    }

    #[test]
    fn rate_spans_first_to_last_sample() {
        let now = Utc::now();
        let history = vec![
            (now - ChronoDuration::minutes(60), 10.0),
            (now - ChronoDuration::minutes(30), 12.0),
            (now, 14.0),
        ];
        let rate = window_rate(&history, now, 1.0);
        assert!((rate - 4.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_rate_is_zero() {
        let now = Utc::now();
        let history = vec![(now - ChronoDuration::hours(5), 10.0)];
        assert_eq!(window_rate(&history, now, 1.0), 0.0);
    }

    #[test]
    fn acceleration_flag_requires_positive_short_rate() {
        let now = Utc::now();
        let history = vec![
            (now - ChronoDuration::hours(6), 10.0),
            (now - ChronoDuration::minutes(50), 11.0),
            (now, 13.0),
        ];
        let metrics = compute_metrics("mint", &history, now);
        assert!(metrics.accelerating);
        assert!(metrics.peak_liquidity_sol >= 13.0);
    }
}
