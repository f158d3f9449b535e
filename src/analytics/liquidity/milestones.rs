//! Milestone ladder tracking with per-token cooldowns.
//!
//! Four ladders are watched per token: USD liquidity, SOL liquidity (73
//! marks graduation), graduation progress, and liquidity velocity. An alert
//! fires on the first upward crossing of a threshold not already alerted
//! inside the cooldown window. The tracker is pure in-memory state; the
//! caller persists alerts and publishes events.

use crate::config::MilestoneConfig;
use crate::models::{AlertSeverity, MilestoneAlert, MilestoneLadder};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub const USD_LADDER: [f64; 9] = [
    2_500.0, 5_000.0, 7_500.0, 10_000.0, 15_000.0, 25_000.0, 50_000.0, 75_000.0, 100_000.0,
];
/// 73 SOL of real reserves marks graduation.
pub const SOL_LADDER: [f64; 8] = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 73.0];
pub const PROGRESS_LADDER: [f64; 9] = [25.0, 50.0, 60.0, 70.0, 80.0, 85.0, 90.0, 95.0, 99.0];
pub const VELOCITY_LADDER: [f64; 7] = [1.0, 2.0, 5.0, 10.0, 15.0, 20.0, 30.0];

pub const GRADUATION_SOL: f64 = 73.0;

/// One liquidity observation handed in by the ingest path.
#[derive(Debug, Clone, Copy)]
pub struct LiquidityObservation {
    pub usd_liquidity: f64,
    pub sol_liquidity: f64,
    pub progress_percent: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TokenMilestoneState {
    prev_usd: f64,
    prev_sol: f64,
    prev_progress: f64,
    prev_velocity: f64,
    last_observation: Option<(DateTime<Utc>, f64)>,
    /// Alert key (`ladder:threshold`) to last alert time.
    last_alerts: HashMap<String, DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

pub struct MilestoneTracker {
    config: MilestoneConfig,
    state: Mutex<HashMap<String, TokenMilestoneState>>,
}

impl MilestoneTracker {
    pub fn new(config: MilestoneConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one observation; returns the alerts that cleared cooldown.
    pub fn observe(&self, token_address: &str, obs: LiquidityObservation) -> Vec<MilestoneAlert> {
        let mut state = self.state.lock().expect("milestone state poisoned");
        let entry = state.entry(token_address.to_string()).or_default();

        // Instantaneous velocity in SOL/hour from the previous observation.
        let velocity = match entry.last_observation {
            Some((prev_time, prev_sol)) => {
                let hours = (obs.time - prev_time).num_seconds() as f64 / 3600.0;
                if hours > 0.0 {
                    (obs.sol_liquidity - prev_sol) / hours
                } else {
                    entry.prev_velocity
                }
            }
            None => 0.0,
        };

        let cooldown = ChronoDuration::seconds(self.config.cooldown_secs as i64);
        let mut alerts = Vec::new();

        let crossings = [
            (
                MilestoneLadder::UsdLiquidity,
                &USD_LADDER[..],
                entry.prev_usd,
                obs.usd_liquidity,
            ),
            (
                MilestoneLadder::SolLiquidity,
                &SOL_LADDER[..],
                entry.prev_sol,
                obs.sol_liquidity,
            ),
            (
                MilestoneLadder::GraduationProgress,
                &PROGRESS_LADDER[..],
                entry.prev_progress,
                obs.progress_percent,
            ),
            (
                MilestoneLadder::Velocity,
                &VELOCITY_LADDER[..],
                entry.prev_velocity,
                velocity,
            ),
        ];

        for (ladder, thresholds, prev, current) in crossings {
            let crossed: Vec<f64> = thresholds
                .iter()
                .copied()
                .filter(|&t| prev < t && current >= t)
                .collect();
            let Some(&highest) = crossed.last() else {
                continue;
            };

            let key = format!("{}:{}", ladder.as_str(), highest);
            let in_cooldown = entry
                .last_alerts
                .get(&key)
                .is_some_and(|&at| obs.time - at < cooldown);

            if !in_cooldown {
                // Stamp every rung cleared by this jump so a dip does not
                // re-alert rung by rung on the way back up. Suppressed
                // crossings leave the original stamp in place.
                for t in &crossed {
                    entry
                        .last_alerts
                        .insert(format!("{}:{}", ladder.as_str(), t), obs.time);
                }
                alerts.push(MilestoneAlert {
                    token_address: token_address.to_string(),
                    ladder,
                    threshold: highest,
                    value: current,
                    severity: severity_for(ladder, highest),
                    time: obs.time,
                });
            }
        }

        entry.prev_usd = obs.usd_liquidity;
        entry.prev_sol = obs.sol_liquidity;
        entry.prev_progress = obs.progress_percent;
        entry.prev_velocity = velocity;
        entry.last_observation = Some((obs.time, obs.sol_liquidity));
        entry.last_seen = Some(obs.time);

        alerts
    }

    /// Drop per-token state not touched within the configured window.
    pub fn prune(&self) {
        let cutoff = Utc::now() - ChronoDuration::hours(self.config.prune_after_hours as i64);
        self.state
            .lock()
            .expect("milestone state poisoned")
            .retain(|_, s| s.last_seen.is_some_and(|t| t > cutoff));
    }

    pub fn tracked_count(&self) -> usize {
        self.state.lock().expect("milestone state poisoned").len()
    }
}

fn severity_for(ladder: MilestoneLadder, threshold: f64) -> AlertSeverity {
    match ladder {
        MilestoneLadder::SolLiquidity => match threshold {
            t if t >= GRADUATION_SOL => AlertSeverity::Critical,
            t if t >= 50.0 => AlertSeverity::High,
            t if t >= 30.0 => AlertSeverity::Medium,
            _ => AlertSeverity::Low,
        },
        MilestoneLadder::UsdLiquidity => match threshold {
            t if t >= 50_000.0 => AlertSeverity::High,
            t if t >= 15_000.0 => AlertSeverity::Medium,
            _ => AlertSeverity::Low,
        },
        MilestoneLadder::GraduationProgress => match threshold {
            t if t >= 99.0 => AlertSeverity::Critical,
            t if t >= 85.0 => AlertSeverity::High,
            t if t >= 60.0 => AlertSeverity::Medium,
            _ => AlertSeverity::Low,
        },
        MilestoneLadder::Velocity => match threshold {
            t if t >= 30.0 => AlertSeverity::Critical,
            t if t >= 15.0 => AlertSeverity::High,
            t if t >= 5.0 => AlertSeverity::Medium,
            _ => AlertSeverity::Low,
        },
    }
}
