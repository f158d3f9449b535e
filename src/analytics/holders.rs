//! Holder enumeration and concentration metrics.
//!
//! Tokens are queued at HIGH/MEDIUM/LOW priority; workers dequeue, fetch
//! every non-zero token account for the mint over JSON-RPC behind a request
//! throttle, compute top-N concentration, and write the result onto the
//! token row.

use crate::config::{HolderConfig, RpcConfig};
use crate::database::Database;
use crate::events::{DomainEvent, EventBus};
use crate::models::{HolderMetrics, TokenCategory};
use crate::rpc_client::LightRpcClient;
use anyhow::Result;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePriority {
    High,
    Medium,
    Low,
}

impl QueuePriority {
    /// Scan priority for a token category; moving into AIM upgrades to HIGH.
    pub fn for_category(category: TokenCategory) -> Self {
        match category {
            TokenCategory::Aim => QueuePriority::High,
            TokenCategory::High => QueuePriority::Medium,
            _ => QueuePriority::Low,
        }
    }
}

/// Three-level FIFO with membership dedup. HIGH drains before MEDIUM,
/// MEDIUM before LOW.
#[derive(Default)]
pub struct PriorityQueue {
    high: VecDeque<String>,
    medium: VecDeque<String>,
    low: VecDeque<String>,
    queued: HashSet<String>,
}

impl PriorityQueue {
    /// Returns false when the address is already queued.
    pub fn push(&mut self, address: &str, priority: QueuePriority) -> bool {
        if !self.queued.insert(address.to_string()) {
            return false;
        }
        let address = address.to_string();
        match priority {
            QueuePriority::High => self.high.push_back(address),
            QueuePriority::Medium => self.medium.push_back(address),
            QueuePriority::Low => self.low.push_back(address),
        }
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        let address = self
            .high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())?;
        self.queued.remove(&address);
        Some(address)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn clear(&mut self) {
        *self = PriorityQueue::default();
    }
}

pub struct HolderAnalytics {
    db: Database,
    bus: EventBus,
    rpc: Arc<LightRpcClient>,
    rpc_config: RpcConfig,
    config: HolderConfig,
    queue: Mutex<PriorityQueue>,
    notify: Notify,
    throttle: tokio::sync::Mutex<Option<Instant>>,
}

impl HolderAnalytics {
    pub fn new(
        db: Database,
        bus: EventBus,
        rpc: Arc<LightRpcClient>,
        rpc_config: RpcConfig,
        config: HolderConfig,
    ) -> Self {
        Self {
            db,
            bus,
            rpc,
            rpc_config,
            config,
            queue: Mutex::new(PriorityQueue::default()),
            notify: Notify::new(),
            throttle: tokio::sync::Mutex::new(None),
        }
    }

    /// Queue a token for holder analysis; duplicates are ignored.
    pub fn enqueue(&self, token_address: &str, priority: QueuePriority) {
        let pushed = self
            .queue
            .lock()
            .expect("holder queue poisoned")
            .push(token_address, priority);
        if pushed {
            self.notify.notify_one();
        }
    }

    fn pop(&self) -> Option<String> {
        self.queue.lock().expect("holder queue poisoned").pop()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().expect("holder queue poisoned").len()
    }

    /// Enqueue every token whose metrics are older than its category
    /// cadence. Driven by the periodic holder-refresh task.
    pub async fn refresh_due_tokens(&self) -> Result<usize> {
        let cadences = [
            (TokenCategory::Aim, self.config.aim_refresh_secs, QueuePriority::High),
            (TokenCategory::High, self.config.high_refresh_secs, QueuePriority::Medium),
            (TokenCategory::Medium, self.config.medium_refresh_secs, QueuePriority::Low),
            (TokenCategory::Low, self.config.low_refresh_secs, QueuePriority::Low),
        ];

        let mut queued = 0;
        for (category, max_age, priority) in cadences {
            let due = self
                .db
                .tokens_due_for_holder_refresh(category, max_age, 50)
                .await?;
            for address in due {
                self.enqueue(&address, priority);
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Worker loop: dequeue, fetch, persist, emit. Runs until shutdown.
    pub async fn run_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let address = match self.pop() {
                Some(address) => address,
                None => {
                    tokio::select! {
                        _ = self.notify.notified() => continue,
                        _ = shutdown.changed() => return,
                    }
                }
            };

            if *shutdown.borrow() {
                return;
            }
            if let Err(err) = self.process(&address).await {
                warn!(token = %address, %err, "holder analysis dropped");
            }
        }
    }

    async fn process(&self, address: &str) -> Result<()> {
        self.throttle_request().await;

        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 1..=self.rpc_config.max_retries.max(1) {
            match self.rpc.mint_holders(address).await {
                Ok(holders) => {
                    let metrics =
                        compute_concentration(address, holders.balances, holders.source);
                    self.db.update_holder_metrics(&metrics).await?;
                    debug!(
                        token = %address,
                        holders = metrics.total_holders,
                        top10 = metrics.top_10_percent,
                        source = metrics.data_source,
                        "holder metrics updated"
                    );
                    self.bus.publish(DomainEvent::HoldersUpdated(metrics));
                    return Ok(());
                }
                Err(err) if err.is_transient() => {
                    let delay =
                        Duration::from_secs(self.rpc_config.retry_backoff_secs * attempt as u64);
                    debug!(token = %address, attempt, %err, ?delay, "holder fetch retrying");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("holder fetch retries exhausted")))
    }

    /// Enforce the minimum inter-request delay across all workers.
    async fn throttle_request(&self) {
        let min_interval = Duration::from_millis(self.rpc_config.min_request_interval_ms);
        let mut last = self.throttle.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Restart hook for the health check: drop anything stuck in the queue.
    pub fn clear_queue(&self) {
        let mut queue = self.queue.lock().expect("holder queue poisoned");
        let depth = queue.len();
        queue.clear();
        if depth > 0 {
            info!(depth, "holder queue cleared");
        }
    }
}

/// Top-N concentration over balance-sorted holders.
pub fn compute_concentration(
    token_address: &str,
    mut balances: Vec<u64>,
    source: &str,
) -> HolderMetrics {
    balances.sort_unstable_by(|a, b| b.cmp(a));
    let total: u128 = balances.iter().map(|&b| b as u128).sum();

    let top_share = |n: usize| -> f64 {
        if total == 0 {
            return 0.0;
        }
        let held: u128 = balances.iter().take(n).map(|&b| b as u128).sum();
        held as f64 / total as f64 * 100.0
    };

    HolderMetrics {
        token_address: token_address.to_string(),
        total_holders: balances.len() as i32,
        top_1_percent: top_share(1),
        top_5_percent: top_share(5),
        top_10_percent: top_share(10),
        top_25_percent: top_share(25),
        top_50_percent: top_share(50),
        data_source: source.to_string(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concentration_over_sorted_balances() {
        // 100 holders of 1 plus one whale of 900: whale holds 90%.
        let mut balances = vec![1u64; 100];
        balances.push(900);
        let metrics = compute_concentration("mint", balances, "program_accounts");

        assert_eq!(metrics.total_holders, 101);
        assert!((metrics.top_1_percent - 90.0).abs() < 1e-9);
        assert!((metrics.top_10_percent - 90.9).abs() < 0.1);
        assert_eq!(metrics.data_source, "program_accounts");
    }

    #[test]
    fn fewer_holders_than_n_is_total_concentration() {
        let metrics = compute_concentration("mint", vec![50, 50], "program_accounts");
        assert_eq!(metrics.total_holders, 2);
        assert_eq!(metrics.top_10_percent, 100.0);
        assert_eq!(metrics.top_50_percent, 100.0);
    }

    #[test]
    fn zero_supply_yields_zero_concentration() {
        let metrics = compute_concentration("mint", vec![], "largest_accounts");
        assert_eq!(metrics.total_holders, 0);
        assert_eq!(metrics.top_10_percent, 0.0);
    }

    #[test]
    fn queue_drains_high_before_medium_before_low() {
        let mut queue = PriorityQueue::default();
        queue.push("low", QueuePriority::Low);
        queue.push("high", QueuePriority::High);
        queue.push("medium", QueuePriority::Medium);

        assert_eq!(queue.pop().as_deref(), Some("high"));
        assert_eq!(queue.pop().as_deref(), Some("medium"));
        assert_eq!(queue.pop().as_deref(), Some("low"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn queue_ignores_duplicates_until_popped() {
        let mut queue = PriorityQueue::default();
        assert!(queue.push("mint", QueuePriority::Low));
        assert!(!queue.push("mint", QueuePriority::High));
        assert_eq!(queue.len(), 1);

        queue.pop();
        assert!(queue.push("mint", QueuePriority::High));
    }

    #[test]
    fn clear_empties_all_levels() {
        let mut queue = PriorityQueue::default();
        queue.push("a", QueuePriority::High);
        queue.push("b", QueuePriority::Low);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn category_maps_to_scan_priority() {
        assert_eq!(
            QueuePriority::for_category(TokenCategory::Aim),
            QueuePriority::High
        );
        assert_eq!(
            QueuePriority::for_category(TokenCategory::High),
            QueuePriority::Medium
        );
        assert_eq!(
            QueuePriority::for_category(TokenCategory::Low),
            QueuePriority::Low
        );
    }
}
