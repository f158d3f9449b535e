//! Single point of ingest: buffering, enrichment, and transactional flush.
//!
//! The manager owns the flush buffers and the in-memory token cache; the
//! geyser task feeds it over a channel, analytics get work handed to them,
//! and everything downstream observes the event bus. Exactly one flush is
//! in flight at any time; inbound events keep appending to fresh buffers.

use crate::analytics::liquidity::milestones::{LiquidityObservation, GRADUATION_SOL};
use crate::analytics::{
    GrowthTracker, HolderAnalytics, MilestoneTracker, QualityScorer, QueuePriority,
    VolumeAnalytics,
};
use crate::analytics::liquidity::quality::{coefficient_of_variation, QualityInputs};
use crate::config::PipelineConfig;
use crate::curve::{BondingCurveState, PricingResult};
use crate::database::{timeseries::dedupe_ticks, Database};
use crate::error::StartupError;
use crate::events::{DomainEvent, EventBus, StreamStats};
use crate::geyser::{self, GeyserSubscription, ParsedTransaction, UpstreamEvent};
use crate::metadata::{self, MetadataSource};
use crate::models::{
    CategoryTransition, MilestoneAlert, NewToken, PriceTick, TokenCategory, TokenRowUpdate,
    TokenTransaction, TransactionKind, VolumeAlert, VolumeAlertKind,
};
use crate::rpc_client::LightRpcClient;
use crate::scheduler::Scheduler;
use crate::signal::SignalEvaluator;
use crate::sol_price::SolPriceService;
use crate::stream::Classifier;
use anyhow::Result;
use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Upper bound on the holder queue before the health check clears it.
const MAX_HEALTHY_QUEUE_DEPTH: usize = 500;

/// The three flush buffers plus the piggybacked row updates and transitions
/// that commit in the same transaction.
#[derive(Debug, Default)]
struct FlushBuffers {
    prices: Vec<PriceTick>,
    transactions: Vec<TokenTransaction>,
    new_tokens: Vec<NewToken>,
    token_updates: HashMap<String, TokenRowUpdate>,
    transitions: Vec<CategoryTransition>,
}

impl FlushBuffers {
    fn drain(&mut self) -> FlushBuffers {
        std::mem::take(self)
    }

    fn is_empty(&self) -> bool {
        self.prices.is_empty()
            && self.transactions.is_empty()
            && self.new_tokens.is_empty()
            && self.token_updates.is_empty()
            && self.transitions.is_empty()
    }

    fn any_over(&self, limit: usize) -> bool {
        self.prices.len() >= limit
            || self.transactions.len() >= limit
            || self.new_tokens.len() >= limit
    }
}

/// Cached per-token state for classification and event bookkeeping.
#[derive(Debug, Clone)]
struct CachedToken {
    category: TokenCategory,
    market_cap: f64,
    price_sol: f64,
    price_usd: f64,
    first_seen_above_threshold: Option<DateTime<Utc>>,
    below_threshold_since: Option<DateTime<Utc>>,
    graduated: bool,
    create_seen: bool,
}

#[derive(Default)]
struct Counters {
    events_received: AtomicU64,
    price_updates: AtomicU64,
    transactions: AtomicU64,
    tokens_created: AtomicU64,
    flushes: AtomicU64,
    flush_errors: AtomicU64,
    rows_written: AtomicU64,
    reconnects: AtomicU64,
}

pub struct StreamManager {
    config: PipelineConfig,
    db: Database,
    bus: EventBus,
    sol_price: Arc<SolPriceService>,
    classifier: Classifier,
    milestones: Arc<MilestoneTracker>,
    volume: Arc<VolumeAnalytics>,
    holders: Arc<HolderAnalytics>,
    growth: Arc<GrowthTracker>,
    quality: Arc<QualityScorer>,
    buffers: Mutex<FlushBuffers>,
    cache: Mutex<HashMap<String, CachedToken>>,
    counters: Counters,
    last_flush: Mutex<Option<Instant>>,
    connected: AtomicBool,
    flush_notify: Notify,
    flush_gate: tokio::sync::Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl StreamManager {
    /// Bring the whole pipeline up: database, SOL price, subscription,
    /// analytics, workers and periodic tasks. Fails with [`StartupError`]
    /// when any of the three hard dependencies cannot be initialized.
    pub async fn start(
        config: PipelineConfig,
        metadata_source: Arc<dyn MetadataSource>,
    ) -> Result<Arc<Self>, StartupError> {
        config
            .validate_all()
            .map_err(|e| StartupError::Config(e.to_string()))?;

        let bus = EventBus::new(config.monitoring.event_capacity);

        let db = Database::connect(&config.database)
            .await
            .map_err(|e| StartupError::Database(e.to_string()))?;
        let sol_price = SolPriceService::start(config.sol_price.clone()).await?;
        geyser::probe_endpoint(&config.geyser)
            .await
            .map_err(|e| StartupError::Subscription(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let rpc = Arc::new(LightRpcClient::new(
            config.rpc.url.clone(),
            config.rpc.timeout_secs,
        ));
        let classifier = Classifier::new(config.categories.clone());
        let milestones = Arc::new(MilestoneTracker::new(config.analytics.milestones.clone()));
        let volume = Arc::new(VolumeAnalytics::new(config.analytics.volume.clone()));
        let holders = Arc::new(HolderAnalytics::new(
            db.clone(),
            bus.clone(),
            rpc,
            config.rpc.clone(),
            config.analytics.holders.clone(),
        ));
        let growth = Arc::new(GrowthTracker::new(
            db.clone(),
            config.analytics.growth.clone(),
        ));
        let quality = Arc::new(QualityScorer::new(config.analytics.quality.clone()));

        let manager = Arc::new(Self {
            config,
            db,
            bus,
            sol_price,
            classifier,
            milestones,
            volume,
            holders,
            growth,
            quality,
            buffers: Mutex::new(FlushBuffers::default()),
            cache: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            last_flush: Mutex::new(None),
            connected: AtomicBool::new(false),
            flush_notify: Notify::new(),
            flush_gate: tokio::sync::Mutex::new(()),
            shutdown_tx,
        });

        manager
            .warm_cache()
            .await
            .map_err(|e| StartupError::Database(e.to_string()))?;

        manager.spawn_tasks(shutdown_rx, metadata_source);
        info!("stream manager started");
        Ok(manager)
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Load known token categories so crossings survive restarts.
    async fn warm_cache(&self) -> Result<()> {
        let known = self.db.load_token_categories().await?;
        let count = known.len();
        let mut cache = self.cache.lock().expect("token cache poisoned");
        for (address, category, market_cap) in known {
            cache.insert(
                address,
                CachedToken {
                    category,
                    market_cap,
                    price_sol: 0.0,
                    price_usd: 0.0,
                    first_seen_above_threshold: None,
                    below_threshold_since: None,
                    graduated: false,
                    create_seen: true,
                },
            );
        }
        info!(tokens = count, "token cache warmed");
        Ok(())
    }

    fn spawn_tasks(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
        metadata_source: Arc<dyn MetadataSource>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(8192);

        let subscription = GeyserSubscription::new(
            self.config.geyser.clone(),
            event_tx,
            self.bus.clone(),
            shutdown.clone(),
        );
        tokio::spawn(subscription.run());

        tokio::spawn(self.clone().ingest_loop(event_rx, shutdown.clone()));
        tokio::spawn(self.clone().flush_loop(shutdown.clone()));
        tokio::spawn(self.clone().connection_state_loop(shutdown.clone()));
        tokio::spawn(self.sol_price.clone().run(shutdown.clone()));

        for _ in 0..self.config.analytics.holders.workers {
            tokio::spawn(self.holders.clone().run_worker(shutdown.clone()));
        }

        let evaluator = Arc::new(SignalEvaluator::new(
            self.db.clone(),
            self.bus.clone(),
            self.config.signals.clone(),
            self.classifier.clone(),
            self.sol_price.clone(),
            self.growth.clone(),
            self.quality.clone(),
            self.volume.clone(),
        ));
        tokio::spawn(evaluator.run(shutdown.clone()));

        self.spawn_periodic_tasks(shutdown, metadata_source);
    }

    fn spawn_periodic_tasks(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
        metadata_source: Arc<dyn MetadataSource>,
    ) {
        let sched = &self.config.scheduler;
        let mut scheduler = Scheduler::new(shutdown);

        let manager = self.clone();
        scheduler.spawn(
            "stream-stats",
            Duration::from_secs(sched.stats_interval_secs),
            move || {
                let manager = manager.clone();
                async move {
                    let stats = manager.stats_snapshot();
                    info!(
                        events = stats.events_received,
                        prices = stats.price_updates,
                        transactions = stats.transactions,
                        flushes = stats.flushes,
                        flush_errors = stats.flush_errors,
                        rows = stats.rows_written,
                        "stream stats"
                    );
                    manager.bus.publish(DomainEvent::Stats(stats));
                }
            },
        );

        let manager = self.clone();
        scheduler.spawn(
            "health-check",
            Duration::from_secs(sched.health_interval_secs),
            move || {
                let manager = manager.clone();
                async move { manager.health_check().await }
            },
        );

        let holders = self.holders.clone();
        scheduler.spawn(
            "holder-refresh",
            Duration::from_secs(sched.holder_refresh_secs),
            move || {
                let holders = holders.clone();
                async move {
                    match holders.refresh_due_tokens().await {
                        Ok(queued) if queued > 0 => debug!(queued, "holder refresh sweep"),
                        Ok(_) => {}
                        Err(err) => warn!(%err, "holder refresh sweep failed"),
                    }
                }
            },
        );

        let manager = self.clone();
        scheduler.spawn(
            "liquidity-growth",
            Duration::from_secs(sched.growth_sweep_secs),
            move || {
                let manager = manager.clone();
                async move { manager.growth_sweep().await }
            },
        );

        let manager = self.clone();
        scheduler.spawn(
            "liquidity-quality",
            Duration::from_secs(sched.quality_sweep_secs),
            move || {
                let manager = manager.clone();
                async move { manager.quality_sweep().await }
            },
        );

        let volume = self.volume.clone();
        scheduler.spawn(
            "volume-leaderboard",
            Duration::from_secs(sched.volume_leaderboard_secs),
            move || {
                let volume = volume.clone();
                async move {
                    for (rank, (address, stats)) in volume.leaderboard(10).into_iter().enumerate() {
                        info!(
                            rank = rank + 1,
                            token = %address,
                            volume_1h = stats.total_usd,
                            buy_ratio = stats.buy_ratio,
                            "volume leaderboard"
                        );
                    }
                }
            },
        );

        let db = self.db.clone();
        let bus = self.bus.clone();
        scheduler.spawn(
            "metadata-backfill",
            Duration::from_secs(sched.metadata_backfill_secs),
            move || {
                let db = db.clone();
                let bus = bus.clone();
                let source = metadata_source.clone();
                async move {
                    match metadata::backfill_pass(&db, source.as_ref(), &bus, 25).await {
                        Ok(updated) if updated > 0 => info!(updated, "metadata backfilled"),
                        Ok(_) => {}
                        Err(err) => warn!(%err, "metadata backfill failed"),
                    }
                }
            },
        );

        let manager = self.clone();
        scheduler.spawn(
            "cache-prune",
            Duration::from_secs(sched.cache_prune_secs),
            move || {
                let manager = manager.clone();
                async move {
                    manager.milestones.prune();
                    manager.volume.prune();
                    manager
                        .growth
                        .prune(chrono::Duration::hours(24));
                    debug!(
                        milestones = manager.milestones.tracked_count(),
                        volume = manager.volume.tracked_count(),
                        growth = manager.growth.cached_count(),
                        "analytics caches pruned"
                    );
                }
            },
        );
    }

    /// Signal every task, run a bounded final flush, and close the pool.
    pub async fn stop(&self) {
        info!("stopping stream manager");
        let _ = self.shutdown_tx.send(true);

        let grace = Duration::from_millis(self.config.ingest.final_flush_grace_ms);
        match tokio::time::timeout(grace, self.flush()).await {
            Ok(()) => info!("final flush complete"),
            Err(_) => {
                let discarded = {
                    let mut buffers = self.buffers.lock().expect("flush buffers poisoned");
                    let batch = buffers.drain();
                    batch.prices.len() + batch.transactions.len() + batch.new_tokens.len()
                };
                warn!(discarded, "final flush exceeded grace window, buffers discarded");
            }
        }

        self.db.close().await;
        info!("stream manager stopped");
    }

    // ---- ingest -----------------------------------------------------------

    async fn ingest_loop(
        self: Arc<Self>,
        mut events: mpsc::Receiver<UpstreamEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = events.recv() => {
                    let Some(event) = event else { return };
                    self.counters.events_received.fetch_add(1, Ordering::Relaxed);
                    match event {
                        UpstreamEvent::CurveUpdate { bonding_curve, state, slot } => {
                            if let Err(err) = self.handle_curve_update(bonding_curve, state, slot).await {
                                warn!(%err, "curve update dropped");
                            }
                        }
                        UpstreamEvent::Transaction(parsed) => {
                            if let Err(err) = self.handle_transaction(parsed).await {
                                warn!(%err, "transaction dropped");
                            }
                        }
                        UpstreamEvent::Ping { .. } | UpstreamEvent::Ignored => {}
                    }
                }
            }
        }
    }

    async fn handle_curve_update(
        &self,
        bonding_curve: Pubkey,
        state: BondingCurveState,
        slot: u64,
    ) -> Result<()> {
        self.counters.price_updates.fetch_add(1, Ordering::Relaxed);
        let mint = state.mint.to_string();

        if state.complete {
            if self.mark_graduated(&mint) {
                info!(token = %mint, "bonding curve complete");
                self.bus.publish(DomainEvent::TokenGraduated {
                    address: mint,
                    real_sol_reserves: state.real_sol_reserves as f64 / LAMPORTS_PER_SOL,
                });
            }
            return Ok(());
        }

        let sol_usd = self.sol_price.current();
        let pricing = crate::curve::price(
            &state,
            sol_usd,
            self.config.categories.graduation_sol_target,
        );
        if !pricing.is_valid() {
            debug!(token = %mint, validity = ?pricing.validity, "price rejected");
            return Ok(());
        }
        for warning in &pricing.warnings {
            debug!(token = %mint, warning, "pricing warning");
        }

        let now = Utc::now();
        let liquidity_sol = state.real_sol_reserves as f64 / LAMPORTS_PER_SOL;
        let band = self.classifier.classify(pricing.market_cap_usd);

        let Some(mut effect) =
            self.apply_price_to_cache(&mint, &pricing, band, liquidity_sol, now)
        else {
            // Unknown token below the entry threshold: never persisted.
            return Ok(());
        };
        if let Some(new_token) = &mut effect.new_token {
            new_token.bonding_curve = Some(bonding_curve.to_string());
        }

        if let Some(new_token) = &effect.new_token {
            self.bus.publish(DomainEvent::NewToken(new_token.clone()));
        }
        if let Some(transition) = &effect.transition {
            info!(
                token = %mint,
                from = %transition.from_category,
                to = %transition.to_category,
                market_cap = transition.market_cap,
                "category transition"
            );
            // Downstream consumers see the category change before any state
            // derived from it.
            self.bus
                .publish(DomainEvent::CategoryChanged(transition.clone()));
            if transition.to_category == TokenCategory::Aim {
                self.holders.enqueue(&mint, QueuePriority::High);
            }
        } else if effect.new_token.as_ref().is_some_and(|t| {
            matches!(t.category, TokenCategory::Aim | TokenCategory::High)
        }) {
            self.holders
                .enqueue(&mint, QueuePriority::for_category(effect.category));
        }

        let tick = PriceTick {
            token_address: mint.clone(),
            time: now,
            price_usd: pricing.price_usd,
            price_sol: pricing.price_sol,
            virtual_sol_reserves: state.virtual_sol_reserves as i64,
            virtual_token_reserves: state.virtual_token_reserves as i64,
            real_sol_reserves: state.real_sol_reserves as i64,
            real_token_reserves: state.real_token_reserves as i64,
            market_cap: pricing.market_cap_usd,
            liquidity_usd: pricing.liquidity_usd,
            slot: slot as i64,
            source: self.config.ingest.source.clone(),
        };

        let over_limit = {
            let mut buffers = self.buffers.lock().expect("flush buffers poisoned");
            buffers.prices.push(tick);
            if let Some(new_token) = effect.new_token {
                buffers.new_tokens.push(new_token);
            }
            if let Some(transition) = effect.transition {
                buffers.transitions.push(transition);
            }
            buffers.token_updates.insert(
                mint.clone(),
                TokenRowUpdate {
                    address: mint.clone(),
                    category: effect.category,
                    current_price_sol: pricing.price_sol,
                    current_price_usd: pricing.price_usd,
                    market_cap: pricing.market_cap_usd,
                    liquidity_sol,
                    curve_progress: pricing.curve_progress,
                    first_seen_above_threshold: effect.first_seen_above_threshold,
                    below_threshold_since: effect.below_threshold_since,
                    last_price_update: now,
                },
            );
            buffers.any_over(self.config.ingest.batch_size)
        };
        if over_limit {
            self.flush_notify.notify_one();
        }

        // Milestones are compute-on-event.
        let observation = LiquidityObservation {
            usd_liquidity: pricing.liquidity_usd,
            sol_liquidity: liquidity_sol,
            progress_percent: pricing.curve_progress,
            time: now,
        };
        let alerts = self.milestones.observe(&mint, observation);
        self.publish_milestone_alerts(&mint, alerts).await;

        Ok(())
    }

    async fn publish_milestone_alerts(&self, mint: &str, alerts: Vec<MilestoneAlert>) {
        for alert in alerts {
            if let Err(err) = self.db.insert_milestone_alert(&alert).await {
                warn!(token = %mint, %err, "milestone alert not persisted");
            }

            match alert.ladder {
                crate::models::MilestoneLadder::SolLiquidity
                    if alert.threshold >= GRADUATION_SOL =>
                {
                    if self.mark_graduated(mint) {
                        self.bus.publish(DomainEvent::TokenGraduated {
                            address: mint.to_string(),
                            real_sol_reserves: alert.value,
                        });
                    }
                }
                crate::models::MilestoneLadder::GraduationProgress
                    if alert.threshold >= 95.0 =>
                {
                    self.bus.publish(DomainEvent::NearGraduation {
                        address: mint.to_string(),
                        progress_percent: alert.value,
                    });
                }
                _ => {}
            }

            self.bus.publish(DomainEvent::LiquidityMilestone(alert));
        }
    }

    async fn handle_transaction(&self, parsed: ParsedTransaction) -> Result<()> {
        self.counters.transactions.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let sol_usd = self.sol_price.current();

        let mut skip_row = false;
        match parsed.kind {
            TransactionKind::Create => {
                self.counters.tokens_created.fetch_add(1, Ordering::Relaxed);
                if let Some(mint) = &parsed.mint {
                    let outcome = self.register_create(mint, parsed.user.clone(), now);
                    if let Some(new_token) = outcome.new_token {
                        info!(token = %mint, "token created");
                        self.bus.publish(DomainEvent::NewToken(new_token));
                    }
                    // At most one create row per token.
                    skip_row = outcome.duplicate;
                }
            }
            TransactionKind::Buy | TransactionKind::Sell => {
                if let Some(mint) = &parsed.mint {
                    let category = {
                        let cache = self.cache.lock().expect("token cache poisoned");
                        cache.get(mint).map(|entry| entry.category)
                    };
                    if let Some(category) = category {
                        let usd_value = parsed.sol_amount * sol_usd;
                        let alerts = self.volume.record(
                            mint,
                            parsed.kind,
                            usd_value,
                            category,
                            now,
                        );
                        self.publish_volume_alerts(alerts).await;
                    }
                }
            }
        }

        if !skip_row {
            let (price_usd, price_sol) = {
                let cache = self.cache.lock().expect("token cache poisoned");
                parsed
                    .mint
                    .as_deref()
                    .and_then(|mint| cache.get(mint))
                    .map(|entry| (Some(entry.price_usd), Some(entry.price_sol)))
                    .unwrap_or((None, None))
            };

            let over_limit = {
                let mut buffers = self.buffers.lock().expect("flush buffers poisoned");
                buffers.transactions.push(TokenTransaction {
                    signature: parsed.signature,
                    token_address: parsed.mint,
                    time: now,
                    kind: parsed.kind,
                    user_address: parsed.user,
                    token_amount: parsed.token_amount,
                    sol_amount: parsed.sol_amount,
                    price_usd,
                    price_sol,
                    slot: parsed.slot as i64,
                    fee: parsed.fee as i64,
                });
                buffers.any_over(self.config.ingest.batch_size)
            };
            if over_limit {
                self.flush_notify.notify_one();
            }
        }

        Ok(())
    }

    async fn publish_volume_alerts(&self, alerts: Vec<VolumeAlert>) {
        for alert in alerts {
            if let Err(err) = self.db.insert_volume_alert(&alert).await {
                warn!(token = %alert.token_address, %err, "volume alert not persisted");
            }

            let specialized = match alert.kind {
                VolumeAlertKind::Spike => DomainEvent::VolumeSpike(alert.clone()),
                VolumeAlertKind::Imbalance => DomainEvent::VolumeImbalance(alert.clone()),
                VolumeAlertKind::UnusualPattern => {
                    DomainEvent::UnusualVolumePattern(alert.clone())
                }
            };
            self.bus.publish(specialized);

            if alert.kind == VolumeAlertKind::Spike {
                let high = self.config.analytics.volume.imbalance_high_ratio;
                let low = self.config.analytics.volume.imbalance_low_ratio;
                if alert.buy_ratio_1h >= high {
                    self.bus.publish(DomainEvent::PumpDetected(alert.clone()));
                } else if alert.buy_ratio_1h <= low {
                    self.bus.publish(DomainEvent::DumpDetected(alert.clone()));
                }
            }

            self.bus.publish(DomainEvent::VolumeAlert(alert));
        }
    }

    // ---- cache ------------------------------------------------------------

    /// Apply a valid price observation to the token cache, returning what
    /// the ingest path must do with it. `None` means the token stays
    /// untracked.
    fn apply_price_to_cache(
        &self,
        mint: &str,
        pricing: &PricingResult,
        band: Option<TokenCategory>,
        liquidity_sol: f64,
        now: DateTime<Utc>,
    ) -> Option<PriceEffect> {
        let mut cache = self.cache.lock().expect("token cache poisoned");

        match cache.get_mut(mint) {
            None => {
                // Discovery by price: only at or above the entry threshold.
                let category = band?;
                cache.insert(
                    mint.to_string(),
                    CachedToken {
                        category,
                        market_cap: pricing.market_cap_usd,
                        price_sol: pricing.price_sol,
                        price_usd: pricing.price_usd,
                        first_seen_above_threshold: Some(now),
                        below_threshold_since: None,
                        graduated: false,
                        create_seen: false,
                    },
                );
                Some(PriceEffect {
                    category,
                    new_token: Some(NewToken {
                        address: mint.to_string(),
                        symbol: None,
                        name: None,
                        category,
                        current_price_sol: pricing.price_sol,
                        current_price_usd: pricing.price_usd,
                        market_cap: pricing.market_cap_usd,
                        liquidity: liquidity_sol,
                        curve_progress: pricing.curve_progress,
                        bonding_curve: None,
                        creator: None,
                        created_at: now,
                    }),
                    transition: None,
                    first_seen_above_threshold: Some(now),
                    below_threshold_since: None,
                })
            }
            Some(entry) => {
                let transition = band
                    .filter(|b| *b != entry.category)
                    .map(|to| CategoryTransition {
                        token_address: mint.to_string(),
                        from_category: entry.category,
                        to_category: to,
                        market_cap: pricing.market_cap_usd,
                        reason: "market_cap_threshold".to_string(),
                        time: now,
                    });

                match band {
                    Some(category) => {
                        entry.category = category;
                        entry.first_seen_above_threshold.get_or_insert(now);
                        entry.below_threshold_since = None;
                    }
                    None => {
                        entry.below_threshold_since.get_or_insert(now);
                    }
                }
                entry.market_cap = pricing.market_cap_usd;
                entry.price_sol = pricing.price_sol;
                entry.price_usd = pricing.price_usd;

                Some(PriceEffect {
                    category: entry.category,
                    new_token: None,
                    transition,
                    first_seen_above_threshold: entry.first_seen_above_threshold,
                    below_threshold_since: entry.below_threshold_since,
                })
            }
        }
    }

    /// Track a create transaction. Unknown mints get a cache entry and a
    /// buffered `NewToken`; a second create for the same mint is flagged as
    /// a duplicate.
    fn register_create(&self, mint: &str, creator: Option<String>, now: DateTime<Utc>) -> CreateOutcome {
        let mut cache = self.cache.lock().expect("token cache poisoned");
        match cache.get_mut(mint) {
            Some(entry) => {
                let duplicate = entry.create_seen;
                entry.create_seen = true;
                CreateOutcome {
                    new_token: None,
                    duplicate,
                }
            }
            None => {
                cache.insert(
                    mint.to_string(),
                    CachedToken {
                        // Created tokens enter at the band floor until a
                        // price observation reclassifies them.
                        category: TokenCategory::Low,
                        market_cap: 0.0,
                        price_sol: 0.0,
                        price_usd: 0.0,
                        first_seen_above_threshold: None,
                        below_threshold_since: Some(now),
                        graduated: false,
                        create_seen: true,
                    },
                );
                CreateOutcome {
                    new_token: Some(NewToken {
                        address: mint.to_string(),
                        symbol: None,
                        name: None,
                        category: TokenCategory::Low,
                        current_price_sol: 0.0,
                        current_price_usd: 0.0,
                        market_cap: 0.0,
                        liquidity: 0.0,
                        curve_progress: 0.0,
                        bonding_curve: None,
                        creator,
                        created_at: now,
                    }),
                    duplicate: false,
                }
            }
        }
    }

    fn mark_graduated(&self, mint: &str) -> bool {
        let mut cache = self.cache.lock().expect("token cache poisoned");
        match cache.get_mut(mint) {
            Some(entry) if !entry.graduated => {
                entry.graduated = true;
                true
            }
            _ => false,
        }
    }

    // ---- flush ------------------------------------------------------------

    async fn flush_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(
            self.config.ingest.flush_interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                _ = self.flush_notify.notified() => self.flush().await,
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Run one flush. Exclusive: a second caller waits for the first to
    /// finish, then flushes whatever accumulated meanwhile.
    pub async fn flush(&self) {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut buffers = self.buffers.lock().expect("flush buffers poisoned");
            buffers.drain()
        };
        if batch.is_empty() {
            return;
        }

        match self.flush_batch(&batch).await {
            Ok(rows) => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                self.counters.rows_written.fetch_add(rows, Ordering::Relaxed);
                *self.last_flush.lock().expect("last flush poisoned") = Some(Instant::now());
                debug!(
                    rows,
                    prices = batch.prices.len(),
                    transactions = batch.transactions.len(),
                    tokens = batch.new_tokens.len(),
                    "flush committed"
                );
            }
            Err(err) => {
                // The transaction rolled back; the drained buffers are
                // dropped so the next tick starts clean.
                self.counters.flush_errors.fetch_add(1, Ordering::Relaxed);
                error!(%err, "flush failed, batch discarded");
                self.bus.publish(DomainEvent::Error {
                    component: "flush".to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    async fn flush_batch(&self, batch: &FlushBuffers) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        let mut rows = 0u64;

        // 1. New tokens, idempotent.
        rows += Database::insert_new_tokens(&mut tx, &batch.new_tokens).await?;

        // 2. Placeholders for referenced-but-missing tokens.
        let new_addresses: BTreeSet<&str> = batch
            .new_tokens
            .iter()
            .map(|t| t.address.as_str())
            .collect();
        let mut referenced: BTreeSet<String> = batch
            .prices
            .iter()
            .map(|p| p.token_address.clone())
            .chain(
                batch
                    .transactions
                    .iter()
                    .filter_map(|t| t.token_address.clone()),
            )
            .filter(|address| !new_addresses.contains(address.as_str()))
            .collect();
        if !referenced.is_empty() {
            let addresses: Vec<String> = referenced.iter().cloned().collect();
            let existing = Database::existing_addresses(&mut tx, &addresses).await?;
            referenced.retain(|address| !existing.contains(address));
            for address in &referenced {
                let placeholder = self.build_placeholder(address, batch);
                let above_entry =
                    placeholder.market_cap >= self.classifier.entry_threshold();
                Database::insert_placeholder_token(&mut tx, &placeholder, above_entry).await?;
                rows += 1;
            }
        }

        // 3. Deduplicated price upsert in bounded chunks.
        let deduped = dedupe_ticks(batch.prices.clone());
        for chunk in deduped.chunks(self.config.ingest.price_chunk_size) {
            rows += Database::upsert_price_chunk(&mut tx, chunk).await?;
        }

        // 4. Transactions with a known token address only.
        let persistable: Vec<TokenTransaction> = batch
            .transactions
            .iter()
            .filter(|t| t.token_address.as_deref().is_some_and(|a| !a.is_empty()))
            .cloned()
            .collect();
        for chunk in persistable.chunks(self.config.ingest.transaction_chunk_size) {
            rows += Database::insert_transaction_chunk(&mut tx, chunk).await?;
        }

        // 5. Category transitions, then the token rows they describe.
        Database::insert_category_transitions(&mut tx, &batch.transitions).await?;
        for update in batch.token_updates.values() {
            Database::apply_token_update(&mut tx, update).await?;
        }

        tx.commit().await?;
        Ok(rows)
    }

    /// Placeholder identity for a token we only know from this batch's
    /// ticks and transactions.
    fn build_placeholder(&self, address: &str, batch: &FlushBuffers) -> NewToken {
        let best_tick = batch
            .prices
            .iter()
            .filter(|p| p.token_address == address)
            .max_by_key(|p| p.slot);

        let now = Utc::now();
        match best_tick {
            Some(tick) => NewToken {
                address: address.to_string(),
                symbol: None,
                name: None,
                category: self
                    .classifier
                    .classify(tick.market_cap)
                    .unwrap_or(TokenCategory::Low),
                current_price_sol: tick.price_sol,
                current_price_usd: tick.price_usd,
                market_cap: tick.market_cap,
                liquidity: tick.real_sol_reserves as f64 / LAMPORTS_PER_SOL,
                curve_progress: 0.0,
                bonding_curve: None,
                creator: None,
                created_at: now,
            },
            None => NewToken {
                address: address.to_string(),
                symbol: None,
                name: None,
                category: TokenCategory::Low,
                current_price_sol: 0.0,
                current_price_usd: 0.0,
                market_cap: 0.0,
                liquidity: 0.0,
                curve_progress: 0.0,
                bonding_curve: None,
                creator: None,
                created_at: now,
            },
        }
    }

    // ---- analytics sweeps -------------------------------------------------

    /// Periodic growth refresh over recently active tokens; notable momentum
    /// is fanned out on the bus.
    async fn growth_sweep(&self) {
        let categories = [
            TokenCategory::Medium,
            TokenCategory::High,
            TokenCategory::Aim,
        ];
        let tokens = match self.db.recently_active_tokens(&categories, 3600, 100).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(%err, "growth sweep query failed");
                return;
            }
        };

        for address in tokens {
            match self.growth.metrics(&address).await {
                Ok(Some(metrics))
                    if metrics.momentum == crate::models::LiquidityMomentum::High
                        || metrics.momentum == crate::models::LiquidityMomentum::Declining =>
                {
                    self.bus.publish(DomainEvent::LiquidityMomentum(metrics));
                }
                Ok(_) => {}
                Err(err) => warn!(token = %address, %err, "growth metrics failed"),
            }
        }
    }

    /// Periodic quality assessment of AIM tokens; strong scores are fanned
    /// out on the bus.
    async fn quality_sweep(&self) {
        let tokens = match self
            .db
            .recently_active_tokens(&[TokenCategory::Aim], 3600, 50)
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(%err, "quality sweep query failed");
                return;
            }
        };

        for address in tokens {
            match self.assess_token_quality(&address).await {
                Ok(Some(score)) if score.score >= 80.0 => {
                    self.bus.publish(DomainEvent::HighQualityLiquidity(score));
                }
                Ok(_) => {}
                Err(err) => warn!(token = %address, %err, "quality assessment failed"),
            }
        }
    }

    async fn assess_token_quality(
        &self,
        address: &str,
    ) -> Result<Option<crate::models::LiquidityQualityScore>> {
        let Some(token) = self.db.get_token(address).await? else {
            return Ok(None);
        };
        let volatility = coefficient_of_variation(&self.db.price_history(address, 1.0).await?);
        let volume_1h = self
            .volume
            .metrics(address)
            .map(|m| m.window_1h.total_usd)
            .unwrap_or(0.0);

        let inputs = QualityInputs {
            liquidity_usd: 2.0 * token.liquidity * self.sol_price.current(),
            volume_1h_usd: volume_1h,
            volatility,
            top_10_percent: token.top_10_percent,
        };
        Ok(Some(self.quality.assess(address, &inputs)))
    }

    // ---- monitoring -------------------------------------------------------

    async fn connection_state_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rx = self.bus.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = rx.recv() => match event {
                    Ok(DomainEvent::Connected) => {
                        self.connected.store(true, Ordering::Relaxed);
                    }
                    Ok(DomainEvent::Disconnected { .. }) => {
                        self.connected.store(false, Ordering::Relaxed);
                        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }

    pub fn stats_snapshot(&self) -> StreamStats {
        StreamStats {
            events_received: self.counters.events_received.load(Ordering::Relaxed),
            price_updates: self.counters.price_updates.load(Ordering::Relaxed),
            transactions: self.counters.transactions.load(Ordering::Relaxed),
            tokens_created: self.counters.tokens_created.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            flush_errors: self.counters.flush_errors.load(Ordering::Relaxed),
            rows_written: self.counters.rows_written.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            secs_since_last_flush: self
                .last_flush
                .lock()
                .expect("last flush poisoned")
                .map(|at| at.elapsed().as_secs()),
        }
    }

    /// Surface unhealthy state and trigger the recoveries that are safe to
    /// run automatically.
    async fn health_check(&self) {
        let mut healthy = true;

        if let Err(err) = self.db.health_check().await {
            healthy = false;
            error!(%err, "health: database unreachable");
        }

        if !self.connected.load(Ordering::Relaxed) {
            healthy = false;
            warn!("health: geyser stream disconnected");
        }

        let stale_flush = self
            .last_flush
            .lock()
            .expect("last flush poisoned")
            .map(|at| at.elapsed() > Duration::from_secs(60))
            .unwrap_or(false);
        let pending = !self.buffers.lock().expect("flush buffers poisoned").is_empty();
        if stale_flush && pending {
            healthy = false;
            warn!("health: no flush in over 60s with pending buffers");
            self.flush_notify.notify_one();
        }

        let depth = self.holders.queue_depth();
        if depth > MAX_HEALTHY_QUEUE_DEPTH {
            healthy = false;
            warn!(depth, "health: holder queue too deep, clearing");
            self.holders.clear_queue();
        }

        if healthy {
            debug!("health check passed");
        }
    }
}

struct CreateOutcome {
    new_token: Option<NewToken>,
    duplicate: bool,
}

/// What one valid price observation did to the cache.
struct PriceEffect {
    category: TokenCategory,
    new_token: Option<NewToken>,
    transition: Option<CategoryTransition>,
    first_seen_above_threshold: Option<DateTime<Utc>>,
    below_threshold_since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(address: &str, market_cap: f64, slot: i64) -> PriceTick {
        PriceTick {
            token_address: address.to_string(),
            time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            price_usd: 0.001,
            price_sol: 0.00001,
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_073_000_000_000_000,
            real_sol_reserves: 5_000_000_000,
            real_token_reserves: 0,
            market_cap,
            liquidity_usd: 1_000.0,
            slot,
            source: "grpc".to_string(),
        }
    }

    #[test]
    fn buffers_report_overflow_per_buffer() {
        let mut buffers = FlushBuffers::default();
        assert!(buffers.is_empty());
        assert!(!buffers.any_over(2));

        buffers.prices.push(tick("a", 9_000.0, 1));
        buffers.prices.push(tick("a", 9_100.0, 2));
        assert!(buffers.any_over(2));
        assert!(!buffers.any_over(3));
    }

    #[test]
    fn drain_leaves_fresh_buffers() {
        let mut buffers = FlushBuffers::default();
        buffers.prices.push(tick("a", 9_000.0, 1));
        buffers.transitions.push(CategoryTransition {
            token_address: "a".to_string(),
            from_category: TokenCategory::Low,
            to_category: TokenCategory::Medium,
            market_cap: 15_100.0,
            reason: "market_cap_threshold".to_string(),
            time: Utc::now(),
        });

        let batch = buffers.drain();
        assert_eq!(batch.prices.len(), 1);
        assert_eq!(batch.transitions.len(), 1);
        assert!(buffers.is_empty());
    }
}
