//! Typed publish/subscribe surface for domain events.
//!
//! Components never call each other for notification; they publish here and
//! subscribers receive owned, immutable event values. The bus is a bounded
//! broadcast channel: a lagging subscriber loses the oldest events rather
//! than back-pressuring the ingest path.

use crate::models::{
    BuySignal, CategoryTransition, HolderMetrics, LiquidityGrowthMetrics, LiquidityQualityScore,
    MilestoneAlert, NewToken, VolumeAlert,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Counters surfaced by the periodic stats task and the `stats` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStats {
    pub events_received: u64,
    pub price_updates: u64,
    pub transactions: u64,
    pub tokens_created: u64,
    pub flushes: u64,
    pub flush_errors: u64,
    pub rows_written: u64,
    pub reconnects: u64,
    /// Seconds since the last successful flush, if any.
    pub secs_since_last_flush: Option<u64>,
}

/// Every event the pipeline emits. Names are contracts (§ external
/// interfaces); `name()` returns the wire name.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    NewToken(NewToken),
    MetadataUpdated {
        address: String,
        symbol: Option<String>,
        name: Option<String>,
        image_url: Option<String>,
    },
    HoldersUpdated(HolderMetrics),
    CategoryChanged(CategoryTransition),
    PumpDetected(VolumeAlert),
    DumpDetected(VolumeAlert),
    NearGraduation {
        address: String,
        progress_percent: f64,
    },
    TokenGraduated {
        address: String,
        real_sol_reserves: f64,
    },
    LiquidityMilestone(MilestoneAlert),
    HighQualityLiquidity(LiquidityQualityScore),
    LiquidityMomentum(LiquidityGrowthMetrics),
    VolumeAlert(VolumeAlert),
    VolumeSpike(VolumeAlert),
    VolumeImbalance(VolumeAlert),
    UnusualVolumePattern(VolumeAlert),
    BuySignal(BuySignal),
    VolumeTriggeredBuySignal(BuySignal),
    Stats(StreamStats),
    Connected,
    Disconnected {
        reason: String,
    },
    Error {
        component: String,
        message: String,
    },
}

impl DomainEvent {
    /// Contract name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::NewToken(_) => "newToken",
            DomainEvent::MetadataUpdated { .. } => "metadataUpdated",
            DomainEvent::HoldersUpdated(_) => "holdersUpdated",
            DomainEvent::CategoryChanged(_) => "categoryChanged",
            DomainEvent::PumpDetected(_) => "pumpDetected",
            DomainEvent::DumpDetected(_) => "dumpDetected",
            DomainEvent::NearGraduation { .. } => "nearGraduation",
            DomainEvent::TokenGraduated { .. } => "tokenGraduated",
            DomainEvent::LiquidityMilestone(_) => "liquidityMilestone",
            DomainEvent::HighQualityLiquidity(_) => "highQualityLiquidity",
            DomainEvent::LiquidityMomentum(_) => "liquidityMomentum",
            DomainEvent::VolumeAlert(_) => "volumeAlert",
            DomainEvent::VolumeSpike(_) => "volumeSpike",
            DomainEvent::VolumeImbalance(_) => "volumeImbalance",
            DomainEvent::UnusualVolumePattern(_) => "unusualVolumePattern",
            DomainEvent::BuySignal(_) => "buySignal",
            DomainEvent::VolumeTriggeredBuySignal(_) => "volumeTriggeredBuySignal",
            DomainEvent::Stats(_) => "stats",
            DomainEvent::Connected => "connected",
            DomainEvent::Disconnected { .. } => "disconnected",
            DomainEvent::Error { .. } => "error",
        }
    }

    /// Severity-specialized name for alert events, e.g.
    /// `liquidityMilestone:critical`.
    pub fn specialized_name(&self) -> Option<String> {
        let severity = match self {
            DomainEvent::LiquidityMilestone(alert) => alert.severity,
            DomainEvent::VolumeAlert(alert)
            | DomainEvent::VolumeSpike(alert)
            | DomainEvent::VolumeImbalance(alert)
            | DomainEvent::UnusualVolumePattern(alert) => alert.severity,
            _ => return None,
        };
        Some(format!(
            "{}:{}",
            self.name(),
            severity.as_str().to_ascii_lowercase()
        ))
    }

    /// Token the event concerns, when it concerns exactly one.
    pub fn token_address(&self) -> Option<&str> {
        match self {
            DomainEvent::NewToken(t) => Some(&t.address),
            DomainEvent::MetadataUpdated { address, .. } => Some(address),
            DomainEvent::HoldersUpdated(m) => Some(&m.token_address),
            DomainEvent::CategoryChanged(t) => Some(&t.token_address),
            DomainEvent::PumpDetected(a) | DomainEvent::DumpDetected(a) => Some(&a.token_address),
            DomainEvent::NearGraduation { address, .. } => Some(address),
            DomainEvent::TokenGraduated { address, .. } => Some(address),
            DomainEvent::LiquidityMilestone(a) => Some(&a.token_address),
            DomainEvent::HighQualityLiquidity(q) => Some(&q.token_address),
            DomainEvent::LiquidityMomentum(g) => Some(&g.token_address),
            DomainEvent::VolumeAlert(a)
            | DomainEvent::VolumeSpike(a)
            | DomainEvent::VolumeImbalance(a)
            | DomainEvent::UnusualVolumePattern(a) => Some(&a.token_address),
            DomainEvent::BuySignal(s) | DomainEvent::VolumeTriggeredBuySignal(s) => {
                Some(&s.token_address)
            }
            _ => None,
        }
    }
}

/// Cloneable handle to the broadcast bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. A send error only means there are currently no
    /// subscribers, which is not a fault.
    pub fn publish(&self, event: DomainEvent) {
        debug!(event = event.name(), token = ?event.token_address(), "publish");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
