//! Event bus contract tests: every emitted event keeps its wire name, and
//! subscribers observe events in publish order.

use chrono::Utc;
use pumpline::events::{DomainEvent, EventBus, StreamStats};
use pumpline::models::{
    AlertSeverity, BuySignal, CategoryTransition, HolderMetrics, LiquidityGrowthMetrics,
    LiquidityMomentum, LiquidityQualityScore, MilestoneAlert, MilestoneLadder, NewToken,
    RiskLevel, TokenCategory, TradingSuitability, VolumeAlert, VolumeAlertKind,
};

fn volume_alert(kind: VolumeAlertKind, severity: AlertSeverity) -> VolumeAlert {
    VolumeAlert {
        token_address: "mint".to_string(),
        kind,
        severity,
        volume_1h_usd: 5_000.0,
        hourly_avg_24h_usd: 800.0,
        buy_ratio_1h: 0.8,
        tx_count_1h: 40,
        message: "test".to_string(),
        time: Utc::now(),
    }
}

fn milestone() -> MilestoneAlert {
    MilestoneAlert {
        token_address: "mint".to_string(),
        ladder: MilestoneLadder::SolLiquidity,
        threshold: 73.0,
        value: 73.4,
        severity: AlertSeverity::Critical,
        time: Utc::now(),
    }
}

fn signal() -> BuySignal {
    BuySignal {
        token_address: "mint".to_string(),
        passed: true,
        reason: "all criteria passed".to_string(),
        confidence: 0.7,
        market_cap: 40_000.0,
        liquidity_usd: 12_000.0,
        holders: 120,
        top_10_percent: 28.0,
        security_score: 72,
        quality: None,
        growth: None,
        risk_level: RiskLevel::Medium,
        recommended_position_sol: Some(1.0),
        evaluated_at: Utc::now(),
    }
}

#[test]
fn every_event_keeps_its_wire_name() {
    let growth = LiquidityGrowthMetrics {
        token_address: "mint".to_string(),
        rate_1h: 6.0,
        rate_6h: 2.0,
        rate_24h: 1.0,
        momentum: LiquidityMomentum::High,
        accelerating: true,
        peak_liquidity_sol: 40.0,
        hours_since_peak: 0.0,
        computed_at: Utc::now(),
    };
    let quality = LiquidityQualityScore {
        token_address: "mint".to_string(),
        score: 85.0,
        grade: 'B',
        suitability: TradingSuitability::Excellent,
        computed_at: Utc::now(),
    };
    let holders = HolderMetrics {
        token_address: "mint".to_string(),
        total_holders: 150,
        top_1_percent: 12.0,
        top_5_percent: 20.0,
        top_10_percent: 28.0,
        top_25_percent: 45.0,
        top_50_percent: 70.0,
        data_source: "program_accounts".to_string(),
        updated_at: Utc::now(),
    };

    let cases: Vec<(DomainEvent, &str)> = vec![
        (
            DomainEvent::NewToken(NewToken {
                address: "mint".to_string(),
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
                created_at: Utc::now(),
            }),
            "newToken",
        ),
        (
            DomainEvent::MetadataUpdated {
                address: "mint".to_string(),
                symbol: Some("TKN".to_string()),
                name: None,
                image_url: None,
            },
            "metadataUpdated",
        ),
        (DomainEvent::HoldersUpdated(holders), "holdersUpdated"),
        (
            DomainEvent::CategoryChanged(CategoryTransition {
                token_address: "mint".to_string(),
                from_category: TokenCategory::High,
                to_category: TokenCategory::Aim,
                market_cap: 35_100.0,
                reason: "market_cap_threshold".to_string(),
                time: Utc::now(),
            }),
            "categoryChanged",
        ),
        (
            DomainEvent::PumpDetected(volume_alert(VolumeAlertKind::Spike, AlertSeverity::High)),
            "pumpDetected",
        ),
        (
            DomainEvent::DumpDetected(volume_alert(VolumeAlertKind::Spike, AlertSeverity::High)),
            "dumpDetected",
        ),
        (
            DomainEvent::NearGraduation {
                address: "mint".to_string(),
                progress_percent: 96.0,
            },
            "nearGraduation",
        ),
        (
            DomainEvent::TokenGraduated {
                address: "mint".to_string(),
                real_sol_reserves: 73.4,
            },
            "tokenGraduated",
        ),
        (DomainEvent::LiquidityMilestone(milestone()), "liquidityMilestone"),
        (DomainEvent::HighQualityLiquidity(quality), "highQualityLiquidity"),
        (DomainEvent::LiquidityMomentum(growth), "liquidityMomentum"),
        (
            DomainEvent::VolumeAlert(volume_alert(VolumeAlertKind::Spike, AlertSeverity::Medium)),
            "volumeAlert",
        ),
        (
            DomainEvent::VolumeSpike(volume_alert(VolumeAlertKind::Spike, AlertSeverity::Medium)),
            "volumeSpike",
        ),
        (
            DomainEvent::VolumeImbalance(volume_alert(
                VolumeAlertKind::Imbalance,
                AlertSeverity::Medium,
            )),
            "volumeImbalance",
        ),
        (
            DomainEvent::UnusualVolumePattern(volume_alert(
                VolumeAlertKind::UnusualPattern,
                AlertSeverity::High,
            )),
            "unusualVolumePattern",
        ),
        (DomainEvent::BuySignal(signal()), "buySignal"),
        (
            DomainEvent::VolumeTriggeredBuySignal(signal()),
            "volumeTriggeredBuySignal",
        ),
        (DomainEvent::Stats(StreamStats::default()), "stats"),
        (DomainEvent::Connected, "connected"),
        (
            DomainEvent::Disconnected {
                reason: "stream closed".to_string(),
            },
            "disconnected",
        ),
        (
            DomainEvent::Error {
                component: "flush".to_string(),
                message: "boom".to_string(),
            },
            "error",
        ),
    ];

    for (event, expected) in cases {
        assert_eq!(event.name(), expected);
    }
}

#[test]
fn severity_specialized_names_only_for_alerts() {
    let critical = DomainEvent::VolumeAlert(volume_alert(
        VolumeAlertKind::Spike,
        AlertSeverity::Critical,
    ));
    assert_eq!(
        critical.specialized_name().as_deref(),
        Some("volumeAlert:critical")
    );
    assert_eq!(
        DomainEvent::LiquidityMilestone(milestone())
            .specialized_name()
            .as_deref(),
        Some("liquidityMilestone:critical")
    );
    assert_eq!(DomainEvent::Connected.specialized_name(), None);
    assert_eq!(DomainEvent::BuySignal(signal()).specialized_name(), None);
}

#[tokio::test]
async fn subscribers_observe_publish_order() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();

    bus.publish(DomainEvent::Connected);
    bus.publish(DomainEvent::LiquidityMilestone(milestone()));
    bus.publish(DomainEvent::Disconnected {
        reason: "eof".to_string(),
    });

    assert_eq!(rx.recv().await.unwrap().name(), "connected");
    assert_eq!(rx.recv().await.unwrap().name(), "liquidityMilestone");
    assert_eq!(rx.recv().await.unwrap().name(), "disconnected");
}

#[tokio::test]
async fn late_subscribers_miss_earlier_events() {
    let bus = EventBus::new(64);
    bus.publish(DomainEvent::Connected);

    let mut rx = bus.subscribe();
    bus.publish(DomainEvent::Disconnected {
        reason: "eof".to_string(),
    });
    assert_eq!(rx.recv().await.unwrap().name(), "disconnected");
}
