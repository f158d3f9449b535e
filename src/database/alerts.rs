//! Append-only alert and transition tables

use super::Database;
use crate::models::{CategoryTransition, MilestoneAlert, VolumeAlert};
use anyhow::Result;
use sqlx::{Postgres, Transaction};

impl Database {
    /// Append category transitions inside the flush transaction, after the
    /// token rows they reference exist.
    pub async fn insert_category_transitions(
        tx: &mut Transaction<'static, Postgres>,
        transitions: &[CategoryTransition],
    ) -> Result<()> {
        for t in transitions {
            sqlx::query(
                r#"
                INSERT INTO category_transitions (
                    token_address, from_category, to_category, market_cap, reason, time
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&t.token_address)
            .bind(t.from_category.as_str())
            .bind(t.to_category.as_str())
            .bind(t.market_cap)
            .bind(&t.reason)
            .bind(t.time)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_milestone_alert(&self, alert: &MilestoneAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO liquidity_milestone_alerts (
                token_address, ladder, threshold, value, severity, time
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&alert.token_address)
        .bind(alert.ladder.as_str())
        .bind(alert.threshold)
        .bind(alert.value)
        .bind(alert.severity.as_str())
        .bind(alert.time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_volume_alert(&self, alert: &VolumeAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO volume_alerts (
                token_address, kind, severity, volume_1h_usd,
                hourly_avg_24h_usd, buy_ratio_1h, tx_count_1h, message, time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&alert.token_address)
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(alert.volume_1h_usd)
        .bind(alert.hourly_avg_24h_usd)
        .bind(alert.buy_ratio_1h)
        .bind(alert.tx_count_1h as i64)
        .bind(&alert.message)
        .bind(alert.time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
