//! PostgreSQL / TimescaleDB access layer.
//!
//! All queries are runtime-checked (`sqlx::query` + `bind`); schema
//! installation is managed out-of-band. Expected layout:
//!
//! - `tokens` — one row per tracked token, PK `address`
//! - `timeseries.token_prices` — price hypertable, unique `(token_address, time)`
//! - `timeseries.token_transactions` — transaction hypertable, unique
//!   `(signature, token_address, time)`
//! - `category_transitions`, `liquidity_milestone_alerts`, `volume_alerts` —
//!   append-only
//!
//! The flush path runs inside one transaction obtained from [`Database::begin`];
//! analytics acquire connections from the shared pool on demand.

pub mod alerts;
pub mod timeseries;
pub mod tokens;

use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connect the shared pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await?;

        Ok(Self { pool })
    }

    /// Begin the exclusive flush transaction.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
