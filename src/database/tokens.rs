//! Token-table operations

use super::Database;
use crate::models::{
    HolderMetrics, NewToken, Token, TokenCategory, TokenRowUpdate,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashSet;
use std::str::FromStr;

/// Placeholder identity for tokens pre-inserted ahead of metadata arrival.
pub const PLACEHOLDER_SYMBOL: &str = "LOADING…";
pub const PLACEHOLDER_NAME: &str = "Unknown Token";

fn token_from_row(row: &PgRow) -> Result<Token> {
    let category: String = row.get("category");
    Ok(Token {
        address: row.get("address"),
        symbol: row.get("symbol"),
        name: row.get("name"),
        description: row.get("description"),
        image_url: row.get("image_url"),
        category: TokenCategory::from_str(&category).map_err(anyhow::Error::msg)?,
        current_price_sol: row.get("current_price_sol"),
        current_price_usd: row.get("current_price_usd"),
        market_cap: row.get("market_cap"),
        liquidity: row.get("liquidity"),
        curve_progress: row.get("curve_progress"),
        bonding_curve: row.get("bonding_curve"),
        creator: row.get("creator"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_price_update: row.get("last_price_update"),
        first_seen_above_threshold: row.get("first_seen_above_threshold"),
        below_threshold_since: row.get("below_threshold_since"),
        holders: row.get("holders"),
        top_10_percent: row.get("top_10_percent"),
        top_25_percent: row.get("top_25_percent"),
        holder_distribution: row.get("holder_distribution"),
        holder_last_updated: row.get("holder_last_updated"),
        solsniffer_score: row.get("solsniffer_score"),
        solsniffer_checked_at: row.get("solsniffer_checked_at"),
        security_data: row.get("security_data"),
        buy_attempts: row.get("buy_attempts"),
    })
}

impl Database {
    /// Flush step 1: insert newly observed tokens, ignoring address
    /// collisions.
    pub async fn insert_new_tokens(
        tx: &mut Transaction<'static, Postgres>,
        tokens: &[NewToken],
    ) -> Result<u64> {
        let mut inserted = 0;
        for token in tokens {
            let result = sqlx::query(
                r#"
                INSERT INTO tokens (
                    address, symbol, name, category, current_price_sol,
                    current_price_usd, market_cap, liquidity, curve_progress,
                    bonding_curve, creator, created_at, updated_at, buy_attempts
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), 0)
                ON CONFLICT (address) DO NOTHING
                "#,
            )
            .bind(&token.address)
            .bind(&token.symbol)
            .bind(&token.name)
            .bind(token.category.as_str())
            .bind(token.current_price_sol)
            .bind(token.current_price_usd)
            .bind(token.market_cap)
            .bind(token.liquidity)
            .bind(token.curve_progress)
            .bind(&token.bonding_curve)
            .bind(&token.creator)
            .bind(token.created_at)
            .execute(&mut **tx)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Which of the given addresses already have a token row.
    pub async fn existing_addresses(
        tx: &mut Transaction<'static, Postgres>,
        addresses: &[String],
    ) -> Result<HashSet<String>> {
        if addresses.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query("SELECT address FROM tokens WHERE address = ANY($1)")
            .bind(addresses)
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("address")).collect())
    }

    /// Flush step 2: pre-insert placeholder rows for tokens referenced by
    /// pending prices or transactions, so the hypertable inserts never hit a
    /// missing foreign key.
    pub async fn insert_placeholder_token(
        tx: &mut Transaction<'static, Postgres>,
        token: &NewToken,
        above_entry: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                address, symbol, name, category, current_price_sol,
                current_price_usd, market_cap, liquidity, curve_progress,
                bonding_curve, creator, created_at, updated_at,
                first_seen_above_threshold, below_threshold_since, buy_attempts
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), $13, $14, 0)
            ON CONFLICT (address) DO NOTHING
            "#,
        )
        .bind(&token.address)
        .bind(PLACEHOLDER_SYMBOL)
        .bind(PLACEHOLDER_NAME)
        .bind(token.category.as_str())
        .bind(token.current_price_sol)
        .bind(token.current_price_usd)
        .bind(token.market_cap)
        .bind(token.liquidity)
        .bind(token.curve_progress)
        .bind(&token.bonding_curve)
        .bind(&token.creator)
        .bind(token.created_at)
        .bind(above_entry.then_some(token.created_at))
        .bind((!above_entry).then_some(token.created_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Apply the latest price-derived columns to a token row. Repeated
    /// identical updates only move `last_price_update` and `updated_at`.
    pub async fn apply_token_update(
        tx: &mut Transaction<'static, Postgres>,
        update: &TokenRowUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tokens SET
                category = $2,
                current_price_sol = $3,
                current_price_usd = $4,
                market_cap = $5,
                liquidity = $6,
                curve_progress = $7,
                first_seen_above_threshold = COALESCE(first_seen_above_threshold, $8),
                below_threshold_since = CASE
                    WHEN $9::timestamptz IS NULL THEN NULL
                    ELSE COALESCE(below_threshold_since, $9)
                END,
                last_price_update = $10,
                updated_at = NOW()
            WHERE address = $1
            "#,
        )
        .bind(&update.address)
        .bind(update.category.as_str())
        .bind(update.current_price_sol)
        .bind(update.current_price_usd)
        .bind(update.market_cap)
        .bind(update.liquidity_sol)
        .bind(update.curve_progress)
        .bind(update.first_seen_above_threshold)
        .bind(update.below_threshold_since)
        .bind(update.last_price_update)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_token(&self, address: &str) -> Result<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(token_from_row).transpose()
    }

    /// Category snapshot for warming the in-memory classifier cache.
    pub async fn load_token_categories(&self) -> Result<Vec<(String, TokenCategory, f64)>> {
        let rows = sqlx::query("SELECT address, category, market_cap FROM tokens")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let category: String = row.get("category");
            out.push((
                row.get("address"),
                TokenCategory::from_str(&category).map_err(anyhow::Error::msg)?,
                row.get("market_cap"),
            ));
        }
        Ok(out)
    }

    /// Persist holder concentration metrics onto the token row.
    pub async fn update_holder_metrics(&self, metrics: &HolderMetrics) -> Result<()> {
        let distribution = serde_json::json!({
            "top_1": metrics.top_1_percent,
            "top_5": metrics.top_5_percent,
            "top_10": metrics.top_10_percent,
            "top_25": metrics.top_25_percent,
            "top_50": metrics.top_50_percent,
            "source": metrics.data_source,
        });
        sqlx::query(
            r#"
            UPDATE tokens SET
                holders = $2,
                top_10_percent = $3,
                top_25_percent = $4,
                holder_distribution = $5,
                holder_last_updated = $6,
                updated_at = NOW()
            WHERE address = $1
            "#,
        )
        .bind(&metrics.token_address)
        .bind(metrics.total_holders)
        .bind(metrics.top_10_percent)
        .bind(metrics.top_25_percent)
        .bind(distribution.to_string())
        .bind(metrics.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Tokens whose holder metrics are older than the cadence for their
    /// category.
    pub async fn tokens_due_for_holder_refresh(
        &self,
        category: TokenCategory,
        max_age_secs: u64,
        limit: i64,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT address FROM tokens
            WHERE category = $1
              AND (holder_last_updated IS NULL
                   OR holder_last_updated < NOW() - make_interval(secs => $2))
            ORDER BY holder_last_updated ASC NULLS FIRST
            LIMIT $3
            "#,
        )
        .bind(category.as_str())
        .bind(max_age_secs as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("address")).collect())
    }

    /// Tokens with a price update inside the window, for analytics sweeps.
    pub async fn recently_active_tokens(
        &self,
        categories: &[TokenCategory],
        window_secs: u64,
        limit: i64,
    ) -> Result<Vec<String>> {
        let names: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT address FROM tokens
            WHERE category = ANY($1)
              AND last_price_update > NOW() - make_interval(secs => $2)
            ORDER BY market_cap DESC
            LIMIT $3
            "#,
        )
        .bind(&names)
        .bind(window_secs as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("address")).collect())
    }

    /// Tokens still carrying placeholder identity, oldest first, for the
    /// metadata backfill task.
    pub async fn placeholder_tokens(&self, limit: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT address FROM tokens
            WHERE symbol = $1 OR symbol IS NULL
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(PLACEHOLDER_SYMBOL)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("address")).collect())
    }

    /// Apply enrichment results from a metadata source.
    pub async fn update_token_metadata(
        &self,
        address: &str,
        symbol: Option<&str>,
        name: Option<&str>,
        description: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tokens SET
                symbol = COALESCE($2, symbol),
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                image_url = COALESCE($5, image_url),
                updated_at = NOW()
            WHERE address = $1
            "#,
        )
        .bind(address)
        .bind(symbol)
        .bind(name)
        .bind(description)
        .bind(image_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump the buy-attempt counter after a passed signal.
    pub async fn increment_buy_attempts(&self, address: &str) -> Result<i32> {
        let row = sqlx::query(
            "UPDATE tokens SET buy_attempts = buy_attempts + 1, updated_at = NOW()
             WHERE address = $1 RETURNING buy_attempts",
        )
        .bind(address)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("buy_attempts"))
    }

    /// Operator reset of the anti-spam counter.
    pub async fn reset_buy_attempts(&self, address: &str) -> Result<()> {
        sqlx::query("UPDATE tokens SET buy_attempts = 0, updated_at = NOW() WHERE address = $1")
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a security score refresh (fed by the enrichment seam).
    pub async fn update_security_score(
        &self,
        address: &str,
        score: i32,
        data: Option<serde_json::Value>,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tokens SET
                solsniffer_score = $2,
                security_data = $3,
                solsniffer_checked_at = $4,
                updated_at = NOW()
            WHERE address = $1
            "#,
        )
        .bind(address)
        .bind(score)
        .bind(data)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
