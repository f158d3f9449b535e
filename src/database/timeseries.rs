//! Hypertable operations: price ticks and transactions

use super::Database;
use crate::models::{PriceTick, TokenTransaction};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashMap;

/// Deduplicate ticks by `(token_address, time)`, keeping the tick with the
/// highest slot. Input order is preserved for the surviving rows.
pub fn dedupe_ticks(ticks: Vec<PriceTick>) -> Vec<PriceTick> {
    let mut best: HashMap<(String, DateTime<Utc>), usize> = HashMap::new();
    let mut keep: Vec<Option<PriceTick>> = Vec::with_capacity(ticks.len());

    for tick in ticks {
        let key = (tick.token_address.clone(), tick.time);
        match best.get(&key) {
            Some(&idx) => {
                let existing = keep[idx]
                    .as_ref()
                    .expect("deduped slot still occupied");
                if tick.slot > existing.slot {
                    keep[idx] = Some(tick);
                }
            }
            None => {
                best.insert(key, keep.len());
                keep.push(Some(tick));
            }
        }
    }

    keep.into_iter().flatten().collect()
}

impl Database {
    /// Flush step 3: upsert one chunk (≤ `ingest.price_chunk_size`) of
    /// deduplicated ticks. Conflicting rows get their price and
    /// market-cap/liquidity fields overwritten.
    pub async fn upsert_price_chunk(
        tx: &mut Transaction<'static, Postgres>,
        ticks: &[PriceTick],
    ) -> Result<u64> {
        if ticks.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO timeseries.token_prices (
                token_address, time, price_usd, price_sol,
                virtual_sol_reserves, virtual_token_reserves,
                real_sol_reserves, real_token_reserves,
                market_cap, liquidity_usd, slot, source) ",
        );
        builder.push_values(ticks, |mut row, tick| {
            row.push_bind(&tick.token_address)
                .push_bind(tick.time)
                .push_bind(tick.price_usd)
                .push_bind(tick.price_sol)
                .push_bind(tick.virtual_sol_reserves)
                .push_bind(tick.virtual_token_reserves)
                .push_bind(tick.real_sol_reserves)
                .push_bind(tick.real_token_reserves)
                .push_bind(tick.market_cap)
                .push_bind(tick.liquidity_usd)
                .push_bind(tick.slot)
                .push_bind(&tick.source);
        });
        builder.push(
            " ON CONFLICT (token_address, time) DO UPDATE SET
                price_usd = EXCLUDED.price_usd,
                price_sol = EXCLUDED.price_sol,
                virtual_sol_reserves = EXCLUDED.virtual_sol_reserves,
                virtual_token_reserves = EXCLUDED.virtual_token_reserves,
                real_sol_reserves = EXCLUDED.real_sol_reserves,
                real_token_reserves = EXCLUDED.real_token_reserves,
                market_cap = EXCLUDED.market_cap,
                liquidity_usd = EXCLUDED.liquidity_usd,
                slot = EXCLUDED.slot",
        );

        let result = builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    /// Flush step 4: insert one chunk of transactions, ignoring duplicates
    /// on `(signature, token_address, time)`. Rows without a resolved token
    /// address must be filtered out by the caller.
    pub async fn insert_transaction_chunk(
        tx: &mut Transaction<'static, Postgres>,
        transactions: &[TokenTransaction],
    ) -> Result<u64> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO timeseries.token_transactions (
                signature, token_address, time, type, user_address,
                token_amount, sol_amount, price_usd, price_sol, slot, fee) ",
        );
        builder.push_values(transactions, |mut row, t| {
            row.push_bind(&t.signature)
                .push_bind(t.token_address.as_deref().unwrap_or_default())
                .push_bind(t.time)
                .push_bind(t.kind.as_str())
                .push_bind(&t.user_address)
                .push_bind(t.token_amount)
                .push_bind(t.sol_amount)
                .push_bind(t.price_usd)
                .push_bind(t.price_sol)
                .push_bind(t.slot)
                .push_bind(t.fee);
        });
        builder.push(" ON CONFLICT (signature, token_address, time) DO NOTHING");

        let result = builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    /// Liquidity history in real-SOL reserves for the growth tracker.
    pub async fn liquidity_history(
        &self,
        token_address: &str,
        hours: f64,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let rows = sqlx::query(
            r#"
            SELECT time, real_sol_reserves
            FROM timeseries.token_prices
            WHERE token_address = $1
              AND time > NOW() - make_interval(secs => $2)
            ORDER BY time ASC
            "#,
        )
        .bind(token_address)
        .bind(hours * 3600.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let time: DateTime<Utc> = row.get("time");
                let lamports: i64 = row.get("real_sol_reserves");
                (time, lamports as f64 / 1e9)
            })
            .collect())
    }

    /// Recent USD prices, oldest first, for volatility estimation.
    pub async fn price_history(&self, token_address: &str, hours: f64) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            r#"
            SELECT price_usd
            FROM timeseries.token_prices
            WHERE token_address = $1
              AND time > NOW() - make_interval(secs => $2)
            ORDER BY time ASC
            "#,
        )
        .bind(token_address)
        .bind(hours * 3600.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("price_usd")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(address: &str, secs: i64, slot: i64) -> PriceTick {
        PriceTick {
            token_address: address.to_string(),
            time: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            price_usd: slot as f64,
            price_sol: 0.0,
            virtual_sol_reserves: 0,
            virtual_token_reserves: 0,
            real_sol_reserves: 0,
            real_token_reserves: 0,
            market_cap: 0.0,
            liquidity_usd: 0.0,
            slot,
            source: "grpc".to_string(),
        }
    }

    #[test]
    fn dedupe_keeps_highest_slot() {
        let deduped = dedupe_ticks(vec![
            tick("a", 0, 500),
            tick("a", 0, 501),
            tick("a", 1, 400),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].slot, 501);
        assert_eq!(deduped[1].slot, 400);
    }

    #[test]
    fn dedupe_does_not_downgrade() {
        let deduped = dedupe_ticks(vec![tick("a", 0, 501), tick("a", 0, 500)]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].slot, 501);
    }

    #[test]
    fn dedupe_distinguishes_tokens() {
        let deduped = dedupe_ticks(vec![tick("a", 0, 1), tick("b", 0, 2)]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn dedupe_of_empty_is_empty() {
        assert!(dedupe_ticks(Vec::new()).is_empty());
    }
}
