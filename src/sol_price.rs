//! SOL/USD price service.
//!
//! Polls a configurable HTTP endpoint and caches the latest rate. The first
//! fetch happens at startup and is fatal on failure; afterwards poll errors
//! keep the previous value.

use crate::config::SolPriceConfig;
use crate::error::StartupError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct SolPriceService {
    config: SolPriceConfig,
    client: reqwest::Client,
    /// f64 bits of the latest price.
    current: AtomicU64,
}

impl SolPriceService {
    /// Fetch the initial price and return the running service.
    pub async fn start(config: SolPriceConfig) -> Result<Arc<Self>, StartupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StartupError::SolPrice(e.to_string()))?;

        let service = Arc::new(Self {
            config,
            client,
            current: AtomicU64::new(0),
        });

        let initial = service
            .fetch()
            .await
            .map_err(|e| StartupError::SolPrice(e.to_string()))?;
        service.store(initial);
        info!(price = initial, "initial SOL price fetched");

        Ok(service)
    }

    pub fn current(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Relaxed))
    }

    fn store(&self, price: f64) {
        self.current.store(price.to_bits(), Ordering::Relaxed);
    }

    /// Poll loop; runs until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.fetch().await {
                        Ok(price) => {
                            debug!(price, "SOL price updated");
                            self.store(price);
                        }
                        Err(err) => {
                            warn!(%err, "SOL price poll failed, keeping previous value");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    return;
                }
            }
        }
    }

    async fn fetch(&self) -> anyhow::Result<f64> {
        let body: serde_json::Value = self
            .client
            .get(&self.config.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        extract_usd_price(&body)
            .ok_or_else(|| anyhow::anyhow!("no usd price in response: {body}"))
    }
}

/// Accepts the common response shapes: `{"solana":{"usd":x}}`,
/// `{"price":x}`, or a bare number.
fn extract_usd_price(body: &serde_json::Value) -> Option<f64> {
    if let Some(price) = body["solana"]["usd"].as_f64() {
        return Some(price);
    }
    if let Some(price) = body["price"].as_f64() {
        return Some(price);
    }
    body.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coingecko_shape() {
        let body = serde_json::json!({"solana": {"usd": 141.27}});
        assert_eq!(extract_usd_price(&body), Some(141.27));
    }

    #[test]
    fn parses_simple_shapes() {
        assert_eq!(
            extract_usd_price(&serde_json::json!({"price": 100.5})),
            Some(100.5)
        );
        assert_eq!(extract_usd_price(&serde_json::json!(99.0)), Some(99.0));
    }

    #[test]
    fn missing_price_is_none() {
        assert_eq!(extract_usd_price(&serde_json::json!({"other": 1})), None);
    }
}
