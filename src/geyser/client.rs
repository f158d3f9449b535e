//! Yellowstone gRPC subscription with automatic reconnect.
//!
//! The subscription task owns the connection lifecycle and forwards parsed
//! upstream events over a channel to the stream manager; the manager's
//! buffers survive reconnects untouched.

use super::filters::{parse_commitment, subscription_request};
use super::parser::{parse_update, UpstreamEvent};
use crate::config::GeyserConfig;
use crate::events::{DomainEvent, EventBus};
use anyhow::Result;
use futures::SinkExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tonic::transport::channel::ClientTlsConfig;
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::geyser::{SubscribeRequest, SubscribeRequestPing, SubscribeUpdate};

/// Verify the endpoint accepts a connection, without subscribing. Used at
/// startup so a bad endpoint fails fast instead of spinning the reconnect
/// loop forever.
pub async fn probe_endpoint(config: &GeyserConfig) -> Result<()> {
    GeyserGrpcClient::build_from_shared(config.endpoint.clone())?
        .x_token(config.x_token.clone())?
        .tls_config(ClientTlsConfig::new().with_native_roots())?
        .connect_timeout(Duration::from_secs(10))
        .connect()
        .await?;
    Ok(())
}

/// Long-lived subscription task. Reconnects with exponential backoff on any
/// stream failure; the backoff resets after a healthy connection.
pub struct GeyserSubscription {
    config: GeyserConfig,
    events: mpsc::Sender<UpstreamEvent>,
    bus: EventBus,
    shutdown: watch::Receiver<bool>,
}

impl GeyserSubscription {
    pub fn new(
        config: GeyserConfig,
        events: mpsc::Sender<UpstreamEvent>,
        bus: EventBus,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            events,
            bus,
            shutdown,
        }
    }

    /// Drive the subscription until shutdown.
    pub async fn run(mut self) {
        let mut consecutive_failures: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                info!("geyser subscription shutting down");
                return;
            }

            match self.run_once().await {
                Ok(()) => {
                    // Stream ended without error: orderly shutdown.
                    return;
                }
                Err(err) => {
                    consecutive_failures = consecutive_failures
                        .saturating_add(1)
                        .min(self.config.max_reconnect_attempts);
                    self.bus.publish(DomainEvent::Disconnected {
                        reason: err.to_string(),
                    });
                    let delay = backoff_delay(
                        self.config.reconnect_delay_secs,
                        consecutive_failures,
                    );
                    error!(%err, attempt = consecutive_failures, ?delay, "geyser stream failed, reconnecting");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => return,
                    }
                }
            }
        }
    }

    async fn run_once(&mut self) -> Result<()> {
        info!(endpoint = %self.config.endpoint, "connecting to geyser endpoint");

        let mut client = GeyserGrpcClient::build_from_shared(self.config.endpoint.clone())?
            .x_token(self.config.x_token.clone())?
            .tls_config(ClientTlsConfig::new().with_native_roots())?
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .connect()
            .await?;

        let request = subscription_request(parse_commitment(&self.config.commitment));
        let (mut sink, mut stream) = client.subscribe_with_request(Some(request)).await?;

        info!("geyser subscription established");
        self.bus.publish(DomainEvent::Connected);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    return Ok(());
                }
                update = stream.next() => {
                    let update: SubscribeUpdate = match update {
                        Some(Ok(update)) => update,
                        Some(Err(status)) => {
                            return Err(anyhow::anyhow!("geyser stream error: {status}"));
                        }
                        None => anyhow::bail!("geyser stream closed by server"),
                    };
                    match parse_update(update) {
                        UpstreamEvent::Ping { id } => {
                            // Keep-alive: echo the ping id back on the sink.
                            let pong = SubscribeRequest {
                                ping: Some(SubscribeRequestPing { id }),
                                ..Default::default()
                            };
                            if let Err(err) = sink.send(pong).await {
                                warn!(%err, "failed to answer geyser ping");
                            }
                        }
                        UpstreamEvent::Ignored => {}
                        event => {
                            if self.events.send(event).await.is_err() {
                                // Manager dropped its receiver; nothing left to feed.
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

fn backoff_delay(base_secs: u64, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(6);
    let secs = base_secs.saturating_mul(1u64 << exp).min(60);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(5, 1), Duration::from_secs(5));
        assert_eq!(backoff_delay(5, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(5, 3), Duration::from_secs(20));
        assert_eq!(backoff_delay(5, 10), Duration::from_secs(60));
    }
}
