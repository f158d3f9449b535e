//! Pumpline
//!
//! Real-time ingestion, classification, and signal-generation pipeline for
//! pump.fun bonding-curve tokens. Consumes a Yellowstone Geyser stream,
//! decodes bonding-curve state, persists prices and transactions into
//! TimescaleDB hypertables, and drives liquidity/holder/volume analytics
//! and the buy-signal evaluator.

pub mod analytics;
pub mod config;
pub mod curve;
pub mod database;
pub mod error;
pub mod events;
pub mod geyser;
pub mod metadata;
pub mod models;
pub mod rpc_client;
pub mod scheduler;
pub mod signal;
pub mod sol_price;
pub mod stream;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use database::Database;
pub use events::{DomainEvent, EventBus};
pub use models::*;
pub use stream::StreamManager;
