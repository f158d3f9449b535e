//! Yellowstone Geyser subscription: filters, client, and update parsing

pub mod client;
pub mod filters;
pub mod parser;

pub use client::{probe_endpoint, GeyserSubscription};
pub use filters::{parse_commitment, subscription_request, PUMP_FUN_PROGRAM};
pub use parser::{parse_update, ParsedTransaction, UpstreamEvent};
