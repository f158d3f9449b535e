//! Data models for tracked tokens, time-series rows, analytics and alerts

pub mod alerts;
pub mod analytics;
pub mod signal;
pub mod tick;
pub mod token;

pub use alerts::*;
pub use analytics::*;
pub use signal::*;
pub use tick::*;
pub use token::*;
