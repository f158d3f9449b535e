//! Analytics subsystems: liquidity, holders, volume.
//!
//! All three share the same shape: compute on event (or sweep), cache the
//! result in memory, and hand alerts back to the caller for persistence and
//! fan-out. Caches are owned here; nothing is shared mutable state.

pub mod holders;
pub mod liquidity;
pub mod volume;

pub use holders::{HolderAnalytics, PriorityQueue, QueuePriority};
pub use liquidity::{GrowthTracker, MilestoneTracker, QualityScorer};
pub use volume::VolumeAnalytics;
