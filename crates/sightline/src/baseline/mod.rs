//! Per-key statistical baselines and their concurrent manager.
//!
//! A [`Baseline`] is an immutable summary of one metric's recent history,
//! recomputed from the key's rolling window on every update and replaced as
//! a whole value — readers never observe a partially updated snapshot.
//!
//! ## Architecture
//!
//! ```text
//!   update(key, value) ──► BaselineManager
//!                             │  DashMap<BaselineKey, (RollingWindow, Baseline)>
//!                             │    per-key shard locking, no global lock
//!                             └── push ► snapshot ► recompute ► swap
//!   get(key) ──► most recently completed Baseline (or absent)
//! ```

pub mod manager;
pub mod types;

pub use manager::{BaselineManager, BaselineManagerStats};
pub use types::{Baseline, BaselineKey};

/// Minimum samples before a baseline is statistically meaningful. Below this
/// floor detectors treat the baseline as absent and silently abstain.
pub const MIN_BASELINE_SAMPLES: usize = 10;

/// Default rolling-window capacity per key.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;
