//! Anomaly detectors: a closed set of statistical variants behind one
//! capability trait the engine iterates over.
//!
//! ## Architecture
//!
//! ```text
//!   TelemetryEvent + Baseline (read)
//!       │
//!       ├──► ZScoreDetector   σ-distance from the mean
//!       ├──► IqrDetector      Tukey quartile fences
//!       ├──► MadDetector      modified z-score (robust)
//!       └──► CusumDetector    accumulated drift (per-key state)
//!             │
//!             ▼
//!       Option<AnomalyEvent>
//! ```
//!
//! Detectors take `&self` everywhere so one instance can serve concurrent
//! workers; the only mutable state (CUSUM accumulators, counters) lives in
//! per-key concurrent maps and atomics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::anomaly::{AnomalyEvent, DetectionMethod};
use crate::error::DetectionResult;
use crate::telemetry::TelemetryEvent;

pub mod cusum;
pub mod iqr;
pub mod mad;
pub mod zscore;

pub use cusum::{CusumConfig, CusumDetector};
pub use iqr::{IqrConfig, IqrDetector};
pub use mad::{MadConfig, MadDetector};
pub use zscore::{ZScoreConfig, ZScoreDetector};

// ── Detector kind ───────────────────────────────────────────────────────

/// The closed set of detector variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    ZScore,
    Iqr,
    Mad,
    Cusum,
}

impl DetectorKind {
    /// Stable short name, used for logging and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::ZScore => "zscore",
            DetectorKind::Iqr => "iqr",
            DetectorKind::Mad => "mad",
            DetectorKind::Cusum => "cusum",
        }
    }

    /// The detection method this variant stamps on its anomalies.
    pub fn method(self) -> DetectionMethod {
        match self {
            DetectorKind::ZScore => DetectionMethod::ZScore,
            DetectorKind::Iqr => DetectionMethod::Iqr,
            DetectorKind::Mad => DetectionMethod::Mad,
            DetectorKind::Cusum => DetectionMethod::Cusum,
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ── Capability trait ────────────────────────────────────────────────────

/// Common capability set of all detector variants.
///
/// `detect` classifies one event against the current baseline and never
/// mutates learned state; `update` is the learning half and is a no-op for
/// detectors whose only state is the shared baseline (the engine owns
/// baseline updates). `reset` clears detector-private state and counters,
/// independently of baselines.
pub trait Detector: Send + Sync {
    /// Classify an event. `Ok(None)` means "no anomaly", including the
    /// normal case of a missing or not-yet-valid baseline.
    fn detect(&self, event: &TelemetryEvent) -> DetectionResult<Option<AnomalyEvent>>;

    /// Learn from an event. Default: nothing to learn privately.
    fn update(&self, event: &TelemetryEvent) -> DetectionResult<()> {
        let _ = event;
        Ok(())
    }

    /// Clear detector-private state and counters.
    fn reset(&self);

    /// Which variant this is.
    fn kind(&self) -> DetectorKind;

    /// Stable short name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Snapshot of this detector's counters.
    fn stats(&self) -> DetectorStats;
}

// ── Per-detector statistics ─────────────────────────────────────────────

/// Point-in-time snapshot of one detector's counters.
#[derive(Debug, Clone)]
pub struct DetectorStats {
    /// Detection calls made.
    pub invocations: u64,
    /// Anomalies returned.
    pub detections: u64,
    /// Failed calls (invalid input or internal fault).
    pub errors: u64,
}

impl DetectorStats {
    /// Detections per invocation, 0 when idle.
    pub fn detection_rate(&self) -> f64 {
        if self.invocations == 0 {
            return 0.0;
        }
        self.detections as f64 / self.invocations as f64
    }
}

/// Lock-free counter cell shared by all detector variants.
#[derive(Debug, Default)]
pub(crate) struct DetectorCounters {
    invocations: AtomicU64,
    detections: AtomicU64,
    errors: AtomicU64,
}

impl DetectorCounters {
    pub(crate) fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DetectorStats {
        DetectorStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.invocations.store(0, Ordering::Relaxed);
        self.detections.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Saturating confidence curve shared by the score-based detectors: rises
/// steeply just past the threshold, flattens toward the 0.99 cap.
pub(crate) fn saturating_confidence(score: f64, threshold: f64) -> f64 {
    (1.0 - 0.5 / (1.0 + (score - threshold))).clamp(0.5, 0.99)
}
