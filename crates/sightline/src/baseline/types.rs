//! Baseline data types: the per-key summary snapshot and the key itself.

use serde::{Deserialize, Serialize};

use crate::stats;
use crate::telemetry::{
    ModelId, ServiceId, TelemetryEvent, METRIC_COST_USD, METRIC_ERROR_RATE, METRIC_LATENCY_MS,
    METRIC_TOTAL_TOKENS,
};

use super::MIN_BASELINE_SAMPLES;

// ── Baseline key ────────────────────────────────────────────────────────

/// Identity partitioning all per-metric state: (service, model, metric).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaselineKey {
    pub service: ServiceId,
    pub model: ModelId,
    pub metric: String,
}

impl BaselineKey {
    pub fn new(service: ServiceId, model: ModelId, metric: impl Into<String>) -> Self {
        Self {
            service,
            model,
            metric: metric.into(),
        }
    }

    /// Key for the latency metric.
    pub fn latency(service: ServiceId, model: ModelId) -> Self {
        Self::new(service, model, METRIC_LATENCY_MS)
    }

    /// Key for the token-count metric.
    pub fn tokens(service: ServiceId, model: ModelId) -> Self {
        Self::new(service, model, METRIC_TOTAL_TOKENS)
    }

    /// Key for the cost metric.
    pub fn cost(service: ServiceId, model: ModelId) -> Self {
        Self::new(service, model, METRIC_COST_USD)
    }

    /// Key for the error-rate metric.
    pub fn error_rate(service: ServiceId, model: ModelId) -> Self {
        Self::new(service, model, METRIC_ERROR_RATE)
    }

    /// The key an event's observation belongs to.
    pub fn for_event(event: &TelemetryEvent) -> Self {
        Self::new(event.service.clone(), event.model.clone(), event.metric.clone())
    }
}

impl std::fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.model, self.metric)
    }
}

// ── Baseline snapshot ───────────────────────────────────────────────────

/// Immutable statistical summary of one key's recent history.
///
/// Replaced as a whole value on every update. Valid only once
/// [`MIN_BASELINE_SAMPLES`] observations have been folded in; an invalid
/// baseline exists but detectors treat it as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Median (P50).
    pub median: f64,
    /// Median absolute deviation.
    pub mad: f64,
    /// First quartile (P25).
    pub q1: f64,
    /// Third quartile (P75).
    pub q3: f64,
    /// Interquartile range, Q3 − Q1.
    pub iqr: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Smallest sample in the window.
    pub min: f64,
    /// Largest sample in the window.
    pub max: f64,
    /// Number of samples summarized.
    pub sample_count: usize,
}

impl Baseline {
    /// Compute a baseline from a sample snapshot. One sort, then order
    /// statistics off the sorted copy.
    pub fn from_samples(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self::empty();
        }

        let sorted = stats::sorted(data);
        let q1 = stats::percentile_sorted(&sorted, 25.0);
        let q3 = stats::percentile_sorted(&sorted, 75.0);

        Self {
            mean: stats::mean(data),
            std_dev: stats::std_dev(data),
            median: stats::percentile_sorted(&sorted, 50.0),
            mad: stats::mad(data),
            q1,
            q3,
            iqr: q3 - q1,
            p95: stats::percentile_sorted(&sorted, 95.0),
            p99: stats::percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            sample_count: data.len(),
        }
    }

    /// A baseline with no observations.
    pub fn empty() -> Self {
        Self {
            mean: 0.0,
            std_dev: 0.0,
            median: 0.0,
            mad: 0.0,
            q1: 0.0,
            q3: 0.0,
            iqr: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
            sample_count: 0,
        }
    }

    /// Whether enough samples have accumulated for detectors to trust this
    /// baseline.
    pub fn is_valid(&self) -> bool {
        self.sample_count >= MIN_BASELINE_SAMPLES
    }
}
