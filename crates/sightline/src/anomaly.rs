//! Anomaly output model.
//!
//! An [`AnomalyEvent`] is the record handed to an alerting or storage
//! collaborator when a detector fires. "No anomaly" is represented by the
//! absence of an event, never by an error. The core keeps no history of
//! emitted anomalies beyond aggregate counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baseline::Baseline;
use crate::telemetry::{ModelId, ServiceId, TelemetryEvent};

// ── Severity ────────────────────────────────────────────────────────────

/// Coarse ranking of an anomaly's significance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

// ── Anomaly kind ────────────────────────────────────────────────────────

/// What kind of misbehavior the anomaly represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Latency far outside its recent distribution.
    LatencySpike,
    /// Token usage far outside its recent distribution.
    TokenUsageSpike,
    /// Cost far outside its recent distribution.
    CostAnomaly,
    /// Error rate far outside its recent distribution.
    ErrorRateIncrease,
    /// Sustained shift of the metric's level (CUSUM-style).
    Drift,
    /// Outlier on a metric without a more specific classification.
    Outlier,
}

impl AnomalyKind {
    /// Classify a single-point outlier by metric name.
    pub fn for_metric(metric: &str) -> Self {
        if metric.contains("latency") {
            AnomalyKind::LatencySpike
        } else if metric.contains("token") {
            AnomalyKind::TokenUsageSpike
        } else if metric.contains("cost") {
            AnomalyKind::CostAnomaly
        } else if metric.contains("error") {
            AnomalyKind::ErrorRateIncrease
        } else {
            AnomalyKind::Outlier
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::LatencySpike => write!(f, "latency_spike"),
            AnomalyKind::TokenUsageSpike => write!(f, "token_usage_spike"),
            AnomalyKind::CostAnomaly => write!(f, "cost_anomaly"),
            AnomalyKind::ErrorRateIncrease => write!(f, "error_rate_increase"),
            AnomalyKind::Drift => write!(f, "drift"),
            AnomalyKind::Outlier => write!(f, "outlier"),
        }
    }
}

// ── Detection method ────────────────────────────────────────────────────

/// Which detector produced the anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ZScore,
    Iqr,
    Mad,
    Cusum,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::ZScore => write!(f, "z_score"),
            DetectionMethod::Iqr => write!(f, "iqr"),
            DetectionMethod::Mad => write!(f, "mad"),
            DetectionMethod::Cusum => write!(f, "cusum"),
        }
    }
}

// ── Anomaly event ───────────────────────────────────────────────────────

/// A detected anomaly, carrying the baseline snapshot the decision used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Unique anomaly identifier.
    pub anomaly_id: Uuid,
    /// Detection timestamp.
    pub timestamp: DateTime<Utc>,
    /// Severity ranking.
    pub severity: Severity,
    /// Anomaly classification.
    pub kind: AnomalyKind,
    /// Affected service.
    pub service: ServiceId,
    /// Affected model.
    pub model: ModelId,
    /// Metric the anomaly was observed on.
    pub metric: String,
    /// Detector that fired.
    pub method: DetectionMethod,
    /// Confidence that the value is truly anomalous, in [0.0, 0.99].
    pub confidence: f64,
    /// Observed value.
    pub value: f64,
    /// Threshold the decision statistic exceeded: metric units for the
    /// point detectors, accumulator units for CUSUM.
    pub threshold: f64,
    /// Deviation measure where applicable (sigma distance for Z-Score,
    /// modified z-score for MAD, accumulator level for CUSUM).
    pub deviation: Option<f64>,
    /// The baseline snapshot the decision was made against.
    pub baseline: Baseline,
    /// Human-readable account of what fired and why.
    pub description: String,
}

impl AnomalyEvent {
    /// Create an anomaly for a telemetry event. Confidence is clamped into
    /// the contract range [0.0, 0.99].
    pub fn new(
        severity: Severity,
        kind: AnomalyKind,
        method: DetectionMethod,
        confidence: f64,
        event: &TelemetryEvent,
        baseline: Baseline,
    ) -> Self {
        Self {
            anomaly_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            kind,
            service: event.service.clone(),
            model: event.model.clone(),
            metric: event.metric.clone(),
            method,
            confidence: confidence.clamp(0.0, 0.99),
            value: event.value,
            threshold: 0.0,
            deviation: None,
            baseline,
            description: String::new(),
        }
    }

    /// Set the exceeded threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the deviation measure.
    pub fn with_deviation(mut self, deviation: f64) -> Self {
        self.deviation = Some(deviation);
        self
    }

    /// Set the human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
