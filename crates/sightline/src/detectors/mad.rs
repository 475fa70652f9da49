//! MAD detector: modified z-score over median absolute deviation.
//!
//! `M = 0.6745 · (x − median) / MAD`. Median and MAD are both unaffected by
//! heavy tails, making this the detector of choice for noisy, non-normal
//! metrics. Disabled by default in the engine.

use std::sync::Arc;

use tracing::debug;

use crate::anomaly::{AnomalyEvent, AnomalyKind, Severity};
use crate::baseline::{BaselineKey, BaselineManager};
use crate::error::DetectionResult;
use crate::stats;
use crate::telemetry::TelemetryEvent;

use super::{saturating_confidence, Detector, DetectorCounters, DetectorKind, DetectorStats};

/// MAD detector configuration.
#[derive(Debug, Clone)]
pub struct MadConfig {
    /// Modified z-score magnitude above which a value is anomalous.
    pub threshold: f64,
}

impl Default for MadConfig {
    fn default() -> Self {
        Self { threshold: 3.5 }
    }
}

/// Detects single-point outliers against median and MAD. The most robust of
/// the point detectors; a MAD of zero carries no spread information and
/// yields no signal.
pub struct MadDetector {
    config: MadConfig,
    baselines: Arc<BaselineManager>,
    counters: DetectorCounters,
}

impl MadDetector {
    pub fn new(config: MadConfig, baselines: Arc<BaselineManager>) -> Self {
        Self {
            config,
            baselines,
            counters: DetectorCounters::default(),
        }
    }

    /// Grade on |M| relative to the configured threshold.
    fn severity(&self, m_abs: f64) -> Severity {
        if m_abs >= 2.0 * self.config.threshold {
            Severity::Critical
        } else if m_abs >= 1.5 * self.config.threshold {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl Detector for MadDetector {
    fn detect(&self, event: &TelemetryEvent) -> DetectionResult<Option<AnomalyEvent>> {
        self.counters.record_invocation();
        if let Err(e) = event.validate() {
            self.counters.record_error();
            return Err(e);
        }

        let key = BaselineKey::for_event(event);
        let baseline = match self.baselines.get(&key) {
            Some(b) if b.is_valid() => b,
            _ => return Ok(None),
        };
        if baseline.mad <= 0.0 {
            return Ok(None);
        }

        let m = stats::modified_zscore(event.value, baseline.median, baseline.mad);
        if m.abs() <= self.config.threshold {
            return Ok(None);
        }

        let severity = self.severity(m.abs());
        let confidence = saturating_confidence(m.abs(), self.config.threshold);
        let bound =
            baseline.median + m.signum() * self.config.threshold * baseline.mad / 0.6745;
        let description = format!(
            "{} {:.2} has modified z-score {:.2} against median {:.2} (MAD {:.2})",
            event.metric, event.value, m, baseline.median, baseline.mad
        );

        debug!(
            key = %key,
            value = event.value,
            modified_zscore = m,
            %severity,
            "mad anomaly detected"
        );
        self.counters.record_detection();

        let anomaly = AnomalyEvent::new(
            severity,
            AnomalyKind::for_metric(&event.metric),
            self.kind().method(),
            confidence,
            event,
            baseline,
        )
        .with_threshold(bound)
        .with_deviation(m.abs())
        .with_description(description);

        Ok(Some(anomaly))
    }

    fn reset(&self) {
        self.counters.reset();
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Mad
    }

    fn stats(&self) -> DetectorStats {
        self.counters.snapshot()
    }
}
