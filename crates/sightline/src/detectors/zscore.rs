//! Z-Score detector: flags values far from the baseline mean in
//! standard-deviation units.
//!
//! Formula: `z = (x − μ) / σ`. Threshold interpretation for normal data:
//! 2σ keeps ~95% of values inside, 3σ ~99.7%, 4σ ~99.99%.

use std::sync::Arc;

use tracing::debug;

use crate::anomaly::{AnomalyEvent, AnomalyKind, Severity};
use crate::baseline::{BaselineKey, BaselineManager};
use crate::error::DetectionResult;
use crate::stats;
use crate::telemetry::TelemetryEvent;

use super::{saturating_confidence, Detector, DetectorCounters, DetectorKind, DetectorStats};

/// Z-Score detector configuration.
#[derive(Debug, Clone)]
pub struct ZScoreConfig {
    /// σ multiple above which a value is anomalous.
    pub threshold: f64,
}

impl Default for ZScoreConfig {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

/// Detects single-point outliers against the baseline mean and standard
/// deviation. A degenerate baseline (σ = 0) or a missing/invalid baseline
/// yields no signal.
pub struct ZScoreDetector {
    config: ZScoreConfig,
    baselines: Arc<BaselineManager>,
    counters: DetectorCounters,
}

impl ZScoreDetector {
    pub fn new(config: ZScoreConfig, baselines: Arc<BaselineManager>) -> Self {
        Self {
            config,
            baselines,
            counters: DetectorCounters::default(),
        }
    }

    /// Severity tiers are fixed in σ units regardless of the configured
    /// threshold; Low is only reachable when the caller widened it below 3.
    fn severity(z_abs: f64) -> Severity {
        if z_abs >= 6.0 {
            Severity::Critical
        } else if z_abs >= 4.0 {
            Severity::High
        } else if z_abs >= 3.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Detector for ZScoreDetector {
    fn detect(&self, event: &TelemetryEvent) -> DetectionResult<Option<AnomalyEvent>> {
        self.counters.record_invocation();
        if let Err(e) = event.validate() {
            self.counters.record_error();
            return Err(e);
        }

        let key = BaselineKey::for_event(event);
        let baseline = match self.baselines.get(&key) {
            Some(b) if b.is_valid() => b,
            _ => {
                debug!(key = %key, "no valid baseline, abstaining");
                return Ok(None);
            }
        };

        let z = stats::zscore(event.value, baseline.mean, baseline.std_dev);
        if z.abs() <= self.config.threshold {
            return Ok(None);
        }

        let severity = Self::severity(z.abs());
        let confidence = saturating_confidence(z.abs(), self.config.threshold);
        let bound = baseline.mean + z.signum() * self.config.threshold * baseline.std_dev;
        let description = format!(
            "{} {:.2} is {:.2} standard deviations from baseline mean {:.2}",
            event.metric, event.value, z, baseline.mean
        );

        debug!(
            key = %key,
            value = event.value,
            z_score = z,
            %severity,
            "z-score anomaly detected"
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
        .with_deviation(z.abs())
        .with_description(description);

        Ok(Some(anomaly))
    }

    fn reset(&self) {
        self.counters.reset();
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::ZScore
    }

    fn stats(&self) -> DetectorStats {
        self.counters.snapshot()
    }
}
