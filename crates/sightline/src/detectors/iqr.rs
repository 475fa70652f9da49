//! IQR detector: Tukey quartile fences.
//!
//! Bounds are `[Q1 − m·IQR, Q3 + m·IQR]` with m = 1.5 by default. Because
//! quartiles ignore tail magnitude, a single extreme value cannot drag the
//! fences the way it drags mean and standard deviation.

use std::sync::Arc;

use tracing::debug;

use crate::anomaly::{AnomalyEvent, AnomalyKind, Severity};
use crate::baseline::{Baseline, BaselineKey, BaselineManager};
use crate::error::DetectionResult;
use crate::stats;
use crate::telemetry::TelemetryEvent;

use super::{Detector, DetectorCounters, DetectorKind, DetectorStats};

/// IQR detector configuration.
#[derive(Debug, Clone)]
pub struct IqrConfig {
    /// IQR multiple for the fences. 1.5 is Tukey's rule for moderate
    /// outliers; 3.0 flags only extreme ones.
    pub multiplier: f64,
}

impl Default for IqrConfig {
    fn default() -> Self {
        Self { multiplier: 1.5 }
    }
}

/// Detects values outside the quartile fences. Robust to single extreme
/// values in the baseline window.
pub struct IqrDetector {
    config: IqrConfig,
    baselines: Arc<BaselineManager>,
    counters: DetectorCounters,
}

impl IqrDetector {
    pub fn new(config: IqrConfig, baselines: Arc<BaselineManager>) -> Self {
        Self {
            config,
            baselines,
            counters: DetectorCounters::default(),
        }
    }

    /// Grade by distance from the nearer quartile, symmetric on both sides:
    /// beyond 3·IQR → Critical, beyond 1.5× the configured multiple → High,
    /// beyond the fence → Medium.
    fn severity(&self, excess: f64, baseline: &Baseline) -> Severity {
        if excess > 3.0 * baseline.iqr {
            Severity::Critical
        } else if excess > 1.5 * self.config.multiplier * baseline.iqr {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Confidence grows with the exceedance measured in IQR units.
    fn confidence(&self, excess: f64, baseline: &Baseline) -> f64 {
        let beyond_fence = (excess - self.config.multiplier * baseline.iqr) / baseline.iqr;
        (0.7 + beyond_fence.min(3.0) * 0.1).clamp(0.7, 0.99)
    }
}

impl Detector for IqrDetector {
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
        if baseline.iqr <= 0.0 {
            // all mass in one point, the fences carry no information
            return Ok(None);
        }

        if !stats::is_iqr_outlier(
            event.value,
            baseline.q1,
            baseline.q3,
            baseline.iqr,
            self.config.multiplier,
        ) {
            return Ok(None);
        }

        let lower = baseline.q1 - self.config.multiplier * baseline.iqr;
        let upper = baseline.q3 + self.config.multiplier * baseline.iqr;
        // distance from the nearer quartile; > multiplier·IQR by construction
        let (excess, bound) = if event.value > upper {
            (event.value - baseline.q3, upper)
        } else {
            (baseline.q1 - event.value, lower)
        };

        let severity = self.severity(excess, &baseline);
        let confidence = self.confidence(excess, &baseline);
        let description = format!(
            "{} {:.2} outside quartile fences [{:.2}, {:.2}] (IQR {:.2})",
            event.metric, event.value, lower, upper, baseline.iqr
        );

        debug!(
            key = %key,
            value = event.value,
            lower,
            upper,
            %severity,
            "iqr anomaly detected"
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
        .with_description(description);

        Ok(Some(anomaly))
    }

    fn reset(&self) {
        self.counters.reset();
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Iqr
    }

    fn stats(&self) -> DetectorStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::DetectionMethod;

    fn manager_with(values: &[f64]) -> Arc<BaselineManager> {
        let manager = Arc::new(BaselineManager::new(100).unwrap());
        let key = BaselineKey::latency("svc".into(), "gpt-4".into());
        for &v in values {
            manager.update(key.clone(), v).unwrap();
        }
        manager
    }

    fn ramp() -> Vec<f64> {
        (1..=20).map(|i| i as f64 * 10.0).collect()
    }

    #[test]
    fn value_inside_fences_passes() {
        let detector = IqrDetector::new(IqrConfig::default(), manager_with(&ramp()));
        let event = TelemetryEvent::latency("svc", "gpt-4", 100.0);
        assert!(detector.detect(&event).unwrap().is_none());
    }

    #[test]
    fn extreme_value_fires() {
        let detector = IqrDetector::new(IqrConfig::default(), manager_with(&ramp()));
        let event = TelemetryEvent::latency("svc", "gpt-4", 800.0);

        let anomaly = detector.detect(&event).unwrap().expect("should fire");
        assert_eq!(anomaly.method, DetectionMethod::Iqr);
        assert!(anomaly.confidence >= 0.7);
        assert_eq!(anomaly.kind, AnomalyKind::LatencySpike);
    }

    #[test]
    fn fires_below_the_lower_fence() {
        let detector = IqrDetector::new(IqrConfig::default(), manager_with(&ramp()));
        let event = TelemetryEvent::latency("svc", "gpt-4", -500.0);

        let anomaly = detector.detect(&event).unwrap().expect("should fire");
        assert!(anomaly.threshold < 0.0, "reported bound should be the lower fence");
        assert_eq!(anomaly.severity, Severity::Critical);
    }

    #[test]
    fn fences_are_robust_to_an_outlier_in_the_window() {
        // Seed 1..=5 plus a wild 100 (padded to reach the validity floor):
        // the fences barely move, so a fresh 100 is still flagged Critical.
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0, 1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let detector = IqrDetector::new(IqrConfig::default(), manager_with(&samples));

        let event = TelemetryEvent::latency("svc", "gpt-4", 100.0);
        let anomaly = detector.detect(&event).unwrap().expect("should fire");
        assert_eq!(anomaly.severity, Severity::Critical);
    }

    #[test]
    fn severity_escalates_with_distance() {
        // ramp(): q1 = 57.5, q3 = 152.5, iqr = 95
        let detector = IqrDetector::new(IqrConfig::default(), manager_with(&ramp()));

        // just past the fence: excess (value − q3) in (142.5, 213.75]
        let medium = TelemetryEvent::latency("svc", "gpt-4", 300.0);
        assert_eq!(detector.detect(&medium).unwrap().unwrap().severity, Severity::Medium);

        // excess in (213.75, 285]
        let high = TelemetryEvent::latency("svc", "gpt-4", 380.0);
        assert_eq!(detector.detect(&high).unwrap().unwrap().severity, Severity::High);

        // excess > 285
        let critical = TelemetryEvent::latency("svc", "gpt-4", 500.0);
        assert_eq!(detector.detect(&critical).unwrap().unwrap().severity, Severity::Critical);
    }

    #[test]
    fn degenerate_window_carries_no_signal() {
        let samples = [7.0; 12];
        let detector = IqrDetector::new(IqrConfig::default(), manager_with(&samples));
        let event = TelemetryEvent::latency("svc", "gpt-4", 1000.0);
        assert!(detector.detect(&event).unwrap().is_none());
    }

    #[test]
    fn abstains_without_valid_baseline() {
        let manager = Arc::new(BaselineManager::new(10).unwrap());
        let detector = IqrDetector::new(IqrConfig::default(), manager);
        let event = TelemetryEvent::latency("svc", "gpt-4", 1000.0);
        assert!(detector.detect(&event).unwrap().is_none());
    }
}
