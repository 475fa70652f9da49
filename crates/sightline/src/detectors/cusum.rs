//! CUSUM detector: cumulative-sum control chart for sustained drift.
//!
//! Maintains two per-key accumulators over the standardized deviation
//! `d = (x − μ)/σ`, with μ and σ taken from the key's baseline:
//!
//! ```text
//! S_high = max(0, S_high + (d − k))
//! S_low  = min(0, S_low  + (d + k))
//! anomaly iff S_high > h  OR  |S_low| > h
//! ```
//!
//! A single spike smaller than the slack `k` never accumulates and larger
//! transients decay; a sustained systematic offset crosses the threshold
//! after roughly `h / ε` samples of `k + ε` offset. The accumulators are
//! detector-owned state, independent of the baseline manager's windows.
//!
//! `detect` evaluates the rule with the current value transiently and leaves
//! the stored accumulators alone; `update` persists the step and re-arms an
//! accumulator that crossed the threshold. The engine therefore keeps the
//! detect-then-learn transaction shape for drift exactly as for baselines.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::anomaly::{AnomalyEvent, AnomalyKind, Severity};
use crate::baseline::{BaselineKey, BaselineManager};
use crate::error::DetectionResult;
use crate::telemetry::TelemetryEvent;

use super::{saturating_confidence, Detector, DetectorCounters, DetectorKind, DetectorStats};

/// CUSUM detector configuration. Both parameters are in standardized
/// (σ-distance) units.
#[derive(Debug, Clone)]
pub struct CusumConfig {
    /// Accumulator level above which drift is reported.
    pub threshold: f64,
    /// Allowable per-sample deviation before anything accumulates.
    pub slack: f64,
}

impl Default for CusumConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            slack: 0.5,
        }
    }
}

/// Per-key accumulator pair.
#[derive(Debug, Clone, Copy, Default)]
struct CusumState {
    s_high: f64,
    s_low: f64,
}

/// Detects sustained shifts of a metric's level rather than single spikes.
pub struct CusumDetector {
    config: CusumConfig,
    baselines: Arc<BaselineManager>,
    states: DashMap<BaselineKey, CusumState>,
    counters: DetectorCounters,
}

impl CusumDetector {
    pub fn new(config: CusumConfig, baselines: Arc<BaselineManager>) -> Self {
        Self {
            config,
            baselines,
            states: DashMap::new(),
            counters: DetectorCounters::default(),
        }
    }

    /// Standardized deviation of a value for a key, if the key has a usable
    /// reference level.
    fn standardized(&self, key: &BaselineKey, value: f64) -> Option<f64> {
        let baseline = self.baselines.get(key)?;
        if !baseline.is_valid() || baseline.std_dev <= 0.0 {
            return None;
        }
        Some((value - baseline.mean) / baseline.std_dev)
    }

    fn severity(&self, level: f64) -> Severity {
        if level > 2.0 * self.config.threshold {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Stored accumulators for a key.
    #[cfg(test)]
    fn accumulators(&self, key: &BaselineKey) -> Option<(f64, f64)> {
        self.states.get(key).map(|s| (s.s_high, s.s_low))
    }
}

impl Detector for CusumDetector {
    fn detect(&self, event: &TelemetryEvent) -> DetectionResult<Option<AnomalyEvent>> {
        self.counters.record_invocation();
        if let Err(e) = event.validate() {
            self.counters.record_error();
            return Err(e);
        }

        let key = BaselineKey::for_event(event);
        let Some(d) = self.standardized(&key, event.value) else {
            return Ok(None);
        };

        let state = self
            .states
            .get(&key)
            .map(|s| *s)
            .unwrap_or_default();
        let candidate_high = (state.s_high + d - self.config.slack).max(0.0);
        let candidate_low = (state.s_low + d + self.config.slack).min(0.0);

        let level = candidate_high.max(candidate_low.abs());
        if level <= self.config.threshold {
            return Ok(None);
        }

        let direction = if candidate_high > self.config.threshold {
            "upward"
        } else {
            "downward"
        };
        let severity = self.severity(level);
        let confidence = saturating_confidence(level, self.config.threshold);
        let description = format!(
            "sustained {} drift on {}: cumulative deviation {:.2} over threshold {:.2}",
            direction, event.metric, level, self.config.threshold
        );

        // the key may have been cleared since standardized() read it
        let Some(baseline) = self.baselines.get(&key) else {
            return Ok(None);
        };

        debug!(
            key = %key,
            value = event.value,
            s_high = candidate_high,
            s_low = candidate_low,
            %severity,
            "cusum drift detected"
        );
        self.counters.record_detection();

        let anomaly = AnomalyEvent::new(
            severity,
            AnomalyKind::Drift,
            self.kind().method(),
            confidence,
            event,
            baseline,
        )
        .with_threshold(self.config.threshold)
        .with_deviation(level)
        .with_description(description);

        Ok(Some(anomaly))
    }

    fn update(&self, event: &TelemetryEvent) -> DetectionResult<()> {
        if let Err(e) = event.validate() {
            self.counters.record_error();
            return Err(e);
        }

        let key = BaselineKey::for_event(event);
        let Some(d) = self.standardized(&key, event.value) else {
            // no reference level yet, nothing to accumulate against
            return Ok(());
        };

        let mut state = self.states.entry(key).or_default();
        state.s_high = (state.s_high + d - self.config.slack).max(0.0);
        state.s_low = (state.s_low + d + self.config.slack).min(0.0);

        // re-arm after a crossing so the next drift episode starts clean
        if state.s_high > self.config.threshold {
            state.s_high = 0.0;
        }
        if state.s_low.abs() > self.config.threshold {
            state.s_low = 0.0;
        }

        Ok(())
    }

    fn reset(&self) {
        self.states.clear();
        self.counters.reset();
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Cusum
    }

    fn stats(&self) -> DetectorStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::DetectionMethod;

    /// Manager seeded so the latency baseline has mean 100, population σ 10,
    /// frozen for the rest of the test (the manager is only written here).
    fn seeded_manager() -> Arc<BaselineManager> {
        let manager = Arc::new(BaselineManager::new(100).unwrap());
        let key = latency_key();
        for _ in 0..5 {
            manager.update(key.clone(), 90.0).unwrap();
            manager.update(key.clone(), 110.0).unwrap();
        }
        manager
    }

    fn latency_key() -> BaselineKey {
        BaselineKey::latency("svc".into(), "gpt-4".into())
    }

    fn event(value: f64) -> TelemetryEvent {
        TelemetryEvent::latency("svc", "gpt-4", value)
    }

    #[test]
    fn abstains_without_baseline() {
        let manager = Arc::new(BaselineManager::new(10).unwrap());
        let detector = CusumDetector::new(CusumConfig::default(), manager);
        assert!(detector.detect(&event(1000.0)).unwrap().is_none());
        detector.update(&event(1000.0)).unwrap();
        assert!(detector.accumulators(&latency_key()).is_none());
    }

    #[test]
    fn sub_slack_spike_never_accumulates() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        // 0.4σ offset is below the 0.5σ slack
        for _ in 0..100 {
            assert!(detector.detect(&event(104.0)).unwrap().is_none());
            detector.update(&event(104.0)).unwrap();
        }
        let (s_high, s_low) = detector.accumulators(&latency_key()).unwrap();
        assert_eq!(s_high, 0.0);
        assert_eq!(s_low, 0.0);
    }

    #[test]
    fn single_large_transient_decays() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        // one 3σ spike: accumulates 2.5, below the threshold of 5
        assert!(detector.detect(&event(130.0)).unwrap().is_none());
        detector.update(&event(130.0)).unwrap();
        let (s_high, _) = detector.accumulators(&latency_key()).unwrap();
        assert!((s_high - 2.5).abs() < 1e-9);

        // back to normal: each on-mean sample decays the accumulator by k
        for _ in 0..5 {
            detector.update(&event(100.0)).unwrap();
        }
        let (s_high, _) = detector.accumulators(&latency_key()).unwrap();
        assert_eq!(s_high, 0.0);
    }

    #[test]
    fn sustained_upward_offset_triggers_at_ceil_h_over_epsilon() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        // offset k + ε with ε = 0.3σ: value 108. ⌈h/ε⌉ = ⌈5/0.3⌉ = 17.
        let drifting = event(108.0);
        for i in 1..17 {
            assert!(
                detector.detect(&drifting).unwrap().is_none(),
                "fired early at sample {}",
                i
            );
            detector.update(&drifting).unwrap();
        }

        let anomaly = detector.detect(&drifting).unwrap().expect("should fire at sample 17");
        assert_eq!(anomaly.method, DetectionMethod::Cusum);
        assert_eq!(anomaly.kind, AnomalyKind::Drift);
        assert!(anomaly.description.contains("upward"));
    }

    #[test]
    fn sustained_downward_offset_triggers() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        let drifting = event(92.0); // −0.8σ per sample
        let mut fired = None;
        for i in 1..=30 {
            if let Some(anomaly) = detector.detect(&drifting).unwrap() {
                fired = Some((i, anomaly));
                break;
            }
            detector.update(&drifting).unwrap();
        }
        let (at, anomaly) = fired.expect("downward drift should fire");
        assert_eq!(at, 17);
        assert!(anomaly.description.contains("downward"));
    }

    #[test]
    fn update_rearms_after_crossing() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        let drifting = event(108.0);
        for _ in 0..17 {
            detector.update(&drifting).unwrap();
        }
        // the 17th update pushed the accumulator past h and re-armed it
        let (s_high, _) = detector.accumulators(&latency_key()).unwrap();
        assert_eq!(s_high, 0.0);
    }

    #[test]
    fn detect_does_not_mutate_stored_state() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        detector.update(&event(108.0)).unwrap();
        let before = detector.accumulators(&latency_key()).unwrap();
        for _ in 0..10 {
            detector.detect(&event(200.0)).unwrap();
        }
        let after = detector.accumulators(&latency_key()).unwrap();
        assert_eq!(before.0, after.0);
        assert_eq!(before.1, after.1);
    }

    #[test]
    fn replay_is_deterministic() {
        let run = || {
            let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());
            for i in 0..50u32 {
                let value = 100.0 + (i % 7) as f64;
                detector.update(&event(value)).unwrap();
            }
            detector.accumulators(&latency_key()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn reset_zeroes_accumulators_and_counters() {
        let detector = CusumDetector::new(CusumConfig::default(), seeded_manager());

        detector.update(&event(108.0)).unwrap();
        detector.detect(&event(108.0)).unwrap();
        assert!(detector.accumulators(&latency_key()).is_some());

        detector.reset();
        assert!(detector.accumulators(&latency_key()).is_none());
        assert_eq!(detector.stats().invocations, 0);
    }
}
