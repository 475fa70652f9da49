//! Detection engine: runs the enabled detectors against shared baselines.
//!
//! Each call is a complete, independent transaction against shared state —
//! there is no session concept. `process` is detect-then-learn, so a value
//! can never mask itself by entering the baseline before it is judged.
//! Everything is synchronous and takes `&self`: workers on a thread pool
//! call straight in, per-key serialization happens inside the baseline
//! manager and the CUSUM state map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::anomaly::AnomalyEvent;
use crate::baseline::{BaselineKey, BaselineManager, DEFAULT_WINDOW_SIZE};
use crate::detectors::{
    CusumConfig, CusumDetector, Detector, DetectorStats, IqrConfig, IqrDetector, MadConfig,
    MadDetector, ZScoreConfig, ZScoreDetector,
};
use crate::error::{DetectionError, DetectionResult};
use crate::telemetry::TelemetryEvent;

// ── Configuration ───────────────────────────────────────────────────────

/// Engine configuration. The defaults are usable unconfigured: Z-Score, IQR
/// and CUSUM on, MAD off (largely redundant next to Z-Score and IQR on
/// well-behaved metrics), 1000-sample windows, continuous learning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub enable_zscore: bool,
    pub zscore: ZScoreConfig,

    pub enable_iqr: bool,
    pub iqr: IqrConfig,

    pub enable_mad: bool,
    pub mad: MadConfig,

    pub enable_cusum: bool,
    pub cusum: CusumConfig,

    /// Rolling-window capacity per key.
    pub baseline_window_size: usize,

    /// Whether baselines (and CUSUM accumulators) keep absorbing new
    /// observations after initial seeding.
    pub continuous_learning: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_zscore: true,
            zscore: ZScoreConfig::default(),
            enable_iqr: true,
            iqr: IqrConfig::default(),
            enable_mad: false,
            mad: MadConfig::default(),
            enable_cusum: true,
            cusum: CusumConfig::default(),
            baseline_window_size: DEFAULT_WINDOW_SIZE,
            continuous_learning: true,
        }
    }
}

impl EngineConfig {
    /// Reject configurations that could never work. Construction-time only.
    fn validate(&self) -> DetectionResult<()> {
        if self.zscore.threshold <= 0.0 {
            return Err(DetectionError::config(format!(
                "z-score threshold must be positive, got {}",
                self.zscore.threshold
            )));
        }
        if self.iqr.multiplier <= 0.0 {
            return Err(DetectionError::config(format!(
                "iqr multiplier must be positive, got {}",
                self.iqr.multiplier
            )));
        }
        if self.mad.threshold <= 0.0 {
            return Err(DetectionError::config(format!(
                "mad threshold must be positive, got {}",
                self.mad.threshold
            )));
        }
        if self.cusum.threshold <= 0.0 {
            return Err(DetectionError::config(format!(
                "cusum threshold must be positive, got {}",
                self.cusum.threshold
            )));
        }
        if self.cusum.slack < 0.0 {
            return Err(DetectionError::config(format!(
                "cusum slack must not be negative, got {}",
                self.cusum.slack
            )));
        }
        if !(self.enable_zscore || self.enable_iqr || self.enable_mad || self.enable_cusum) {
            return Err(DetectionError::config("no detectors enabled"));
        }
        Ok(())
    }
}

// ── Statistics ──────────────────────────────────────────────────────────

/// Point-in-time snapshot of engine counters.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Events that entered `detect`/`process`.
    pub events_processed: u64,
    /// Anomalies returned.
    pub anomalies_detected: u64,
    /// Detector failures and deadline skips.
    pub detection_errors: u64,
    /// `anomalies_detected / events_processed`, 0 when idle.
    pub detection_rate: f64,
    /// Per-detector snapshots, in declared order.
    pub detector_stats: Vec<(String, DetectorStats)>,
}

#[derive(Debug, Default)]
struct EngineCounters {
    events_processed: AtomicU64,
    anomalies_detected: AtomicU64,
    detection_errors: AtomicU64,
}

impl EngineCounters {
    fn reset(&self) {
        self.events_processed.store(0, Ordering::Relaxed);
        self.anomalies_detected.store(0, Ordering::Relaxed);
        self.detection_errors.store(0, Ordering::Relaxed);
    }
}

// ── Engine ──────────────────────────────────────────────────────────────

/// Orchestrates the enabled detectors over one baseline manager.
///
/// Detectors run in declared order (z-score, IQR, MAD, CUSUM) and the first
/// to fire wins. One detector's failure is counted and logged, never
/// propagated: the remaining detectors still run.
pub struct DetectionEngine {
    config: EngineConfig,
    baselines: Arc<BaselineManager>,
    detectors: Vec<Box<dyn Detector>>,
    counters: EngineCounters,
}

impl DetectionEngine {
    /// Build an engine from configuration. Fails only on configuration the
    /// engine could never run with.
    pub fn new(config: EngineConfig) -> DetectionResult<Self> {
        config.validate()?;

        let baselines = Arc::new(BaselineManager::new(config.baseline_window_size)?);
        let mut detectors: Vec<Box<dyn Detector>> = Vec::new();

        if config.enable_zscore {
            detectors.push(Box::new(ZScoreDetector::new(
                config.zscore.clone(),
                Arc::clone(&baselines),
            )));
        }
        if config.enable_iqr {
            detectors.push(Box::new(IqrDetector::new(
                config.iqr.clone(),
                Arc::clone(&baselines),
            )));
        }
        if config.enable_mad {
            detectors.push(Box::new(MadDetector::new(
                config.mad.clone(),
                Arc::clone(&baselines),
            )));
        }
        if config.enable_cusum {
            detectors.push(Box::new(CusumDetector::new(
                config.cusum.clone(),
                Arc::clone(&baselines),
            )));
        }

        let names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        info!(detectors = ?names, window = config.baseline_window_size, "detection engine created");

        Ok(Self {
            config,
            baselines,
            detectors,
            counters: EngineCounters::default(),
        })
    }

    /// Engine with default configuration.
    pub fn with_defaults() -> Self {
        // the default configuration is valid by construction
        Self::new(EngineConfig::default()).expect("default engine config is valid")
    }

    /// Classify an event against the current baselines.
    ///
    /// Returns the first anomaly found in declared detector order, `None`
    /// when nothing fires, and an error only for malformed input.
    pub fn detect(&self, event: &TelemetryEvent) -> DetectionResult<Option<AnomalyEvent>> {
        self.detect_inner(event, None)
    }

    /// Like [`detect`](Self::detect), but detectors not yet started when the
    /// deadline passes are skipped and counted like failures. Never blocks
    /// or fails the whole call because of the deadline.
    pub fn detect_with_deadline(
        &self,
        event: &TelemetryEvent,
        timeout: Duration,
    ) -> DetectionResult<Option<AnomalyEvent>> {
        self.detect_inner(event, Some(timeout))
    }

    fn detect_inner(
        &self,
        event: &TelemetryEvent,
        timeout: Option<Duration>,
    ) -> DetectionResult<Option<AnomalyEvent>> {
        self.counters.events_processed.fetch_add(1, Ordering::Relaxed);
        event.validate()?;

        debug!(
            event_id = %event.event_id,
            service = %event.service,
            model = %event.model,
            metric = %event.metric,
            "running anomaly detection"
        );
        let start = Instant::now();

        for detector in &self.detectors {
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    warn!(
                        event_id = %event.event_id,
                        detector = detector.name(),
                        "detection deadline exceeded, skipping remaining detectors"
                    );
                    self.counters.detection_errors.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(
                        "sightline_detection_errors_total",
                        "detector" => detector.name()
                    )
                    .increment(1);
                    break;
                }
            }

            match detector.detect(event) {
                Ok(Some(anomaly)) => {
                    let elapsed = start.elapsed();
                    self.counters.anomalies_detected.fetch_add(1, Ordering::Relaxed);

                    info!(
                        event_id = %event.event_id,
                        detector = detector.name(),
                        kind = %anomaly.kind,
                        severity = %anomaly.severity,
                        confidence = anomaly.confidence,
                        detection_us = elapsed.as_micros() as u64,
                        "anomaly detected"
                    );
                    metrics::counter!(
                        "sightline_anomalies_detected_total",
                        "detector" => detector.name(),
                        "kind" => anomaly.kind.to_string(),
                        "severity" => anomaly.severity.to_string()
                    )
                    .increment(1);
                    metrics::histogram!(
                        "sightline_detection_duration_seconds",
                        "detector" => detector.name()
                    )
                    .record(elapsed.as_secs_f64());

                    return Ok(Some(anomaly));
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        event_id = %event.event_id,
                        detector = detector.name(),
                        error = %e,
                        "detector failed, continuing with remaining detectors"
                    );
                    self.counters.detection_errors.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(
                        "sightline_detection_errors_total",
                        "detector" => detector.name()
                    )
                    .increment(1);
                    continue;
                }
            }
        }

        metrics::histogram!("sightline_detection_duration_seconds", "detector" => "all")
            .record(start.elapsed().as_secs_f64());
        Ok(None)
    }

    /// Fold an event into the baselines and detector-private state.
    ///
    /// A no-op unless continuous learning is enabled: frozen baselines stay
    /// exactly as seeded.
    pub fn update(&self, event: &TelemetryEvent) -> DetectionResult<()> {
        if !self.config.continuous_learning {
            return Ok(());
        }
        event.validate()?;

        // the engine is the single writer into the shared baselines; a
        // detector's update only touches its private state
        self.baselines
            .update(BaselineKey::for_event(event), event.value)?;

        for detector in &self.detectors {
            if let Err(e) = detector.update(event) {
                warn!(
                    detector = detector.name(),
                    error = %e,
                    "detector update failed"
                );
            }
        }
        Ok(())
    }

    /// Detect then learn, as one logical unit per event. Detection always
    /// sees the baseline as it was before this event.
    pub fn process(&self, event: &TelemetryEvent) -> DetectionResult<Option<AnomalyEvent>> {
        let anomaly = self.detect(event)?;
        self.update(event)?;
        Ok(anomaly)
    }

    /// Snapshot of engine and per-detector counters.
    pub fn stats(&self) -> EngineStats {
        let events_processed = self.counters.events_processed.load(Ordering::Relaxed);
        let anomalies_detected = self.counters.anomalies_detected.load(Ordering::Relaxed);
        let detection_rate = if events_processed == 0 {
            0.0
        } else {
            anomalies_detected as f64 / events_processed as f64
        };

        EngineStats {
            events_processed,
            anomalies_detected,
            detection_errors: self.counters.detection_errors.load(Ordering::Relaxed),
            detection_rate,
            detector_stats: self
                .detectors
                .iter()
                .map(|d| (d.name().to_string(), d.stats()))
                .collect(),
        }
    }

    /// Full cold start: clears all baselines, detector-private state, and
    /// every counter.
    pub fn reset(&self) {
        info!("resetting detection engine");
        self.baselines.clear_all();
        for detector in &self.detectors {
            detector.reset();
        }
        self.counters.reset();
    }

    /// The shared baseline manager, for seeding and gauge export.
    pub fn baseline_manager(&self) -> &Arc<BaselineManager> {
        &self.baselines
    }

    /// Number of enabled detectors.
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Names of the enabled detectors, in declared order.
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
