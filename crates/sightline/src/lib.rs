//! # sightline
//!
//! Statistical anomaly detection for streaming LLM telemetry.
//!
//! The crate is the detection core of a telemetry-monitoring system: it
//! consumes normalized [`TelemetryEvent`] records keyed by
//! (service, model, metric) and produces [`AnomalyEvent`] records, or
//! nothing. Transport, alert delivery, storage and dashboards are external
//! collaborators.
//!
//! ## Architecture
//!
//! ```text
//!   TelemetryEvent
//!       │
//!       ▼
//!   ┌──────────────────┐   read    ┌──────────────────────────┐
//!   │ DetectionEngine  │◄──────────│ BaselineManager          │
//!   │  ├─ ZScore       │           │  DashMap<BaselineKey,    │
//!   │  ├─ IQR          │           │    (RollingWindow,       │
//!   │  ├─ MAD (opt)    │           │     Baseline)>           │
//!   │  └─ CUSUM        │──────────►│                          │
//!   └────────┬─────────┘   learn   └──────────────────────────┘
//!            │ first detector to fire, in declared order
//!            ▼
//!   Option<AnomalyEvent>
//! ```
//!
//! `process` = detect then learn, so a value is always judged against the
//! baseline as it stood *before* that value arrived — an anomalous sample
//! cannot mask itself.
//!
//! ## Quick start
//!
//! ```rust
//! use sightline::{DetectionEngine, TelemetryEvent};
//!
//! let engine = DetectionEngine::with_defaults();
//!
//! // seed a baseline, then watch for outliers
//! for _ in 0..5 {
//!     engine.process(&TelemetryEvent::latency("chat-api", "gpt-4", 95.0)).unwrap();
//!     engine.process(&TelemetryEvent::latency("chat-api", "gpt-4", 105.0)).unwrap();
//! }
//!
//! let spike = TelemetryEvent::latency("chat-api", "gpt-4", 2500.0);
//! let anomaly = engine.process(&spike).unwrap().expect("spike should be flagged");
//! assert_eq!(anomaly.metric, "latency_ms");
//! ```
//!
//! ## Concurrency
//!
//! All engine methods take `&self` and are safe to call from a worker pool.
//! Per-key state is sharded (different keys never contend on one lock) and
//! counters are lock-free atomics. There are no suspension points; the
//! work is in-memory and CPU-bound.

#![deny(unsafe_code)]

pub mod anomaly;
pub mod baseline;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod stats;
pub mod telemetry;

// ── Re-exports ──────────────────────────────────────────────────────────

pub use anomaly::{AnomalyEvent, AnomalyKind, DetectionMethod, Severity};
pub use baseline::{
    Baseline, BaselineKey, BaselineManager, BaselineManagerStats, DEFAULT_WINDOW_SIZE,
    MIN_BASELINE_SAMPLES,
};
pub use detectors::{
    CusumConfig, CusumDetector, Detector, DetectorKind, DetectorStats, IqrConfig, IqrDetector,
    MadConfig, MadDetector, ZScoreConfig, ZScoreDetector,
};
pub use engine::{DetectionEngine, EngineConfig, EngineStats};
pub use error::{DetectionError, DetectionResult};
pub use stats::RollingWindow;
pub use telemetry::{
    ModelId, ServiceId, TelemetryEvent, METRIC_COST_USD, METRIC_ERROR_RATE, METRIC_LATENCY_MS,
    METRIC_TOTAL_TOKENS,
};
