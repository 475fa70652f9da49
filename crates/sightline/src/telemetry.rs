//! Telemetry input model.
//!
//! A [`TelemetryEvent`] is the normalized record handed to the detection core
//! by an ingestion collaborator: one numeric observation of one metric for
//! one (service, model) pair. Events are transient: consumed by the engine,
//! never stored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DetectionError, DetectionResult};

// ── Well-known metric names ─────────────────────────────────────────────

/// Request latency in milliseconds.
pub const METRIC_LATENCY_MS: &str = "latency_ms";
/// Total tokens (prompt + completion) per request.
pub const METRIC_TOTAL_TOKENS: &str = "total_tokens";
/// Request cost in USD.
pub const METRIC_COST_USD: &str = "cost_usd";
/// Error rate in [0, 1].
pub const METRIC_ERROR_RATE: &str = "error_rate";

// ── Identifiers ─────────────────────────────────────────────────────────

/// Identifies the service emitting telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies the model serving the request (e.g. `"gpt-4"`, `"claude-3"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Telemetry event ─────────────────────────────────────────────────────

/// One numeric observation of one metric.
///
/// Immutable once received. The `tags` map carries free-form context
/// (region, user id, trace id) that the core passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the observation was taken.
    pub timestamp: DateTime<Utc>,
    /// Emitting service.
    pub service: ServiceId,
    /// Model serving the request.
    pub model: ModelId,
    /// Metric name (see the `METRIC_*` constants for well-known names).
    pub metric: String,
    /// Observed value. Must be finite.
    pub value: f64,
    /// Free-form context tags.
    pub tags: HashMap<String, String>,
}

impl TelemetryEvent {
    /// Create an event for an arbitrary metric, stamped now.
    pub fn new(
        service: impl Into<ServiceId>,
        model: impl Into<ModelId>,
        metric: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            service: service.into(),
            model: model.into(),
            metric: metric.into(),
            value,
            tags: HashMap::new(),
        }
    }

    /// Latency observation in milliseconds.
    pub fn latency(service: impl Into<ServiceId>, model: impl Into<ModelId>, ms: f64) -> Self {
        Self::new(service, model, METRIC_LATENCY_MS, ms)
    }

    /// Token-count observation.
    pub fn tokens(service: impl Into<ServiceId>, model: impl Into<ModelId>, tokens: f64) -> Self {
        Self::new(service, model, METRIC_TOTAL_TOKENS, tokens)
    }

    /// Cost observation in USD.
    pub fn cost(service: impl Into<ServiceId>, model: impl Into<ModelId>, usd: f64) -> Self {
        Self::new(service, model, METRIC_COST_USD, usd)
    }

    /// Error-rate observation in [0, 1].
    pub fn error_rate(service: impl Into<ServiceId>, model: impl Into<ModelId>, rate: f64) -> Self {
        Self::new(service, model, METRIC_ERROR_RATE, rate)
    }

    /// Attach a context tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Check the input contract, naming the offending field on failure.
    ///
    /// Rejects non-finite values and empty identifiers. Called once per
    /// engine entry point; a failure is scoped to that call.
    pub fn validate(&self) -> DetectionResult<()> {
        if self.service.as_str().is_empty() {
            return Err(DetectionError::invalid_input("service", "must not be empty"));
        }
        if self.model.as_str().is_empty() {
            return Err(DetectionError::invalid_input("model", "must not be empty"));
        }
        if self.metric.is_empty() {
            return Err(DetectionError::invalid_input("metric", "must not be empty"));
        }
        if !self.value.is_finite() {
            return Err(DetectionError::invalid_input(
                "value",
                format!("must be finite, got {}", self.value),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_and_model_id_roundtrip() {
        let sid = ServiceId::new("chat-api");
        assert_eq!(sid.as_str(), "chat-api");
        assert_eq!(sid.to_string(), "chat-api");

        let mid: ModelId = "gpt-4".into();
        assert_eq!(mid.as_str(), "gpt-4");
    }

    #[test]
    fn id_equality_and_hash() {
        let a = ServiceId::new("x");
        let b = ServiceId::new("x");
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn named_constructors_pick_metric() {
        let e = TelemetryEvent::latency("svc", "gpt-4", 120.0);
        assert_eq!(e.metric, METRIC_LATENCY_MS);

        let e = TelemetryEvent::tokens("svc", "gpt-4", 300.0);
        assert_eq!(e.metric, METRIC_TOTAL_TOKENS);

        let e = TelemetryEvent::cost("svc", "gpt-4", 0.02);
        assert_eq!(e.metric, METRIC_COST_USD);

        let e = TelemetryEvent::error_rate("svc", "gpt-4", 0.0);
        assert_eq!(e.metric, METRIC_ERROR_RATE);
    }

    #[test]
    fn tags_pass_through() {
        let e = TelemetryEvent::latency("svc", "gpt-4", 100.0)
            .with_tag("region", "us-east-1")
            .with_tag("trace_id", "abc123");
        assert_eq!(e.tags.get("region").unwrap(), "us-east-1");
        assert_eq!(e.tags.len(), 2);
    }

    #[test]
    fn validate_accepts_well_formed_event() {
        let e = TelemetryEvent::latency("svc", "gpt-4", 100.0);
        assert!(e.validate().is_ok());
    }

    #[test]
    fn validate_names_offending_field() {
        let e = TelemetryEvent::latency("svc", "gpt-4", f64::NAN);
        match e.validate() {
            Err(DetectionError::InvalidInput { field, .. }) => assert_eq!(field, "value"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        let e = TelemetryEvent::latency("", "gpt-4", 100.0);
        match e.validate() {
            Err(DetectionError::InvalidInput { field, .. }) => assert_eq!(field, "service"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        let e = TelemetryEvent::new("svc", "gpt-4", "", 100.0);
        match e.validate() {
            Err(DetectionError::InvalidInput { field, .. }) => assert_eq!(field, "metric"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_infinities() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY] {
            let e = TelemetryEvent::cost("svc", "gpt-4", bad);
            assert!(e.validate().is_err());
        }
    }

    #[test]
    fn event_serialization_roundtrip() {
        let e = TelemetryEvent::tokens("svc", "claude-3", 450.0).with_tag("user_id", "u-1");
        let json = serde_json::to_string(&e).unwrap();
        let restored: TelemetryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.event_id, e.event_id);
        assert_eq!(restored.service, e.service);
        assert_eq!(restored.value, 450.0);
    }
}
