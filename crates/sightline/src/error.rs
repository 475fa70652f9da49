use thiserror::Error;

/// Errors from the detection core.
///
/// Absence of a valid baseline is deliberately not represented here: it is a
/// normal state in which detectors silently abstain, not a failure.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Invalid construction parameters. Fatal at construction time only.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// Malformed telemetry at call time. Scoped to the single call that
    /// received it; stored baselines and accumulators are untouched.
    #[error("invalid input: field `{field}` {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// An internal fault inside one detector. The engine catches these,
    /// counts them, and keeps running the remaining detectors.
    #[error("detector `{detector}` failed: {reason}")]
    Detector { detector: &'static str, reason: String },
}

impl DetectionError {
    pub fn config(reason: impl Into<String>) -> Self {
        DetectionError::Config {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        DetectionError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn detector(detector: &'static str, reason: impl Into<String>) -> Self {
        DetectionError::Detector {
            detector,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for detection results.
pub type DetectionResult<T> = Result<T, DetectionError>;
