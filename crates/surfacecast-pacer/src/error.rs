//! Error taxonomy for the paced video pipeline.
//!
//! Errors are split by locality and fatality rather than lumped into one
//! enum-of-everything: configuration mistakes are caught at construction and
//! are always fatal, transport and producer failures are local and counted,
//! timer anomalies are self-healing, and a small set of invariant violations
//! are genuinely fatal and tear the pipeline down.

use std::fmt;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PacerError>;

/// Errors raised while validating a [`crate::config::PipelineConfig`].
///
/// All `ConfigError` variants are surfaced at construction time, before any
/// thread is spawned.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid frame rate: numerator and denominator must both be positive (got {num}/{den})")]
    InvalidRate { num: i64, den: i64 },

    #[error("buffer_depth must be at least 1 when buffering is enabled (got {0})")]
    ZeroDepth(u32),

    #[error("enable_capture_backpressure requires enable_paced_invalidation")]
    BackpressureWithoutPacedInvalidation,

    #[error("gate_engage_ticks must be at least 1 (got {0})")]
    InvalidGateEngageTicks(u32),

    #[error("telemetry_interval must be non-zero")]
    ZeroTelemetryInterval,
}

/// Best-effort transport send failed. Local, counted, non-fatal.
#[derive(Debug, thiserror::Error)]
#[error("transport send failed: {reason}")]
pub struct TransportError {
    pub reason: String,
}

/// The producer misbehaved (wrong dimensions, callback panic). Local,
/// counted, non-fatal; the offending frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("producer delivered frame with unexpected dimensions: expected {expected_w}x{expected_h}, got {got_w}x{got_h}")]
    WrongDimensions {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
    },
    #[error("producer callback panicked: {0}")]
    CallbackPanicked(String),
}

/// Clock regression or extreme drift observed by the Pacer's timer.
/// Logged and resynchronized, never fatal on its own.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("clock regression detected: deadline moved backward by {0:?}")]
    ClockRegression(std::time::Duration),
    #[error("timer drift of {0:?} exceeded two periods; skipping missed ticks")]
    ExtremeDrift(std::time::Duration),
}

/// An invariant was violated in a way that cannot be locally recovered from.
/// Tears down the pipeline and is surfaced via the lifecycle event.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("allocator exhausted while copying frame payload")]
    AllocatorExhausted,
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Top-level error type unifying the taxonomy above.
#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Coarse classification of an error, independent of its concrete variant.
///
/// Lets a caller decide retry/backoff policy without matching on every
/// enum arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Raised once at construction; the pipeline never started.
    Configuration,
    /// Local and non-fatal; the pipeline keeps running.
    Transient,
    /// The pipeline has torn itself down and will not recover on its own.
    Fatal,
}

/// Suggested recovery action for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Fix the configuration and reconstruct the pipeline.
    FixAndRebuild,
    /// No action needed; the error was already counted and logged.
    Ignore,
    /// Retry the failed operation on the next tick.
    RetryNextTick,
    /// The pipeline is torn down; a new one must be built.
    Rebuild,
}

impl PacerError {
    /// Classify this error for coarse-grained handling.
    pub fn error_type(&self) -> ErrorType {
        match self {
            PacerError::Config(_) => ErrorType::Configuration,
            PacerError::Transport(_) | PacerError::Producer(_) | PacerError::Timer(_) => {
                ErrorType::Transient
            }
            PacerError::Fatal(_) => ErrorType::Fatal,
        }
    }

    /// Recommended recovery action for this error.
    pub fn recovery_action(&self) -> RecoveryAction {
        match self.error_type() {
            ErrorType::Configuration => RecoveryAction::FixAndRebuild,
            ErrorType::Transient => RecoveryAction::RetryNextTick,
            ErrorType::Fatal => RecoveryAction::Rebuild,
        }
    }
}

/// Classify an arbitrary error type implementing [`std::error::Error`] when
/// it is already known to be one of ours; falls back to [`ErrorType::Fatal`]
/// for safety if given something outside the taxonomy.
pub fn classify_error(err: &PacerError) -> ErrorType {
    err.error_type()
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::Configuration => write!(f, "configuration"),
            ErrorType::Transient => write!(f, "transient"),
            ErrorType::Fatal => write!(f, "fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_fatal_classification() {
        let err = PacerError::Config(ConfigError::ZeroDepth(0));
        assert_eq!(err.error_type(), ErrorType::Configuration);
        assert_eq!(err.recovery_action(), RecoveryAction::FixAndRebuild);
    }

    #[test]
    fn test_transport_error_is_transient() {
        let err = PacerError::Transport(TransportError {
            reason: "socket closed".into(),
        });
        assert_eq!(err.error_type(), ErrorType::Transient);
        assert_eq!(err.recovery_action(), RecoveryAction::RetryNextTick);
    }

    #[test]
    fn test_fatal_error_classification() {
        let err = PacerError::Fatal(FatalError::AllocatorExhausted);
        assert_eq!(err.error_type(), ErrorType::Fatal);
        assert_eq!(err.recovery_action(), RecoveryAction::Rebuild);
    }

    #[test]
    fn test_classify_error_helper_matches_method() {
        let err = PacerError::Producer(ProducerError::WrongDimensions {
            expected_w: 1920,
            expected_h: 1080,
            got_w: 100,
            got_h: 100,
        });
        assert_eq!(classify_error(&err), err.error_type());
    }
}
