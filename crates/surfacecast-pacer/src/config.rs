//! Pipeline configuration: defaults, a fluent builder, and typed validation.

use crate::error::ConfigError;
use crate::rate::RateModel;
use std::time::Duration;

/// Chooses how the Pacer recovers once it re-enters `Warmup` after an
/// underrun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderrunStrategy {
    /// Discard everything but the newest frame on entry, so recovery never
    /// replays pre-stall content.
    #[default]
    Strict,
    /// Preserve the backlog and keep draining it before falling back to
    /// repeats, if the backlog is non-empty at the moment of underrun.
    LatencyExpansion,
}

/// Full configuration for a [`crate::pipeline::Pipeline`].
///
/// Every field here corresponds to a row in the paced-video-pipeline
/// configuration table; see [`PipelineConfig::validate`] for the
/// constraints between fields.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Off = direct-send fast path; on = Pacer active.
    pub enable_buffering: bool,
    /// Target queue depth in frames. Minimum 1. Only meaningful when
    /// `enable_buffering` is set.
    pub buffer_depth: u32,
    /// The pacer's output cadence.
    pub target_rate: RateModel,
    /// Demand-driven renders instead of a free-running periodic clock.
    pub enable_paced_invalidation: bool,
    /// Pauses the Pump when the Frame Store backs up. Requires
    /// `enable_paced_invalidation`.
    pub enable_capture_backpressure: bool,
    /// Enables +/- half-period Pump timing correction from Pacer feedback.
    pub enable_cadence_adaptation: bool,
    /// Selects the latency-expansion underrun recovery strategy instead of
    /// strict.
    pub allow_latency_expansion: bool,
    /// Cadence of telemetry snapshots.
    pub telemetry_interval: Duration,
    /// Extra queue depth, beyond `target_depth`, tolerated before the
    /// capture-backpressure gate engages.
    pub backpressure_slack: u32,
    /// Consecutive over-threshold ticks required before the backpressure
    /// gate actually engages, to avoid reacting to a single noisy tick.
    pub gate_engage_ticks: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_buffering: false,
            buffer_depth: 3,
            target_rate: RateModel::new(60, 1).expect("60/1 is always valid"),
            enable_paced_invalidation: false,
            enable_capture_backpressure: false,
            enable_cadence_adaptation: false,
            allow_latency_expansion: false,
            telemetry_interval: Duration::from_secs(10),
            backpressure_slack: 1,
            gate_engage_ticks: 3,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Derived underrun strategy from `allow_latency_expansion`.
    pub fn underrun_strategy(&self) -> UnderrunStrategy {
        if self.allow_latency_expansion {
            UnderrunStrategy::LatencyExpansion
        } else {
            UnderrunStrategy::Strict
        }
    }

    /// Target queue depth the Pacer steers toward. Zero when buffering is
    /// disabled (direct mode has no queue).
    pub fn target_depth(&self) -> u32 {
        if self.enable_buffering {
            self.buffer_depth
        } else {
            0
        }
    }

    /// Validate cross-field constraints. Construction-time only; a
    /// `PipelineConfig` that fails here never spawns a thread.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_buffering && self.buffer_depth == 0 {
            return Err(ConfigError::ZeroDepth(self.buffer_depth));
        }
        if self.enable_capture_backpressure && !self.enable_paced_invalidation {
            return Err(ConfigError::BackpressureWithoutPacedInvalidation);
        }
        if self.gate_engage_ticks == 0 {
            return Err(ConfigError::InvalidGateEngageTicks(self.gate_engage_ticks));
        }
        if self.telemetry_interval.is_zero() {
            return Err(ConfigError::ZeroTelemetryInterval);
        }
        Ok(())
    }
}

/// Fluent builder for [`PipelineConfig`]. Fields not set fall back to
/// [`PipelineConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfigOverrides,
}

#[derive(Debug, Clone, Default)]
struct PipelineConfigOverrides {
    enable_buffering: Option<bool>,
    buffer_depth: Option<u32>,
    target_rate: Option<RateModel>,
    enable_paced_invalidation: Option<bool>,
    enable_capture_backpressure: Option<bool>,
    enable_cadence_adaptation: Option<bool>,
    allow_latency_expansion: Option<bool>,
    telemetry_interval: Option<Duration>,
    backpressure_slack: Option<u32>,
    gate_engage_ticks: Option<u32>,
}

impl PipelineConfigBuilder {
    pub fn enable_buffering(mut self, value: bool) -> Self {
        self.config.enable_buffering = Some(value);
        self
    }

    pub fn buffer_depth(mut self, value: u32) -> Self {
        self.config.buffer_depth = Some(value);
        self
    }

    pub fn target_rate(mut self, value: RateModel) -> Self {
        self.config.target_rate = Some(value);
        self
    }

    pub fn enable_paced_invalidation(mut self, value: bool) -> Self {
        self.config.enable_paced_invalidation = Some(value);
        self
    }

    pub fn enable_capture_backpressure(mut self, value: bool) -> Self {
        self.config.enable_capture_backpressure = Some(value);
        self
    }

    pub fn enable_cadence_adaptation(mut self, value: bool) -> Self {
        self.config.enable_cadence_adaptation = Some(value);
        self
    }

    pub fn allow_latency_expansion(mut self, value: bool) -> Self {
        self.config.allow_latency_expansion = Some(value);
        self
    }

    pub fn telemetry_interval(mut self, value: Duration) -> Self {
        self.config.telemetry_interval = Some(value);
        self
    }

    pub fn backpressure_slack(mut self, value: u32) -> Self {
        self.config.backpressure_slack = Some(value);
        self
    }

    pub fn gate_engage_ticks(mut self, value: u32) -> Self {
        self.config.gate_engage_ticks = Some(value);
        self
    }

    /// Build the config, validating cross-field constraints.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            enable_buffering: self.config.enable_buffering.unwrap_or(defaults.enable_buffering),
            buffer_depth: self.config.buffer_depth.unwrap_or(defaults.buffer_depth),
            target_rate: self.config.target_rate.unwrap_or(defaults.target_rate),
            enable_paced_invalidation: self
                .config
                .enable_paced_invalidation
                .unwrap_or(defaults.enable_paced_invalidation),
            enable_capture_backpressure: self
                .config
                .enable_capture_backpressure
                .unwrap_or(defaults.enable_capture_backpressure),
            enable_cadence_adaptation: self
                .config
                .enable_cadence_adaptation
                .unwrap_or(defaults.enable_cadence_adaptation),
            allow_latency_expansion: self
                .config
                .allow_latency_expansion
                .unwrap_or(defaults.allow_latency_expansion),
            telemetry_interval: self
                .config
                .telemetry_interval
                .unwrap_or(defaults.telemetry_interval),
            backpressure_slack: self
                .config
                .backpressure_slack
                .unwrap_or(defaults.backpressure_slack),
            gate_engage_ticks: self
                .config
                .gate_engage_ticks
                .unwrap_or(defaults.gate_engage_ticks),
        };
        config.validate()?;
        Ok(config)
    }
}
