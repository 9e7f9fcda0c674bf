//! Rational frame-rate arithmetic and cadence observation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// A rational frame rate: `numerator / denominator` frames per second.
///
/// Always stored normalized (coprime, both positive) after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateModel {
    numerator: i64,
    denominator: i64,
}

impl RateModel {
    /// Build a normalized rate from a numerator/denominator pair.
    pub fn new(numerator: i64, denominator: i64) -> Result<Self, ConfigError> {
        if numerator <= 0 || denominator <= 0 {
            return Err(ConfigError::InvalidRate {
                num: numerator,
                den: denominator,
            });
        }
        let g = gcd(numerator, denominator);
        Ok(Self {
            numerator: numerator / g,
            denominator: denominator / g,
        })
    }

    /// Parse a frame rate from free-form text: decimal (`59.94`), ratio
    /// (`60000/1001` or `60000:1001`), or integer (`30`).
    ///
    /// Recognized broadcast-standard decimals map to their exact rational
    /// forms; other decimals are normalized with a denominator of 1000.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();

        if let Some((num, den)) = text.split_once('/').or_else(|| text.split_once(':')) {
            let num: i64 = num
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidRate { num: 0, den: 0 })?;
            let den: i64 = den
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidRate { num: 0, den: 0 })?;
            return Self::new(num, den);
        }

        if let Ok(int_value) = text.parse::<i64>() {
            return Self::new(int_value, 1);
        }

        let decimal: f64 = text
            .parse()
            .map_err(|_| ConfigError::InvalidRate { num: 0, den: 0 })?;

        if let Some(exact) = broadcast_standard_rational(decimal) {
            return Ok(exact);
        }

        // Unknown decimal: normalize with a denominator of 1000.
        let numerator = (decimal * 1000.0).round() as i64;
        Self::new(numerator, 1000)
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    /// Nominal period as a `Duration`, derived as `round(1e9 * D / N)` ns.
    pub fn nominal_period(&self) -> Duration {
        let period_ns =
            (1_000_000_000f64 * self.denominator as f64 / self.numerator as f64).round();
        Duration::from_nanos(period_ns as u64)
    }

    /// Frames per second as a floating-point approximation, for display only.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl Default for RateModel {
    fn default() -> Self {
        Self {
            numerator: 60,
            denominator: 1,
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Broadcast-standard decimals that map to exact rational forms rather than
/// a denominator-of-1000 approximation.
fn broadcast_standard_rational(decimal: f64) -> Option<RateModel> {
    const STANDARDS: &[(f64, i64, i64)] = &[
        (23.976, 24000, 1001),
        (29.97, 30000, 1001),
        (59.94, 60000, 1001),
        (119.88, 120000, 1001),
    ];
    const EPSILON: f64 = 0.005;
    STANDARDS
        .iter()
        .find(|(value, _, _)| (decimal - value).abs() < EPSILON)
        .map(|(_, num, den)| RateModel {
            numerator: *num,
            denominator: *den,
        })
}

/// Records paint arrival times in a rolling two-second window and exposes
/// observed frames-per-second and shortfall-versus-target, for telemetry
/// only — it never influences pacing decisions.
pub struct CadenceTracker {
    window: Duration,
    target_fps: f64,
    arrivals: VecDeque<Instant>,
}

impl CadenceTracker {
    pub fn new(target_rate: RateModel) -> Self {
        Self {
            window: Duration::from_secs(2),
            target_fps: target_rate.as_f64(),
            arrivals: VecDeque::new(),
        }
    }

    /// Record a paint arrival at `now`.
    pub fn record_arrival(&mut self, now: Instant) {
        self.arrivals.push_back(now);
        self.evict_stale(now);
    }

    fn evict_stale(&mut self, now: Instant) {
        while let Some(&front) = self.arrivals.front() {
            if now.duration_since(front) > self.window {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether the rolling window has accumulated a full window's worth of
    /// history yet.
    pub fn is_filled(&self, now: Instant) -> bool {
        match self.arrivals.front() {
            Some(&front) => now.duration_since(front) >= self.window,
            None => false,
        }
    }

    /// Observed frames-per-second over the rolling window.
    pub fn observed_fps(&self, now: Instant) -> f64 {
        if self.arrivals.len() < 2 {
            return 0.0;
        }
        let span = now
            .duration_since(*self.arrivals.front().unwrap())
            .as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.arrivals.len() - 1) as f64 / span
    }

    /// Percentage shortfall against the configured target rate; positive
    /// means arrivals are falling behind.
    pub fn fps_shortfall_percent(&self, now: Instant) -> f64 {
        if self.target_fps <= 0.0 {
            return 0.0;
        }
        let observed = self.observed_fps(now);
        ((self.target_fps - observed) / self.target_fps * 100.0).max(0.0)
    }
}
