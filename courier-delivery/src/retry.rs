//! Caller-level retry policy.
//!
//! A single `send_report` never retries internally. Callers that want retries
//! re-run the whole pipeline through
//! [`DeliveryOrchestrator::send_report_with_retry`](crate::DeliveryOrchestrator::send_report_with_retry),
//! which consults this policy between attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classifier::FailureKind;

/// Bounded exponential backoff across whole pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of pipeline runs, the first one included.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff, in milliseconds.
    ///
    /// The delay before attempt `n + 1` is `base * 2^(n - 1)`.
    ///
    /// Default: 2 000
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on a single backoff delay, in milliseconds.
    ///
    /// Default: 10 000
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Wall-clock ceiling for all attempts and delays combined, in milliseconds.
    ///
    /// Default: 180 000
    #[serde(default = "defaults::overall_ms")]
    pub overall_ms: u64,

    /// Delays are randomized within ±`jitter_factor`, clamped to `0..=1`.
    ///
    /// Default: 0.1
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            overall_ms: defaults::overall_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Whether a failed attempt number `attempt` (1-indexed) of `kind`
    /// should be followed by another one.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }

    /// Backoff after attempt number `attempt` (1-indexed), jitter included.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = if exponent >= 63 {
            self.max_delay_ms
        } else {
            self.base_delay_ms
                .saturating_mul(1u64 << exponent)
                .min(self.max_delay_ms)
        };

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jittered = {
            let range = (delay as f64) * self.jitter();
            let jitter: f64 = rand::rng().random_range(-range..=range);
            ((delay as f64) + jitter).max(0.0) as u64
        };

        Duration::from_millis(jittered)
    }

    /// `jitter_factor` clamped to `0..=1`. Anything that is not a finite
    /// number disables jitter.
    fn jitter(&self) -> f64 {
        if self.jitter_factor.is_finite() {
            self.jitter_factor.abs().min(1.0)
        } else {
            0.0
        }
    }

    /// The ceiling across every attempt.
    #[must_use]
    pub const fn overall(&self) -> Duration {
        Duration::from_millis(self.overall_ms)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        2_000
    }

    pub const fn max_delay_ms() -> u64 {
        10_000
    }

    pub const fn overall_ms() -> u64 {
        180_000
    }

    pub const fn jitter_factor() -> f64 {
        0.1
    }
}
