//! Backoff delay computation.
//!
//! The delay before retry `k` is `min(max_delay, base_delay * factor^(k-1))`
//! plus an additive jitter of up to [`JITTER_RATIO`] of the capped delay.
//! Randomness is an injectable capability so tests can assert exact bounds.

use crate::policy::RetryPolicy;
use std::time::Duration;

/// Fraction of the capped delay that jitter may add.
pub const JITTER_RATIO: f64 = 0.1;

/// Source of jitter randomness.
///
/// Implementations return a value in `[0, 1)`; the executor scales it by
/// [`JITTER_RATIO`] times the capped delay.
pub trait Jitter: Send + Sync {
    /// Sample a jitter fraction in `[0, 1)`.
    fn sample(&self) -> f64;
}

/// Default jitter source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl Jitter for ThreadRngJitter {
    fn sample(&self) -> f64 {
        use rand::Rng;
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Jitter source that adds nothing. Deterministic delays for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn sample(&self) -> f64 {
        0.0
    }
}

/// Jitter source returning a fixed fraction, clamped to `[0, 1)`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&self) -> f64 {
        self.0.clamp(0.0, 0.999_999)
    }
}

/// Compute the jittered delay before the next retry.
///
/// `failures` is the number of attempts that have failed so far (1-indexed:
/// after the first failure, `failures == 1` and the delay is `base_delay`).
pub fn delay_for(policy: &RetryPolicy, failures: u32, jitter: &dyn Jitter) -> Duration {
    let exponent = failures.saturating_sub(1);
    let raw = policy.base_delay.as_secs_f64() * policy.backoff_factor.powi(exponent as i32);
    let capped = raw.min(policy.max_delay.as_secs_f64());
    let jittered = capped + capped * JITTER_RATIO * jitter.sample();
    Duration::from_secs_f64(jittered.max(0.0))
}
