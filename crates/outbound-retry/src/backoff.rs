//! Linear backoff with pluggable jitter.
//!
//! The delay before retry `k` (1-indexed: the wait after attempt `k`) is
//!
//! ```text
//! min(max_delay, min(max_delay, base_delay * k) + jitter)
//! ```
//!
//! so it grows with the attempt number, spreads concurrent callers apart, and
//! never exceeds `max_delay`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Source of the random part of a backoff delay.
pub trait Jitter: Send + Sync {
    /// A jitter sample.
    fn sample(&self) -> Duration;

    /// Upper bound of [`Jitter::sample`].
    fn max(&self) -> Duration;
}

/// No randomness: delays are exactly `base_delay * k`, clamped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn sample(&self) -> Duration {
        Duration::ZERO
    }

    fn max(&self) -> Duration {
        Duration::ZERO
    }
}

/// Uniform jitter in `[0, max]` from the thread-local RNG.
#[derive(Debug, Clone, Copy)]
pub struct UniformJitter {
    max: Duration,
}

impl UniformJitter {
    /// Jitter up to `max`.
    pub fn new(max: Duration) -> Self {
        Self { max }
    }
}

impl Jitter for UniformJitter {
    fn sample(&self) -> Duration {
        sample_up_to(&mut rand::rng(), self.max)
    }

    fn max(&self) -> Duration {
        self.max
    }
}

/// Uniform jitter in `[0, max]` from a seeded generator.
///
/// Two instances with the same seed produce the same sequence, which makes
/// delay schedules reproducible in tests.
#[derive(Debug)]
pub struct SeededJitter {
    max: Duration,
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Jitter up to `max`, drawn from a generator seeded with `seed`.
    pub fn new(max: Duration, seed: u64) -> Self {
        Self {
            max,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Jitter for SeededJitter {
    fn sample(&self) -> Duration {
        // A panic while sampling cannot leave the generator half-updated.
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        sample_up_to(&mut *rng, self.max)
    }

    fn max(&self) -> Duration {
        self.max
    }
}

fn sample_up_to<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.random_range(0..=nanos))
}

/// Delay schedule: linear in the attempt number plus jitter, capped.
#[derive(Clone)]
pub struct LinearJitterBackoff {
    base_delay: Duration,
    max_delay: Duration,
    jitter: std::sync::Arc<dyn Jitter>,
}

impl LinearJitterBackoff {
    pub(crate) fn new(
        base_delay: Duration,
        max_delay: Duration,
        jitter: std::sync::Arc<dyn Jitter>,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter,
        }
    }

    /// Delay before the retry that follows attempt `attempt` (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        let k = u32::try_from(attempt.max(1)).unwrap_or(u32::MAX);
        let linear = self.base_delay.saturating_mul(k).min(self.max_delay);
        linear
            .saturating_add(self.jitter.sample())
            .min(self.max_delay)
    }

    /// Smallest possible delay for `attempt`.
    pub fn lower_bound(&self, attempt: usize) -> Duration {
        let k = u32::try_from(attempt.max(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(k).min(self.max_delay)
    }

    /// Largest possible delay for `attempt`.
    pub fn upper_bound(&self, attempt: usize) -> Duration {
        self.lower_bound(attempt)
            .saturating_add(self.jitter.max())
            .min(self.max_delay)
    }

    /// Base delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Cap on every delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl std::fmt::Debug for LinearJitterBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearJitterBackoff")
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("max_jitter", &self.jitter.max())
            .finish()
    }
}
