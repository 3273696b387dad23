//! Probabilistic early expiration
//!
//! An entry aged `age` out of `ttl` is flagged for refresh with probability
//! `age / (ttl * beta)`, clamped to `[0, 1]`, and always once `age >= ttl`.
//! Refreshes are spread over the lifetime of an entry instead of piling up at
//! the expiry instant (Vattani, Chierichetti, Lowenstein, "Optimal
//! Probabilistic Cache Stampede Prevention", VLDB 2015).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Source of uniform draws on `[0, 1)`
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// Thread-local generator, used unless a source is injected
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Reproducible generator for simulations and tests
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random::<f64>()
    }
}

/// Always returns the same draw
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}

/// Probability that an entry of the given age should be refreshed early
pub fn early_expiration_probability(age: Duration, ttl: Duration, beta: f64) -> f64 {
    if age >= ttl {
        return 1.0;
    }
    let p = age.as_secs_f64() / (ttl.as_secs_f64() * beta);
    if p.is_nan() {
        return 1.0;
    }
    p.clamp(0.0, 1.0)
}

/// Decide whether a still-valid entry should also trigger a refresh
pub fn should_fetch_early(
    age: Duration,
    ttl: Duration,
    beta: f64,
    random: &dyn RandomSource,
) -> bool {
    if age >= ttl {
        return true;
    }
    random.next_f64() < early_expiration_probability(age, ttl, beta)
}
