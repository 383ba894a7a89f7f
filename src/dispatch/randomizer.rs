//! Randomness for batch building and pacing
//!
//! Every random decision of the dispatcher (noise size, order shuffle,
//! slow-sell chunk size, pacing sleep) goes through one [`Randomizer`] so
//! tests can seed it.

use rand::prelude::*;
use rand::rngs::StdRng;
use std::time::Duration;

/// Source of randomness for the dispatcher
pub struct Randomizer {
    rng: Box<dyn RngCore + Send>,
}

impl Randomizer {
    /// Create a new randomizer with optional seed
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng: Box::new(rng) }
    }

    pub fn from_entropy() -> Self {
        Self::new(None)
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// Use any generator, e.g. a stepping mock in tests
    pub fn with_rng<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// Uniform integer in `[min, max]`
    pub fn random_int(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Uniform float in `[min, max]`
    pub fn random_float(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Pacing sleep between orders
    pub fn jitter_sleep(&mut self, min_secs: f64, max_secs: f64) -> Duration {
        let secs = self.random_float(min_secs.max(0.0), max_secs.max(0.0));
        Duration::from_secs_f64(secs)
    }

    /// Uniform in-place permutation
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

impl Default for Randomizer {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl std::fmt::Debug for Randomizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Randomizer").finish_non_exhaustive()
    }
}
