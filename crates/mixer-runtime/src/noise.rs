//! Random sources for the temperature random walk.
//!
//! The stepper draws one sample per agitated tick. Injecting the source
//! keeps ticks reproducible: seed it in tests, draw from entropy in
//! production.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform samples in `[0, 1)`.
pub trait NoiseSource: Send {
    /// Next sample.
    fn next_unit(&mut self) -> f64;
}

/// [`NoiseSource`] backed by a seedable standard RNG.
#[derive(Debug, Clone)]
pub struct SeededNoise {
    rng: StdRng,
}

impl SeededNoise {
    /// Deterministic source; the same seed replays the same walk.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Non-deterministic source seeded from the OS.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is set, otherwise from entropy.
    #[must_use]
    pub fn from_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::from_seed)
    }
}

impl NoiseSource for SeededNoise {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Source that always returns the same value. Useful for pinning the walk
/// direction in tests and demos.
#[derive(Debug, Clone, Copy)]
pub struct ConstantNoise(pub f64);

impl NoiseSource for ConstantNoise {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}
