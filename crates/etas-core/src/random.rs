//! Per-worker random stream.
//!
//! Each worker owns one [`RandomStream`]. Before generating catalog `i` the
//! worker reseeds it from `(base_seed, i)`, so the random sequence a catalog
//! sees depends only on its index. A run with a fixed base seed therefore
//! produces the same ensemble whatever the thread count.

use etas_math::{gr_sample_inverse, omori_inverse, omori_rate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

/// SplitMix64 finalizer over `base ^ golden * (index + 1)`.
pub fn derive_seed(base: u64, index: u64) -> u64 {
    let mut z = base ^ 0x9E37_79B9_7F4A_7C15u64.wrapping_mul(index.wrapping_add(1));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seedable generator with the samplers the catalog engine needs.
#[derive(Debug, Clone)]
pub struct RandomStream {
    base_seed: u64,
    rng: ChaCha8Rng,
}

impl RandomStream {
    pub fn new(base_seed: u64) -> Self {
        Self {
            base_seed,
            rng: ChaCha8Rng::seed_from_u64(base_seed),
        }
    }

    /// A stream with a random base seed.
    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u64>())
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Restart the stream for catalog `index`.
    pub fn reseed_for_catalog(&mut self, index: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(derive_seed(self.base_seed, index));
    }

    /// Uniform sample in the open interval (0, 1).
    pub fn uniform(&mut self) -> f64 {
        loop {
            let u: f64 = self.rng.random();
            if u > 0.0 {
                return u;
            }
        }
    }

    /// Poisson count. A non-positive mean yields 0.
    pub fn poisson(&mut self, mean: f64) -> u64 {
        if !(mean > 0.0) {
            return 0;
        }
        match Poisson::new(mean) {
            Ok(dist) => {
                let k: f64 = dist.sample(&mut self.rng);
                k as u64
            }
            // Only reachable for means beyond the sampler's range; the
            // generator caps catalog size long before that.
            Err(_) => mean.round() as u64,
        }
    }

    /// Exponential waiting time with the given rate.
    pub fn exponential(&mut self, rate: f64) -> f64 {
        -self.uniform().ln() / rate
    }

    /// Time since the parent, in [t1, t2], with density proportional to
    /// `(t + c)^-p`.
    pub fn omori_sample(&mut self, p: f64, c: f64, t1: f64, t2: f64) -> f64 {
        let total = omori_rate(p, c, t1, t2);
        let t = omori_inverse(p, c, t1, self.uniform() * total);
        if t.is_finite() {
            t.clamp(t1, t2)
        } else {
            t2
        }
    }

    /// Gutenberg-Richter magnitude on [m1, m2].
    pub fn gr_sample(&mut self, b: f64, m1: f64, m2: f64) -> f64 {
        gr_sample_inverse(b, m1, m2, self.uniform()).clamp(m1, m2)
    }
}
