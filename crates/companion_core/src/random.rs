//! crates/companion_core/src/random.rs
//!
//! Random selection behind a trait so template choices can be pinned in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

pub trait RandomSource: Send + Sync {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick_index(&self, len: usize) -> usize;
}

/// Picks one item from a non-empty pool.
pub fn choose<'a>(source: &dyn RandomSource, pool: &[&'a str]) -> &'a str {
    let index = source.pick_index(pool.len()).min(pool.len() - 1);
    pool[index]
}

/// Uniform selection from a `StdRng`, seeded from entropy or a fixed seed.
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for StdRandom {
    fn pick_index(&self, len: usize) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..len),
            // A poisoned lock only means another picker panicked mid-call.
            Err(poisoned) => poisoned.into_inner().gen_range(0..len),
        }
    }
}

/// Always returns the same index (clamped to the pool).
pub struct FixedIndex(pub usize);

impl RandomSource for FixedIndex {
    fn pick_index(&self, len: usize) -> usize {
        self.0.min(len - 1)
    }
}
