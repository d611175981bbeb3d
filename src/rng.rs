//! Deterministic random rolls for disease onset
//!
//! A roll is derived from (master seed, plant id, check instant, disease slot),
//! so whichever driver evaluates a given hourly check gets the same outcome.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub trait RollSource: Send + Sync {
    /// Uniform value in [0, 1).
    fn roll(&self, plant_id: &str, checked_at: i64, slot: usize) -> f64;
}

#[derive(Debug, Clone)]
pub struct SeededRolls {
    master_seed: u64,
}

impl SeededRolls {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    fn derive_seed(&self, plant_id: &str, checked_at: i64, slot: usize) -> u64 {
        let mut seed = self.master_seed;
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= hash_id(plant_id);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= (checked_at as u64).wrapping_mul(48271);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= (slot as u64).wrapping_mul(69069);
        seed
    }
}

impl Default for SeededRolls {
    fn default() -> Self {
        Self::new(42)
    }
}

impl RollSource for SeededRolls {
    fn roll(&self, plant_id: &str, checked_at: i64, slot: usize) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(self.derive_seed(plant_id, checked_at, slot));
        rng.gen::<f64>()
    }
}

/// Always returns the same value; 0.0 forces every onset, 1.0 suppresses all.
#[derive(Debug, Clone, Copy)]
pub struct FixedRoll(pub f64);

impl RollSource for FixedRoll {
    fn roll(&self, _plant_id: &str, _checked_at: i64, _slot: usize) -> f64 {
        self.0
    }
}

// FNV-1a; stable across builds unlike the std hasher.
fn hash_id(id: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in id.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
