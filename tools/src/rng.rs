//! Deterministic random number generation for the runner.
//!
//! RULE: The runner never calls a platform RNG.
//! Every roll comes from a `StreamRng` derived from the run seed, so a
//! run replays identically from the same seed and starting tick.
//!
//! Each concern (contract offers, incidents) owns its own stream, seeded
//! from (seed XOR stream index). Adding a stream never shifts the others.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Stable stream assignments.
/// NEVER reorder entries; only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Offers    = 0,
    Incidents = 1,
}

pub struct StreamRng {
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// `resume_tick` is 0 for a fresh run and the snapshot tick on restore.
    pub fn new(seed: u64, stream: Stream, resume_tick: u64) -> Self {
        let derived = seed
            ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ resume_tick.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        Self { inner: Pcg64Mcg::seed_from_u64(derived) }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll an index in [0, n). Returns None when n is 0.
    pub fn pick(&mut self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        Some((self.inner.next_u64() % n as u64) as usize)
    }

    /// Bernoulli trial: true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}
