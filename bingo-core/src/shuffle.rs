//! Deterministic seeded permutations.
//!
//! ```text
//! seed string ──FNV-1a──► u32 ──xorshift32──► r ∈ [0,1) ──Fisher–Yates──► permutation
//! ```
//!
//! The pipeline is pure integer arithmetic with explicit 32-bit wraparound,
//! so the same seed yields the same permutation on every platform and across
//! process restarts.

/// FNV-1a 32-bit offset basis.
pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime.
pub const FNV_PRIME: u32 = 0x0100_0193;

/// xorshift32 has a fixed point at zero; a zero hash is remapped to this.
const ZERO_SEED_REPLACEMENT: u32 = 0x9e37_79b9;

/// FNV-1a over the UTF-8 bytes of `input`.
pub fn fnv1a_32(input: &str) -> u32 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Marsaglia xorshift32 (13, 17, 5).
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { ZERO_SEED_REPLACEMENT } else { seed };
        Self { state }
    }

    pub fn from_seed_str(seed: &str) -> Self {
        Self::new(fnv1a_32(seed))
    }

    /// Advance and return the raw 32-bit state.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Advance and return `state / 0xffffffff`. Note the upper bound is
    /// inclusive when the state is `u32::MAX`.
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.next_u32()) / f64::from(u32::MAX)
    }
}

/// Seeded Fisher–Yates shuffle.
#[derive(Debug, Clone)]
pub struct SeededShuffle {
    seed: String,
}

impl SeededShuffle {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Return a permuted copy of `items`; the input is left untouched.
    pub fn shuffle<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let mut out = items.to_vec();
        let mut rng = XorShift32::from_seed_str(&self.seed);
        for i in (1..out.len()).rev() {
            let j = ((rng.next_unit() * (i + 1) as f64).floor() as usize).min(i);
            out.swap(i, j);
        }
        out
    }
}

/// Convenience wrapper around [`SeededShuffle::shuffle`].
pub fn seeded_shuffle<T: Clone>(items: &[T], seed: &str) -> Vec<T> {
    SeededShuffle::new(seed).shuffle(items)
}
