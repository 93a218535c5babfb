//! Deterministic pseudo-randomness for decoy selection.
//!
//! Every "random" choice the MBR orchestrator makes (picking a donor peak
//! to serve as a random-RT decoy) is reproducible: the generator is seeded
//! from the engine-wide `random_seed` combined with a hash of the donor
//! identification's modified sequence, so two engine runs over identical
//! inputs pick the same decoys (spec §5, "Determinism").

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A deterministic per-donor pseudo-random generator.
pub fn rng_for_donor(base_seed: u64, donor_modified_sequence: &str) -> ChaCha8Rng {
    let mut hasher = DefaultHasher::new();
    donor_modified_sequence.hash(&mut hasher);
    let combined_seed = base_seed ^ hasher.finish();
    ChaCha8Rng::seed_from_u64(combined_seed)
}

/// Pick a uniformly random element from `candidates` using `rng`, or `None`
/// if empty.
pub fn choose_uniform<'a, T>(rng: &mut ChaCha8Rng, candidates: &'a [T]) -> Option<&'a T> {
    if candidates.is_empty() {
        return None;
    }
    let index = rng.gen_range(0..candidates.len());
    candidates.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_and_sequence_produce_the_same_draws() {
        let mut a = rng_for_donor(42, "PEPTIDEK");
        let mut b = rng_for_donor(42, "PEPTIDEK");
        let candidates = [1, 2, 3, 4, 5];
        assert_eq!(choose_uniform(&mut a, &candidates), choose_uniform(&mut b, &candidates));
    }

    #[test]
    fn different_sequences_usually_diverge() {
        let mut a = rng_for_donor(42, "PEPTIDEK");
        let mut b = rng_for_donor(42, "SEQUENCER");
        let candidates: Vec<u32> = (0..1000).collect();
        let draws_a: Vec<Option<&u32>> = (0..5).map(|_| choose_uniform(&mut a, &candidates)).collect();
        let draws_b: Vec<Option<&u32>> = (0..5).map(|_| choose_uniform(&mut b, &candidates)).collect();
        assert_ne!(draws_a, draws_b);
    }
}
