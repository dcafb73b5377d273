/// Drill engine: seeded shuffle.
///
/// Pure given a seed. Seed selection belongs to `IdentityClock`.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Maximum number of items in a `fixed_random` session.
pub const RANDOM_SESSION_SIZE: usize = 10;

/// Unbiased in-place permutation (Fisher–Yates over a ChaCha8 stream).
pub fn shuffle_in_place<T>(items: &mut [T], seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    items.shuffle(&mut rng);
}

/// Shuffle `ids` with `seed` and keep the first `limit`.
pub fn sample(ids: &[String], seed: u64, limit: usize) -> Vec<String> {
    let mut out = ids.to_vec();
    shuffle_in_place(&mut out, seed);
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_same_seed_same_permutation() {
        let mut a = ids(30);
        let mut b = ids(30);
        shuffle_in_place(&mut a, 1234);
        shuffle_in_place(&mut b, 1234);
        assert_eq!(a, b);
    }

    #[test]
    fn test_is_permutation() {
        let mut shuffled = ids(25);
        shuffle_in_place(&mut shuffled, 9);
        let mut sorted = shuffled.clone();
        sorted.sort_by_key(|s| s.parse::<usize>().unwrap());
        assert_eq!(sorted, ids(25));
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = ids(30);
        let mut b = ids(30);
        shuffle_in_place(&mut a, 1);
        shuffle_in_place(&mut b, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sample_truncates() {
        assert_eq!(sample(&ids(20), 5, RANDOM_SESSION_SIZE).len(), 10);
        assert_eq!(sample(&ids(4), 5, RANDOM_SESSION_SIZE).len(), 4);
        assert!(sample(&[], 5, RANDOM_SESSION_SIZE).is_empty());
    }
}
