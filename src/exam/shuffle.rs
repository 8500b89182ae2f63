// src/exam/shuffle.rs

use rand::Rng;

/// Returns a uniformly shuffled copy of `items` (Fisher-Yates), drawing from
/// `rng`. The input is left untouched.
pub fn shuffle_with<T: Clone, R: Rng>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = rng.gen_range(0..=i);
        shuffled.swap(i, j);
    }
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sorted(mut v: Vec<u32>) -> Vec<u32> {
        v.sort_unstable();
        v
    }

    #[test]
    fn output_is_a_permutation_for_all_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        for size in [0usize, 1, 2, 3, 10, 65, 200] {
            let input: Vec<u32> = (0..size as u32).map(|n| n % 7).collect();
            let output = shuffle_with(&input, &mut rng);
            assert_eq!(output.len(), input.len());
            assert_eq!(sorted(output), sorted(input.clone()));
        }
    }

    #[test]
    fn input_is_left_untouched() {
        let input = vec![1, 2, 3, 4, 5];
        let _ = shuffle_with(&input, &mut rand::thread_rng());
        assert_eq!(input, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn shuffling_actually_reorders() {
        let input: Vec<u32> = (0..20).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let reordered = (0..50).any(|_| shuffle_with(&input, &mut rng) != input);
        assert!(reordered);
    }

    #[test]
    fn every_position_is_reachable() {
        let input = vec![0u32, 1, 2];
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen_first = [false; 3];
        for _ in 0..200 {
            let out = shuffle_with(&input, &mut rng);
            seen_first[out[0] as usize] = true;
        }
        assert_eq!(seen_first, [true, true, true]);
    }
}
