//! # One-Dimensional Value Matching
//!
//! For every requested value `y`, pick the source row whose value `x` is the
//! first sorted value not below `y` (left insertion point). Requests above the
//! largest source value fall back to the largest one.

use std::cmp::Ordering;

/// Stable argsort of `values` under IEEE total order.
pub fn argsort(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    order
}

/// Left insertion point of `y` in the ascending `sorted` slice.
#[inline]
fn insertion_point(sorted: &[f64], y: f64) -> usize {
    sorted.partition_point(|&x| x.total_cmp(&y) == Ordering::Less)
}

/// Index into `x` matched to every value of `y`.
///
/// When `assume_x_is_sorted` is set, `x` must already be ascending and the
/// returned indices refer to it directly; otherwise `x` is argsorted first and
/// the indices are mapped back to the caller's order. Empty `x` yields an
/// empty result.
pub fn matched_value_selection_indices(x: &[f64], y: &[f64], assume_x_is_sorted: bool) -> Vec<usize> {
    if x.is_empty() {
        return Vec::new();
    }
    let last = x.len() - 1;

    if assume_x_is_sorted {
        return y
            .iter()
            .map(|&v| insertion_point(x, v).min(last))
            .collect();
    }

    let order = argsort(x);
    let sorted: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    y.iter()
        .map(|&v| order[insertion_point(&sorted, v).min(last)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_recovers_permuted_values() {
        let mut rng = StdRng::seed_from_u64(43);
        let x: Vec<f64> = (0..100_000)
            .map(|_| 10f64.powf(rng.random_range(10.0..15.0)))
            .collect();
        let mut y = x.clone();
        y.shuffle(&mut rng);

        let idx = matched_value_selection_indices(&x, &y, false);
        for (&i, &target) in idx.iter().zip(&y) {
            assert!((x[i] - target).abs() <= 0.01 * target.abs());
        }
    }

    #[test]
    fn test_sorted_input_and_clamping() {
        let x = [1.0, 2.0, 3.0];
        let y = [0.0, 1.5, 2.0, 99.0];
        assert_eq!(matched_value_selection_indices(&x, &y, true), vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_unsorted_maps_back() {
        let x = [30.0, 10.0, 20.0];
        let y = [10.0, 25.0, 31.0];
        assert_eq!(matched_value_selection_indices(&x, &y, false), vec![1, 0, 0]);
    }

    #[test]
    fn test_empty_source() {
        assert!(matched_value_selection_indices(&[], &[1.0], false).is_empty());
    }
}
