//! # Bounded-Range Draws
//!
//! Uniform draws, with replacement, of integers from half-open ranges
//! `[first, last)`. This is the random kernel underneath source-halo
//! selection: once source rows are grouped by cell, every cell is one range
//! and every target halo in it asks for one draw.

use rand::distr::uniform::SampleUniform;
use rand::Rng;

use crate::error::{GalsamplerError, Result};

/// Append `n` uniform draws from `[lo, hi)` to `out`. Requires `lo < hi`.
#[inline]
pub fn draw_in_range<T, R>(lo: T, hi: T, n: usize, rng: &mut R, out: &mut Vec<T>)
where
    T: SampleUniform + PartialOrd + Copy,
    R: Rng + ?Sized,
{
    debug_assert!(lo < hi);
    out.extend((0..n).map(|_| rng.random_range(lo..hi)));
}

/// Draw `num_select[i]` values from `[first[i], last[i])` for every `i`,
/// concatenated in input order.
///
/// All inputs are validated before the first draw: the three arrays must
/// share a length and every range must be non-empty.
pub fn draw_from_ranges<R: Rng + ?Sized>(
    first: &[i64],
    last: &[i64],
    num_select: &[u32],
    rng: &mut R,
) -> Result<Vec<i64>> {
    GalsamplerError::check_len("last", last.len(), "first", first.len())?;
    GalsamplerError::check_len("num_select", num_select.len(), "first", first.len())?;

    if let Some(index) = first.iter().zip(last).position(|(f, l)| l <= f) {
        return Err(GalsamplerError::DegenerateRange {
            index,
            first: first[index],
            last: last[index],
        });
    }

    let total: usize = num_select.iter().map(|&n| n as usize).sum();
    let mut out = Vec::with_capacity(total);
    for ((&lo, &hi), &n) in first.iter().zip(last).zip(num_select) {
        draw_in_range(lo, hi, n as usize, rng, &mut out);
    }
    Ok(out)
}
