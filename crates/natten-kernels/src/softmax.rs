//! Numerically stable softmax over neighborhood windows.

use natten_core::{NattenError, Result, Tensor};
use tracing::trace;

use crate::check::ensure_f32;
use crate::parallel;

/// Normalize `row` into a probability distribution in place.
///
/// Subtracts the row maximum before exponentiating. If the maximum is
/// `+inf`, the mass is split evenly over the `+inf` entries; if every entry
/// is `-inf`, the row becomes uniform. NaN inputs propagate.
pub fn softmax_in_place(row: &mut [f32]) {
    if row.is_empty() {
        return;
    }
    let max_val = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    if max_val == f32::INFINITY {
        let hits = row.iter().filter(|&&v| v == f32::INFINITY).count() as f32;
        for v in row.iter_mut() {
            *v = if *v == f32::INFINITY { 1.0 / hits } else { 0.0 };
        }
        return;
    }
    if max_val == f32::NEG_INFINITY {
        let uniform = 1.0 / row.len() as f32;
        row.iter_mut().for_each(|v| *v = uniform);
        return;
    }

    let mut sum = 0.0f32;
    for v in row.iter_mut() {
        let e = (*v - max_val).exp();
        *v = e;
        sum += e;
    }

    let inv_sum = 1.0 / sum;
    for v in row.iter_mut() {
        *v *= inv_sum;
    }
}

/// Softmax over the last axis of a score tensor (any strides).
///
/// Returns a new contiguous tensor of the same shape.
pub fn window_softmax(scores: &Tensor) -> Result<Tensor> {
    ensure_f32(scores)?;
    let window = *scores
        .dims()
        .last()
        .ok_or_else(|| NattenError::config("attn", "cannot normalize a scalar"))?;

    let mut weights = scores.to_f32_vec()?;
    trace!(rows = weights.len() / window.max(1), window, "softmax phase");
    parallel::for_each_row(&mut weights, window, |_, row| softmax_in_place(row))?;
    Ok(Tensor::from_f32_vec(weights, scores.dims()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_distribution(row: &[f32]) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum = {sum}");
        assert!(row.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_equal_scores_uniform() {
        let mut row = [3.0f32; 5];
        softmax_in_place(&mut row);
        for &v in &row {
            assert!((v - 0.2).abs() < 1e-7);
        }
    }

    #[test]
    fn test_extreme_magnitudes() {
        let mut row = [1e30f32, -1e30, 0.0, 1e30];
        softmax_in_place(&mut row);
        assert_distribution(&row);
        assert!((row[0] - 0.5).abs() < 1e-6);
        assert_eq!(row[1], 0.0);

        let mut row = [-1e30f32, -1e30 + 1e24, -1e30];
        softmax_in_place(&mut row);
        assert_distribution(&row);
    }

    #[test]
    fn test_infinities() {
        let mut row = [f32::INFINITY, 1.0, f32::INFINITY];
        softmax_in_place(&mut row);
        assert_eq!(row, [0.5, 0.0, 0.5]);

        let mut row = [f32::NEG_INFINITY; 4];
        softmax_in_place(&mut row);
        assert_eq!(row, [0.25; 4]);

        let mut row = [f32::NEG_INFINITY, 2.0];
        softmax_in_place(&mut row);
        assert_eq!(row, [0.0, 1.0]);
    }

    #[test]
    fn test_random_rows_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(11);
        for window in [1usize, 3, 9, 25, 49] {
            let mut row: Vec<f32> = (0..window).map(|_| rng.gen_range(-50.0f32..50.0)).collect();
            softmax_in_place(&mut row);
            assert_distribution(&row);
        }
    }

    #[test]
    fn test_window_softmax_strided() {
        let data: Vec<f32> = (0..24).map(|v| (v % 7) as f32).collect();
        let t = Tensor::from_f32(&data, &[2, 4, 3]);
        let permuted = t.permute(&[1, 0, 2]).unwrap();
        let out = window_softmax(&permuted).unwrap();
        assert_eq!(out.dims(), &[4, 2, 3]);

        let reference = window_softmax(&permuted.contiguous().unwrap()).unwrap();
        assert_eq!(out.as_f32_slice().unwrap(), reference.as_f32_slice().unwrap());
        for row in out.as_f32_slice().unwrap().chunks(3) {
            assert_distribution(row);
        }
    }
}
