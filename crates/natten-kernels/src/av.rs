//! AV phase: attention-weighted sums of neighbor values.
//!
//! Neighbors are recomputed with the same [`WindowParams::locate`] call as
//! the QK phase, so weight `j` always lines up with score `j`. Heads are
//! written side by side, giving `(batch, extent..., heads * dim_v)` directly
//! without a separate permute/reshape pass.

use natten_core::{Result, Tensor};
use tracing::trace;

use crate::check;
use crate::parallel;
use crate::window::WindowParams;

/// 1-D aggregation: `attn (batch, heads, length, k)` with
/// `value (batch, heads, length, dim_v)` → `(batch, length, heads * dim_v)`.
///
/// Rows past `original_length` are zero.
pub fn na1d_av(
    attn: &Tensor,
    value: &Tensor,
    params: &WindowParams,
    original_length: usize,
) -> Result<Tensor> {
    let problem = check::av(attn, value, params, [original_length], ["original_length"])?;
    let [length] = problem.extent;
    let [original] = problem.original;
    let (heads, dim_v) = (problem.heads, problem.dim);
    let k = params.kernel_size();

    let a = attn.view_f32()?;
    let v = value.view_f32()?;
    let (a_j, v_l, v_c) = (a.stride(3), v.stride(2), v.stride(3));

    trace!(?problem, kernel_size = k, dilation = params.dilation(), "na1d av phase");

    let row_len = heads * dim_v;
    let mut out = vec![0.0f32; problem.batch * length * row_len];
    parallel::for_each_row(&mut out, row_len, |row, out_row| {
        let (b, i) = (row / length, row % length);
        if problem.is_padding([i]) {
            return;
        }
        let w = params.locate(i, original);

        for (h, acc) in out_row.chunks_mut(dim_v).enumerate() {
            let a_base = a.offset_of(&[b, h, i, 0]);
            let v_base = v.offset_of(&[b, h, 0, 0]);
            for j in 0..k {
                let weight = a.get(a_base + j * a_j);
                let v_row = v_base + w.neighbor(j) * v_l;
                for (c, slot) in acc.iter_mut().enumerate() {
                    *slot += weight * v.get(v_row + c * v_c);
                }
            }
        }
    })?;

    Ok(Tensor::from_f32_vec(out, &[problem.batch, length, row_len]))
}

/// 2-D aggregation: `attn (batch, heads, height, width, k²)` with
/// `value (batch, heads, height, width, dim_v)` →
/// `(batch, height, width, heads * dim_v)`.
pub fn na2d_av(
    attn: &Tensor,
    value: &Tensor,
    params: &WindowParams,
    original_height: usize,
    original_width: usize,
) -> Result<Tensor> {
    let problem = check::av(
        attn,
        value,
        params,
        [original_height, original_width],
        ["original_height", "original_width"],
    )?;
    let [height, width] = problem.extent;
    let [orig_h, orig_w] = problem.original;
    let (heads, dim_v) = (problem.heads, problem.dim);
    let k = params.kernel_size();

    let a = attn.view_f32()?;
    let v = value.view_f32()?;
    let a_j = a.stride(4);
    let (v_y, v_x, v_c) = (v.stride(2), v.stride(3), v.stride(4));

    trace!(?problem, kernel_size = k, dilation = params.dilation(), "na2d av phase");

    let row_len = heads * dim_v;
    let mut out = vec![0.0f32; problem.batch * height * width * row_len];
    parallel::for_each_row(&mut out, row_len, |row, out_row| {
        let x = row % width;
        let y = (row / width) % height;
        let b = row / (width * height);
        if problem.is_padding([y, x]) {
            return;
        }
        let wy = params.locate(y, orig_h);
        let wx = params.locate(x, orig_w);

        for (h, acc) in out_row.chunks_mut(dim_v).enumerate() {
            let a_base = a.offset_of(&[b, h, y, x, 0]);
            let v_base = v.offset_of(&[b, h, 0, 0, 0]);
            for ki in 0..k {
                let v_line = v_base + wy.neighbor(ki) * v_y;
                for kj in 0..k {
                    let weight = a.get(a_base + (ki * k + kj) * a_j);
                    let v_pixel = v_line + wx.neighbor(kj) * v_x;
                    for (c, slot) in acc.iter_mut().enumerate() {
                        *slot += weight * v.get(v_pixel + c * v_c);
                    }
                }
            }
        }
    })?;

    Ok(Tensor::from_f32_vec(
        out,
        &[problem.batch, height, width, row_len],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1d_uniform_weights_average_window() {
        // one head, dim 2: value[i] = (i, 10 i)
        let data: Vec<f32> = (0..5).flat_map(|i| [i as f32, 10.0 * i as f32]).collect();
        let value = Tensor::from_f32(&data, &[1, 1, 5, 2]);
        let attn = Tensor::full(&[1, 1, 5, 3], 1.0 / 3.0);
        let p = WindowParams::new(3, 1).unwrap();

        let out = na1d_av(&attn, &value, &p, 5).unwrap();
        assert_eq!(out.dims(), &[1, 5, 2]);
        let o = out.as_f32_slice().unwrap();
        // i = 0 averages 0,1,2; i = 2 averages 1,2,3; i = 4 averages 2,3,4
        assert!((o[0] - 1.0).abs() < 1e-6);
        assert!((o[4] - 2.0).abs() < 1e-6);
        assert!((o[9] - 30.0).abs() < 1e-5);
    }

    #[test]
    fn test_1d_heads_concatenated() {
        // two heads; head h value is constant h + 1
        let mut data = vec![1.0f32; 4 * 3];
        data.extend(vec![2.0f32; 4 * 3]);
        let value = Tensor::from_f32(&data, &[1, 2, 4, 3]);
        let attn = Tensor::full(&[1, 2, 4, 1], 1.0);
        let p = WindowParams::new(1, 1).unwrap();

        let out = na1d_av(&attn, &value, &p, 4).unwrap();
        assert_eq!(out.dims(), &[1, 4, 6]);
        assert_eq!(&out.as_f32_slice().unwrap()[0..6], &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_2d_one_hot_weight_selects_neighbor() {
        // value[y, x] = 10 y + x, one channel
        let data: Vec<f32> = (0..4).flat_map(|y| (0..4).map(move |x| (10 * y + x) as f32)).collect();
        let value = Tensor::from_f32(&data, &[1, 1, 4, 4, 1]);
        // weight 1 on window member (2, 0) only
        let mut weights = vec![0.0f32; 16 * 9];
        for pixel in 0..16 {
            weights[pixel * 9 + 6] = 1.0;
        }
        let attn = Tensor::from_f32(&weights, &[1, 1, 4, 4, 9]);
        let p = WindowParams::new(3, 1).unwrap();

        let out = na2d_av(&attn, &value, &p, 4, 4).unwrap();
        assert_eq!(out.dims(), &[1, 4, 4, 1]);
        let o = out.view_f32().unwrap();
        // pixel (1, 1): window rows 0..3, cols 0..3 → member (2, 0) = (2, 0)
        assert_eq!(o.at(&[0, 1, 1, 0]), 20.0);
        // pixel (3, 3): window rows 1..4, cols 1..4 → member (2, 0) = (3, 1)
        assert_eq!(o.at(&[0, 3, 3, 0]), 31.0);
    }
}
