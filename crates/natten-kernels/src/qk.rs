//! QK phase: windowed query-key scores plus relative positional bias.
//!
//! For each (batch, head, query) the score row holds, for every window
//! member `j`, `dot(query, key[neighbor(j)]) + rpb[head, bias(j)]`. In 2-D
//! the window is the Cartesian product of the row and column windows,
//! flattened as `ki * kernel_size + kj`. Scores are not scaled.

use natten_core::{Result, Tensor};
use tracing::trace;

use crate::check;
use crate::parallel;
use crate::window::WindowParams;

/// Raw 1-D scores, shape `(batch, heads, length, kernel_size)`.
///
/// Query rows past `original_length` are padding and score zero.
pub fn na1d_qk_rpb(
    query: &Tensor,
    key: &Tensor,
    rpb: &Tensor,
    params: &WindowParams,
    original_length: usize,
) -> Result<Tensor> {
    let problem = check::qk(query, key, rpb, params, [original_length], ["original_length"])?;
    let [length] = problem.extent;
    let [original] = problem.original;
    let k = params.kernel_size();

    let q = query.view_f32()?;
    let kv = key.view_f32()?;
    let bias = rpb.view_f32()?;
    let (q_c, k_l, k_c, rpb_o) = (q.stride(3), kv.stride(2), kv.stride(3), bias.stride(1));

    trace!(?problem, kernel_size = k, dilation = params.dilation(), "na1d qk phase");

    let mut scores = vec![0.0f32; problem.batch * problem.heads * length * k];
    parallel::for_each_row(&mut scores, k, |row, out| {
        let i = row % length;
        let bh = row / length;
        let (b, h) = (bh / problem.heads, bh % problem.heads);
        if problem.is_padding([i]) {
            return;
        }

        let w = params.locate(i, original);
        let q_base = q.offset_of(&[b, h, i, 0]);
        let k_base = kv.offset_of(&[b, h, 0, 0]);
        let rpb_base = bias.offset_of(&[h, 0]);

        for (j, score) in out.iter_mut().enumerate() {
            let k_row = k_base + w.neighbor(j) * k_l;
            let dot = q.dot(q_base, q_c, &kv, k_row, k_c, problem.dim);
            *score = dot + bias.get(rpb_base + w.bias(j) * rpb_o);
        }
    })?;

    Ok(Tensor::from_f32_vec(
        scores,
        &[problem.batch, problem.heads, length, k],
    ))
}

/// Raw 2-D scores, shape `(batch, heads, height, width, kernel_size²)`.
///
/// Query pixels outside `original_height × original_width` score zero.
pub fn na2d_qk_rpb(
    query: &Tensor,
    key: &Tensor,
    rpb: &Tensor,
    params: &WindowParams,
    original_height: usize,
    original_width: usize,
) -> Result<Tensor> {
    let problem = check::qk(
        query,
        key,
        rpb,
        params,
        [original_height, original_width],
        ["original_height", "original_width"],
    )?;
    let [height, width] = problem.extent;
    let [orig_h, orig_w] = problem.original;
    let k = params.kernel_size();
    let window = k * k;

    let q = query.view_f32()?;
    let kv = key.view_f32()?;
    let bias = rpb.view_f32()?;
    let (q_c, k_y, k_x, k_c) = (q.stride(4), kv.stride(2), kv.stride(3), kv.stride(4));
    let (rpb_y, rpb_x) = (bias.stride(1), bias.stride(2));

    trace!(?problem, kernel_size = k, dilation = params.dilation(), "na2d qk phase");

    let mut scores = vec![0.0f32; problem.batch * problem.heads * height * width * window];
    parallel::for_each_row(&mut scores, window, |row, out| {
        let x = row % width;
        let y = (row / width) % height;
        let bh = row / (width * height);
        let (b, h) = (bh / problem.heads, bh % problem.heads);
        if problem.is_padding([y, x]) {
            return;
        }

        let wy = params.locate(y, orig_h);
        let wx = params.locate(x, orig_w);
        let q_base = q.offset_of(&[b, h, y, x, 0]);
        let k_base = kv.offset_of(&[b, h, 0, 0, 0]);
        let rpb_base = bias.offset_of(&[h, 0, 0]);

        for ki in 0..k {
            let k_rowline = k_base + wy.neighbor(ki) * k_y;
            let rpb_row = rpb_base + wy.bias(ki) * rpb_y;
            for kj in 0..k {
                let k_pixel = k_rowline + wx.neighbor(kj) * k_x;
                let dot = q.dot(q_base, q_c, &kv, k_pixel, k_c, problem.dim);
                out[ki * k + kj] = dot + bias.get(rpb_row + wx.bias(kj) * rpb_x);
            }
        }
    })?;

    Ok(Tensor::from_f32_vec(
        scores,
        &[problem.batch, problem.heads, height, width, window],
    ))
}
