//! Stateless neighborhood-attention forward passes.
//!
//! `na1d_forward` / `na2d_forward` run the full pipeline
//! (QK+RPB → window softmax → AV). The `natten*qkrpb` / `natten*av` entry
//! points expose the two kernel phases on their own.
//!
//! Validation order is dtype, window parameters, extents, then shapes.
//! Every check runs before any window index is computed.

use natten_core::{Result, Tensor};
use natten_kernels::check;
use natten_kernels::{na1d_av, na1d_qk_rpb, na2d_av, na2d_qk_rpb, window_softmax, WindowParams};

use crate::config::NeighborhoodConfig;

const LENGTH: [&str; 1] = ["original_length"];
const HEIGHT_WIDTH: [&str; 2] = ["original_height", "original_width"];

fn ensure_all_f32(tensors: &[&Tensor]) -> Result<()> {
    tensors.iter().try_for_each(|t| check::ensure_f32(t))
}

/// 1-D neighborhood attention.
///
/// * `query`, `key` - `(batch, heads, length, dim)`
/// * `value`        - `(batch, heads, length, dim_v)`
/// * `rpb`          - `(heads, 2 * kernel_size - 1)`
///
/// Returns `(batch, length, heads * dim_v)`. Scores are not scaled; scale the
/// query beforehand if needed.
pub fn na1d_forward(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    rpb: &Tensor,
    config: &NeighborhoodConfig,
    original_length: usize,
) -> Result<Tensor> {
    ensure_all_f32(&[query, key, value, rpb])?;
    let params = config.window_params()?;
    let (_, dim_v) = check::forward(query, key, value, rpb, &params, [original_length], LENGTH)?;

    tracing::debug!(
        query = ?query.dims(),
        dim_v,
        kernel_size = params.kernel_size(),
        dilation = params.dilation(),
        original_length,
        "na1d forward"
    );

    let scores = na1d_qk_rpb(query, key, rpb, &params, original_length)?;
    let attn = window_softmax(&scores)?;
    na1d_av(&attn, value, &params, original_length)
}

/// 2-D neighborhood attention.
///
/// * `query`, `key` - `(batch, heads, height, width, dim)`
/// * `value`        - `(batch, heads, height, width, dim_v)`
/// * `rpb`          - `(heads, 2 * kernel_size - 1, 2 * kernel_size - 1)`
///
/// Returns `(batch, height, width, heads * dim_v)`.
pub fn na2d_forward(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    rpb: &Tensor,
    config: &NeighborhoodConfig,
    original_height: usize,
    original_width: usize,
) -> Result<Tensor> {
    ensure_all_f32(&[query, key, value, rpb])?;
    let params = config.window_params()?;
    let original = [original_height, original_width];
    let (_, dim_v) = check::forward(query, key, value, rpb, &params, original, HEIGHT_WIDTH)?;

    tracing::debug!(
        query = ?query.dims(),
        dim_v,
        kernel_size = params.kernel_size(),
        dilation = params.dilation(),
        original_height,
        original_width,
        "na2d forward"
    );

    let scores = na2d_qk_rpb(query, key, rpb, &params, original_height, original_width)?;
    let attn = window_softmax(&scores)?;
    na2d_av(&attn, value, &params, original_height, original_width)
}

/// 1-D QK phase: raw scores `(batch, heads, length, kernel_size)`.
pub fn natten1dqkrpb(
    query: &Tensor,
    key: &Tensor,
    rpb: &Tensor,
    kernel_size: usize,
    dilation: usize,
    original_length: usize,
) -> Result<Tensor> {
    ensure_all_f32(&[query, key, rpb])?;
    let params = WindowParams::new(kernel_size, dilation)?;
    na1d_qk_rpb(query, key, rpb, &params, original_length)
}

/// 1-D AV phase: `(batch, length, heads * dim_v)` from weights and values.
pub fn natten1dav(
    attn: &Tensor,
    value: &Tensor,
    kernel_size: usize,
    dilation: usize,
    original_length: usize,
) -> Result<Tensor> {
    ensure_all_f32(&[attn, value])?;
    let params = WindowParams::new(kernel_size, dilation)?;
    na1d_av(attn, value, &params, original_length)
}

/// 2-D QK phase: raw scores `(batch, heads, height, width, kernel_size²)`.
pub fn natten2dqkrpb(
    query: &Tensor,
    key: &Tensor,
    rpb: &Tensor,
    kernel_size: usize,
    dilation: usize,
    original_height: usize,
    original_width: usize,
) -> Result<Tensor> {
    ensure_all_f32(&[query, key, rpb])?;
    let params = WindowParams::new(kernel_size, dilation)?;
    na2d_qk_rpb(query, key, rpb, &params, original_height, original_width)
}

/// 2-D AV phase: `(batch, height, width, heads * dim_v)`.
pub fn natten2dav(
    attn: &Tensor,
    value: &Tensor,
    kernel_size: usize,
    dilation: usize,
    original_height: usize,
    original_width: usize,
) -> Result<Tensor> {
    ensure_all_f32(&[attn, value])?;
    let params = WindowParams::new(kernel_size, dilation)?;
    na2d_av(attn, value, &params, original_height, original_width)
}
