//! Dense multi-head attention over the whole sequence.
//!
//! Attention(Q, K, V) = softmax(Q @ K^T * scale) @ V
//!
//! Reference for the neighborhood kernels: with `kernel_size == length`, a
//! zero RPB and `scale = Some(1.0)`, `natten1d` computes the same thing.

use natten_core::{NattenError, Result, Tensor};
use natten_kernels::check::ensure_f32;
use natten_kernels::parallel;
use natten_kernels::softmax_in_place;

/// Full-sequence attention.
///
/// # Arguments
/// * `query` - `(batch, heads, seq_q, d_k)`
/// * `key`   - `(batch, heads, seq_k, d_k)`
/// * `value` - `(batch, heads, seq_k, d_v)`
/// * `scale` - Optional scaling factor (default: `1/sqrt(d_k)`)
///
/// # Returns
/// * `(batch, seq_q, heads * d_v)`, heads side by side like `natten1d`
pub fn fmha_forward(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    scale: Option<f32>,
) -> Result<Tensor> {
    for t in [query, key, value] {
        ensure_f32(t)?;
    }

    let (q_dims, k_dims, v_dims) = (query.dims(), key.dims(), value.dims());
    if q_dims.len() != 4 {
        return Err(NattenError::config(
            "query",
            format!("expected (batch, heads, seq, dim), got {:?}", q_dims),
        ));
    }
    let (batch, heads, seq_q, d_k) = (q_dims[0], q_dims[1], q_dims[2], q_dims[3]);
    if k_dims.len() != 4 || k_dims[0] != batch || k_dims[1] != heads || k_dims[3] != d_k {
        return Err(NattenError::config(
            "key",
            format!("expected ({batch}, {heads}, _, {d_k}), got {:?}", k_dims),
        ));
    }
    let seq_k = k_dims[2];
    if v_dims.len() != 4 || v_dims[0] != batch || v_dims[1] != heads || v_dims[2] != seq_k {
        return Err(NattenError::config(
            "value",
            format!("expected ({batch}, {heads}, {seq_k}, _), got {:?}", v_dims),
        ));
    }
    let d_v = v_dims[3];

    let scale_factor = scale.unwrap_or(1.0 / (d_k as f32).sqrt());

    let q = query.view_f32()?;
    let k = key.view_f32()?;
    let v = value.view_f32()?;
    let (q_c, k_l, k_c, v_l, v_c) = (q.stride(3), k.stride(2), k.stride(3), v.stride(2), v.stride(3));

    let row_len = heads * d_v;
    let mut output = vec![0.0f32; batch * seq_q * row_len];
    parallel::for_each_row(&mut output, row_len, |row, out_row| {
        let (b, i) = (row / seq_q, row % seq_q);
        let mut scores = vec![0.0f32; seq_k];

        for (h, acc) in out_row.chunks_mut(d_v).enumerate() {
            let q_base = q.offset_of(&[b, h, i, 0]);
            let k_base = k.offset_of(&[b, h, 0, 0]);
            let v_base = v.offset_of(&[b, h, 0, 0]);

            // scores = q @ K^T * scale
            for (j, s) in scores.iter_mut().enumerate() {
                *s = q.dot(q_base, q_c, &k, k_base + j * k_l, k_c, d_k) * scale_factor;
            }
            softmax_in_place(&mut scores);

            // out = weights @ V
            for (j, &w) in scores.iter().enumerate() {
                let v_row = v_base + j * v_l;
                for (c, slot) in acc.iter_mut().enumerate() {
                    *slot += w * v.get(v_row + c * v_c);
                }
            }
        }
    })?;

    Ok(Tensor::from_f32_vec(output, &[batch, seq_q, row_len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_weights_average_values() {
        // identical keys: every query sees a uniform distribution
        let q = Tensor::randn(&[1, 1, 4, 2]);
        let k = Tensor::ones(&[1, 1, 4, 2]);
        let v = Tensor::from_f32(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0], &[1, 1, 4, 2]);
        let out = fmha_forward(&q, &k, &v, None).unwrap();
        assert_eq!(out.dims(), &[1, 4, 2]);
        for row in out.as_f32_slice().unwrap().chunks(2) {
            assert!((row[0] - 0.5).abs() < 1e-5);
            assert!((row[1] - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cross_attention_lengths() {
        let q = Tensor::randn(&[2, 3, 5, 4]);
        let k = Tensor::randn(&[2, 3, 7, 4]);
        let v = Tensor::randn(&[2, 3, 7, 6]);
        let out = fmha_forward(&q, &k, &v, Some(0.5)).unwrap();
        assert_eq!(out.dims(), &[2, 5, 18]);
        assert!(out.as_f32_slice().unwrap().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_mismatched_key_dim_rejected() {
        let q = Tensor::randn(&[1, 2, 4, 4]);
        let k = Tensor::randn(&[1, 2, 4, 3]);
        match fmha_forward(&q, &k, &k, None) {
            Err(NattenError::Configuration { param, .. }) => assert_eq!(param, "key"),
            other => panic!("expected key error, got {other:?}"),
        }
    }
}
