//! Input validation shared by the kernels and the attention entry points.
//!
//! Checks run in a fixed order: dtype, extents, then tensor shapes. Window
//! parameters are validated earlier, when [`WindowParams`] is built. Nothing
//! is indexed until every check has passed.

use natten_core::{DType, NattenError, Result, Tensor};

use crate::window::WindowParams;

/// Validated geometry of one neighborhood-attention call over `N` spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Problem<const N: usize> {
    pub batch: usize,
    pub heads: usize,
    /// Tensor extent per spatial axis (may include padding).
    pub extent: [usize; N],
    /// Unpadded extent per spatial axis; windows are derived from this.
    pub original: [usize; N],
    /// Channel size of the tensor the check was run against.
    pub dim: usize,
}

impl<const N: usize> Problem<N> {
    /// Spatial positions per (batch, head).
    pub fn positions(&self) -> usize {
        self.extent.iter().product()
    }

    /// Whether `coord` lies in the padded region of any axis.
    #[inline]
    pub fn is_padding(&self, coord: [usize; N]) -> bool {
        coord.iter().zip(&self.original).any(|(&c, &o)| c >= o)
    }

    fn dims_with(&self, last: usize) -> Vec<usize> {
        let mut dims = Vec::with_capacity(N + 3);
        dims.push(self.batch);
        dims.push(self.heads);
        dims.extend_from_slice(&self.extent);
        dims.push(last);
        dims
    }
}

/// Reject anything but F32.
pub fn ensure_f32(tensor: &Tensor) -> Result<()> {
    match tensor.dtype() {
        DType::F32 => Ok(()),
        other => Err(NattenError::UnsupportedDType(other)),
    }
}

fn expect_dims(param: &'static str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    if tensor.dims() != expected {
        return Err(NattenError::config(
            param,
            format!("expected shape {:?}, got {:?}", expected, tensor.dims()),
        ));
    }
    Ok(())
}

/// Read (batch, heads, extent...) off a rank `N + 3` tensor and check the
/// unpadded extents against it.
fn geometry<const N: usize>(
    param: &'static str,
    tensor: &Tensor,
    params: &WindowParams,
    original: [usize; N],
    names: [&'static str; N],
) -> Result<Problem<N>> {
    let dims = tensor.dims();
    if dims.len() != N + 3 {
        return Err(NattenError::config(
            param,
            format!("expected a rank-{} tensor, got shape {:?}", N + 3, dims),
        ));
    }
    let mut extent = [0usize; N];
    extent.copy_from_slice(&dims[2..2 + N]);

    for axis in 0..N {
        params.check_extent(names[axis], original[axis])?;
        if original[axis] > extent[axis] {
            return Err(NattenError::config(
                names[axis],
                format!(
                    "{} {} exceeds tensor extent {}",
                    names[axis], original[axis], extent[axis]
                ),
            ));
        }
    }

    Ok(Problem {
        batch: dims[0],
        heads: dims[1],
        extent,
        original,
        dim: dims[N + 2],
    })
}

/// Validate the QK phase: query and key `(batch, heads, extent..., dim)`,
/// rpb `(heads, 2k-1, ...)`.
pub fn qk<const N: usize>(
    query: &Tensor,
    key: &Tensor,
    rpb: &Tensor,
    params: &WindowParams,
    original: [usize; N],
    names: [&'static str; N],
) -> Result<Problem<N>> {
    for t in [query, key, rpb] {
        ensure_f32(t)?;
    }
    let problem = geometry("query", query, params, original, names)?;
    expect_dims("key", key, query.dims())?;

    let mut rpb_dims = vec![problem.heads];
    rpb_dims.extend(std::iter::repeat(params.rpb_extent()).take(N));
    expect_dims("rpb", rpb, &rpb_dims)?;
    Ok(problem)
}

/// Validate the AV phase: attn `(batch, heads, extent..., k^N)` and value
/// `(batch, heads, extent..., dim_v)`. The returned `dim` is `dim_v`.
pub fn av<const N: usize>(
    attn: &Tensor,
    value: &Tensor,
    params: &WindowParams,
    original: [usize; N],
    names: [&'static str; N],
) -> Result<Problem<N>> {
    ensure_f32(attn)?;
    ensure_f32(value)?;
    let problem = geometry("value", value, params, original, names)?;
    let window = params.kernel_size().pow(N as u32);
    expect_dims("attn", attn, &problem.dims_with(window))?;
    Ok(problem)
}

/// Validate a full forward call; returns the QK geometry and `dim_v`.
pub fn forward<const N: usize>(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    rpb: &Tensor,
    params: &WindowParams,
    original: [usize; N],
    names: [&'static str; N],
) -> Result<(Problem<N>, usize)> {
    ensure_f32(value)?;
    let problem = qk(query, key, rpb, params, original, names)?;

    let dims = value.dims();
    if dims.len() != N + 3 {
        return Err(NattenError::config(
            "value",
            format!("expected a rank-{} tensor, got shape {:?}", N + 3, dims),
        ));
    }
    let dim_v = dims[N + 2];
    expect_dims("value", value, &problem.dims_with(dim_v))?;
    Ok((problem, dim_v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_param(err: NattenError) -> &'static str {
        match err {
            NattenError::Configuration { param, .. } => param,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    const LEN: [&str; 1] = ["original_length"];

    #[test]
    fn test_qk_geometry() {
        let p = WindowParams::new(3, 1).unwrap();
        let q = Tensor::zeros(&[2, 4, 8, 16], DType::F32);
        let rpb = Tensor::zeros(&[4, 5], DType::F32);
        let problem = qk(&q, &q, &rpb, &p, [6], LEN).unwrap();
        assert_eq!(problem.batch, 2);
        assert_eq!(problem.heads, 4);
        assert_eq!(problem.extent, [8]);
        assert_eq!(problem.dim, 16);
        assert!(problem.is_padding([6]));
        assert!(!problem.is_padding([5]));
    }

    #[test]
    fn test_errors_name_the_parameter() {
        let p = WindowParams::new(3, 1).unwrap();
        let q = Tensor::zeros(&[1, 2, 8, 4], DType::F32);
        let rpb = Tensor::zeros(&[2, 5], DType::F32);

        let k = Tensor::zeros(&[1, 2, 8, 3], DType::F32);
        assert_eq!(config_param(qk(&q, &k, &rpb, &p, [8], LEN).unwrap_err()), "key");

        let bad_rpb = Tensor::zeros(&[2, 7], DType::F32);
        assert_eq!(config_param(qk(&q, &q, &bad_rpb, &p, [8], LEN).unwrap_err()), "rpb");

        assert_eq!(
            config_param(qk(&q, &q, &rpb, &p, [9], LEN).unwrap_err()),
            "original_length"
        );
        assert_eq!(
            config_param(qk(&q, &q, &rpb, &p, [2], LEN).unwrap_err()),
            "kernel_size"
        );

        let q3 = Tensor::zeros(&[2, 8, 4], DType::F32);
        assert_eq!(config_param(qk(&q3, &q3, &rpb, &p, [8], LEN).unwrap_err()), "query");
    }

    #[test]
    fn test_dtype_checked_first() {
        let p = WindowParams::new(3, 1).unwrap();
        let q = Tensor::zeros(&[1, 2, 8, 4], DType::F32);
        let bad = Tensor::zeros(&[1], DType::I32);
        // wrong dtype wins over the wrong rpb shape
        assert!(matches!(
            qk(&q, &q, &bad, &p, [8], LEN),
            Err(NattenError::UnsupportedDType(DType::I32))
        ));
    }

    #[test]
    fn test_av_and_forward() {
        let p = WindowParams::new(3, 1).unwrap();
        let names = ["original_height", "original_width"];
        let v = Tensor::zeros(&[1, 2, 5, 6, 7], DType::F32);
        let attn = Tensor::zeros(&[1, 2, 5, 6, 9], DType::F32);
        let problem = av(&attn, &v, &p, [5, 6], names).unwrap();
        assert_eq!(problem.dim, 7);
        assert_eq!(problem.positions(), 30);

        let short = Tensor::zeros(&[1, 2, 5, 6, 3], DType::F32);
        assert_eq!(config_param(av(&short, &v, &p, [5, 6], names).unwrap_err()), "attn");

        let q = Tensor::zeros(&[1, 2, 5, 6, 4], DType::F32);
        let rpb = Tensor::zeros(&[2, 5, 5], DType::F32);
        let (problem, dim_v) = forward(&q, &q, &v, &rpb, &p, [5, 6], names).unwrap();
        assert_eq!(problem.dim, 4);
        assert_eq!(dim_v, 7);

        let v_bad = Tensor::zeros(&[1, 2, 5, 5, 7], DType::F32);
        assert_eq!(
            config_param(forward(&q, &q, &v_bad, &rpb, &p, [5, 6], names).unwrap_err()),
            "value"
        );
    }
}
