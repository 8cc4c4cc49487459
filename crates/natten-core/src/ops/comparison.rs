//! Comparison operations on tensors.

use crate::dtype::DType;
use crate::error::NattenError;
use crate::tensor::Tensor;
use crate::Result;

impl Tensor {
    /// Largest absolute element-wise difference between two tensors.
    ///
    /// NaNs in either operand make the result NaN.
    pub fn max_abs_diff(&self, other: &Tensor) -> Result<f32> {
        let (a, b) = comparable(self, other)?;
        Ok(a.iter().zip(&b).fold(0.0f32, |acc, (&x, &y)| {
            let d = (x - y).abs();
            if d.is_nan() || acc.is_nan() {
                f32::NAN
            } else {
                acc.max(d)
            }
        }))
    }

    /// Whether `|self - other| <= atol + rtol * |other|` holds element-wise.
    ///
    /// Equal infinities compare close; NaN never does.
    pub fn allclose(&self, other: &Tensor, rtol: f32, atol: f32) -> Result<bool> {
        let (a, b) = comparable(self, other)?;
        Ok(a.iter().zip(&b).all(|(&x, &y)| {
            if x == y {
                return true;
            }
            (x - y).abs() <= atol + rtol * y.abs()
        }))
    }
}

fn comparable(a: &Tensor, b: &Tensor) -> Result<(Vec<f32>, Vec<f32>)> {
    if a.dtype() != DType::F32 || b.dtype() != DType::F32 {
        return Err(NattenError::DTypeMismatch {
            expected: a.dtype(),
            got: b.dtype(),
        });
    }
    if a.shape() != b.shape() {
        return Err(NattenError::ShapeMismatch {
            expected: a.dims().to_vec(),
            got: b.dims().to_vec(),
        });
    }
    Ok((a.to_f32_vec()?, b.to_f32_vec()?))
}
