//! Element-wise arithmetic operations on tensors.

use crate::autograd::{graph_input, AddBackward, GradNode};
use crate::dtype::DType;
use crate::error::NattenError;
use crate::tensor::Tensor;
use crate::Result;

impl Tensor {
    /// Element-wise addition: self + other. Records `AddBackward` when
    /// either operand tracks gradients.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        let out = binary_op(self, other, |a, b| a + b)?;
        if !(self.tracks_grad() || other.tracks_grad()) {
            return Ok(out);
        }
        let node = GradNode::with_grad_fn(
            Box::new(AddBackward),
            vec![graph_input(self), graph_input(other)],
        );
        Ok(out.with_grad_node(node))
    }
}

/// Apply a binary operation element-wise on equal shapes (f32 only).
fn binary_op(a: &Tensor, b: &Tensor, op: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
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

    let result: Vec<f32> = match (a.as_f32_slice(), b.as_f32_slice()) {
        // Fast path: both contiguous
        (Some(x), Some(y)) => x.iter().zip(y).map(|(&p, &q)| op(p, q)).collect(),
        _ => {
            let x = a.to_f32_vec()?;
            let y = b.to_f32_vec()?;
            x.into_iter().zip(y).map(|(p, q)| op(p, q)).collect()
        }
    };

    Ok(Tensor::from_f32_vec(result, a.dims()))
}
