use std::fmt;
use std::sync::Arc;

use rand::Rng;
use smallvec::SmallVec;

use crate::autograd::{self, GradNode};
use crate::dtype::DType;
use crate::error::NattenError;
use crate::shape::{self, Shape};
use crate::storage::Storage;
use crate::view::StridedView;
use crate::Result;

/// A multi-dimensional array with explicit strides.
///
/// Tensors support:
/// - Zero-copy views (reshape, permute, transpose, narrow share storage)
/// - Stride-aware reads through [`StridedView`]
/// - Gradient tracking, so operators can declare (or refuse) a backward
///
/// # Examples
///
/// ```
/// use natten_core::Tensor;
///
/// let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
/// let tr = t.transpose(0, 1).unwrap();
/// assert_eq!(tr.shape().dims(), &[3, 2]);
/// assert!(!tr.is_contiguous());
/// assert_eq!(tr.to_f32_vec().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: SmallVec<[usize; 6]>,
    offset: usize,
    requires_grad: bool,
    grad_node: Option<Arc<GradNode>>,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    fn with_storage(storage: Storage, shape: Shape) -> Self {
        let strides = shape.contiguous_strides();
        Self {
            storage,
            shape,
            strides,
            offset: 0,
            requires_grad: false,
            grad_node: None,
        }
    }

    /// Create a tensor from f32 data with the given shape.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        Self::from_f32_vec(data.to_vec(), shape)
    }

    /// Create a tensor that takes ownership of an f32 buffer.
    pub fn from_f32_vec(data: Vec<f32>, shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "Shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        Self::with_storage(Storage::from_f32_vec(data), s)
    }

    /// Create a tensor from f64 data with the given shape.
    pub fn from_f64(data: &[f64], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(s.numel(), data.len());
        Self::with_storage(Storage::from_f64(data), s)
    }

    /// Create a tensor from i32 data with the given shape.
    pub fn from_i32(data: &[i32], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(s.numel(), data.len());
        Self::with_storage(Storage::from_i32(data), s)
    }

    /// Create a tensor of zeros with the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        Self::with_storage(Storage::zeros(dtype, s.numel()), s)
    }

    /// Create an f32 tensor filled with `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel = Shape::new(shape).numel();
        Self::from_f32_vec(vec![value; numel], shape)
    }

    /// Create a tensor of ones (f32).
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Create a tensor with values drawn from N(0, 1) using the thread RNG.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with(shape, &mut rand::thread_rng())
    }

    /// Create a tensor with values drawn from N(0, 1) using the given RNG.
    pub fn randn_with<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let numel = Shape::new(shape).numel();
        // Box-Muller transform for normal distribution
        let data: Vec<f32> = (0..numel)
            .map(|_| {
                let u1: f32 = rng.gen_range(1e-7f32..1.0f32);
                let u2: f32 = rng.gen_range(0.0f32..std::f32::consts::TAU);
                (-2.0 * u1.ln()).sqrt() * u2.cos()
            })
            .collect();
        Self::from_f32_vec(data, shape)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Shape of the tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Dimension sizes.
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Strides (in elements, not bytes).
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Offset of the first element in the backing storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Backing storage (shared with every view of it).
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether this tensor is contiguous in memory (row-major).
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides() && self.offset == 0
    }

    // =========================================================================
    // Autograd
    // =========================================================================

    /// Whether this tensor requires gradient computation.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Set whether this tensor requires gradient computation.
    /// When enabled, creates a leaf GradNode for this tensor.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
        if requires_grad && self.grad_node.is_none() {
            self.grad_node = Some(GradNode::leaf());
        }
        if !requires_grad {
            self.grad_node = None;
        }
    }

    /// Get the GradNode for this tensor (if tracking gradients).
    pub fn grad_node(&self) -> Option<&Arc<GradNode>> {
        self.grad_node.as_ref()
    }

    /// Attach a GradNode to this tensor (used by op dispatch).
    pub fn with_grad_node(mut self, node: Arc<GradNode>) -> Self {
        self.grad_node = Some(node);
        self.requires_grad = true;
        self
    }

    /// Get the accumulated gradient for this tensor.
    pub fn grad(&self) -> Option<Tensor> {
        self.grad_node.as_ref().and_then(|n| n.get_grad())
    }

    /// Whether ops on this tensor should record graph nodes.
    pub fn tracks_grad(&self) -> bool {
        self.requires_grad && self.grad_node.is_some() && autograd::is_grad_enabled()
    }

    /// Run the backward pass from this tensor (must be scalar).
    pub fn backward(&self) -> Result<()> {
        if self.numel() != 1 {
            return Err(NattenError::ShapeMismatch {
                expected: vec![1],
                got: self.dims().to_vec(),
            });
        }
        self.backward_with(Tensor::ones(self.dims()))
    }

    /// Run the backward pass seeded with an explicit output gradient.
    pub fn backward_with(&self, grad_output: Tensor) -> Result<()> {
        if grad_output.dims() != self.dims() {
            return Err(NattenError::ShapeMismatch {
                expected: self.dims().to_vec(),
                got: grad_output.dims().to_vec(),
            });
        }
        let node = self.grad_node.as_ref().ok_or_else(|| {
            NattenError::StorageError("backward() called on tensor without grad tracking".into())
        })?;
        autograd::backward(node, grad_output)
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Get the underlying f32 data as a slice (contiguous tensors only).
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if !self.is_contiguous() {
            return None;
        }
        let slice = self.storage.as_f32_slice()?;
        slice.get(..self.numel())
    }

    /// Get the underlying i32 data as a slice (contiguous tensors only).
    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        if !self.is_contiguous() {
            return None;
        }
        let slice = self.storage.as_i32_slice()?;
        slice.get(..self.numel())
    }

    /// Stride-aware read view of an f32 tensor.
    pub fn view_f32(&self) -> Result<StridedView<'_>> {
        let data = self
            .storage
            .as_f32_slice()
            .ok_or(NattenError::UnsupportedDType(self.dtype()))?;
        Ok(StridedView::new(data, self.offset, self.shape.dims(), &self.strides))
    }

    /// Get a single f32 element by logical flat index.
    pub fn get_f32(&self, flat_index: usize) -> Option<f32> {
        let slice = self.storage.as_f32_slice()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    /// Copy the elements out in logical (row-major) order, widening to f32.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if let Some(slice) = self.as_f32_slice() {
            return Ok(slice.to_vec());
        }
        let numel = self.numel();
        match self.dtype() {
            DType::F32 => {
                let src = self.storage.as_f32_slice().unwrap_or_default();
                self.gather(src, numel)
            }
            DType::F64 => {
                let src = self.storage.as_f64_slice().unwrap_or_default();
                Ok(self.gather(src, numel)?.into_iter().map(|v| v as f32).collect())
            }
            other => Err(NattenError::UnsupportedDType(other)),
        }
    }

    /// Copy the elements of an i32 tensor out in logical order.
    pub fn to_i32_vec(&self) -> Result<Vec<i32>> {
        let src = self
            .storage
            .as_i32_slice()
            .ok_or(NattenError::UnsupportedDType(self.dtype()))?;
        self.gather(src, self.numel())
    }

    fn gather<T: Copy>(&self, src: &[T], numel: usize) -> Result<Vec<T>> {
        (0..numel)
            .map(|i| {
                self.flat_to_physical(i)
                    .and_then(|p| src.get(p).copied())
                    .ok_or_else(|| {
                        NattenError::StorageError(format!(
                            "logical index {i} maps outside storage of {} elements",
                            src.len()
                        ))
                    })
            })
            .collect()
    }

    /// Convert a logical flat index to a physical storage index.
    fn flat_to_physical(&self, flat_index: usize) -> Option<usize> {
        if flat_index >= self.numel() {
            return None;
        }
        let mut remaining = flat_index;
        let mut physical = self.offset;
        for (axis, &dim) in self.shape.dims().iter().enumerate().rev() {
            physical += (remaining % dim) * self.strides[axis];
            remaining /= dim;
        }
        Some(physical)
    }

    // =========================================================================
    // Shape operations (zero-copy views)
    // =========================================================================

    fn view_with(&self, shape: Shape, strides: SmallVec<[usize; 6]>, offset: usize) -> Tensor {
        Tensor {
            storage: self.storage.clone(),
            shape,
            strides,
            offset,
            requires_grad: self.requires_grad,
            grad_node: self.grad_node.clone(),
        }
    }

    /// Reshape the tensor (zero-copy; the tensor must be contiguous).
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let resolved = self.shape.resolve_reshape(new_shape).ok_or_else(|| {
            NattenError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.iter().map(|&d| d as usize).collect(),
            }
        })?;

        if !self.is_contiguous() {
            return Err(NattenError::StorageError(
                "Cannot reshape non-contiguous tensor (call .contiguous() first)".into(),
            ));
        }

        let strides = resolved.contiguous_strides();
        Ok(self.view_with(resolved, strides, self.offset))
    }

    /// Reorder dimensions (zero-copy view).
    pub fn permute(&self, order: &[usize]) -> Result<Tensor> {
        let new_shape = self.shape.permute(order).ok_or_else(|| NattenError::ShapeMismatch {
            expected: (0..self.ndim()).collect(),
            got: order.to_vec(),
        })?;
        let strides = order.iter().map(|&axis| self.strides[axis]).collect();
        Ok(self.view_with(new_shape, strides, self.offset))
    }

    /// Swap two dimensions (zero-copy view).
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Tensor> {
        let ndim = self.ndim();
        for axis in [dim0, dim1] {
            if axis >= ndim {
                return Err(NattenError::InvalidAxis { axis, ndim });
            }
        }
        let mut order: SmallVec<[usize; 6]> = (0..ndim).collect();
        order.swap(dim0, dim1);
        debug_assert!(shape::is_permutation(&order, ndim));
        self.permute(&order)
    }

    /// Restrict `dim` to `start..start + len` (zero-copy view).
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Tensor> {
        let ndim = self.ndim();
        if dim >= ndim {
            return Err(NattenError::InvalidAxis { axis: dim, ndim });
        }
        let extent = self.dims()[dim];
        if start + len > extent {
            return Err(NattenError::ShapeMismatch {
                expected: vec![extent],
                got: vec![start + len],
            });
        }
        let mut dims = self.dims().to_vec();
        dims[dim] = len;
        let offset = self.offset + start * self.strides[dim];
        Ok(self.view_with(Shape::from(dims), self.strides.clone(), offset))
    }

    /// Return a contiguous copy of this tensor if it isn't already contiguous.
    pub fn contiguous(&self) -> Result<Tensor> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let mut t = match self.dtype() {
            DType::I32 => Tensor::from_i32(&self.to_i32_vec()?, self.dims()),
            DType::F64 => {
                let src = self.storage.as_f64_slice().unwrap_or_default();
                Tensor::from_f64(&self.gather(src, self.numel())?, self.dims())
            }
            _ => Tensor::from_f32_vec(self.to_f32_vec()?, self.dims()),
        };
        t.requires_grad = self.requires_grad;
        t.grad_node = self.grad_node.clone();
        Ok(t)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, strides={:?}, dtype={}, contiguous={}, requires_grad={})",
            self.shape,
            self.strides.as_slice(),
            self.dtype(),
            self.is_contiguous(),
            self.requires_grad,
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_f32_vec() {
            Ok(data) if data.len() <= 20 => write!(f, "tensor({:?}, shape={})", data, self.shape),
            Ok(data) if !data.is_empty() => write!(
                f,
                "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                data[0],
                data[1],
                data[data.len() - 1],
                self.shape
            ),
            _ => write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype()),
        }
    }
}
