//! Stride-aware read access to tensor data.
//!
//! Inputs to the attention kernels are frequently permuted views, so kernels
//! never assume a packed row-major layout. Every element is addressed as
//! `offset + Σ index_i · stride_i` against the full backing buffer.

/// Read-only strided window over an f32 buffer.
#[derive(Debug, Clone, Copy)]
pub struct StridedView<'a> {
    data: &'a [f32],
    offset: usize,
    dims: &'a [usize],
    strides: &'a [usize],
}

impl<'a> StridedView<'a> {
    /// Build a view. `dims` and `strides` must have equal length.
    pub fn new(data: &'a [f32], offset: usize, dims: &'a [usize], strides: &'a [usize]) -> Self {
        debug_assert_eq!(dims.len(), strides.len());
        Self {
            data,
            offset,
            dims,
            strides,
        }
    }

    /// Logical dimensions.
    pub fn dims(&self) -> &'a [usize] {
        self.dims
    }

    /// Stride (in elements) of `axis`.
    #[inline]
    pub fn stride(&self, axis: usize) -> usize {
        self.strides[axis]
    }

    /// Physical offset of a multi-dimensional index.
    #[inline]
    pub fn offset_of(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.strides.len());
        index
            .iter()
            .zip(self.strides)
            .fold(self.offset, |acc, (&i, &s)| acc + i * s)
    }

    /// Element at a physical offset previously derived from `offset_of`.
    #[inline]
    pub fn get(&self, physical: usize) -> f32 {
        self.data[physical]
    }

    /// Element at a multi-dimensional index.
    #[inline]
    pub fn at(&self, index: &[usize]) -> f32 {
        self.data[self.offset_of(index)]
    }

    /// Dot product of two strided vectors of length `len`.
    #[inline]
    pub fn dot(&self, base: usize, stride: usize, other: &StridedView<'_>, other_base: usize, other_stride: usize, len: usize) -> f32 {
        let mut acc = 0.0f32;
        for c in 0..len {
            acc += self.data[base + c * stride] * other.data[other_base + c * other_stride];
        }
        acc
    }
}
