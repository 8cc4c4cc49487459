use std::sync::Arc;

use crate::DType;

/// Typed CPU buffer behind a tensor.
///
/// Buffers are kept typed (rather than raw bytes) so slices are always
/// correctly aligned, including for empty tensors.
#[derive(Debug, Clone)]
pub enum StorageData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
}

/// Shared, reference-counted tensor storage.
///
/// Views produced by reshape/permute/narrow clone the `Arc`, never the data.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<StorageData>,
}

impl Storage {
    /// Allocate zero-filled storage for `numel` elements of the given dtype.
    ///
    /// Half-precision dtypes are widened, so they allocate `F32`.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        let data = match dtype {
            DType::F64 => StorageData::F64(vec![0.0; numel]),
            DType::I32 => StorageData::I32(vec![0; numel]),
            DType::F16 | DType::BF16 | DType::F32 => StorageData::F32(vec![0.0; numel]),
        };
        Self {
            data: Arc::new(data),
        }
    }

    /// Take ownership of an f32 buffer.
    pub fn from_f32_vec(data: Vec<f32>) -> Self {
        Self {
            data: Arc::new(StorageData::F32(data)),
        }
    }

    /// Create storage from a slice of f32 values.
    pub fn from_f32(data: &[f32]) -> Self {
        Self::from_f32_vec(data.to_vec())
    }

    /// Create storage from a slice of f64 values.
    pub fn from_f64(data: &[f64]) -> Self {
        Self {
            data: Arc::new(StorageData::F64(data.to_vec())),
        }
    }

    /// Create storage from a slice of i32 values.
    pub fn from_i32(data: &[i32]) -> Self {
        Self {
            data: Arc::new(StorageData::I32(data.to_vec())),
        }
    }

    /// Get the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self.data.as_ref() {
            StorageData::F32(_) => DType::F32,
            StorageData::F64(_) => DType::F64,
            StorageData::I32(_) => DType::I32,
        }
    }

    /// Number of elements held by the buffer.
    pub fn numel(&self) -> usize {
        match self.data.as_ref() {
            StorageData::F32(v) => v.len(),
            StorageData::F64(v) => v.len(),
            StorageData::I32(v) => v.len(),
        }
    }

    /// Raw native-endian bytes of the whole buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match self.data.as_ref() {
            StorageData::F32(v) => bytemuck::cast_slice(v),
            StorageData::F64(v) => bytemuck::cast_slice(v),
            StorageData::I32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Interpret storage as a slice of f32 values.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self.data.as_ref() {
            StorageData::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret storage as a slice of f64 values.
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match self.data.as_ref() {
            StorageData::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret storage as a slice of i32 values.
    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        match self.data.as_ref() {
            StorageData::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Whether two storages share the same buffer.
    pub fn same_buffer(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
