//! Tensor save/load using the safetensors format.
//!
//! Used to capture reference fixtures: a set of named input tensors plus the
//! expected outputs, compared after reload with `allclose`.

use std::collections::HashMap;
use std::path::Path;

use safetensors::tensor::{serialize, TensorView};
use safetensors::SafeTensors;

use crate::dtype::DType;
use crate::error::NattenError;
use crate::tensor::Tensor;
use crate::Result;

/// Serialize named tensors into a safetensors byte buffer.
///
/// F32, F64 and I32 tensors are written natively; strided views are
/// compacted first.
pub fn serialize_tensors(tensors: &HashMap<String, Tensor>) -> Result<Vec<u8>> {
    let mut buffers: Vec<(&str, safetensors::Dtype, Vec<usize>, &[u8])> = Vec::new();
    let compacted = tensors
        .iter()
        .map(|(name, tensor)| Ok((name.as_str(), tensor.contiguous()?)))
        .collect::<Result<Vec<_>>>()?;

    for (name, data) in &compacted {
        let dtype = match data.dtype() {
            DType::F32 => safetensors::Dtype::F32,
            DType::F64 => safetensors::Dtype::F64,
            DType::I32 => safetensors::Dtype::I32,
            other => return Err(NattenError::UnsupportedDType(other)),
        };
        // the backing buffer may be longer than the view
        let len = data.numel() * data.dtype().element_size();
        let bytes = &data.storage().as_bytes()[..len];
        buffers.push((*name, dtype, data.dims().to_vec(), bytes));
    }

    let mut views = Vec::with_capacity(buffers.len());
    for (name, dtype, shape, bytes) in &buffers {
        let view = TensorView::new(*dtype, shape.clone(), bytes)
            .map_err(|e| NattenError::StorageError(format!("safetensors view error: {}", e)))?;
        views.push((*name, view));
    }

    serialize(views, &None)
        .map_err(|e| NattenError::StorageError(format!("safetensors serialize error: {}", e)))
}

/// Parse a safetensors byte buffer into named tensors.
///
/// F16, BF16 and F64 entries are widened to F32.
pub fn deserialize_tensors(bytes: &[u8]) -> Result<HashMap<String, Tensor>> {
    let tensors = SafeTensors::deserialize(bytes)
        .map_err(|e| NattenError::StorageError(format!("safetensors parse error: {}", e)))?;

    let mut result = HashMap::new();
    for (name, view) in tensors.tensors() {
        result.insert(name.to_string(), view_to_tensor(&view)?);
    }
    Ok(result)
}

/// Save named tensors to a safetensors file.
pub fn save_tensors(tensors: &HashMap<String, Tensor>, path: &Path) -> Result<()> {
    let serialized = serialize_tensors(tensors)?;
    std::fs::write(path, serialized)
        .map_err(|e| NattenError::StorageError(format!("Failed to write {}: {}", path.display(), e)))
}

/// Load named tensors from a safetensors file.
pub fn load_tensors(path: &Path) -> Result<HashMap<String, Tensor>> {
    let data = std::fs::read(path)
        .map_err(|e| NattenError::StorageError(format!("Failed to read {}: {}", path.display(), e)))?;
    deserialize_tensors(&data)
}

fn view_to_tensor(view: &TensorView<'_>) -> Result<Tensor> {
    let shape: Vec<usize> = view.shape().to_vec();
    let data = view.data();

    let tensor = match view.dtype() {
        safetensors::Dtype::F32 => {
            let values = data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Tensor::from_f32_vec(values, &shape)
        }
        safetensors::Dtype::F16 => {
            let values = data
                .chunks_exact(2)
                .map(|b| half::f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
                .collect();
            Tensor::from_f32_vec(values, &shape)
        }
        safetensors::Dtype::BF16 => {
            let values = data
                .chunks_exact(2)
                .map(|b| half::bf16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
                .collect();
            Tensor::from_f32_vec(values, &shape)
        }
        safetensors::Dtype::F64 => {
            let values = data
                .chunks_exact(8)
                .map(|b| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    f64::from_le_bytes(raw) as f32
                })
                .collect();
            Tensor::from_f32_vec(values, &shape)
        }
        safetensors::Dtype::I32 => {
            let values: Vec<i32> = data
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Tensor::from_i32(&values, &shape)
        }
        other => {
            return Err(NattenError::StorageError(format!(
                "Unsupported safetensors dtype: {:?}",
                other
            )))
        }
    };
    Ok(tensor)
}
