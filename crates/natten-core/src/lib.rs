//! # natten-core
//!
//! Core tensor engine for natten-rs.
//!
//! Provides the foundational `Tensor` type with:
//! - F32 compute dtype, I32 index tables, F16/BF16/F64 on-disk formats
//! - Zero-copy views (reshape, permute, transpose, narrow)
//! - A stride-aware read accessor (`StridedView`) used by every kernel
//! - A minimal autograd graph so operators can declare their backward
//! - safetensors I/O for captured tensor fixtures

pub mod dtype;
pub mod storage;
pub mod shape;
pub mod view;
pub mod tensor;
pub mod ops;
pub mod autograd;
pub mod io;
pub mod error;

pub use dtype::DType;
pub use storage::Storage;
pub use shape::Shape;
pub use view::StridedView;
pub use tensor::Tensor;
pub use error::NattenError;

pub type Result<T> = std::result::Result<T, NattenError>;
