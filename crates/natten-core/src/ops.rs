//! Tensor operations: arithmetic and comparison.
//!
//! All operations return new tensors (functional style) and read their
//! inputs through strides, so permuted views need no explicit copy.

pub mod arithmetic;
pub mod comparison;
