use crate::dtype::DType;

/// Errors raised by natten-rs.
///
/// `Configuration` and `Unsupported` are the two caller-facing categories of
/// the attention operators; the remaining variants come from the tensor core.
#[derive(Debug, thiserror::Error)]
pub enum NattenError {
    /// A window or tensor parameter is invalid. `param` names the offender.
    #[error("invalid configuration for '{param}': {reason}")]
    Configuration { param: &'static str, reason: String },

    /// The requested operation exists in the API but is not implemented.
    #[error("unsupported operation: {op}")]
    Unsupported { op: String },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("unsupported dtype: {0}")]
    UnsupportedDType(DType),

    #[error("cannot reshape {numel} elements into {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<usize> },

    #[error("axis {axis} out of range for tensor of rank {ndim}")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("storage error: {0}")]
    StorageError(String),

    /// Compute backend failed to initialize.
    #[error("backend error: {0}")]
    Backend(String),
}

impl NattenError {
    /// Shorthand for a `Configuration` error.
    pub fn config(param: &'static str, reason: impl Into<String>) -> Self {
        NattenError::Configuration {
            param,
            reason: reason.into(),
        }
    }

    /// Shorthand for an `Unsupported` error.
    pub fn unsupported(op: impl Into<String>) -> Self {
        NattenError::Unsupported { op: op.into() }
    }

    /// Whether this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, NattenError::Configuration { .. })
    }

    /// Whether this is an unsupported-operation error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, NattenError::Unsupported { .. })
    }
}
