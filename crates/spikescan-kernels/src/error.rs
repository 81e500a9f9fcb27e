//! Error types for the scan kernels

use thiserror::Error;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors that can occur at a kernel call boundary
///
/// All variants are raised before any computation starts; a failed call
/// leaves every caller-owned buffer untouched and is safe to retry after
/// correcting the inputs.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Wrong rank or mismatched row count between tensors of one invocation
    #[error("Shape mismatch for '{tensor}': expected {expected}, got {got}")]
    Shape {
        /// Name of the offending tensor argument
        tensor: String,
        /// Expected dimension description
        expected: String,
        /// Actual dimension description
        got: String,
    },

    /// Buffer is not laid out contiguously (time must be the fast axis)
    #[error("'{tensor}' has to be contiguous (row stride {stride}, row length {steps})")]
    NotContiguous {
        /// Name of the offending tensor argument
        tensor: String,
        /// Stride between consecutive rows
        stride: usize,
        /// Elements per row
        steps: usize,
    },

    /// Parameter value outside its permitted range
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Gradient was supplied on an output that does not support it
    #[error("Unsupported gradient path: {reason}")]
    UnsupportedGradient {
        /// Why this gradient path is rejected
        reason: String,
    },
}

impl KernelError {
    /// Create a shape mismatch error
    pub fn shape(
        tensor: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::Shape {
            tensor: tensor.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a contiguity error
    pub fn not_contiguous(tensor: impl Into<String>, stride: usize, steps: usize) -> Self {
        Self::NotContiguous {
            tensor: tensor.into(),
            stride,
            steps,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an unsupported gradient error
    pub fn unsupported_gradient(reason: impl Into<String>) -> Self {
        Self::UnsupportedGradient {
            reason: reason.into(),
        }
    }
}
