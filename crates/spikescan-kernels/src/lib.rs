//! Fused forward/backward scan kernels for spiking neuron dynamics
//!
//! This crate implements the temporal-recurrence core used to train spiking
//! neural networks with surrogate gradients: a leaky-integrator scan with a
//! learnable decay factor, and an integrate-and-fire scan with thresholded
//! spike emission, subtractive reset, and an optional lower bound, each with
//! a matching custom backward pass.
//!
//! Callers hand in flattened 2D rasters (one row per independent neuron
//! instance, time as the fast axis) together with per-row or broadcast
//! parameters; the kernels never see the caller's full tensor shape. Rows are
//! computed in parallel (one lane per row) while the recurrence stays
//! strictly sequential along the time axis.
//!
//! The layer object that owns shapes, neuron state between calls, and the
//! choice of surrogate strategy lives outside this crate; kernels return new
//! state instead of mutating shared buffers, and the caller decides what to
//! persist.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod error;
pub mod fire;
pub mod leaky;
pub mod raster;
pub mod surrogate;

mod parallel;

// Re-export essential types
pub use error::{KernelError, Result};
pub use fire::{fire_backward, fire_forward, FireGrad, FireOutput, FireParams};
pub use leaky::{leaky_backward, leaky_forward, LeakyGrad};
pub use raster::{Raster, RasterView, RowParam};
pub use surrogate::SurrogateGradient;

/// Scalar element type shared by every kernel buffer
pub type Float = f32;

/// Kernel crate version for compatibility checking
pub const KERNELS_VERSION: u32 = 1;
