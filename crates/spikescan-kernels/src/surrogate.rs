//! Surrogate gradient strategy seam
//!
//! Spike emission is a step nonlinearity with zero derivative almost
//! everywhere, so the backward kernels evaluate a caller-chosen surrogate
//! instead. The strategy is picked once at layer construction time and
//! threaded through as an opaque handle; this crate defines only the seam,
//! not any particular surrogate shape.

use crate::Float;

/// Surrogate derivative of the spike nonlinearity
///
/// Implementations must be pure: the returned value may depend only on the
/// membrane potential and the firing threshold. The backward kernels call
/// this once per element of the saved membrane trace.
pub trait SurrogateGradient {
    /// Surrogate derivative at membrane potential `v_mem` for the given
    /// firing threshold
    fn surrogate_grad(&self, v_mem: Float, threshold: Float) -> Float;
}

/// Any plain `(v_mem, threshold) -> derivative` closure is a valid strategy
impl<F> SurrogateGradient for F
where
    F: Fn(Float, Float) -> Float,
{
    fn surrogate_grad(&self, v_mem: Float, threshold: Float) -> Float {
        self(v_mem, threshold)
    }
}
