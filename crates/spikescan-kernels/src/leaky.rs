//! Leaky-integrator scan kernels
//!
//! Exponential-decay accumulation over time with a learnable decay factor
//! and no nonlinearity. Used for synaptic current filtering and as the
//! non-spiking membrane mode. Each row evolves independently; the time
//! recurrence is strictly sequential within a row.

use crate::error::Result;
use crate::parallel::{fill_per_row, for_each_row};
use crate::raster::{ensure_contiguous, ensure_shape, ensure_state_len, Raster, RasterView, RowParam};
use crate::Float;

/// Gradients produced by [`leaky_backward`]
#[derive(Debug, Clone)]
pub struct LeakyGrad {
    /// Gradient with respect to the input currents, same shape as the input
    pub grad_input: Raster,
    /// Gradient with respect to the per-row decay factor, when requested
    pub grad_alpha: Option<Vec<Float>>,
}

/// Leaky-integrator forward scan
///
/// Computes `s[n,t] = alpha[n] * s[n,t-1] + input[n,t]` with
/// `s[n,-1] = state0[n]` and returns the full trace. The caller persists the
/// last column as the next invocation's initial state.
///
/// # Errors
///
/// Fails before any computation if `input` is not contiguous, if `state0` or
/// a per-row `alpha` does not have one entry per row, or if any decay value
/// lies outside `[0, 1]`.
pub fn leaky_forward(
    input: RasterView<'_>,
    state0: &[Float],
    alpha: RowParam<'_>,
) -> Result<Raster> {
    let (rows, steps) = (input.rows(), input.steps());
    ensure_contiguous("input", &input)?;
    ensure_state_len("state0", state0, rows)?;
    alpha.validate_rows("alpha", rows)?;
    alpha.validate_range("alpha", 0.0, 1.0)?;

    log::debug!("leaky_forward: {} rows x {} steps", rows, steps);

    let mut trace = Raster::zeros(rows, steps);
    if steps == 0 {
        return Ok(trace);
    }

    for_each_row(trace.data_mut(), steps, |n, out_row| {
        let a = alpha.get(n);
        let mut s = state0[n];
        for (t, &x) in input.row(n).iter().enumerate() {
            s = a * s + x;
            out_row[t] = s;
        }
    });

    Ok(trace)
}

/// Leaky-integrator backward scan
///
/// Accumulates the adjoint recurrence `g[n,t] = grad_trace[n,t] +
/// alpha[n] * g[n,t+1]` from the last step down to the first; `g` is the
/// gradient with respect to the input. When `needs_alpha_grad` is set, the
/// decay gradient `sum_t g[n,t] * s[n,t-1]` is accumulated as well from the
/// saved forward trace (with `s[n,-1] = state0[n]`); otherwise that pass is
/// skipped entirely.
///
/// # Errors
///
/// Same validation as [`leaky_forward`], applied to both the upstream
/// gradient and the saved trace.
pub fn leaky_backward(
    grad_trace: RasterView<'_>,
    saved_trace: RasterView<'_>,
    state0: &[Float],
    alpha: RowParam<'_>,
    needs_alpha_grad: bool,
) -> Result<LeakyGrad> {
    let (rows, steps) = (grad_trace.rows(), grad_trace.steps());
    ensure_contiguous("grad_trace", &grad_trace)?;
    ensure_shape("saved_trace", &saved_trace, rows, steps)?;
    ensure_contiguous("saved_trace", &saved_trace)?;
    ensure_state_len("state0", state0, rows)?;
    alpha.validate_rows("alpha", rows)?;
    alpha.validate_range("alpha", 0.0, 1.0)?;

    log::debug!(
        "leaky_backward: {} rows x {} steps, alpha grad: {}",
        rows,
        steps,
        needs_alpha_grad
    );

    let mut grad_input = Raster::zeros(rows, steps);
    if steps == 0 {
        return Ok(LeakyGrad {
            grad_input,
            grad_alpha: needs_alpha_grad.then(|| vec![0.0; rows]),
        });
    }

    for_each_row(grad_input.data_mut(), steps, |n, out_row| {
        let a = alpha.get(n);
        let upstream = grad_trace.row(n);
        let mut g = 0.0;
        for t in (0..steps).rev() {
            g = upstream[t] + a * g;
            out_row[t] = g;
        }
    });

    let grad_alpha = if needs_alpha_grad {
        let mut ga = vec![0.0; rows];
        let adjoint = grad_input.view();
        fill_per_row(&mut ga, |n| {
            let g = adjoint.row(n);
            let trace = saved_trace.row(n);
            let mut acc = g[0] * state0[n];
            for t in 1..steps {
                acc += g[t] * trace[t - 1];
            }
            acc
        });
        Some(ga)
    } else {
        None
    };

    Ok(LeakyGrad {
        grad_input,
        grad_alpha,
    })
}
