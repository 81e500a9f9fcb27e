//! Integrate-and-fire scan kernels
//!
//! Exponential-decay accumulation with threshold-crossing spike emission,
//! subtractive reset, an optional lower bound on the carried state, and an
//! optional cap on spikes per time step.
//!
//! The forward scan applies each step's reset at the start of the *next*
//! step, before the decay. The recorded membrane trace is therefore the
//! post-decay, pre-reset potential, and the spike count of the last step is
//! part of the carried state: resuming from `(v_mem, spikes)` of the last
//! column reproduces an unchunked run exactly. The backward scans assume
//! reset-after-decay instead and use a reset amount pre-scaled by the decay
//! factor to compensate; this reordering correction is part of the kernel
//! contract and must not be altered without re-deriving the adjoint.

use crate::error::{KernelError, Result};
use crate::parallel::{fill_per_row, for_each_row, for_each_row_pair};
use crate::raster::{ensure_contiguous, ensure_shape, ensure_state_len, Raster, RasterView, RowParam};
use crate::surrogate::SurrogateGradient;
use crate::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shared configuration for the integrate-and-fire forward and backward scans
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FireParams {
    /// Firing threshold, shared across rows
    pub threshold: Float,
    /// Lower bound applied to the carried membrane state, if any
    pub min_v_mem: Option<Float>,
    /// Maximum number of spikes a row may emit in one time step, if capped
    pub max_spikes_per_bin: Option<u32>,
}

impl Default for FireParams {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            min_v_mem: None,
            max_spikes_per_bin: None,
        }
    }
}

impl FireParams {
    /// Create parameters with the given firing threshold
    pub fn new(threshold: Float) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Set the lower bound for the carried membrane state
    pub fn with_min_v_mem(mut self, min_v_mem: Float) -> Self {
        self.min_v_mem = Some(min_v_mem);
        self
    }

    /// Cap the number of spikes per row and time step
    pub fn with_max_spikes_per_bin(mut self, max: u32) -> Self {
        self.max_spikes_per_bin = Some(max);
        self
    }

    /// Validate the parameter combination
    pub fn validate(&self) -> Result<()> {
        if let Some(lo) = self.min_v_mem {
            if self.threshold.is_nan() || self.threshold <= lo {
                return Err(KernelError::invalid_parameter(
                    "threshold",
                    format!("{} (with min_v_mem={})", self.threshold, lo),
                    "> min_v_mem",
                ));
            }
        }
        Ok(())
    }
}

/// Outputs of [`fire_forward`]
#[derive(Debug, Clone)]
pub struct FireOutput {
    /// Spike count per row and time step (integer-valued, stored as floats)
    pub spikes: Raster,
    /// Post-decay, pre-reset membrane potential per row and time step
    pub v_mem: Raster,
}

impl FireOutput {
    /// State to carry into the next invocation: last membrane value and last
    /// spike count of each row
    pub fn carry(&self) -> (Vec<Float>, Vec<Float>) {
        (self.v_mem.last_column(), self.spikes.last_column())
    }
}

/// Gradients produced by [`fire_backward`]
#[derive(Debug, Clone)]
pub struct FireGrad {
    /// Gradient with respect to the input currents
    pub grad_input: Raster,
    /// Gradient with respect to the per-row decay factor, when requested
    pub grad_alpha: Option<Vec<Float>>,
}

/// Number of spikes emitted at post-decay potential `v`
///
/// Zero below the threshold; at or above it, one spike per repeated
/// subtraction of `reset` that still leaves the potential at or above the
/// threshold, clamped to the per-bin cap when one is set.
#[inline]
fn spike_count(v: Float, threshold: Float, reset: Float, cap: Option<u32>) -> Float {
    if v < threshold {
        return 0.0;
    }
    let count = if reset > 0.0 {
        1.0 + ((v - threshold) / reset).floor()
    } else {
        Float::INFINITY
    };
    match cap {
        Some(k) => count.min(k as Float),
        None => count,
    }
}

/// Integrate-and-fire forward scan
///
/// Per row and step: subtract the previous step's spike count times the
/// reset amount, clamp to `min_v_mem` when configured, decay by `alpha`,
/// add the input, record the membrane value, then count spikes. Returns the
/// spike raster and the recorded (post-decay, pre-reset) membrane trace.
///
/// `reset` defaults to the firing threshold for every row when `None`.
/// `activation0` is the spike count of the step preceding this chunk, so a
/// per-bin cap that was partially consumed carries over exactly.
///
/// # Errors
///
/// Fails before any computation on a non-contiguous input, a state or
/// per-row parameter without one entry per row, a decay value outside
/// `[0, 1]`, or a threshold not above the configured lower bound.
pub fn fire_forward(
    input: RasterView<'_>,
    alpha: RowParam<'_>,
    v_init: &[Float],
    activation0: &[Float],
    reset: Option<RowParam<'_>>,
    params: &FireParams,
) -> Result<FireOutput> {
    let (rows, steps) = (input.rows(), input.steps());
    ensure_contiguous("input", &input)?;
    alpha.validate_rows("alpha", rows)?;
    ensure_state_len("v_init", v_init, rows)?;
    ensure_state_len("activation0", activation0, rows)?;
    let reset = reset.unwrap_or(RowParam::Scalar(params.threshold));
    reset.validate_rows("reset", rows)?;
    params.validate()?;
    alpha.validate_range("alpha", 0.0, 1.0)?;

    log::debug!(
        "fire_forward: {} rows x {} steps, threshold {}",
        rows,
        steps,
        params.threshold
    );

    let mut spikes = Raster::zeros(rows, steps);
    let mut v_mem = Raster::zeros(rows, steps);
    if steps == 0 {
        return Ok(FireOutput { spikes, v_mem });
    }

    let threshold = params.threshold;
    let min_v_mem = params.min_v_mem;
    let cap = params.max_spikes_per_bin;

    for_each_row_pair(spikes.data_mut(), v_mem.data_mut(), steps, |n, s_row, v_row| {
        let a = alpha.get(n);
        let sub = reset.get(n);
        let mut v = v_init[n];
        let mut act = activation0[n];
        for (t, &x) in input.row(n).iter().enumerate() {
            v -= act * sub;
            if let Some(lo) = min_v_mem {
                if v < lo {
                    v = lo;
                }
            }
            v = a * v + x;
            v_row[t] = v;
            act = spike_count(v, threshold, sub, cap);
            s_row[t] = act;
        }
    });

    Ok(FireOutput { spikes, v_mem })
}

/// Integrate-and-fire backward scan
///
/// Computes the gradient with respect to the input from the upstream
/// gradient on the spike output, the saved membrane trace, and the caller's
/// surrogate-gradient strategy. The scan runs backward in time and
/// accumulates through both the decay path and the reset feedback path
/// (each spike reduces the potential available to later steps). Where a
/// lower bound is configured, the accumulated gradient is dropped at steps
/// whose recorded potential did not exceed the bound.
///
/// `grad_v_mem` is the upstream gradient on the membrane-trace output.
/// Gradient flow through the raw trace is unsupported: if any element is
/// nonzero the call fails with [`KernelError::UnsupportedGradient`] before
/// computing anything. Pass `None` when no such gradient exists.
///
/// When `needs_alpha_grad` is set, a companion pass combines the input
/// gradients with the post-reset states recomputed from the saved trace to
/// produce the decay gradient; `v_init` and `activation0` supply the state
/// preceding the first step. The pass is skipped entirely otherwise.
///
/// # Errors
///
/// Same validation as [`fire_forward`], plus the `grad_v_mem` gate.
#[allow(clippy::too_many_arguments)]
pub fn fire_backward<S>(
    surrogate: &S,
    grad_spikes: RasterView<'_>,
    grad_v_mem: Option<RasterView<'_>>,
    saved_v_mem: RasterView<'_>,
    alpha: RowParam<'_>,
    v_init: &[Float],
    activation0: &[Float],
    reset: Option<RowParam<'_>>,
    params: &FireParams,
    needs_alpha_grad: bool,
) -> Result<FireGrad>
where
    S: SurrogateGradient + Sync,
{
    let (rows, steps) = (grad_spikes.rows(), grad_spikes.steps());
    ensure_contiguous("grad_spikes", &grad_spikes)?;
    ensure_shape("saved_v_mem", &saved_v_mem, rows, steps)?;
    ensure_contiguous("saved_v_mem", &saved_v_mem)?;
    if let Some(gv) = grad_v_mem {
        ensure_shape("grad_v_mem", &gv, rows, steps)?;
        if !gv.all(|x| x == 0.0) {
            return Err(KernelError::unsupported_gradient(
                "direct backpropagation through the membrane potential output",
            ));
        }
    }
    alpha.validate_rows("alpha", rows)?;
    ensure_state_len("v_init", v_init, rows)?;
    ensure_state_len("activation0", activation0, rows)?;
    let reset = reset.unwrap_or(RowParam::Scalar(params.threshold));
    reset.validate_rows("reset", rows)?;
    params.validate()?;
    alpha.validate_range("alpha", 0.0, 1.0)?;

    log::debug!(
        "fire_backward: {} rows x {} steps, alpha grad: {}",
        rows,
        steps,
        needs_alpha_grad
    );

    let mut grad_input = Raster::zeros(rows, steps);
    if steps == 0 {
        return Ok(FireGrad {
            grad_input,
            grad_alpha: needs_alpha_grad.then(|| vec![0.0; rows]),
        });
    }

    let threshold = params.threshold;
    let min_v_mem = params.min_v_mem;

    for_each_row(grad_input.data_mut(), steps, |n, out_row| {
        let a = alpha.get(n);
        // Reset scaled by alpha: the backward recurrence assumes the reset
        // is applied after the decay, the forward applies it before.
        let sub_eff = reset.get(n) * a;
        let trace = saved_v_mem.row(n);
        let upstream = grad_spikes.row(n);
        let mut g = 0.0;
        for t in (0..steps).rev() {
            let surr = surrogate.surrogate_grad(trace[t], threshold);
            let not_clipped = match min_v_mem {
                Some(lo) if trace[t] <= lo => 0.0,
                _ => 1.0,
            };
            g = surr * upstream[t] + not_clipped * (a - sub_eff * surr) * g;
            out_row[t] = g;
        }
    });

    let grad_alpha = if needs_alpha_grad {
        let cap = params.max_spikes_per_bin;
        let mut ga = vec![0.0; rows];
        let adjoint = grad_input.view();
        fill_per_row(&mut ga, |n| {
            let sub = reset.get(n);
            let trace = saved_v_mem.row(n);
            let g = adjoint.row(n);
            // Post-reset state preceding each step, recomputed from the
            // trace; alpha multiplied exactly this value in the forward
            // pass, so it is the per-step partial derivative.
            let mut w_prev = post_reset(v_init[n], activation0[n], sub, min_v_mem);
            let mut acc = 0.0;
            for t in 0..steps {
                acc += g[t] * w_prev;
                let act = spike_count(trace[t], threshold, sub, cap);
                w_prev = post_reset(trace[t], act, sub, min_v_mem);
            }
            acc
        });
        Some(ga)
    } else {
        None
    };

    Ok(FireGrad {
        grad_input,
        grad_alpha,
    })
}

/// Membrane state after subtracting `act` spikes and applying the bound
#[inline]
fn post_reset(v: Float, act: Float, reset: Float, min_v_mem: Option<Float>) -> Float {
    let r = v - act * reset;
    match min_v_mem {
        Some(lo) if r < lo => lo,
        _ => r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Float, b: Float, tol: Float) {
        assert!((a - b).abs() <= tol, "expected {} ~ {} (tol {})", b, a, tol);
    }

    fn flat_surrogate(_v: Float, _th: Float) -> Float {
        0.5
    }

    #[test]
    fn test_forward_subthreshold() {
        // Fixpoint of v = 0.5v + 0.4 is 0.8, below threshold: never fires
        let input = Raster::from_vec(vec![0.4; 4], 1, 4).unwrap();
        let out = fire_forward(
            input.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
        )
        .unwrap();
        assert_eq!(out.spikes.row(0), &[0.0, 0.0, 0.0, 0.0]);
        let v = out.v_mem.row(0);
        let expected = [0.4, 0.6, 0.7, 0.75];
        for (got, want) in v.iter().zip(expected.iter()) {
            assert_close(*got, *want, 1e-6);
        }
    }

    #[test]
    fn test_forward_spike_and_deferred_reset() {
        let input = Raster::from_vec(vec![0.6; 4], 1, 4).unwrap();
        let out = fire_forward(
            input.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
        )
        .unwrap();
        // v crosses threshold at t=2; the reset is only subtracted at t=3
        assert_eq!(out.spikes.row(0), &[0.0, 0.0, 1.0, 0.0]);
        let expected = [0.6, 0.9, 1.05, 0.625];
        for (got, want) in out.v_mem.row(0).iter().zip(expected.iter()) {
            assert_close(*got, *want, 1e-6);
        }
    }

    #[test]
    fn test_forward_threshold_boundary_fires() {
        let input = Raster::from_vec(vec![1.0], 1, 1).unwrap();
        let out = fire_forward(
            input.view(),
            1.0.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
        )
        .unwrap();
        assert_eq!(out.spikes.row(0), &[1.0]);
    }

    #[test]
    fn test_forward_multiple_spikes_per_step() {
        let input = Raster::from_vec(vec![3.5], 1, 1).unwrap();
        let out = fire_forward(
            input.view(),
            1.0.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
        )
        .unwrap();
        // 3.5 -> 2.5 -> 1.5 -> 0.5: three subtractions stay at or above 1.0
        assert_eq!(out.spikes.row(0), &[3.0]);
    }

    #[test]
    fn test_forward_spike_cap() {
        let input = Raster::from_vec(vec![3.5, 0.0], 1, 2).unwrap();
        let params = FireParams::new(1.0).with_max_spikes_per_bin(2);
        let out = fire_forward(input.view(), 1.0.into(), &[0.0], &[0.0], None, &params).unwrap();
        // 3.5 would justify three spikes; the cap holds it to two, so the
        // residual potential crosses the threshold again one step later
        assert_eq!(out.spikes.row(0), &[2.0, 1.0]);
        assert_close(out.v_mem[(0, 1)], 1.5, 1e-6);
    }

    #[test]
    fn test_forward_lower_bound_clamps_carry_not_trace() {
        let input = Raster::from_vec(vec![-2.0, 0.0], 1, 2).unwrap();
        let params = FireParams::new(1.0).with_min_v_mem(-1.0);
        let out = fire_forward(input.view(), 1.0.into(), &[0.0], &[0.0], None, &params).unwrap();
        // The recorded trace keeps the raw value; the carried state is
        // clamped before the next decay
        assert_close(out.v_mem[(0, 0)], -2.0, 1e-6);
        assert_close(out.v_mem[(0, 1)], -1.0, 1e-6);
    }

    #[test]
    fn test_forward_carried_activation() {
        // Start a chunk as if the previous chunk's last step spiked twice
        let input = Raster::from_vec(vec![0.0], 1, 1).unwrap();
        let out = fire_forward(
            input.view(),
            1.0.into(),
            &[2.5],
            &[2.0],
            None,
            &FireParams::new(1.0),
        )
        .unwrap();
        assert_close(out.v_mem[(0, 0)], 0.5, 1e-6);
    }

    #[test]
    fn test_forward_validation() {
        let input = Raster::zeros(2, 3);
        let params = FireParams::new(1.0);

        // v_init length mismatch
        assert!(
            fire_forward(input.view(), 0.5.into(), &[0.0], &[0.0, 0.0], None, &params).is_err()
        );

        // alpha out of range
        assert!(fire_forward(
            input.view(),
            (-0.1).into(),
            &[0.0, 0.0],
            &[0.0, 0.0],
            None,
            &params
        )
        .is_err());

        // threshold must exceed the lower bound
        let bad = FireParams::new(1.0).with_min_v_mem(1.0);
        assert!(
            fire_forward(input.view(), 0.5.into(), &[0.0, 0.0], &[0.0, 0.0], None, &bad).is_err()
        );

        // strided chunk is rejected
        let chunk = input.columns(1, 3);
        assert!(fire_forward(chunk, 0.5.into(), &[0.0, 0.0], &[0.0, 0.0], None, &params).is_err());
    }

    #[test]
    fn test_backward_rejects_membrane_gradient() {
        let zeros = Raster::zeros(1, 2);
        let mut gv = Raster::zeros(1, 2);
        gv[(0, 1)] = 1e-3;
        let res = fire_backward(
            &flat_surrogate,
            zeros.view(),
            Some(gv.view()),
            zeros.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
            false,
        );
        assert!(matches!(res, Err(KernelError::UnsupportedGradient { .. })));

        // An explicit all-zero gradient is fine
        let gv = Raster::zeros(1, 2);
        let res = fire_backward(
            &flat_surrogate,
            zeros.view(),
            Some(gv.view()),
            zeros.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
            false,
        );
        assert!(res.is_ok());
    }

    #[test]
    fn test_backward_single_step() {
        let upstream = Raster::from_vec(vec![2.0], 1, 1).unwrap();
        let saved = Raster::from_vec(vec![0.8], 1, 1).unwrap();
        let grads = fire_backward(
            &flat_surrogate,
            upstream.view(),
            None,
            saved.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
            false,
        )
        .unwrap();
        // Single step: grad is just surrogate * upstream
        assert_close(grads.grad_input[(0, 0)], 0.5 * 2.0, 1e-6);
    }

    #[test]
    fn test_backward_two_step_recurrence() {
        let upstream = Raster::from_vec(vec![0.0, 1.0], 1, 2).unwrap();
        let saved = Raster::from_vec(vec![0.2, 0.4], 1, 2).unwrap();
        let grads = fire_backward(
            &flat_surrogate,
            upstream.view(),
            None,
            saved.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &FireParams::new(1.0),
            false,
        )
        .unwrap();
        // g[1] = surr * 1 = 0.5
        // g[0] = (alpha - alpha*reset*surr) * g[1] = (0.5 - 0.25) * 0.5
        assert_close(grads.grad_input[(0, 1)], 0.5, 1e-6);
        assert_close(grads.grad_input[(0, 0)], 0.125, 1e-6);
    }

    #[test]
    fn test_backward_clip_mask_drops_carry() {
        let upstream = Raster::from_vec(vec![0.0, 1.0], 1, 2).unwrap();
        // First trace value sits exactly at the bound: carry through it dies
        let saved = Raster::from_vec(vec![-1.0, 0.4], 1, 2).unwrap();
        let params = FireParams::new(1.0).with_min_v_mem(-1.0);
        let grads = fire_backward(
            &flat_surrogate,
            upstream.view(),
            None,
            saved.view(),
            0.5.into(),
            &[0.0],
            &[0.0],
            None,
            &params,
            false,
        )
        .unwrap();
        assert_close(grads.grad_input[(0, 1)], 0.5, 1e-6);
        assert_close(grads.grad_input[(0, 0)], 0.0, 1e-6);
    }

    #[test]
    fn test_backward_alpha_grad_single_step() {
        // One step: v[0] = alpha * (v_init - a0*reset) + x, so the decay
        // gradient is grad_input[0] * (v_init - a0*reset)
        let upstream = Raster::from_vec(vec![1.0], 1, 1).unwrap();
        let saved = Raster::from_vec(vec![1.2], 1, 1).unwrap();
        let grads = fire_backward(
            &flat_surrogate,
            upstream.view(),
            None,
            saved.view(),
            0.5.into(),
            &[1.9],
            &[1.0],
            None,
            &FireParams::new(1.0),
            true,
        )
        .unwrap();
        let ga = grads.grad_alpha.unwrap();
        assert_close(ga[0], 0.5 * (1.9 - 1.0), 1e-6);
    }

    #[test]
    fn test_backward_alpha_grad_skipped() {
        let zeros = Raster::zeros(2, 3);
        let grads = fire_backward(
            &flat_surrogate,
            zeros.view(),
            None,
            zeros.view(),
            0.5.into(),
            &[0.0, 0.0],
            &[0.0, 0.0],
            None,
            &FireParams::new(1.0),
            false,
        )
        .unwrap();
        assert!(grads.grad_alpha.is_none());
    }

    #[test]
    fn test_spike_count_rule() {
        assert_eq!(spike_count(0.99, 1.0, 1.0, None), 0.0);
        assert_eq!(spike_count(1.0, 1.0, 1.0, None), 1.0);
        assert_eq!(spike_count(2.5, 1.0, 1.0, None), 2.0);
        assert_eq!(spike_count(2.5, 1.0, 0.5, None), 4.0);
        assert_eq!(spike_count(9.0, 1.0, 1.0, Some(3)), 3.0);
    }
}
