use anyhow::Result;
use spikescan_kernels::{leaky_backward, leaky_forward, Float, Raster};

/// Recover known decay factors by gradient descent on the leaky scan.
///
/// Three rows share one input current; each row's target trace was produced
/// with a different decay factor. Squared-error gradients flow through the
/// backward kernel with the decay gradient enabled, and plain gradient
/// descent pulls the estimates onto the targets.
fn main() -> Result<()> {
    env_logger::init();

    let steps = 64;
    let true_alphas: Vec<Float> = vec![0.6, 0.75, 0.9];
    let rows = true_alphas.len();

    // Shared input: a few current pulses
    let mut pulse = vec![0.0f32; steps];
    for t in (0..steps).step_by(9) {
        pulse[t] = 1.0;
    }
    let row = pulse.as_slice();
    let input = Raster::from_rows(&[row, row, row])?;
    let state0 = vec![0.0; rows];

    let target = leaky_forward(input.view(), &state0, (&true_alphas).into())?;

    let mut alphas: Vec<Float> = vec![0.5; rows];
    let lr = 0.05;
    let scale = 1.0 / steps as Float;

    for iter in 0..=300 {
        let trace = leaky_forward(input.view(), &state0, (&alphas).into())?;

        // Mean squared-error loss and its gradient on the trace
        let mut loss = 0.0f32;
        let mut upstream = Raster::zeros(rows, steps);
        for n in 0..rows {
            for t in 0..steps {
                let diff = trace[(n, t)] - target[(n, t)];
                loss += 0.5 * diff * diff * scale;
                upstream[(n, t)] = diff * scale;
            }
        }

        let grads = leaky_backward(
            upstream.view(),
            trace.view(),
            &state0,
            (&alphas).into(),
            true,
        )?;
        let grad_alpha = grads.grad_alpha.expect("alpha gradient requested");

        for n in 0..rows {
            alphas[n] = (alphas[n] - lr * grad_alpha[n]).clamp(0.0, 1.0);
        }

        if iter % 50 == 0 {
            println!(
                "iter {:>3}: loss {:>9.5}, alphas [{:.4}, {:.4}, {:.4}]",
                iter, loss, alphas[0], alphas[1], alphas[2]
            );
        }
    }

    for (n, (&est, &truth)) in alphas.iter().zip(true_alphas.iter()).enumerate() {
        println!(
            "row {}: recovered alpha {:.4} (target {:.2}, error {:+.4})",
            n,
            est,
            truth,
            est - truth
        );
    }

    Ok(())
}
