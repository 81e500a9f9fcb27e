//! Row-parallel execution of per-row scan bodies
//!
//! Rows are independent, so every kernel maps one logical lane per row and
//! keeps the true recurrence sequential inside the lane. With the `parallel`
//! feature the lanes run on the rayon pool; otherwise they run in a plain
//! loop with identical results.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::Float;

/// Run `f(row_index, row)` over every `steps`-long row of `data`
pub(crate) fn for_each_row<F>(data: &mut [Float], steps: usize, f: F)
where
    F: Fn(usize, &mut [Float]) + Sync + Send,
{
    debug_assert!(steps > 0);
    #[cfg(feature = "parallel")]
    data.par_chunks_mut(steps)
        .enumerate()
        .for_each(|(n, row)| f(n, row));
    #[cfg(not(feature = "parallel"))]
    data.chunks_mut(steps)
        .enumerate()
        .for_each(|(n, row)| f(n, row));
}

/// Run `f(row_index, row_a, row_b)` over paired rows of two equally shaped
/// buffers
pub(crate) fn for_each_row_pair<F>(a: &mut [Float], b: &mut [Float], steps: usize, f: F)
where
    F: Fn(usize, &mut [Float], &mut [Float]) + Sync + Send,
{
    debug_assert!(steps > 0);
    debug_assert_eq!(a.len(), b.len());
    #[cfg(feature = "parallel")]
    a.par_chunks_mut(steps)
        .zip(b.par_chunks_mut(steps))
        .enumerate()
        .for_each(|(n, (row_a, row_b))| f(n, row_a, row_b));
    #[cfg(not(feature = "parallel"))]
    a.chunks_mut(steps)
        .zip(b.chunks_mut(steps))
        .enumerate()
        .for_each(|(n, (row_a, row_b))| f(n, row_a, row_b));
}

/// Fill one scalar per row from `f(row_index)`
pub(crate) fn fill_per_row<F>(out: &mut [Float], f: F)
where
    F: Fn(usize) -> Float + Sync + Send,
{
    #[cfg(feature = "parallel")]
    out.par_iter_mut().enumerate().for_each(|(n, v)| *v = f(n));
    #[cfg(not(feature = "parallel"))]
    out.iter_mut().enumerate().for_each(|(n, v)| *v = f(n));
}
