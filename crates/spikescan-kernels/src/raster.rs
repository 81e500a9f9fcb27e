//! Dense row-major buffers for per-neuron time series
//!
//! A [`Raster`] holds one scalar trajectory per row (membrane potential,
//! input current, spike count) with time as the fast-varying axis. Kernels
//! operate on [`RasterView`]s so that callers can pass either a whole owned
//! raster or a column slice of one; views carry an explicit row stride and
//! kernels reject non-contiguous layouts at the call boundary.

use core::ops::{Index, IndexMut};

use crate::error::{KernelError, Result};
use crate::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense row-major matrix of per-row time series (rows x steps)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Raster {
    data: Vec<Float>,
    rows: usize,
    steps: usize,
}

impl Raster {
    /// Create a new raster with given dimensions, initialized to zero
    pub fn zeros(rows: usize, steps: usize) -> Self {
        Self {
            data: vec![0.0; rows * steps],
            rows,
            steps,
        }
    }

    /// Create a raster from a flat data vector (row-major, time fastest)
    pub fn from_vec(data: Vec<Float>, rows: usize, steps: usize) -> Result<Self> {
        if data.len() != rows * steps {
            return Err(KernelError::shape(
                "data",
                format!("{} elements for {}x{}", rows * steps, rows, steps),
                data.len().to_string(),
            ));
        }
        Ok(Self { data, rows, steps })
    }

    /// Create a raster from per-row slices
    pub fn from_rows(rows: &[&[Float]]) -> Result<Self> {
        let steps = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * steps);
        for row in rows {
            if row.len() != steps {
                return Err(KernelError::shape(
                    "rows",
                    format!("{} elements per row", steps),
                    row.len().to_string(),
                ));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            steps,
        })
    }

    /// Number of independent rows (flattened neuron instances)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of time steps per row
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Get reference to the flat internal data
    pub fn data(&self) -> &[Float] {
        &self.data
    }

    /// Get mutable reference to the flat internal data
    pub fn data_mut(&mut self) -> &mut [Float] {
        &mut self.data
    }

    /// Get one row as a slice
    pub fn row(&self, n: usize) -> &[Float] {
        &self.data[n * self.steps..(n + 1) * self.steps]
    }

    /// Last value of each row: the state snapshot carried to the next
    /// invocation by the calling layer
    pub fn last_column(&self) -> Vec<Float> {
        if self.steps == 0 {
            return vec![0.0; self.rows];
        }
        (0..self.rows)
            .map(|n| self.data[n * self.steps + self.steps - 1])
            .collect()
    }

    /// Contiguous view over the whole raster
    pub fn view(&self) -> RasterView<'_> {
        RasterView {
            data: &self.data,
            rows: self.rows,
            steps: self.steps,
            row_stride: self.steps,
        }
    }

    /// Strided view over a range of time steps
    ///
    /// The returned view shares this raster's row stride, so it is only
    /// contiguous when the range covers all steps. Kernels require
    /// contiguous input; use [`RasterView::to_raster`] to copy a chunk out.
    pub fn columns(&self, start: usize, end: usize) -> RasterView<'_> {
        assert!(start <= end && end <= self.steps);
        RasterView {
            data: &self.data[start..],
            rows: self.rows,
            steps: end - start,
            row_stride: self.steps,
        }
    }

    /// Consume the raster and return the flat data vector
    pub fn into_vec(self) -> Vec<Float> {
        self.data
    }
}

impl Index<(usize, usize)> for Raster {
    type Output = Float;

    fn index(&self, (row, step): (usize, usize)) -> &Float {
        &self.data[row * self.steps + step]
    }
}

impl IndexMut<(usize, usize)> for Raster {
    fn index_mut(&mut self, (row, step): (usize, usize)) -> &mut Float {
        &mut self.data[row * self.steps + step]
    }
}

/// Borrowed view of a raster with an explicit row stride
///
/// `row_stride == steps` means the view is contiguous. A view produced by
/// [`Raster::columns`] over a proper sub-range is strided.
#[derive(Debug, Clone, Copy)]
pub struct RasterView<'a> {
    data: &'a [Float],
    rows: usize,
    steps: usize,
    row_stride: usize,
}

impl<'a> RasterView<'a> {
    /// Build a contiguous view directly over a flat caller buffer
    pub fn from_slice(data: &'a [Float], rows: usize, steps: usize) -> Result<Self> {
        if data.len() != rows * steps {
            return Err(KernelError::shape(
                "data",
                format!("{} elements for {}x{}", rows * steps, rows, steps),
                data.len().to_string(),
            ));
        }
        Ok(Self {
            data,
            rows,
            steps,
            row_stride: steps,
        })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of time steps per row
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Stride between consecutive rows in the backing buffer
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Whether time is packed without gaps between rows
    pub fn is_contiguous(&self) -> bool {
        self.row_stride == self.steps
    }

    /// Get one row as a slice
    pub fn row(&self, n: usize) -> &[Float] {
        &self.data[n * self.row_stride..n * self.row_stride + self.steps]
    }

    /// Copy the viewed region into an owned, contiguous raster
    pub fn to_raster(&self) -> Raster {
        let mut data = Vec::with_capacity(self.rows * self.steps);
        for n in 0..self.rows {
            data.extend_from_slice(self.row(n));
        }
        Raster {
            data,
            rows: self.rows,
            steps: self.steps,
        }
    }

    /// Whether every element satisfies the predicate
    pub fn all(&self, mut pred: impl FnMut(Float) -> bool) -> bool {
        (0..self.rows).all(|n| self.row(n).iter().all(|&x| pred(x)))
    }
}

/// Per-row parameter: one scalar broadcast to all rows, or one value per row
#[derive(Debug, Clone, Copy)]
pub enum RowParam<'a> {
    /// Single value shared by every row
    Scalar(Float),
    /// One value per row
    PerRow(&'a [Float]),
}

impl RowParam<'_> {
    /// Value for row `n`
    #[inline]
    pub fn get(&self, n: usize) -> Float {
        match self {
            RowParam::Scalar(v) => *v,
            RowParam::PerRow(vs) => vs[n],
        }
    }

    /// Check that a per-row slice matches the row count
    pub fn validate_rows(&self, name: &str, rows: usize) -> Result<()> {
        if let RowParam::PerRow(vs) = self {
            if vs.len() != rows {
                return Err(KernelError::shape(
                    name,
                    format!("1D with {} elements", rows),
                    vs.len().to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Check that every value lies in `[lo, hi]`
    pub fn validate_range(&self, name: &str, lo: Float, hi: Float) -> Result<()> {
        let out_of_range = |v: Float| v.is_nan() || v < lo || v > hi;
        let bad = match self {
            RowParam::Scalar(v) => out_of_range(*v).then_some(*v),
            RowParam::PerRow(vs) => vs.iter().copied().find(|&v| out_of_range(v)),
        };
        if let Some(v) = bad {
            return Err(KernelError::invalid_parameter(
                name,
                v.to_string(),
                format!("{} <= {} <= {}", lo, name, hi),
            ));
        }
        Ok(())
    }
}

impl From<Float> for RowParam<'_> {
    fn from(v: Float) -> Self {
        RowParam::Scalar(v)
    }
}

impl<'a> From<&'a [Float]> for RowParam<'a> {
    fn from(vs: &'a [Float]) -> Self {
        RowParam::PerRow(vs)
    }
}

impl<'a> From<&'a Vec<Float>> for RowParam<'a> {
    fn from(vs: &'a Vec<Float>) -> Self {
        RowParam::PerRow(vs.as_slice())
    }
}

/// Check that a view is contiguous, failing with the tensor's name
pub(crate) fn ensure_contiguous(name: &str, view: &RasterView<'_>) -> Result<()> {
    if !view.is_contiguous() {
        return Err(KernelError::not_contiguous(
            name,
            view.row_stride(),
            view.steps(),
        ));
    }
    Ok(())
}

/// Check that a view matches the invocation's shared (rows, steps) shape
pub(crate) fn ensure_shape(
    name: &str,
    view: &RasterView<'_>,
    rows: usize,
    steps: usize,
) -> Result<()> {
    if view.rows() != rows || view.steps() != steps {
        return Err(KernelError::shape(
            name,
            format!("{}x{}", rows, steps),
            format!("{}x{}", view.rows(), view.steps()),
        ));
    }
    Ok(())
}

/// Check that a 1D state slice has one entry per row
pub(crate) fn ensure_state_len(name: &str, state: &[Float], rows: usize) -> Result<()> {
    if state.len() != rows {
        return Err(KernelError::shape(
            name,
            format!("1D with {} elements", rows),
            state.len().to_string(),
        ));
    }
    Ok(())
}
