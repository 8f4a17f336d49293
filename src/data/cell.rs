//! # Cell Grid
//!
//! ## Role
//! The multi-dimensional grid formed by the Cartesian product of per-property
//! bin-edge sequences, and the flattened integer id of each of its cells.
//!
//! ## Layout
//! Cell ids use row-major multi-index flattening in the declared property
//! order: `cell_id = Σ idx_k · Π_{j>k} nbins_j`. The last property varies
//! fastest. Every valid id satisfies `0 <= cell_id < Π nbins_k`.

use crate::error::{GalsamplerError, Result};

/// Zero-cost newtype for flattened cell ids
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CellId(pub u32);

impl CellId {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for CellId {
    fn from(idx: u32) -> Self {
        Self(idx)
    }
}

impl From<usize> for CellId {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<CellId> for usize {
    fn from(idx: CellId) -> usize {
        idx.0 as usize
    }
}

/// Shape of the cell grid: number of bins along each property axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridShape {
    dims: Vec<usize>,
    /// strides[k] = Π_{j>k} dims[j]
    strides: Vec<usize>,
    n_cells: usize,
}

impl GridShape {
    /// Create a grid from per-axis bin counts.
    ///
    /// Fails on zero axes, an axis with zero bins, or a grid whose cell count
    /// does not fit a `u32` cell id.
    pub fn new(dims: Vec<usize>) -> Result<Self> {
        if dims.is_empty() {
            return Err(GalsamplerError::invalid_bins(
                "at least one binning property is required",
            ));
        }
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(GalsamplerError::invalid_bins(format!(
                "axis {} has no bins",
                axis
            )));
        }

        let mut strides = vec![1usize; dims.len()];
        let mut n_cells = 1usize;
        for k in (0..dims.len()).rev() {
            strides[k] = n_cells;
            n_cells = n_cells
                .checked_mul(dims[k])
                .filter(|&n| n <= u32::MAX as usize)
                .ok_or_else(|| {
                    GalsamplerError::invalid_bins(format!(
                        "grid {:?} has too many cells for 32-bit cell ids",
                        dims
                    ))
                })?;
        }

        Ok(Self {
            dims,
            strides,
            n_cells,
        })
    }

    /// Grid whose axis lengths are the lengths of the given edge sequences.
    pub fn from_edges<E: AsRef<[f64]>>(edges: &[E]) -> Result<Self> {
        Self::new(edges.iter().map(|e| e.as_ref().len()).collect())
    }

    /// Number of axes
    pub fn n_dims(&self) -> usize {
        self.dims.len()
    }

    /// Bins per axis
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of cells
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn contains(&self, cell: CellId) -> bool {
        cell.as_usize() < self.n_cells
    }

    /// Flatten a multi-index. The caller guarantees `multi[k] < dims[k]`.
    #[inline]
    pub fn ravel(&self, multi: &[usize]) -> CellId {
        debug_assert_eq!(multi.len(), self.dims.len());
        let flat: usize = multi
            .iter()
            .zip(&self.strides)
            .map(|(&idx, &stride)| idx * stride)
            .sum();
        CellId::from(flat)
    }

    /// Recover the multi-index of a cell into `out` (length `n_dims`).
    #[inline]
    pub fn unravel_into(&self, cell: CellId, out: &mut [usize]) {
        debug_assert_eq!(out.len(), self.dims.len());
        let mut rem = cell.as_usize();
        for (slot, &stride) in out.iter_mut().zip(&self.strides) {
            *slot = rem / stride;
            rem %= stride;
        }
    }

    pub fn unravel(&self, cell: CellId) -> Vec<usize> {
        let mut out = vec![0; self.dims.len()];
        self.unravel_into(cell, &mut out);
        out
    }

    /// L1 distance between two cells in multi-index space.
    pub fn taxicab(&self, a: CellId, b: CellId) -> usize {
        let (mut ra, mut rb) = (a.as_usize(), b.as_usize());
        let mut dist = 0;
        for &stride in &self.strides {
            dist += (ra / stride).abs_diff(rb / stride);
            ra %= stride;
            rb %= stride;
        }
        dist
    }
}
