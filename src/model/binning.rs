//! # Halo Binning
//!
//! ## Role
//! Assign every halo the flattened id of the multi-dimensional cell its
//! property values fall in.
//!
//! ## Algorithm
//! Per property `k` with `B_k` edges:
//! `idx_k = min(digitize(value, edges_k), B_k - 1)`, where `digitize` counts
//! the edges `<= value`. Values below the first edge land in bin 0, values at
//! or above the last edge (and NaN) are clamped into the open-ended top bin
//! `B_k - 1`.
//! The per-property indices are then flattened row-major in declared order,
//! so every id lies in `[0, Π B_k)`.

use rayon::prelude::*;

use crate::data::catalog::{BinningScheme, KeyCorrespondence, PropertyTable};
use crate::data::cell::{CellId, GridShape};
use crate::error::{GalsamplerError, Result};

/// One binned property: the halo values and the edges that discretize them.
#[derive(Clone, Copy, Debug)]
pub struct BinSpec<'a> {
    pub name: &'a str,
    pub values: &'a [f64],
    pub edges: &'a [f64],
}

impl<'a> BinSpec<'a> {
    pub fn new(name: &'a str, values: &'a [f64], edges: &'a [f64]) -> Self {
        Self {
            name,
            values,
            edges,
        }
    }
}

/// Index of the bin containing `value`: the number of edges `<= value`,
/// clamped to `edges.len() - 1`. NaN sorts past every edge and lands in the
/// top bin.
#[inline]
pub fn digitize(value: f64, edges: &[f64]) -> usize {
    let idx = edges.partition_point(|&e| !(value < e));
    idx.min(edges.len().saturating_sub(1))
}

/// Validated set of binning specifications over halos of a single catalog.
#[derive(Debug)]
pub struct Binner<'a> {
    specs: Vec<BinSpec<'a>>,
    grid: GridShape,
    n_halos: usize,
}

impl<'a> Binner<'a> {
    /// Validate the specifications once: at least one property, sorted finite
    /// edges, and value arrays of a common length.
    pub fn new(specs: Vec<BinSpec<'a>>) -> Result<Self> {
        let grid = GridShape::new(specs.iter().map(|s| s.edges.len()).collect())?;
        let n_halos = specs[0].values.len();

        for spec in &specs {
            if spec.edges.iter().any(|e| !e.is_finite()) {
                return Err(GalsamplerError::invalid_bins(format!(
                    "property `{}` has non-finite bin edges",
                    spec.name
                )));
            }
            if spec.edges.windows(2).any(|w| w[1] < w[0]) {
                return Err(GalsamplerError::invalid_bins(format!(
                    "bin edges of property `{}` are not sorted",
                    spec.name
                )));
            }
            GalsamplerError::check_len(
                &format!("property `{}`", spec.name),
                spec.values.len(),
                &format!("property `{}`", specs[0].name),
                n_halos,
            )?;
        }

        Ok(Self {
            specs,
            grid,
            n_halos,
        })
    }

    /// Resolve every property of `scheme` in `table`, translating names
    /// through `correspondence`.
    pub fn from_table(
        table: &'a PropertyTable,
        scheme: &'a BinningScheme,
        correspondence: &'a KeyCorrespondence,
        label: &str,
    ) -> Result<Self> {
        let specs = scheme
            .properties()
            .iter()
            .map(|bins| {
                let column_name = correspondence.target_name(&bins.name);
                let values = table.column(column_name, label)?;
                Ok(BinSpec::new(column_name, values, &bins.edges))
            })
            .collect::<Result<Vec<_>>>()?;
        GalsamplerError::check_len(
            &format!("`{}` columns of {}", specs[0].name, label),
            specs[0].values.len(),
            "halo_id",
            table.len(),
        )?;
        Self::new(specs)
    }

    pub fn grid(&self) -> &GridShape {
        &self.grid
    }

    pub fn n_halos(&self) -> usize {
        self.n_halos
    }

    /// Cell id of halo `row`
    #[inline]
    pub fn cell_of(&self, row: usize) -> CellId {
        let flat: usize = self
            .specs
            .iter()
            .zip(self.grid.dims())
            .fold(0usize, |acc, (spec, &nbins)| {
                acc * nbins + digitize(spec.values[row], spec.edges)
            });
        CellId::from(flat)
    }

    /// Cell ids for every halo, computed in parallel over rows.
    pub fn cell_ids(&self) -> Vec<CellId> {
        (0..self.n_halos)
            .into_par_iter()
            .map(|row| self.cell_of(row))
            .collect()
    }
}

/// Convenience wrapper: validate `specs` and bin every halo.
pub fn bin_indices(specs: &[BinSpec<'_>]) -> Result<Vec<CellId>> {
    if specs.is_empty() {
        return Err(GalsamplerError::invalid_bins(
            "at least one binning property is required",
        ));
    }
    Ok(Binner::new(specs.to_vec())?.cell_ids())
}
