//! # Source Halo Selection
//!
//! ## Role
//! For every target halo, draw the row index of a statistically similar halo
//! from the source catalog.
//!
//! ## Algorithm
//! 1. Histogram the source cell ids over the full grid.
//! 2. Fail up front if no cell holds at least `nhalo_min` source halos.
//! 3. For every distinct cell present among the target halos, resolve the
//!    *effective* source cell: the cell itself when it holds `>= nhalo_min`
//!    source halos, otherwise the well-sampled cell at minimum taxicab
//!    distance in multi-index space (ties go to the lowest flattened id).
//! 4. Draw one member of the effective cell per target halo, uniformly and
//!    with replacement, or by matching a secondary property distribution.
//! 5. Scatter the draws so that `selection[i]` belongs to target halo `i`.
//!
//! ## Randomness
//! After validation a single `u64` base seed is drawn from the caller's
//! generator. Target cell `c` draws from its own
//! `StdRng::seed_from_u64(base_seed.wrapping_add(c))`, so the cell loop runs
//! on rayon and the result does not depend on the thread count.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::data::cell::{CellId, GridShape};
use crate::error::{GalsamplerError, Result};
use crate::model::range_draw::draw_in_range;
use crate::utils::telemetry::TelemetryBlackboard;

/// Per-cell source counts and the set of well-sampled cells.
#[derive(Clone, Debug)]
pub struct CellOccupancy {
    counts: Vec<usize>,
    nhalo_min: usize,
    well_sampled: Vec<CellId>,
}

impl CellOccupancy {
    /// Histogram `source_cells` over `grid`.
    ///
    /// A `nhalo_min` of 0 is treated as 1: an empty cell can never supply a halo.
    pub fn from_cells(source_cells: &[CellId], grid: &GridShape, nhalo_min: usize) -> Result<Self> {
        check_cells_in_grid(source_cells, grid, "source")?;
        let nhalo_min = nhalo_min.max(1);

        let mut counts = vec![0usize; grid.n_cells()];
        for &cell in source_cells {
            counts[cell.as_usize()] += 1;
        }
        let well_sampled = counts
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n >= nhalo_min)
            .map(|(c, _)| CellId::from(c))
            .collect();

        Ok(Self {
            counts,
            nhalo_min,
            well_sampled,
        })
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn nhalo_min(&self) -> usize {
        self.nhalo_min
    }

    pub fn n_well_sampled(&self) -> usize {
        self.well_sampled.len()
    }

    pub fn frac_well_sampled(&self) -> f64 {
        self.well_sampled.len() as f64 / self.counts.len() as f64
    }

    pub fn is_well_sampled(&self, cell: CellId) -> bool {
        self.counts[cell.as_usize()] >= self.nhalo_min
    }

    /// Global sanity check: at least one cell must be well-sampled.
    pub fn check(&self) -> Result<()> {
        if self.well_sampled.is_empty() {
            return Err(GalsamplerError::InsufficientSampling {
                nhalo_min: self.nhalo_min,
                n_cells: self.counts.len(),
                frac_good: self.frac_well_sampled(),
            });
        }
        Ok(())
    }

    /// Cell whose source halos stand in for target halos of `cell`.
    ///
    /// Returns `None` only when no cell is well-sampled.
    pub fn effective_cell(&self, cell: CellId, grid: &GridShape) -> Option<CellId> {
        if self.is_well_sampled(cell) {
            return Some(cell);
        }
        let mut best: Option<(usize, CellId)> = None;
        // well_sampled is ascending, so strict `<` keeps the lowest id on ties
        for &candidate in &self.well_sampled {
            let dist = grid.taxicab(cell, candidate);
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, candidate));
            }
        }
        best.map(|(_, c)| c)
    }
}

/// Grid sampling summary, reported so bin widths or `nhalo_min` can be tuned.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingDiagnostics {
    pub n_cells: usize,
    pub n_well_sampled_cells: usize,
    pub frac_well_sampled: f64,
    /// Distinct cells occupied by target halos
    pub n_target_cells: usize,
    /// Target cells that had to borrow from a neighbouring cell
    pub n_fallback_target_cells: usize,
}

/// Match target halos to source halos of similar secondary property value
/// inside the effective cell.
///
/// Both populations of a cell are histogrammed on `n_bins` equal-width bins
/// spanning their combined value range; a target halo draws uniformly among
/// the source halos of its own value bin, or of the nearest occupied one.
#[derive(Clone, Copy, Debug)]
pub struct DistributionMatch<'a> {
    pub source_values: &'a [f64],
    pub target_values: &'a [f64],
    pub n_bins: usize,
}

/// How a target halo picks among the source halos of its effective cell.
#[derive(Clone, Copy, Debug, Default)]
pub enum IntraCellPolicy<'a> {
    #[default]
    Uniform,
    MatchDistribution(DistributionMatch<'a>),
}

/// Selection result aligned with the target halo array.
#[derive(Clone, Debug)]
pub struct HaloSelection {
    /// `source_indices[i]` is the source row chosen for target halo `i`
    pub source_indices: Vec<usize>,
    /// Target halo id paired with each selection
    pub target_halo_ids: Vec<i64>,
    pub diagnostics: SamplingDiagnostics,
}

/// Draws one source halo per target halo, cell by cell.
pub struct SourceHaloSelector<'a> {
    grid: &'a GridShape,
    nhalo_min: usize,
    policy: IntraCellPolicy<'a>,
    telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl<'a> SourceHaloSelector<'a> {
    pub fn new(grid: &'a GridShape, nhalo_min: usize) -> Self {
        Self {
            grid,
            nhalo_min,
            policy: IntraCellPolicy::Uniform,
            telemetry: None,
        }
    }

    pub fn with_policy(mut self, policy: IntraCellPolicy<'a>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Option<Arc<TelemetryBlackboard>>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Source row index for every target halo.
    pub fn select<R: Rng + ?Sized>(
        &self,
        source_cells: &[CellId],
        target_cells: &[CellId],
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        self.select_with_diagnostics(source_cells, target_cells, rng)
            .map(|(indices, _)| indices)
    }

    /// Like [`SourceHaloSelector::select`], pairing every selection with the
    /// id of the target halo it serves.
    pub fn select_tracked<R: Rng + ?Sized>(
        &self,
        source_cells: &[CellId],
        target_cells: &[CellId],
        target_halo_ids: &[i64],
        rng: &mut R,
    ) -> Result<HaloSelection> {
        GalsamplerError::check_len(
            "target halo ids",
            target_halo_ids.len(),
            "target cell ids",
            target_cells.len(),
        )?;
        let (source_indices, diagnostics) = self.select_with_diagnostics(source_cells, target_cells, rng)?;
        Ok(HaloSelection {
            source_indices,
            target_halo_ids: target_halo_ids.to_vec(),
            diagnostics,
        })
    }

    /// Selection together with the grid sampling summary.
    pub fn select_with_diagnostics<R: Rng + ?Sized>(
        &self,
        source_cells: &[CellId],
        target_cells: &[CellId],
        rng: &mut R,
    ) -> Result<(Vec<usize>, SamplingDiagnostics)> {
        let _span = info_span!(
            "select_source_halos",
            n_source = source_cells.len(),
            n_target = target_cells.len()
        )
        .entered();

        check_cells_in_grid(target_cells, self.grid, "target")?;
        if let IntraCellPolicy::MatchDistribution(m) = &self.policy {
            GalsamplerError::check_len("source match values", m.source_values.len(), "source cell ids", source_cells.len())?;
            GalsamplerError::check_len("target match values", m.target_values.len(), "target cell ids", target_cells.len())?;
            if m.n_bins == 0 {
                return Err(GalsamplerError::invalid_bins("distribution matching needs at least one bin"));
            }
        }

        let occupancy = CellOccupancy::from_cells(source_cells, self.grid, self.nhalo_min)?;
        occupancy.check()?;

        let source_groups = CellGroups::new(source_cells, self.grid.n_cells());
        let target_groups = CellGroups::new(target_cells, self.grid.n_cells());
        let target_cell_list: Vec<CellId> = target_groups.occupied().collect();

        if let Some(bb) = &self.telemetry {
            bb.set_total_cells(target_cell_list.len() as u64);
        }

        let base_seed: u64 = rng.random();

        let per_cell: Vec<(CellId, bool, Vec<usize>)> = target_cell_list
            .par_iter()
            .map(|&cell| {
                // check() guarantees at least one well-sampled cell
                let effective = occupancy
                    .effective_cell(cell, self.grid)
                    .unwrap_or(cell);
                let members = source_groups.rows(effective);
                let targets = target_groups.rows(cell);
                let mut cell_rng = StdRng::seed_from_u64(base_seed.wrapping_add(cell.0 as u64));

                let picks = match &self.policy {
                    IntraCellPolicy::Uniform => {
                        let mut draws = Vec::with_capacity(targets.len());
                        draw_in_range(0, members.len(), targets.len(), &mut cell_rng, &mut draws);
                        draws.into_iter().map(|k| members[k]).collect()
                    }
                    IntraCellPolicy::MatchDistribution(m) => {
                        match_within_cell(members, targets, m, &mut cell_rng)
                    }
                };

                if let Some(bb) = &self.telemetry {
                    bb.add_cells_processed(1);
                    bb.add_halos_selected(targets.len() as u64);
                }
                (cell, effective != cell, picks)
            })
            .collect();

        let mut selection = vec![0usize; target_cells.len()];
        let mut n_fallback = 0;
        for (cell, fell_back, picks) in &per_cell {
            if *fell_back {
                n_fallback += 1;
                debug!(
                    cell = cell.0,
                    source_count = occupancy.counts()[cell.as_usize()],
                    "under-sampled target cell resolved to nearest well-sampled cell"
                );
            }
            for (&target_row, &source_row) in target_groups.rows(*cell).iter().zip(picks) {
                selection[target_row] = source_row;
            }
        }

        let diagnostics = SamplingDiagnostics {
            n_cells: self.grid.n_cells(),
            n_well_sampled_cells: occupancy.n_well_sampled(),
            frac_well_sampled: occupancy.frac_well_sampled(),
            n_target_cells: target_cell_list.len(),
            n_fallback_target_cells: n_fallback,
        };
        Ok((selection, diagnostics))
    }
}

/// Simple form: one source row per target halo, grid recovered from the
/// bin-edge sequences.
pub fn select_source_halo<R: Rng + ?Sized, E: AsRef<[f64]>>(
    source_cells: &[CellId],
    target_cells: &[CellId],
    nhalo_min: usize,
    bin_edges: &[E],
    rng: &mut R,
) -> Result<Vec<usize>> {
    let grid = GridShape::from_edges(bin_edges)?;
    SourceHaloSelector::new(&grid, nhalo_min).select(source_cells, target_cells, rng)
}

fn check_cells_in_grid(cells: &[CellId], grid: &GridShape, label: &str) -> Result<()> {
    match cells.iter().position(|&c| !grid.contains(c)) {
        Some(row) => Err(GalsamplerError::invalid_data(format!(
            "{} halo {} has cell id {} outside a grid of {} cells",
            label,
            row,
            cells[row].0,
            grid.n_cells()
        ))),
        None => Ok(()),
    }
}

/// Rows grouped by cell via a stable counting sort.
struct CellGroups {
    offsets: Vec<usize>,
    rows: Vec<usize>,
}

impl CellGroups {
    fn new(cells: &[CellId], n_cells: usize) -> Self {
        let mut offsets = vec![0usize; n_cells + 1];
        for &c in cells {
            offsets[c.as_usize() + 1] += 1;
        }
        for i in 0..n_cells {
            offsets[i + 1] += offsets[i];
        }
        let mut cursor = offsets.clone();
        let mut rows = vec![0usize; cells.len()];
        for (row, &c) in cells.iter().enumerate() {
            let slot = &mut cursor[c.as_usize()];
            rows[*slot] = row;
            *slot += 1;
        }
        Self { offsets, rows }
    }

    #[inline]
    fn rows(&self, cell: CellId) -> &[usize] {
        let c = cell.as_usize();
        &self.rows[self.offsets[c]..self.offsets[c + 1]]
    }

    fn occupied(&self) -> impl Iterator<Item = CellId> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[1] > w[0])
            .map(|(c, _)| CellId::from(c))
    }
}

/// Value-bin index of `v` among `n_bins` equal-width bins on `[lo, hi]`.
#[inline]
fn value_bin(v: f64, lo: f64, hi: f64, n_bins: usize) -> usize {
    if v.is_nan() || v <= lo {
        return 0;
    }
    let scaled = (v - lo) / (hi - lo) * n_bins as f64;
    (scaled as usize).min(n_bins - 1)
}

fn match_within_cell(
    members: &[usize],
    targets: &[usize],
    m: &DistributionMatch<'_>,
    rng: &mut StdRng,
) -> Vec<usize> {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in members
        .iter()
        .map(|&r| m.source_values[r])
        .chain(targets.iter().map(|&r| m.target_values[r]))
        .filter(|v| v.is_finite())
    {
        lo = lo.min(v);
        hi = hi.max(v);
    }

    if !(hi > lo) {
        // degenerate value range: nothing to match on
        let mut draws = Vec::with_capacity(targets.len());
        draw_in_range(0, members.len(), targets.len(), rng, &mut draws);
        return draws.into_iter().map(|k| members[k]).collect();
    }

    let n_bins = m.n_bins;
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); n_bins];
    for &r in members {
        buckets[value_bin(m.source_values[r], lo, hi, n_bins)].push(r);
    }

    targets
        .iter()
        .map(|&t| {
            let want = value_bin(m.target_values[t], lo, hi, n_bins);
            let bucket = nearest_occupied(&buckets, want);
            bucket[rng.random_range(0..bucket.len())]
        })
        .collect()
}

/// Closest non-empty bucket to `want`, lower index first on ties.
fn nearest_occupied(buckets: &[Vec<usize>], want: usize) -> &[usize] {
    for step in 0..buckets.len() {
        if want >= step && !buckets[want - step].is_empty() {
            return &buckets[want - step];
        }
        if want + step < buckets.len() && !buckets[want + step].is_empty() {
            return &buckets[want + step];
        }
    }
    &[]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::threading::build_thread_pool;

    fn cells(ids: &[u32]) -> Vec<CellId> {
        ids.iter().map(|&c| CellId(c)).collect()
    }

    #[test]
    fn test_fallback_1d() {
        // counts [2, 2, 0, 2]
        let grid = GridShape::new(vec![4]).unwrap();
        let source = cells(&[0, 0, 1, 1, 3, 3]);
        let occ = CellOccupancy::from_cells(&source, &grid, 2).unwrap();
        assert_eq!(occ.counts(), &[2, 2, 0, 2]);
        assert_eq!(occ.effective_cell(CellId(0), &grid), Some(CellId(0)));
        assert_eq!(occ.effective_cell(CellId(1), &grid), Some(CellId(1)));
        assert_eq!(occ.effective_cell(CellId(3), &grid), Some(CellId(3)));
        // equidistant from 1 and 3: lowest id wins
        assert_eq!(occ.effective_cell(CellId(2), &grid), Some(CellId(1)));
    }

    #[test]
    fn test_fallback_2d_uses_taxicab() {
        let grid = GridShape::new(vec![3, 3]).unwrap();
        // only cells (0,0) and (2,1) are populated
        let source = cells(&[0, 0, 7, 7]);
        let occ = CellOccupancy::from_cells(&source, &grid, 2).unwrap();
        // (1,1): distance 2 to (0,0), 1 to (2,1)
        assert_eq!(occ.effective_cell(grid.ravel(&[1, 1]), &grid), Some(CellId(7)));
        // (0,2): distance 2 to (0,0), 3 to (2,1)
        assert_eq!(occ.effective_cell(grid.ravel(&[0, 2]), &grid), Some(CellId(0)));
    }

    #[test]
    fn test_global_failure_draws_nothing() {
        struct PanicRng;
        impl rand::RngCore for PanicRng {
            fn next_u32(&mut self) -> u32 {
                panic!("random draw attempted")
            }
            fn next_u64(&mut self) -> u64 {
                panic!("random draw attempted")
            }
            fn fill_bytes(&mut self, _dst: &mut [u8]) {
                panic!("random draw attempted")
            }
        }

        let grid = GridShape::new(vec![4]).unwrap();
        let source = cells(&[0, 0, 1, 1, 3, 3]);
        let target = cells(&[0, 1, 2, 3]);
        let result = SourceHaloSelector::new(&grid, 3).select(&source, &target, &mut PanicRng);
        assert!(matches!(
            result,
            Err(GalsamplerError::InsufficientSampling { nhalo_min: 3, n_cells: 4, .. })
        ));
    }

    #[test]
    fn test_same_cell_when_well_sampled() {
        let mut rng = StdRng::seed_from_u64(43);
        let num_bins = 10;
        let source: Vec<CellId> = (0..100).map(|_| CellId(rng.random_range(0..num_bins))).collect();
        let target: Vec<CellId> = (0..1000).map(|_| CellId(rng.random_range(0..num_bins))).collect();
        let grid = GridShape::new(vec![num_bins as usize]).unwrap();

        let indices = SourceHaloSelector::new(&grid, 1)
            .select(&source, &target, &mut rng)
            .unwrap();
        assert_eq!(indices.len(), target.len());
        for (t, &s) in target.iter().zip(&indices) {
            assert_eq!(source[s], *t);
        }
    }

    #[test]
    fn test_fallback_selection_draws_from_neighbour() {
        let grid = GridShape::new(vec![4]).unwrap();
        let source = cells(&[0, 0, 1, 1, 3, 3]);
        let target = cells(&[2, 2, 2, 0]);
        let mut rng = StdRng::seed_from_u64(1);
        let selection = SourceHaloSelector::new(&grid, 2)
            .select_tracked(&source, &target, &[10, 11, 12, 13], &mut rng)
            .unwrap();
        for &s in &selection.source_indices[..3] {
            assert_eq!(source[s], CellId(1));
        }
        assert_eq!(source[selection.source_indices[3]], CellId(0));
        assert_eq!(selection.target_halo_ids, vec![10, 11, 12, 13]);
        assert_eq!(selection.diagnostics.n_target_cells, 2);
        assert_eq!(selection.diagnostics.n_fallback_target_cells, 1);
        assert_eq!(selection.diagnostics.n_well_sampled_cells, 3);
    }

    #[test]
    fn test_reproducible_with_seed() {
        let grid = GridShape::new(vec![5]).unwrap();
        let source: Vec<CellId> = (0..500u32).map(|i| CellId(i % 5)).collect();
        let target: Vec<CellId> = (0..2000u32).map(|i| CellId((i * 3) % 5)).collect();
        let selector = SourceHaloSelector::new(&grid, 1);
        let a = selector.select(&source, &target, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = selector.select(&source, &target, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cell_outside_grid() {
        let grid = GridShape::new(vec![2]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let result = SourceHaloSelector::new(&grid, 1).select(&cells(&[0, 1]), &cells(&[2]), &mut rng);
        assert!(matches!(result, Err(GalsamplerError::InvalidData { .. })));
    }

    #[test]
    fn test_tracked_shape_mismatch() {
        let grid = GridShape::new(vec![2]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let result = SourceHaloSelector::new(&grid, 1).select_tracked(
            &cells(&[0, 1]),
            &cells(&[0, 1]),
            &[5],
            &mut rng,
        );
        assert!(matches!(result, Err(GalsamplerError::Shape { .. })));
    }

    #[test]
    fn test_distribution_matching_follows_target_values() {
        // one cell; source halos with secondary values 0..100
        let grid = GridShape::new(vec![1]).unwrap();
        let source = vec![CellId(0); 100];
        let source_values: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let target = vec![CellId(0); 50];
        let target_values: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 1.0 } else { 98.0 }).collect();

        let policy = IntraCellPolicy::MatchDistribution(DistributionMatch {
            source_values: &source_values,
            target_values: &target_values,
            n_bins: 10,
        });
        let mut rng = StdRng::seed_from_u64(5);
        let indices = SourceHaloSelector::new(&grid, 1)
            .with_policy(policy)
            .select(&source, &target, &mut rng)
            .unwrap();

        for (i, &s) in indices.iter().enumerate() {
            let v = source_values[s];
            if i % 2 == 0 {
                assert!(v < 10.0, "low target matched to {}", v);
            } else {
                assert!(v >= 89.0, "high target matched to {}", v);
            }
        }
    }

    #[test]
    fn test_value_bin_clamps() {
        assert_eq!(value_bin(0.0, 0.0, 10.0, 5), 0);
        assert_eq!(value_bin(1.99, 0.0, 10.0, 5), 0);
        assert_eq!(value_bin(2.0, 0.0, 10.0, 5), 1);
        assert_eq!(value_bin(9.5, 0.0, 10.0, 5), 4);
        assert_eq!(value_bin(10.0, 0.0, 10.0, 5), 4);
        assert_eq!(value_bin(50.0, 0.0, 10.0, 5), 4);
        assert_eq!(value_bin(-3.0, 0.0, 10.0, 5), 0);
        assert_eq!(value_bin(f64::NAN, 0.0, 10.0, 5), 0);
    }

    #[test]
    fn test_thread_count_does_not_change_selection() {
        let grid = GridShape::new(vec![50]).unwrap();
        let source: Vec<CellId> = (0..5000u32).map(|i| CellId((i * 7) % 45)).collect();
        let target: Vec<CellId> = (0..20_000u32).map(|i| CellId((i * 13) % 50)).collect();
        let edges = vec![(0..50).map(|i| i as f64).collect::<Vec<_>>()];

        let run_on = |n_threads: usize| {
            build_thread_pool(n_threads).unwrap().install(|| {
                let mut rng = StdRng::seed_from_u64(17);
                select_source_halo(&source, &target, 2, &edges, &mut rng).unwrap()
            })
        };
        let single = run_on(1);
        assert_eq!(single.len(), target.len());
        assert_eq!(single, run_on(8));
    }

    #[test]
    fn test_nearest_occupied_bucket() {
        let buckets = vec![vec![1], vec![], vec![], vec![4]];
        assert_eq!(nearest_occupied(&buckets, 1), &[1]);
        assert_eq!(nearest_occupied(&buckets, 2), &[4]);
        assert_eq!(nearest_occupied(&buckets, 3), &[4]);
    }

    #[test]
    fn test_select_source_halo_from_edges() {
        let edges = vec![vec![0.0, 1.0, 2.0]];
        let mut rng = StdRng::seed_from_u64(3);
        let out = select_source_halo(&cells(&[0, 1, 2]), &cells(&[2, 1, 0]), 1, &edges, &mut rng).unwrap();
        assert_eq!(out, vec![2, 1, 0]);
    }
}
