//! # Resampling Pipeline
//!
//! ## Role
//! Compose binning, richness, source-halo selection and galaxy expansion into
//! one batch computation that returns, for every galaxy of the resampled
//! target population, its row in the caller's source galaxy array.
//!
//! ## Algorithm Overview
//! 1. **Richness:** count resident galaxies of every source halo
//! 2. **Sort:** order source galaxies by host id (contiguous runs per halo)
//! 3. **Select:** one source halo per target halo (cell match + fallback)
//! 4. **Expand:** selected halo to its run of galaxies, in selection order
//! 5. **Remap:** sorted positions back to the caller's galaxy rows
//!
//! [`ResamplePipeline`] wraps the same steps for the CLI: it loads a JSON run
//! file, bins both catalogs by name, and writes the result back out.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span, instrument, warn};

use crate::config::Config;
use crate::data::catalog::{enforce_key_correspondence, BinningScheme};
use crate::data::cell::{CellId, GridShape};
use crate::error::{GalsamplerError, Result};
use crate::io::catalog::{read_run_input, write_run_output, RunOutput};
use crate::model::binning::Binner;
use crate::model::expansion::{expand_to_galaxies, repeat_ids, HostSortedGalaxies};
use crate::model::richness::compute_richness;
use crate::model::selection::{
    DistributionMatch, IntraCellPolicy, SamplingDiagnostics, SourceHaloSelector,
};
use crate::utils::telemetry::{Stage, TelemetryBlackboard};

/// Arrays handed over by the catalog layer.
#[derive(Clone, Copy, Debug)]
pub struct SelectionInputs<'a> {
    /// Host halo id of every source galaxy, in the caller's order
    pub galaxy_host_ids: &'a [i64],
    pub source_halo_ids: &'a [i64],
    pub source_cells: &'a [CellId],
    pub target_cells: &'a [CellId],
    /// When present, broadcast to every selected galaxy
    pub target_halo_ids: Option<&'a [i64]>,
}

/// Result of an end-to-end selection.
#[derive(Clone, Debug)]
pub struct GalaxySelection {
    /// Row into the caller's source galaxy array, one per target galaxy
    pub galaxy_indices: Vec<usize>,
    /// Source halo row chosen for every target halo
    pub source_halo_indices: Vec<usize>,
    /// Galaxies given to every target halo
    pub galaxies_per_target_halo: Vec<u32>,
    /// Target halo id of every target galaxy (when ids were supplied)
    pub target_halo_ids: Option<Vec<i64>>,
    pub diagnostics: SamplingDiagnostics,
}

/// End-to-end resampler over a fixed cell grid.
pub struct GalaxyResampler<'a> {
    grid: &'a GridShape,
    nhalo_min: usize,
    policy: IntraCellPolicy<'a>,
    telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl<'a> GalaxyResampler<'a> {
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

    fn set_stage(&self, stage: Stage) {
        if let Some(bb) = &self.telemetry {
            bb.set_stage(stage);
        }
    }

    #[instrument(skip_all, fields(
        n_galaxies = inputs.galaxy_host_ids.len(),
        n_source_halos = inputs.source_halo_ids.len(),
        n_target_halos = inputs.target_cells.len(),
    ))]
    pub fn run<R: Rng + ?Sized>(&self, inputs: &SelectionInputs<'_>, rng: &mut R) -> Result<GalaxySelection> {
        GalsamplerError::check_len(
            "source cell ids",
            inputs.source_cells.len(),
            "source halo ids",
            inputs.source_halo_ids.len(),
        )?;
        if let Some(ids) = inputs.target_halo_ids {
            GalsamplerError::check_len("target halo ids", ids.len(), "target cell ids", inputs.target_cells.len())?;
        }

        self.set_stage(Stage::Richness);
        let richness = info_span!("richness")
            .in_scope(|| compute_richness(inputs.source_halo_ids, inputs.galaxy_host_ids));
        let galaxies = HostSortedGalaxies::from_unsorted(inputs.galaxy_host_ids);

        self.set_stage(Stage::SelectingHalos);
        if let Some(bb) = &self.telemetry {
            bb.set_total_target_halos(inputs.target_cells.len() as u64);
        }
        let selector = SourceHaloSelector::new(self.grid, self.nhalo_min)
            .with_policy(self.policy)
            .with_telemetry(self.telemetry.clone());
        let (source_halo_indices, diagnostics) = match inputs.target_halo_ids {
            Some(ids) => {
                let selection = selector.select_tracked(inputs.source_cells, inputs.target_cells, ids, rng)?;
                (selection.source_indices, selection.diagnostics)
            }
            None => selector.select_with_diagnostics(inputs.source_cells, inputs.target_cells, rng)?,
        };

        if diagnostics.n_fallback_target_cells > 0 {
            warn!(
                n_fallback = diagnostics.n_fallback_target_cells,
                n_target_cells = diagnostics.n_target_cells,
                frac_well_sampled = diagnostics.frac_well_sampled,
                "target cells with fewer than nhalo_min={} source halos borrowed from neighbouring cells",
                self.nhalo_min
            );
        }

        self.set_stage(Stage::ExpandingGalaxies);
        let _span = info_span!("expand_galaxies").entered();
        let mut first = Vec::with_capacity(source_halo_indices.len());
        let mut counts = Vec::with_capacity(source_halo_indices.len());
        for &idx in &source_halo_indices {
            let n = richness[idx];
            let halo_id = inputs.source_halo_ids[idx];
            let start = match galaxies.first_index(halo_id) {
                Some(pos) => pos,
                None if n == 0 => 0,
                None => {
                    return Err(GalsamplerError::invalid_data(format!(
                        "source halo {} has richness {} but no galaxy run",
                        halo_id, n
                    )))
                }
            };
            first.push(start);
            counts.push(n);
        }

        let mut galaxy_indices = expand_to_galaxies(&first, &counts)?;
        for row in galaxy_indices.iter_mut() {
            *row = galaxies.original_row(*row);
        }
        let target_halo_ids = inputs
            .target_halo_ids
            .map(|ids| repeat_ids(ids, &counts))
            .transpose()?;

        if let Some(bb) = &self.telemetry {
            bb.add_galaxies_emitted(galaxy_indices.len() as u64);
        }

        Ok(GalaxySelection {
            galaxy_indices,
            source_halo_indices,
            galaxies_per_target_halo: counts,
            target_halo_ids,
            diagnostics,
        })
    }
}

/// Rows of the caller's source galaxy array that populate the target halos.
///
/// Galaxies of one target halo are contiguous, target halos appear in input
/// order, and within a halo galaxies keep their relative source order.
pub fn source_galaxy_selection_indices<R: Rng + ?Sized, E: AsRef<[f64]>>(
    galaxy_host_ids: &[i64],
    source_halo_ids: &[i64],
    source_cells: &[CellId],
    target_cells: &[CellId],
    nhalo_min: usize,
    bin_edges: &[E],
    rng: &mut R,
) -> Result<Vec<usize>> {
    let grid = GridShape::from_edges(bin_edges)?;
    let inputs = SelectionInputs {
        galaxy_host_ids,
        source_halo_ids,
        source_cells,
        target_cells,
        target_halo_ids: None,
    };
    GalaxyResampler::new(&grid, nhalo_min)
        .run(&inputs, rng)
        .map(|selection| selection.galaxy_indices)
}

/// CLI driver: JSON run file in, JSON result out.
pub struct ResamplePipeline {
    config: Config,
    telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl ResamplePipeline {
    pub fn new(config: Config, telemetry: Option<Arc<TelemetryBlackboard>>) -> Self {
        Self { config, telemetry }
    }

    fn set_stage(&self, stage: Stage) {
        if let Some(bb) = &self.telemetry {
            bb.set_stage(stage);
        }
    }

    #[instrument(skip_all, name = "resample_pipeline")]
    pub fn run(&mut self) -> Result<RunOutput> {
        self.set_stage(Stage::LoadingCatalogs);
        let input = read_run_input(&self.config.input)?;
        input.source_halos.validate("source halos")?;
        input.target_halos.validate("target halos")?;
        info!(
            n_source_halos = input.source_halos.len(),
            n_source_galaxies = input.source_galaxies.host_halo_id.len(),
            n_target_halos = input.target_halos.len(),
            "catalogs loaded"
        );

        self.set_stage(Stage::Binning);
        let scheme = BinningScheme::new(input.bins.clone())?;
        enforce_key_correspondence(
            &input.source_halos,
            &input.target_halos,
            &scheme,
            &input.key_correspondence,
        )?;
        let (source_cells, target_cells) = info_span!("binning").in_scope(|| -> Result<_> {
            let identity = Default::default();
            let source = Binner::from_table(&input.source_halos, &scheme, &identity, "source halos")?;
            let target = Binner::from_table(
                &input.target_halos,
                &scheme,
                &input.key_correspondence,
                "target halos",
            )?;
            Ok((source.cell_ids(), target.cell_ids()))
        })?;

        // Secondary values for distribution matching; "richness" on the source
        // side is the computed occupation, not a stored column.
        let match_values = match &self.config.match_property {
            Some(name) => {
                let source_values: Vec<f64> = if name == "richness" && !input.source_halos.has_column(name) {
                    compute_richness(&input.source_halos.halo_id, &input.source_galaxies.host_halo_id)
                        .into_iter()
                        .map(f64::from)
                        .collect()
                } else {
                    input.source_halos.column(name, "source halos")?.to_vec()
                };
                let target_name = input.key_correspondence.target_name(name);
                let target_values = input.target_halos.column(target_name, "target halos")?.to_vec();
                Some((source_values, target_values))
            }
            None => None,
        };
        let policy = match &match_values {
            Some((source_values, target_values)) => IntraCellPolicy::MatchDistribution(DistributionMatch {
                source_values,
                target_values,
                n_bins: self.config.match_bins,
            }),
            None => IntraCellPolicy::Uniform,
        };

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let inputs = SelectionInputs {
            galaxy_host_ids: &input.source_galaxies.host_halo_id,
            source_halo_ids: &input.source_halos.halo_id,
            source_cells: &source_cells,
            target_cells: &target_cells,
            target_halo_ids: (!self.config.no_track_ids).then_some(input.target_halos.halo_id.as_slice()),
        };
        let selection = GalaxyResampler::new(scheme.grid(), self.config.nhalo_min)
            .with_policy(policy)
            .with_telemetry(self.telemetry.clone())
            .run(&inputs, &mut rng)?;

        info!(
            n_target_galaxies = selection.galaxy_indices.len(),
            n_cells = selection.diagnostics.n_cells,
            n_well_sampled_cells = selection.diagnostics.n_well_sampled_cells,
            n_fallback_target_cells = selection.diagnostics.n_fallback_target_cells,
            "selection complete"
        );

        self.set_stage(Stage::WritingOutput);
        let output = RunOutput::from(selection);
        write_run_output(&self.config.out, &output)?;
        Ok(output)
    }
}
