//! # JSON Run Files
//!
//! Reader for the run description handed to the CLI (bins, the three
//! catalogs reduced to flat columns, the key correspondence) and writer for
//! the selection result.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::data::catalog::{KeyCorrespondence, PropertyBins, PropertyTable};
use crate::error::Result;
use crate::model::selection::SamplingDiagnostics;
use crate::pipelines::resample::GalaxySelection;

/// Source galaxies: only the host id column matters to the resampler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GalaxyTable {
    pub host_halo_id: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub bins: Vec<PropertyBins>,
    pub source_halos: PropertyTable,
    pub source_galaxies: GalaxyTable,
    pub target_halos: PropertyTable,
    #[serde(default)]
    pub key_correspondence: KeyCorrespondence,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub galaxy_indices: Vec<usize>,
    pub source_halo_indices: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_halo_ids: Option<Vec<i64>>,
    pub diagnostics: SamplingDiagnostics,
}

impl From<GalaxySelection> for RunOutput {
    fn from(selection: GalaxySelection) -> Self {
        Self {
            galaxy_indices: selection.galaxy_indices,
            source_halo_indices: selection.source_halo_indices,
            target_halo_ids: selection.target_halo_ids,
            diagnostics: selection.diagnostics,
        }
    }
}

pub fn read_run_input(path: &Path) -> Result<RunInput> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open run file {}", path.display()))?;
    let input: RunInput = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse run file {}", path.display()))?;
    Ok(input)
}

pub fn write_run_output(path: &Path, output: &RunOutput) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, output)?;
    writer.flush()?;
    Ok(())
}
