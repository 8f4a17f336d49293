//! # Galsampler Library
//!
//! Monte Carlo resampling of galaxy catalogs: every halo of a target
//! simulation is populated with the galaxies of a statistically similar
//! source halo, chosen by shared binning of halo properties.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: Halo property tables, binning schemes and the cell grid
//! - `error`: Error types and result aliases
//! - `io`: JSON run files
//! - `model`: Binning, richness, halo selection and galaxy expansion
//! - `pipelines`: High-level workflow orchestration
//! - `utils`: Telemetry and thread pools

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use data::catalog::{BinningScheme, KeyCorrespondence, PropertyBins, PropertyTable};
pub use data::cell::{CellId, GridShape};
pub use error::{GalsamplerError, Result};
pub use model::binning::{bin_indices, BinSpec, Binner};
pub use model::expansion::expand_to_galaxies;
pub use model::richness::compute_richness;
pub use model::selection::{select_source_halo, SourceHaloSelector};

pub use pipelines::{source_galaxy_selection_indices, GalaxyResampler, ResamplePipeline};
