//! # Model Module
//!
//! The resampling algorithms, leaves first:
//! - `binning`: property values to flattened cell ids
//! - `richness`: galaxy counts per host halo
//! - `range_draw`: uniform draws from half-open index ranges
//! - `selection`: one source halo per target halo, with nearest-cell fallback
//! - `matching`: one-dimensional nearest-value matching
//! - `expansion`: selected halos to resident galaxy rows

pub mod binning;
pub mod expansion;
pub mod matching;
pub mod range_draw;
pub mod richness;
pub mod selection;

pub use binning::{bin_indices, BinSpec, Binner};
pub use expansion::{expand_to_galaxies, repeat_ids, HostSortedGalaxies};
pub use matching::matched_value_selection_indices;
pub use range_draw::draw_from_ranges;
pub use richness::{compute_richness, HostCounts};
pub use selection::{
    select_source_halo, CellOccupancy, DistributionMatch, HaloSelection, IntraCellPolicy,
    SamplingDiagnostics, SourceHaloSelector,
};
