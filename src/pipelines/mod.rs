//! # Pipeline Module
//!
//! High-level orchestration of the resampling workflow.

pub mod resample;

pub use resample::{
    source_galaxy_selection_indices, GalaxyResampler, GalaxySelection, ResamplePipeline,
    SelectionInputs,
};
