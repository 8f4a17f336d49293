//! # I/O Module
//!
//! JSON run files for the command-line driver. The resampling core itself
//! only ever sees flat arrays.

pub mod catalog;

pub use catalog::{read_run_input, write_run_output, GalaxyTable, RunInput, RunOutput};
