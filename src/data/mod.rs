//! # Data Module
//!
//! In-memory representations of halo catalogs and the cell grid.
//!
//! ## Design Philosophy: Data-Oriented Design
//! - **Structure of Arrays (SoA):** catalogs arrive as parallel flat columns
//!   (`halo_id`, property values, host ids) rather than row structs.
//! - **Zero-cost newtypes:** `CellId` keeps flattened cell ids apart from row
//!   indices and halo identifiers.

pub mod catalog;
pub mod cell;

// Re-export commonly used types
pub use catalog::{enforce_key_correspondence, BinningScheme, KeyCorrespondence, PropertyBins, PropertyTable};
pub use cell::{CellId, GridShape};
