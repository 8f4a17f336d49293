//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//! Every failure is terminal for the batch: nothing is retried and no partial
//! selection is ever returned.

use thiserror::Error;

/// Main error type for galsampler operations
#[derive(Error, Debug)]
pub enum GalsamplerError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON run files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parallel input arrays of differing length
    #[error("Shape mismatch: {message}")]
    Shape { message: String },

    /// A selection range with no candidates (`last <= first`)
    #[error("Degenerate range at position {index}: first={first}, last={last} (must have at least one source halo per target)")]
    DegenerateRange { index: usize, first: i64, last: i64 },

    /// No cell of the source grid reaches `nhalo_min`
    #[error(
        "The fraction of cells in the source catalog with more halos than \
         nhalo_min={nhalo_min} is {frac_good:.2} (0 of {n_cells} cells); \
         widen the bins or lower nhalo_min"
    )]
    InsufficientSampling {
        nhalo_min: usize,
        n_cells: usize,
        frac_good: f64,
    },

    /// A binning property missing from a table
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Bin edges that cannot define a grid
    #[error("Invalid bins: {message}")]
    InvalidBins { message: String },

    /// Invalid data (cell out of range, unsorted galaxies, bad expansion range)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Errors carrying `anyhow` context from the I/O layer
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type alias for Results using GalsamplerError
pub type Result<T> = std::result::Result<T, GalsamplerError>;

impl GalsamplerError {
    /// Create a shape mismatch error
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an invalid bins error
    pub fn invalid_bins(message: impl Into<String>) -> Self {
        Self::InvalidBins {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Fail with a shape error unless `actual == expected`.
    pub(crate) fn check_len(what: &str, actual: usize, expected_what: &str, expected: usize) -> Result<()> {
        if actual == expected {
            Ok(())
        } else {
            Err(Self::shape(format!(
                "{} has length {} but {} has length {}",
                what, actual, expected_what, expected
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len() {
        assert!(GalsamplerError::check_len("a", 3, "b", 3).is_ok());
        let err = GalsamplerError::check_len("first", 2, "last", 3).unwrap_err();
        assert!(matches!(err, GalsamplerError::Shape { .. }));
        assert!(err.to_string().contains("first has length 2"));
    }

    #[test]
    fn test_insufficient_sampling_message() {
        let err = GalsamplerError::InsufficientSampling {
            nhalo_min: 7,
            n_cells: 4,
            frac_good: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("nhalo_min=7"));
        assert!(msg.contains("0.00"));
    }
}
