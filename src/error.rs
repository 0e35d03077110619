//! Error types for the relighting pipeline.

use thiserror::Error;

/// Main error type for relighting operations.
#[derive(Error, Debug)]
pub enum RelightError {
    /// Input data rejected before any compute begins
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Two rasters or grids that must match do not
    #[error("Dimension mismatch for {what}: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        what: &'static str,
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Accumulation stopped at an iteration boundary
    #[error("Cancelled after {completed} of {total} iterations")]
    Cancelled { completed: usize, total: usize },

    /// Image encoding/decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelightError {
    /// Create an invalid input error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check a pair of dimensions, returning `DimensionMismatch` when they differ.
    pub fn check_dimensions(
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                what,
                expected_width: expected.0,
                expected_height: expected.1,
                width: actual.0,
                height: actual.1,
            })
        }
    }

    /// True for errors raised by input validation.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::DimensionMismatch { .. })
    }
}

/// Result type alias for relighting operations.
pub type Result<T> = std::result::Result<T, RelightError>;
