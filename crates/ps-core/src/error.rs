//! Error types for plotstack

use thiserror::Error;

/// plotstack error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Bin-wise arithmetic between histograms of different binning.
    ///
    /// Always fatal for the current plot evaluation.
    #[error("Shape mismatch in {context}: expected {expected} bins, found {found}")]
    ShapeMismatch {
        /// Operation that detected the mismatch.
        context: String,
        /// Bin count of the left-hand operand.
        expected: usize,
        /// Bin count of the right-hand operand.
        found: usize,
    },
}

impl Error {
    /// Shorthand for a [`Error::ShapeMismatch`].
    pub fn shape_mismatch(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Error::ShapeMismatch { context: context.into(), expected, found }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
