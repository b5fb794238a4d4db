//! Error types for seg-eval operations.

use thiserror::Error;

/// Result type alias for seg-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during segmentation evaluation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Spatial dimensions don't match between paired grids.
    ///
    /// Raised whenever the co-transform invariant is violated: an image
    /// and its label (or a ground truth and a prediction) stopped
    /// sharing identical width and height. Proceeding would silently
    /// corrupt every downstream count, so this is fatal for the sample.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected dimensions (width, height).
        expected: (usize, usize),
        /// Actual dimensions (width, height).
        actual: (usize, usize),
    },

    /// A class index outside `[0, n_class)` was encountered.
    #[error("Class {class} out of range (n_class = {n_class})")]
    ClassRange {
        /// The offending class index.
        class: u32,
        /// Number of classes configured for the run.
        n_class: usize,
    },

    /// Crop offset does not leave any rows to evaluate.
    #[error("Crop offset {offset} out of bounds for height {height}")]
    CropOutOfBounds {
        /// Configured top offset in rows.
        offset: usize,
        /// Height of the grid being cropped.
        height: usize,
    },

    /// The predictor returned score maps inconsistent with the run.
    #[error("Bad score map: {reason}")]
    BadScoreMap {
        /// Why the score map was rejected.
        reason: String,
    },

    /// Error from the external predictor.
    #[error("Predictor error: {message}")]
    Predictor {
        /// Error message from the predictor.
        message: String,
    },

    /// Invalid evaluation configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error writing report files.
    #[error("Report error: {0}")]
    Report(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Wrap a predictor failure message.
    #[must_use]
    pub fn predictor(message: impl Into<String>) -> Self {
        Self::Predictor {
            message: message.into(),
        }
    }
}
