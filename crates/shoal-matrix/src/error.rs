//! Error types for the `shoal-matrix` crate.

use shoal_types::TypesError;

/// Errors raised by banded and population matrix operations.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// A row or column outside the allocated band was addressed.
    #[error("index out of band: row {row}, column {col}")]
    OutOfBand {
        /// Row key that was requested.
        row: u32,
        /// Column that was requested.
        col: usize,
    },

    /// Two structures do not share a compatible length range.
    #[error("incompatible length ranges: {reason}")]
    IncompatibleRange {
        /// Explanation of the mismatch.
        reason: String,
    },

    /// A tag cohort was added twice, or an unknown cohort was addressed.
    #[error("invalid operation on tag {tag}: {reason}")]
    InvalidTagOperation {
        /// Name of the tag cohort involved.
        tag: String,
        /// Explanation of what went wrong.
        reason: String,
    },

    /// A length division or conversion could not be built.
    #[error("length descriptor error: {source}")]
    Types {
        /// The underlying descriptor error.
        #[from]
        source: TypesError,
    },
}
