//! Error types for the `shoal-types` crate.

/// Errors raised while building shared length and time descriptors.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A length-group division could not be built from the given bounds.
    #[error("invalid length group division: {reason}")]
    InvalidDivision {
        /// Explanation of what is wrong with the bounds.
        reason: String,
    },

    /// Two length-group divisions do not overlap, so no index correspondence
    /// between them exists.
    #[error("incompatible length ranges: {reason}")]
    IncompatibleRange {
        /// Explanation of the mismatch.
        reason: String,
    },
}
