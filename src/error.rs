//! Error types for Parcelar operations.
//!
//! Provides rich error context for library consumers.

use std::fmt;

/// Main error type for Parcelar operations.
///
/// Invalid configuration is always surfaced before any partitioning work
/// begins; degenerate folds and non-converged searches are *not* errors and
/// are reported through [`crate::partition::Fold::degenerate`] and
/// [`crate::partition::PartitionMetadata::converged`] instead.
///
/// # Examples
///
/// ```
/// use parcelar::error::ParcelarError;
///
/// let err = ParcelarError::InvalidConfig {
///     param: "k".to_string(),
///     value: "1".to_string(),
///     constraint: ">= 2".to_string(),
/// };
/// assert!(err.to_string().contains("Invalid configuration"));
/// ```
#[derive(Debug)]
pub enum ParcelarError {
    /// Invalid partitioner configuration (k < 2, non-positive size/radius,
    /// fraction outside (0, 1), empty fold after tessellation, ...).
    InvalidConfig {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Empty input: zero points, missing features, empty spatial index.
    EmptyInput {
        /// What was empty
        context: String,
    },

    /// Point set and covariate source use different coordinate reference
    /// systems. Fatal; aborts before producing any fold.
    CrsMismatch {
        /// CRS of the point set
        expected: String,
        /// CRS of the covariate source
        actual: String,
    },

    /// A point fell outside the queried covariate surface.
    OutsideCoverage {
        /// Offending point id
        id: usize,
    },

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for ParcelarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParcelarError::InvalidConfig {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid configuration: {param} = {value}, expected {constraint}"
                )
            }
            ParcelarError::EmptyInput { context } => {
                write!(f, "Empty input: {context}")
            }
            ParcelarError::CrsMismatch { expected, actual } => {
                write!(
                    f,
                    "CRS mismatch: point set uses {expected}, covariate source uses {actual}"
                )
            }
            ParcelarError::OutsideCoverage { id } => {
                write!(f, "Point {id} falls outside the covariate surface")
            }
            ParcelarError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ParcelarError {}

impl From<&str> for ParcelarError {
    fn from(msg: &str) -> Self {
        ParcelarError::Other(msg.to_string())
    }
}

impl From<String> for ParcelarError {
    fn from(msg: String) -> Self {
        ParcelarError::Other(msg)
    }
}

impl ParcelarError {
    /// Create an invalid-configuration error with descriptive context.
    #[must_use]
    pub fn invalid_config(param: &str, value: impl fmt::Display, constraint: &str) -> Self {
        Self::InvalidConfig {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Create an empty input error.
    #[must_use]
    pub fn empty_input(context: &str) -> Self {
        Self::EmptyInput {
            context: context.to_string(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, ParcelarError>;
