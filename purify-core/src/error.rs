//! Error types for purification and its statistical collaborators.
//!
//! Rejecting an impure indicator is a normal outcome and is reported through
//! [`crate::Decision`]; everything here aborts the run.

use thiserror::Error;

/// Result type for purification operations.
pub type PurifyResult<T> = Result<T, PurifyError>;

/// Errors that can occur while purifying a clustering.
#[derive(Debug, Error)]
pub enum PurifyError {
    /// A clustered node has no counterpart in the oracle's variables.
    #[error("Variable '{name}' is not known to the tetrad test")]
    UnknownVariable { name: String },

    /// A node occurs twice within the same input cluster.
    #[error("Variable '{name}' occurs more than once in cluster {cluster}")]
    DuplicateVariable { name: String, cluster: usize },

    /// A fixed visitation order is not a permutation of the clustered nodes.
    #[error("Invalid visitation order: {message}")]
    InvalidVisitOrder { message: String },

    /// A configuration value is out of range.
    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },

    /// Matrix or proposition shapes disagree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Input data cannot be used (non-finite values, bad categories, ...).
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// The statistical oracle could not produce a p-value.
    #[error("Oracle computation failed: {message}")]
    OracleComputation { message: String },

    /// The configured number of tetrad evaluations was used up.
    #[error("Search budget of {limit} tetrad evaluations exhausted")]
    BudgetExhausted { limit: u64 },

    /// An internal contract was violated; indicates an enumeration bug.
    #[error("Precondition violated: {message}")]
    Precondition { message: String },
}

impl PurifyError {
    /// Create an oracle computation error from any displayable cause.
    pub fn oracle<E: std::fmt::Display>(e: E) -> Self {
        Self::OracleComputation {
            message: e.to_string(),
        }
    }

    /// Create a configuration error from any displayable cause.
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidConfig {
            message: e.to_string(),
        }
    }

    /// Create an invalid-data error from any displayable cause.
    pub fn data<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidData {
            message: e.to_string(),
        }
    }
}
