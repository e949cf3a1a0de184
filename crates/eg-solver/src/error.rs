//! Error types for power-flow linearization.

use eg_core::EgError;
use eg_network::NetworkError;
use thiserror::Error;

/// Errors raised while linearizing a network model.
///
/// Every variant except `Network` and `Core` is a numerical failure of the
/// linearization itself: fatal for that scenario unless another reference
/// point is supplied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Singular system: {what}")]
    Singular { what: String },

    #[error("Ill-conditioned {what}: condition number {condition:e} exceeds {bound:e}")]
    IllConditioned {
        what: String,
        condition: f64,
        bound: f64,
    },

    #[error("Rows not connected to the source: {}", rows.join(", "))]
    Islanded { rows: Vec<String> },

    #[error("Reference voltage has {actual} entries, expected {expected}")]
    ReferenceDimension { expected: usize, actual: usize },

    #[error("Invalid reference voltage: {reason}")]
    InvalidReference { reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Core error: {0}")]
    Core(#[from] EgError),
}

impl SolverError {
    /// Numerical failure of the linearization (as opposed to bad input plumbing).
    pub fn is_linearization_failure(&self) -> bool {
        !matches!(self, SolverError::Network(_) | SolverError::Core(_))
    }
}

pub type SolverResult<T> = Result<T, SolverError>;
