//! Error types for DER model construction.

use eg_core::EgError;
use thiserror::Error;

pub type DerResult<T> = Result<T, DerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DerError {
    /// A profile does not have one value per timestep.
    #[error("Profile '{series}' of DER '{der}' has {actual} values, expected {expected}")]
    ProfileAlignment {
        der: String,
        series: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "DER '{der}' draws {apparent_kva:.3} kVA at timestep {timestep}, node '{node}' is rated {rated_kva:.3} kVA"
    )]
    CapacityExceeded {
        der: String,
        node: String,
        timestep: usize,
        apparent_kva: f64,
        rated_kva: f64,
    },

    #[error("DER '{der}' has no recorded profile")]
    MissingProfile { der: String },

    /// Failure reported by a building model collaborator.
    #[error("Building model failed for DER '{der}': {reason}")]
    Building { der: String, reason: String },

    #[error("Invalid timesteps: {reason}")]
    InvalidTimesteps { reason: String },

    #[error("Core error: {0}")]
    Core(#[from] EgError),
}
