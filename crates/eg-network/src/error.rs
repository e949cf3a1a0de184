//! Error types for network model construction.

use eg_core::EgError;
use eg_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Core error: {0}")]
    Core(#[from] EgError),

    #[error("Series impedance of {kind} '{branch}' is zero or not invertible")]
    SingularImpedance { kind: &'static str, branch: String },

    #[error("Invalid parameter for {element}: {reason}")]
    InvalidParameter { element: String, reason: String },
}

pub type NetworkResult<T> = Result<T, NetworkError>;
