//! eg-network: network model builder.
//!
//! Turns a validated grid into per-unit branch primitives and the sparse
//! nodal admittance, branch admittance, branch incidence and DER incidence
//! matrices, all sharing the rows of the grid's `ElementIndex`.

pub mod admittance;
pub mod error;
pub mod model;
pub mod per_unit;
pub mod primitive;

pub use admittance::{AdmittanceSet, SparseComplex, real_to_dense};
pub use error::{NetworkError, NetworkResult};
pub use model::NetworkModel;
pub use per_unit::{PHASE_POWER_SHARE, PerUnitSystem};
pub use primitive::{BranchPrimitive, triangle_to_matrix};
