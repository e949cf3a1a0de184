//! eg-solver: power-flow linearization.
//!
//! Produces a first-order model of AC power flow (node-row power injections
//! to voltage, branch flow and losses) around one reference operating point.
//! Two formulations are available:
//!
//! - **fixed point**: `∂V/∂P = Y_nn⁻¹ diag(1/conj(V_ref))` on the non-source
//!   block of the nodal admittance
//! - **jacobian**: inverse of the polar power-flow Jacobian over the
//!   non-source rows
//!
//! Both fail with a [`SolverError`] on islanded rows, singular blocks or a
//! condition number above the configured bound; there is no fallback to
//! degenerate sensitivities.
//!
//! # Example
//!
//! ```no_run
//! use eg_network::NetworkModel;
//! use eg_solver::{LinearizationSettings, LinearizedModel};
//!
//! # fn demo(network: &NetworkModel) -> eg_solver::SolverResult<()> {
//! let model = LinearizedModel::build(network, &LinearizationSettings::default())?;
//! let dv_dp = &model.active().voltage_magnitude;
//! assert_eq!(dv_dp.nrows(), network.node_dim());
//! # Ok(())
//! # }
//! ```

pub mod conditioning;
pub mod error;
pub mod jacobian;
pub mod linear;
pub mod reference;
pub mod sensitivity;
pub mod settings;

pub use conditioning::{invert_checked, one_norm};
pub use error::{SolverError, SolverResult};
pub use jacobian::{numerical_polar_jacobian, polar_jacobian, row_power};
pub use linear::{DerSensitivities, LinearizedModel, linearize};
pub use reference::{ReferencePoint, flat_start_voltage, no_load_voltage};
pub use sensitivity::Sensitivities;
pub use settings::{
    DEFAULT_MAX_CONDITION_NUMBER, LinearizationMethod, LinearizationSettings, ReferenceKind,
};
