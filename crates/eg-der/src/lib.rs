//! eg-der: DER/load model builder.
//!
//! Builds per-DER active/reactive power time series on the network's
//! per-unit base (injection positive) and maps them onto node-phase rows
//! through the DER incidence matrix. Flexible building loads obtain their
//! profile from a [`BuildingModel`] collaborator.

pub mod building;
pub mod error;
pub mod model;
pub mod profile;
pub mod timesteps;

pub use building::{BuildingModel, FixedBuildingProfiles, RecordedBuildingProfiles};
pub use error::{DerError, DerResult};
pub use model::{DerModel, injection_sign};
pub use profile::PowerProfile;
pub use timesteps::Timesteps;
