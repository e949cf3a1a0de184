//! Building model collaborator.
//!
//! Flexible building loads get their electrical-equivalent profile from an
//! external building model. The thermal dynamics stay behind this trait;
//! the DER model only checks what comes back.

use std::collections::HashMap;

use eg_graph::Der;

use crate::error::{DerError, DerResult};
use crate::profile::PowerProfile;
use crate::timesteps::Timesteps;

pub trait BuildingModel: Send + Sync {
    /// Consumption profile (kW / kvar, consumption positive) of `der` over `timesteps`.
    fn electric_profile(&self, der: &Der, timesteps: &Timesteps) -> DerResult<PowerProfile>;
}

/// Reads the profile stored in the DER record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedBuildingProfiles;

impl BuildingModel for RecordedBuildingProfiles {
    fn electric_profile(&self, der: &Der, _timesteps: &Timesteps) -> DerResult<PowerProfile> {
        der.profile
            .as_ref()
            .map(|def| PowerProfile::from_record(der, def))
            .ok_or_else(|| DerError::MissingProfile {
                der: der.name.clone(),
            })
    }
}

/// Profiles supplied up front, keyed by DER name.
#[derive(Debug, Clone, Default)]
pub struct FixedBuildingProfiles {
    profiles: HashMap<String, PowerProfile>,
}

impl FixedBuildingProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, der: impl Into<String>, profile: PowerProfile) -> Self {
        self.profiles.insert(der.into(), profile);
        self
    }
}

impl BuildingModel for FixedBuildingProfiles {
    fn electric_profile(&self, der: &Der, _timesteps: &Timesteps) -> DerResult<PowerProfile> {
        self.profiles
            .get(&der.name)
            .cloned()
            .ok_or_else(|| DerError::Building {
                der: der.name.clone(),
                reason: "no profile supplied".to_string(),
            })
    }
}
