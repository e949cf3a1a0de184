//! DER/load model: per-DER power time series on the network base.

use eg_core::timing::Timer;
use eg_core::{EgError, Real};
use eg_graph::Der;
use eg_network::NetworkModel;
use eg_project::DerKindDef;
use nalgebra::{DMatrix, DVector};
use sprs::CsMat;

use crate::building::BuildingModel;
use crate::error::{DerError, DerResult};
use crate::profile::PowerProfile;
use crate::timesteps::Timesteps;

/// Apparent power may exceed the node rating by this relative margin.
const CAPACITY_TOLERANCE: Real = 1e-9;

/// Sign turning a record's own convention into injection-positive power.
pub fn injection_sign(kind: DerKindDef) -> Real {
    match kind {
        DerKindDef::Load | DerKindDef::FlexibleBuilding => -1.0,
        DerKindDef::Generator | DerKindDef::Storage => 1.0,
    }
}

/// Power of every DER at every timestep.
///
/// Matrices are `timesteps × ders`, injection positive, in per-unit of the
/// network's three-phase base. Columns follow the DER ids of the grid.
#[derive(Debug, Clone)]
pub struct DerModel {
    names: Vec<String>,
    kinds: Vec<DerKindDef>,
    timesteps: Timesteps,
    active_power: DMatrix<Real>,
    reactive_power: DMatrix<Real>,
    nominal_active_power: DVector<Real>,
    nominal_reactive_power: DVector<Real>,
    wye_incidence: CsMat<Real>,
    delta_incidence: CsMat<Real>,
}

impl DerModel {
    pub fn build(
        network: &NetworkModel,
        timesteps: Timesteps,
        building: &dyn BuildingModel,
    ) -> DerResult<Self> {
        let timer = Timer::start("der_model");
        let grid = network.grid();
        let pu = network.per_unit();
        let ders = grid.ders();
        let steps = timesteps.len();

        let mut active_power = DMatrix::zeros(steps, ders.len());
        let mut reactive_power = DMatrix::zeros(steps, ders.len());
        let mut nominal_active_power = DVector::zeros(ders.len());
        let mut nominal_reactive_power = DVector::zeros(ders.len());

        for der in ders {
            let profile = der_profile(der, &timesteps, building)?;
            profile.check_alignment(&der.name, steps)?;
            if der.kind == DerKindDef::FlexibleBuilding {
                check_capacity(network, der, &profile)?;
            }

            let col = der.id.index();
            let sign = injection_sign(der.kind);
            for t in 0..steps {
                active_power[(t, col)] = sign * pu.power_pu(profile.active_power_kw[t]);
                reactive_power[(t, col)] = sign * pu.power_pu(profile.reactive_power_kvar[t]);
            }
            nominal_active_power[col] = sign * pu.power_pu(der.active_power_kw);
            nominal_reactive_power[col] = sign * pu.power_pu(der.reactive_power_kvar);
        }

        tracing::debug!(
            grid = %grid.name(),
            ders = ders.len(),
            timesteps = steps,
            "DER model assembled"
        );
        timer.stop_and_log();

        Ok(Self {
            names: ders.iter().map(|d| d.name.clone()).collect(),
            kinds: ders.iter().map(|d| d.kind).collect(),
            timesteps,
            active_power,
            reactive_power,
            nominal_active_power,
            nominal_reactive_power,
            wye_incidence: network.der_incidence().clone(),
            delta_incidence: network.der_delta_incidence().clone(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn kinds(&self) -> &[DerKindDef] {
        &self.kinds
    }

    pub fn der_count(&self) -> usize {
        self.names.len()
    }

    /// Column of a DER by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn timesteps(&self) -> &Timesteps {
        &self.timesteps
    }

    /// Active power, `timesteps × ders`, injection positive (p.u.).
    pub fn active_power_pu(&self) -> &DMatrix<Real> {
        &self.active_power
    }

    /// Reactive power, `timesteps × ders`, injection positive (p.u.).
    pub fn reactive_power_pu(&self) -> &DMatrix<Real> {
        &self.reactive_power
    }

    pub fn nominal_active_power_pu(&self) -> &DVector<Real> {
        &self.nominal_active_power
    }

    pub fn nominal_reactive_power_pu(&self) -> &DVector<Real> {
        &self.nominal_reactive_power
    }

    /// Wye node-phase injections (active, reactive) at timestep `t`.
    pub fn nodal_injection(&self, t: usize) -> DerResult<(DVector<Real>, DVector<Real>)> {
        self.check_timestep(t)?;
        Ok((
            spread(&self.wye_incidence, |der| self.active_power[(t, der)]),
            spread(&self.wye_incidence, |der| self.reactive_power[(t, der)]),
        ))
    }

    /// Delta phase-pair injections (active, reactive) at timestep `t`.
    ///
    /// Entry `r` is the power across the pair starting at node row `r`.
    pub fn nodal_delta_injection(&self, t: usize) -> DerResult<(DVector<Real>, DVector<Real>)> {
        self.check_timestep(t)?;
        Ok((
            spread(&self.delta_incidence, |der| self.active_power[(t, der)]),
            spread(&self.delta_incidence, |der| self.reactive_power[(t, der)]),
        ))
    }

    /// Wye node-phase injections at nominal DER power.
    pub fn nominal_nodal_injection(&self) -> (DVector<Real>, DVector<Real>) {
        (
            spread(&self.wye_incidence, |der| self.nominal_active_power[der]),
            spread(&self.wye_incidence, |der| self.nominal_reactive_power[der]),
        )
    }

    /// Wye active injection over time, `node rows × timesteps`.
    pub fn nodal_active_power(&self) -> DMatrix<Real> {
        spread_series(&self.wye_incidence, &self.active_power)
    }

    /// Wye reactive injection over time, `node rows × timesteps`.
    pub fn nodal_reactive_power(&self) -> DMatrix<Real> {
        spread_series(&self.wye_incidence, &self.reactive_power)
    }

    fn check_timestep(&self, t: usize) -> DerResult<()> {
        if t < self.timesteps.len() {
            return Ok(());
        }
        Err(EgError::IndexOob {
            what: "timestep",
            index: t,
            len: self.timesteps.len(),
        }
        .into())
    }
}

fn spread(incidence: &CsMat<Real>, der_power: impl Fn(usize) -> Real) -> DVector<Real> {
    let mut out = DVector::zeros(incidence.rows());
    for (weight, (row, der)) in incidence.iter() {
        out[row] += weight * der_power(der);
    }
    out
}

fn spread_series(incidence: &CsMat<Real>, power: &DMatrix<Real>) -> DMatrix<Real> {
    let mut out = DMatrix::zeros(incidence.rows(), power.nrows());
    for (weight, (row, der)) in incidence.iter() {
        for t in 0..power.nrows() {
            out[(row, t)] += weight * power[(t, der)];
        }
    }
    out
}

fn der_profile(
    der: &Der,
    timesteps: &Timesteps,
    building: &dyn BuildingModel,
) -> DerResult<PowerProfile> {
    if der.kind == DerKindDef::FlexibleBuilding {
        return building.electric_profile(der, timesteps);
    }
    Ok(match &der.profile {
        Some(def) => PowerProfile::from_record(der, def),
        None => PowerProfile::constant(der.active_power_kw, der.reactive_power_kvar, timesteps.len()),
    })
}

fn check_capacity(network: &NetworkModel, der: &Der, profile: &PowerProfile) -> DerResult<()> {
    let Some(node) = network.grid().node(der.node) else {
        return Err(EgError::Invariant {
            what: "DER node outside the grid",
        }
        .into());
    };
    let Some(rated_kva) = node.rated_capacity_kva else {
        return Ok(());
    };
    for (timestep, apparent_kva) in profile.apparent_power_kva().enumerate() {
        if apparent_kva > rated_kva * (1.0 + CAPACITY_TOLERANCE) {
            tracing::warn!(der = %der.name, node = %node.name, timestep, "building profile exceeds node rating");
            return Err(DerError::CapacityExceeded {
                der: der.name.clone(),
                node: node.name.clone(),
                timestep,
                apparent_kva,
                rated_kva,
            });
        }
    }
    Ok(())
}
