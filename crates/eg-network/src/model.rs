//! Immutable electrical model of one scenario's grid.

use eg_core::timing::Timer;
use eg_core::{BranchId, Complex, Real, phasor};
use eg_graph::{ElementIndex, Grid, GridBuilder, NodeType};
use eg_project::{DerDef, ElectricGridDef};
use nalgebra::DVector;
use sprs::CsMat;

use crate::admittance::{AdmittanceSet, SparseComplex, assemble};
use crate::error::{NetworkError, NetworkResult};
use crate::per_unit::PerUnitSystem;
use crate::primitive::{BranchPrimitive, branch_primitive};

/// Network model: grid, per-unit bases and derived admittance structures.
///
/// Built all-or-nothing; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    grid: Grid,
    per_unit: PerUnitSystem,
    primitives: Vec<BranchPrimitive>,
    admittance: AdmittanceSet,
    source_voltage: DVector<Complex>,
    branch_rating_pu: Vec<Option<Real>>,
}

impl NetworkModel {
    /// Build from raw records: index, validate, then assemble.
    pub fn from_records(grid: &ElectricGridDef, ders: &[DerDef]) -> NetworkResult<Self> {
        let grid = GridBuilder::from_records(grid, ders).build()?;
        Self::build(grid)
    }

    /// Build from a validated grid.
    pub fn build(grid: Grid) -> NetworkResult<Self> {
        let timer = Timer::start("network_model");
        let per_unit = PerUnitSystem::from_grid(&grid)?;

        let primitives = grid
            .branches()
            .iter()
            .map(|b| branch_primitive(b, &grid, &per_unit))
            .collect::<NetworkResult<Vec<_>>>()?;
        let admittance = assemble(&grid, &primitives)?;
        let source_voltage = source_voltage(&grid)?;
        let branch_rating_pu = grid
            .branches()
            .iter()
            .map(|b| b.rated_power_kva.map(|kva| per_unit.power_pu(kva)))
            .collect();

        tracing::debug!(
            grid = %grid.name(),
            node_rows = grid.index().node_dim(),
            branch_rows = grid.index().branch_dim(),
            nnz = admittance.node.nnz(),
            "network model assembled"
        );
        timer.stop_and_log();

        Ok(Self {
            grid,
            per_unit,
            primitives,
            admittance,
            source_voltage,
            branch_rating_pu,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn index(&self) -> &ElementIndex {
        self.grid.index()
    }

    pub fn per_unit(&self) -> &PerUnitSystem {
        &self.per_unit
    }

    /// Number of node-phase rows.
    pub fn node_dim(&self) -> usize {
        self.index().node_dim()
    }

    pub fn node_admittance(&self) -> &SparseComplex {
        &self.admittance.node
    }

    pub fn branch_admittance_from(&self) -> &SparseComplex {
        &self.admittance.branch_from
    }

    pub fn branch_admittance_to(&self) -> &SparseComplex {
        &self.admittance.branch_to
    }

    pub fn branch_incidence_from(&self) -> &CsMat<Real> {
        &self.admittance.incidence_from
    }

    pub fn branch_incidence_to(&self) -> &CsMat<Real> {
        &self.admittance.incidence_to
    }

    /// Wye DER incidence, node rows × DERs. Delta DERs have empty columns.
    pub fn der_incidence(&self) -> &CsMat<Real> {
        &self.admittance.der_wye
    }

    /// Delta DER incidence, phase pairs × DERs. Wye DERs have empty columns.
    pub fn der_delta_incidence(&self) -> &CsMat<Real> {
        &self.admittance.der_delta
    }

    /// Phase-to-neutral to phase-to-phase voltage map, node rows × node rows.
    pub fn node_transformation(&self) -> &CsMat<Real> {
        &self.admittance.node_transformation
    }

    pub fn branch_primitive(&self, id: BranchId) -> Option<&BranchPrimitive> {
        self.primitives.get(id.index())
    }

    /// Rated power of a branch in per-unit of the system base.
    pub fn branch_rating_pu(&self, id: BranchId) -> Option<Real> {
        self.branch_rating_pu.get(id.index()).copied().flatten()
    }

    /// Slack voltage phasors, one per source row (per-unit).
    pub fn source_voltage(&self) -> &DVector<Complex> {
        &self.source_voltage
    }

    /// Phase-to-neutral nominal voltage per node row, in kV.
    pub fn nominal_phase_voltage_kv(&self) -> Vec<Real> {
        let index = self.index();
        (0..index.node_dim())
            .map(|r| {
                self.grid
                    .node(index.row_node(r))
                    .map_or(0.0, |n| n.nominal_voltage_kv / 3f64.sqrt())
            })
            .collect()
    }
}

/// Slack phasors: magnitude/angle of the slack node shifted per phase.
fn source_voltage(grid: &Grid) -> NetworkResult<DVector<Complex>> {
    let index = grid.index();
    let slack = grid.node(grid.slack()).ok_or_else(|| NetworkError::InvalidParameter {
        element: grid.name().to_string(),
        reason: "slack node outside the grid".to_string(),
    })?;
    let (magnitude, angle) = match slack.node_type {
        NodeType::Slack {
            voltage_magnitude_pu,
            voltage_angle_deg,
        } => (voltage_magnitude_pu, voltage_angle_deg),
        NodeType::Pq => {
            return Err(NetworkError::InvalidParameter {
                element: slack.name.clone(),
                reason: "slack node is not marked slack".to_string(),
            });
        }
    };
    Ok(DVector::from_iterator(
        index.source_rows().len(),
        index
            .source_rows()
            .iter()
            .map(|&r| phasor(magnitude, angle + index.row_phase(r).angle_offset_deg())),
    ))
}
