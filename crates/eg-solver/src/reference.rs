//! Reference operating points.

use eg_core::{Complex, Real, phasor};
use eg_graph::NodeType;
use eg_network::NetworkModel;
use nalgebra::DVector;

use crate::conditioning::invert_checked;
use crate::error::{SolverError, SolverResult};
use crate::settings::ReferenceKind;

/// Operating point a linearization is taken around.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferencePoint {
    /// Every row at the source voltage of its phase.
    FlatStart,
    /// Voltage with zero injection everywhere: `w = -Y_nn⁻¹ Y_ns V_s`.
    NoLoad,
    /// Explicit node-row voltage (p.u.), e.g. a previous power-flow solution.
    Supplied(DVector<Complex>),
}

impl From<ReferenceKind> for ReferencePoint {
    fn from(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::FlatStart => ReferencePoint::FlatStart,
            ReferenceKind::NoLoad => ReferencePoint::NoLoad,
        }
    }
}

impl ReferencePoint {
    pub fn label(&self) -> &'static str {
        match self {
            ReferencePoint::FlatStart => "flat_start",
            ReferencePoint::NoLoad => "no_load",
            ReferencePoint::Supplied(_) => "supplied",
        }
    }

    /// Full node-row voltage vector of this reference.
    pub fn resolve(&self, network: &NetworkModel, max_condition: Real) -> SolverResult<DVector<Complex>> {
        match self {
            ReferencePoint::FlatStart => Ok(flat_start_voltage(network)),
            ReferencePoint::NoLoad => no_load_voltage(network, max_condition),
            ReferencePoint::Supplied(v) => {
                check_supplied(network, v)?;
                Ok(v.clone())
            }
        }
    }
}

/// Source magnitude and angle, shifted per phase, on every row.
pub fn flat_start_voltage(network: &NetworkModel) -> DVector<Complex> {
    let index = network.index();
    let (magnitude, angle) = network
        .grid()
        .node(index.source_node())
        .map(|n| match n.node_type {
            NodeType::Slack {
                voltage_magnitude_pu,
                voltage_angle_deg,
            } => (voltage_magnitude_pu, voltage_angle_deg),
            NodeType::Pq => (1.0, 0.0),
        })
        .unwrap_or((1.0, 0.0));
    DVector::from_fn(index.node_dim(), |r, _| {
        phasor(magnitude, angle + index.row_phase(r).angle_offset_deg())
    })
}

/// No-load voltage: source rows fixed, other rows from `Y_nn w = -Y_ns V_s`.
pub fn no_load_voltage(network: &NetworkModel, max_condition: Real) -> SolverResult<DVector<Complex>> {
    let index = network.index();
    let source = index.source_rows();
    let others = index.non_source_rows();
    let y = network.node_admittance();

    let mut v = DVector::zeros(index.node_dim());
    for (k, &r) in source.iter().enumerate() {
        v[r] = network.source_voltage()[k];
    }
    if others.is_empty() {
        return Ok(v);
    }

    let y_nn = y.select(others, others);
    let y_ns = y.select(others, source);
    let (y_nn_inv, _) = invert_checked(&y_nn, max_condition, "non-source admittance block")?;
    let w = -(y_nn_inv * (y_ns * network.source_voltage()));
    for (k, &r) in others.iter().enumerate() {
        v[r] = w[k];
    }
    Ok(v)
}

fn check_supplied(network: &NetworkModel, v: &DVector<Complex>) -> SolverResult<()> {
    let expected = network.node_dim();
    if v.len() != expected {
        return Err(SolverError::ReferenceDimension {
            expected,
            actual: v.len(),
        });
    }
    if let Some(row) = v.iter().position(|x| !x.is_finite()) {
        return Err(SolverError::InvalidReference {
            reason: format!("row {row} is not finite"),
        });
    }
    if let Some(&row) = network
        .index()
        .non_source_rows()
        .iter()
        .find(|&&r| v[r].norm() <= Real::EPSILON)
    {
        return Err(SolverError::InvalidReference {
            reason: format!("row {row} has zero magnitude"),
        });
    }
    Ok(())
}
