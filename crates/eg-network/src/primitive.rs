//! Branch primitive admittances.
//!
//! Every branch is reduced to a two-port phase-frame admittance on the
//! system per-unit base:
//!
//! ```text
//! [ I_from ]   [ Y_ff  Y_ft ] [ V_from ]
//! [ I_to   ] = [ Y_tf  Y_tt ] [ V_to   ]
//! ```
//!
//! Each block is `phases × phases`, ordered like the branch phases.

use eg_core::{Complex, Real};
use eg_graph::{Branch, BranchKind, Grid, LineImpedance, TransformerParams};
use nalgebra::DMatrix;

use crate::error::{NetworkError, NetworkResult};
use crate::per_unit::PerUnitSystem;

const MIN_IMPEDANCE_PU: Real = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct BranchPrimitive {
    pub y_ff: DMatrix<Complex>,
    pub y_ft: DMatrix<Complex>,
    pub y_tf: DMatrix<Complex>,
    pub y_tt: DMatrix<Complex>,
}

impl BranchPrimitive {
    pub fn phases(&self) -> usize {
        self.y_ff.nrows()
    }

    /// Symmetric π-model: series admittance plus half the total shunt at each end.
    fn symmetric_pi(series: DMatrix<Complex>, shunt: DMatrix<Complex>) -> Self {
        let half_shunt = shunt * Complex::new(0.5, 0.0);
        Self {
            y_ff: &series + &half_shunt,
            y_tt: &series + &half_shunt,
            y_ft: -series.clone(),
            y_tf: -series,
        }
    }
}

/// Build the primitive of one branch of `grid`.
pub fn branch_primitive(
    branch: &Branch,
    grid: &Grid,
    pu: &PerUnitSystem,
) -> NetworkResult<BranchPrimitive> {
    match &branch.kind {
        BranchKind::Line(impedance) => line_primitive(branch, impedance, grid, pu),
        BranchKind::Transformer(params) => transformer_primitive(branch, params, grid, pu),
    }
}

fn node_of<'g>(
    grid: &'g Grid,
    branch: &Branch,
    id: eg_core::NodeId,
) -> NetworkResult<&'g eg_graph::Node> {
    grid.node(id).ok_or_else(|| NetworkError::InvalidParameter {
        element: branch.name.clone(),
        reason: format!("endpoint {id} outside the grid"),
    })
}

fn line_primitive(
    branch: &Branch,
    impedance: &LineImpedance,
    grid: &Grid,
    pu: &PerUnitSystem,
) -> NetworkResult<BranchPrimitive> {
    let n = branch.phases.len();
    let from = node_of(grid, branch, branch.from)?;
    let base = pu.node_base(from)?;
    let z_base = base.impedance_ohm();

    let (series_z, shunt) = match impedance {
        LineImpedance::PhaseMatrix {
            line_type,
            length_km,
        } => {
            let r = triangle_to_matrix(&line_type.resistance_ohm_per_km, n);
            let x = triangle_to_matrix(&line_type.reactance_ohm_per_km, n);
            let z = DMatrix::from_fn(n, n, |i, j| {
                Complex::new(r[(i, j)], x[(i, j)]) * (*length_km / z_base)
            });
            let shunt = if line_type.capacitance_nf_per_km.is_empty() {
                DMatrix::zeros(n, n)
            } else {
                let c = triangle_to_matrix(&line_type.capacitance_nf_per_km, n);
                let omega = pu.angular_frequency();
                DMatrix::from_fn(n, n, |i, j| {
                    Complex::new(0.0, omega * c[(i, j)] * 1e-9 * length_km * z_base)
                })
            };
            (z, shunt)
        }
        LineImpedance::Ohms {
            resistance_ohm,
            reactance_ohm,
            susceptance_us,
        } => {
            let z = Complex::new(*resistance_ohm, *reactance_ohm) / z_base;
            let b = susceptance_us * 1e-6 * z_base;
            (diagonal(n, z), diagonal(n, Complex::new(0.0, b)))
        }
        LineImpedance::PerUnit {
            resistance_pu,
            reactance_pu,
            susceptance_pu,
            base_voltage_kv,
            base_power_mva,
        } => {
            let own = eg_core::PerUnitBase::new(
                eg_core::kv(base_voltage_kv.unwrap_or(from.nominal_voltage_kv)),
                eg_core::mva(base_power_mva.unwrap_or(pu.base_power_mva())),
            )?;
            let z = Complex::new(
                base.rebase_impedance(*resistance_pu, &own),
                base.rebase_impedance(*reactance_pu, &own),
            );
            let b = susceptance_pu * z_base / own.impedance_ohm();
            (diagonal(n, z), diagonal(n, Complex::new(0.0, b)))
        }
    };

    let series = invert_series(series_z, "line", &branch.name)?;
    Ok(BranchPrimitive::symmetric_pi(series, shunt))
}

fn transformer_primitive(
    branch: &Branch,
    t: &TransformerParams,
    grid: &Grid,
    pu: &PerUnitSystem,
) -> NetworkResult<BranchPrimitive> {
    let n = branch.phases.len();
    let from = node_of(grid, branch, branch.from)?;
    let to = node_of(grid, branch, branch.to)?;

    // Impedance on the transformer rating, referred to the secondary node base.
    let power_ratio = pu.base_power_mva() / (t.rated_power_kva * 1e-3);
    let voltage_ratio = t.secondary_voltage_kv / to.nominal_voltage_kv;
    let z = Complex::new(t.resistance_percent, t.reactance_percent) / 100.0
        * power_ratio
        * voltage_ratio
        * voltage_ratio;
    if !(z.norm() > MIN_IMPEDANCE_PU) || !z.is_finite() {
        return Err(NetworkError::SingularImpedance {
            kind: "transformer",
            branch: branch.name.clone(),
        });
    }
    let ys = z.inv();

    // Winding ratios off the node nominal voltages fold into the tap.
    let ratio = t.tap_ratio * (t.primary_voltage_kv / from.nominal_voltage_kv)
        / (t.secondary_voltage_kv / to.nominal_voltage_kv);
    let tap = Complex::from_polar(ratio, t.phase_shift_deg.to_radians());

    Ok(BranchPrimitive {
        y_ff: diagonal(n, ys / (tap * tap.conj())),
        y_ft: diagonal(n, -ys / tap.conj()),
        y_tf: diagonal(n, -ys / tap),
        y_tt: diagonal(n, ys),
    })
}

/// Leading `n × n` block of a symmetric matrix packed column by column
/// from its upper triangle (`m11, m12, m22, m13, m23, m33`).
pub fn triangle_to_matrix(entries: &[Real], n: usize) -> DMatrix<Real> {
    DMatrix::from_fn(n, n, |i, j| {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        entries.get(hi * (hi + 1) / 2 + lo).copied().unwrap_or(0.0)
    })
}

fn diagonal(n: usize, v: Complex) -> DMatrix<Complex> {
    DMatrix::from_diagonal_element(n, n, v)
}

fn invert_series(
    z: DMatrix<Complex>,
    kind: &'static str,
    name: &str,
) -> NetworkResult<DMatrix<Complex>> {
    let singular = || NetworkError::SingularImpedance {
        kind,
        branch: name.to_string(),
    };
    if z.iter().all(|v| v.norm() <= MIN_IMPEDANCE_PU) {
        return Err(singular());
    }
    let y = z.try_inverse().ok_or_else(singular)?;
    if y.iter().all(|v| v.is_finite()) {
        Ok(y)
    } else {
        Err(singular())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_expands_symmetric() {
        let m = triangle_to_matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 1)], 3.0);
        assert_eq!(m[(0, 2)], 4.0);
        assert_eq!(m[(2, 0)], 4.0);
        assert_eq!(m[(1, 2)], 5.0);
        assert_eq!(m[(2, 2)], 6.0);
        assert_eq!(m, m.transpose());
    }

    #[test]
    fn diagonal_only_entries_give_diagonal_matrix() {
        let m = triangle_to_matrix(&[1.0, 0.0, 2.0, 0.0, 0.0, 3.0], 3);
        assert_eq!(m, DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 2.0, 3.0])));
    }

    #[test]
    fn fewer_phases_take_leading_block() {
        let entries = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let two = triangle_to_matrix(&entries, 2);
        assert_eq!(two, DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 3.0]));
        assert_eq!(triangle_to_matrix(&entries, 1)[(0, 0)], 1.0);
    }

    #[test]
    fn zero_series_impedance_is_singular() {
        let err = invert_series(DMatrix::zeros(2, 2), "line", "l0").unwrap_err();
        assert_eq!(
            err,
            NetworkError::SingularImpedance {
                kind: "line",
                branch: "l0".to_string()
            }
        );
    }

    #[test]
    fn symmetric_pi_row_sums_equal_shunt() {
        let series = diagonal(1, Complex::new(2.0, -4.0));
        let shunt = diagonal(1, Complex::new(0.0, 0.02));
        let p = BranchPrimitive::symmetric_pi(series, shunt);
        let row_sum = p.y_ff[(0, 0)] + p.y_ft[(0, 0)];
        assert!((row_sum - Complex::new(0.0, 0.01)).norm() < 1e-15);
        assert_eq!(p.y_ft, p.y_tf);
    }
}
