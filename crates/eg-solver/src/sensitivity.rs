//! Derived sensitivity matrices.
//!
//! Everything here follows from the complex voltage sensitivity `K`
//! (`dV = K dx` for a real injection change `dx`) at reference voltage `V`:
//!
//! ```text
//! d|V|  = Re(diag(conj(V)/|V|)  K) dx
//! dθ    = Im(diag(conj(V)/|V|²) K) dx
//! dS_f  = [diag(conj(Y_f V)) C_f K + diag(C_f V) conj(Y_f K)] dx
//! dS_t  = [diag(conj(Y_t V)) C_t K + diag(C_t V) conj(Y_t K)] dx
//! dS_ℓ  = 1ᵀ [diag(conj(Y V)) K + diag(V) conj(Y K)] dx
//! ```

use eg_core::{Complex, Real};
use eg_network::{NetworkModel, real_to_dense};
use nalgebra::{DMatrix, DVector, RowDVector};
use sprs::CsMat;

/// Sensitivities of network quantities to one kind of real injection.
///
/// Columns are node-phase rows (or DERs after [`Sensitivities::project`]);
/// source rows and columns are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensitivities {
    /// Complex voltage, node rows × columns.
    pub voltage: DMatrix<Complex>,
    /// Voltage magnitude (p.u.), node rows × columns.
    pub voltage_magnitude: DMatrix<Real>,
    /// Voltage angle (rad), node rows × columns.
    pub voltage_angle: DMatrix<Real>,
    /// Complex power entering each branch phase at its from end, branch rows × columns.
    pub branch_power_from: DMatrix<Complex>,
    /// Complex power entering each branch phase at its to end, branch rows × columns.
    pub branch_power_to: DMatrix<Complex>,
    /// Total complex loss, one entry per column.
    pub loss: RowDVector<Complex>,
}

impl Sensitivities {
    pub fn columns(&self) -> usize {
        self.voltage.ncols()
    }

    /// Column-wise sum with another set over the same columns.
    pub fn plus(&self, other: &Sensitivities) -> Sensitivities {
        Sensitivities {
            voltage: &self.voltage + &other.voltage,
            voltage_magnitude: &self.voltage_magnitude + &other.voltage_magnitude,
            voltage_angle: &self.voltage_angle + &other.voltage_angle,
            branch_power_from: &self.branch_power_from + &other.branch_power_from,
            branch_power_to: &self.branch_power_to + &other.branch_power_to,
            loss: &self.loss + &other.loss,
        }
    }

    /// Change of columns through a node-rows × k map, e.g. the DER incidence.
    pub fn project(&self, map: &CsMat<Real>) -> Sensitivities {
        let real = real_to_dense(map);
        let complex = real.map(|w| Complex::new(w, 0.0));
        Sensitivities {
            voltage: &self.voltage * &complex,
            voltage_magnitude: &self.voltage_magnitude * &real,
            voltage_angle: &self.voltage_angle * &real,
            branch_power_from: &self.branch_power_from * &complex,
            branch_power_to: &self.branch_power_to * &complex,
            loss: &self.loss * &complex,
        }
    }
}

/// Reference-point quantities shared by the active and reactive derivations.
pub(crate) struct FlowContext {
    voltage: DVector<Complex>,
    y: DMatrix<Complex>,
    y_from: DMatrix<Complex>,
    y_to: DMatrix<Complex>,
    c_from: DMatrix<Complex>,
    c_to: DMatrix<Complex>,
    pub(crate) current_conj: DVector<Complex>,
    pub(crate) branch_current_from_conj: DVector<Complex>,
    pub(crate) branch_current_to_conj: DVector<Complex>,
    pub(crate) branch_voltage_from: DVector<Complex>,
    pub(crate) branch_voltage_to: DVector<Complex>,
}

impl FlowContext {
    pub(crate) fn new(network: &NetworkModel, y: DMatrix<Complex>, voltage: DVector<Complex>) -> Self {
        let y_from = network.branch_admittance_from().to_dense();
        let y_to = network.branch_admittance_to().to_dense();
        let c_from = real_to_dense(network.branch_incidence_from()).map(|w| Complex::new(w, 0.0));
        let c_to = real_to_dense(network.branch_incidence_to()).map(|w| Complex::new(w, 0.0));

        let current_conj = (&y * &voltage).map(|c| c.conj());
        let branch_current_from_conj = (&y_from * &voltage).map(|c| c.conj());
        let branch_current_to_conj = (&y_to * &voltage).map(|c| c.conj());
        let branch_voltage_from = &c_from * &voltage;
        let branch_voltage_to = &c_to * &voltage;

        Self {
            voltage,
            y,
            y_from,
            y_to,
            c_from,
            c_to,
            current_conj,
            branch_current_from_conj,
            branch_current_to_conj,
            branch_voltage_from,
            branch_voltage_to,
        }
    }

    pub(crate) fn voltage(&self) -> &DVector<Complex> {
        &self.voltage
    }

    pub(crate) fn sensitivities(&self, k: DMatrix<Complex>) -> Sensitivities {
        let v = &self.voltage;
        let voltage_magnitude = DMatrix::from_fn(k.nrows(), k.ncols(), |a, b| {
            let n = v[a].norm();
            if n > 0.0 { (v[a].conj() * k[(a, b)]).re / n } else { 0.0 }
        });
        let voltage_angle = DMatrix::from_fn(k.nrows(), k.ncols(), |a, b| {
            let n2 = v[a].norm_sqr();
            if n2 > 0.0 { (v[a].conj() * k[(a, b)]).im / n2 } else { 0.0 }
        });

        let branch_power_from = flow_sensitivity(
            &self.branch_current_from_conj,
            &self.branch_voltage_from,
            &self.c_from,
            &self.y_from,
            &k,
        );
        let branch_power_to = flow_sensitivity(
            &self.branch_current_to_conj,
            &self.branch_voltage_to,
            &self.c_to,
            &self.y_to,
            &k,
        );

        let y_k = (&self.y * &k).map(|c| c.conj());
        let loss = RowDVector::from_fn(k.ncols(), |_, b| {
            (0..k.nrows())
                .map(|a| self.current_conj[a] * k[(a, b)] + v[a] * y_k[(a, b)])
                .sum::<Complex>()
        });

        Sensitivities {
            voltage: k,
            voltage_magnitude,
            voltage_angle,
            branch_power_from,
            branch_power_to,
            loss,
        }
    }
}

/// `diag(conj(I_b)) C K + diag(V_b) conj(Y_b K)` for one branch end.
fn flow_sensitivity(
    current_conj: &DVector<Complex>,
    branch_voltage: &DVector<Complex>,
    incidence: &DMatrix<Complex>,
    y_branch: &DMatrix<Complex>,
    k: &DMatrix<Complex>,
) -> DMatrix<Complex> {
    let mut out = incidence * k;
    let y_k = y_branch * k;
    for ((mut row, y_row), (ic, vb)) in out
        .row_iter_mut()
        .zip(y_k.row_iter())
        .zip(current_conj.iter().zip(branch_voltage.iter()))
    {
        for (entry, yk) in row.iter_mut().zip(y_row.iter()) {
            *entry = *ic * *entry + *vb * yk.conj();
        }
    }
    out
}
