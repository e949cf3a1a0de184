//! Single-pass linearization of AC power flow around a reference point.

use eg_core::timing::Timer;
use eg_core::{Complex, Real};
use eg_graph::rows_disconnected_from_source;
use eg_network::NetworkModel;
use nalgebra::{DMatrix, DVector};

use crate::conditioning::invert_checked;
use crate::error::{SolverError, SolverResult};
use crate::jacobian::{polar_jacobian, row_power, unit_phasor};
use crate::reference::ReferencePoint;
use crate::sensitivity::{FlowContext, Sensitivities};
use crate::settings::{LinearizationMethod, LinearizationSettings};

const MIN_PAIR_VOLTAGE: Real = 1e-9;

/// Sensitivities with respect to DER power instead of node-row power.
#[derive(Debug, Clone, PartialEq)]
pub struct DerSensitivities {
    pub active: Sensitivities,
    pub reactive: Sensitivities,
}

/// Linear power-flow model of one network around one reference point.
///
/// Columns are per-unit row injections (phase power on a third of the
/// network base), injection positive.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearizedModel {
    method: LinearizationMethod,
    reference: &'static str,
    condition_number: Real,
    reference_voltage: DVector<Complex>,
    reference_power: DVector<Complex>,
    reference_branch_power_from: DVector<Complex>,
    reference_branch_power_to: DVector<Complex>,
    reference_loss: Complex,
    active: Sensitivities,
    reactive: Sensitivities,
    delta_active: Sensitivities,
    delta_reactive: Sensitivities,
}

impl LinearizedModel {
    /// Linearize around the reference named in `settings`.
    pub fn build(network: &NetworkModel, settings: &LinearizationSettings) -> SolverResult<Self> {
        linearize(network, &ReferencePoint::from(settings.reference), settings)
    }

    pub fn method(&self) -> LinearizationMethod {
        self.method
    }

    /// Label of the reference point (`flat_start`, `no_load`, `supplied`).
    pub fn reference(&self) -> &'static str {
        self.reference
    }

    /// 1-norm condition number of the factorized block.
    pub fn condition_number(&self) -> Real {
        self.condition_number
    }

    pub fn reference_voltage(&self) -> &DVector<Complex> {
        &self.reference_voltage
    }

    pub fn reference_voltage_magnitude(&self) -> DVector<Real> {
        self.reference_voltage.map(|v| v.norm())
    }

    /// Row power injections at the reference point.
    pub fn reference_power(&self) -> &DVector<Complex> {
        &self.reference_power
    }

    pub fn reference_branch_power_from(&self) -> &DVector<Complex> {
        &self.reference_branch_power_from
    }

    pub fn reference_branch_power_to(&self) -> &DVector<Complex> {
        &self.reference_branch_power_to
    }

    pub fn reference_loss(&self) -> Complex {
        self.reference_loss
    }

    /// Sensitivities to active row injections.
    pub fn active(&self) -> &Sensitivities {
        &self.active
    }

    /// Sensitivities to reactive row injections.
    pub fn reactive(&self) -> &Sensitivities {
        &self.reactive
    }

    /// Sensitivities to active phase-to-phase injections.
    ///
    /// Column `r` is the pair starting at node row `r`, as in the network's
    /// node transformation; columns of rows without a pair are zero.
    pub fn delta_active(&self) -> &Sensitivities {
        &self.delta_active
    }

    /// Sensitivities to reactive phase-to-phase injections.
    pub fn delta_reactive(&self) -> &Sensitivities {
        &self.delta_reactive
    }

    /// Sensitivities to DER power (three-phase, system base), wye and delta
    /// DERs alike.
    pub fn der_sensitivities(&self, network: &NetworkModel) -> DerSensitivities {
        let wye = network.der_incidence();
        let delta = network.der_delta_incidence();
        DerSensitivities {
            active: self.active.project(wye).plus(&self.delta_active.project(delta)),
            reactive: self.reactive.project(wye).plus(&self.delta_reactive.project(delta)),
        }
    }

    /// First-order voltage magnitude for row injection changes `dp`, `dq`
    /// relative to the reference.
    pub fn approximate_voltage_magnitude(
        &self,
        dp: &DVector<Real>,
        dq: &DVector<Real>,
    ) -> SolverResult<DVector<Real>> {
        let n = self.reference_voltage.len();
        for v in [dp, dq] {
            if v.len() != n {
                return Err(SolverError::ReferenceDimension {
                    expected: n,
                    actual: v.len(),
                });
            }
        }
        Ok(self.reference_voltage_magnitude()
            + &self.active.voltage_magnitude * dp
            + &self.reactive.voltage_magnitude * dq)
    }
}

/// Linearize `network` around `reference`.
pub fn linearize(
    network: &NetworkModel,
    reference: &ReferencePoint,
    settings: &LinearizationSettings,
) -> SolverResult<LinearizedModel> {
    let span = tracing::info_span!(
        "linearize",
        grid = %network.grid().name(),
        method = settings.method.as_str(),
        reference = reference.label()
    );
    let _guard = span.enter();
    let timer = Timer::start("linearize");

    check_islands(network)?;
    let bound = settings.max_condition_number;
    let voltage = reference.resolve(network, bound)?;
    let y = network.node_admittance().to_dense();
    let rows = network.index().non_source_rows();

    let (k_active, k_reactive, condition_number) = match settings.method {
        LinearizationMethod::FixedPoint => fixed_point(&y, &voltage, rows, bound)?,
        LinearizationMethod::Jacobian => jacobian(&y, &voltage, rows, bound)?,
    };

    let reference_power = row_power(&y, &voltage);
    let context = FlowContext::new(network, y, voltage);
    let reference_branch_power_from = context
        .branch_voltage_from
        .zip_map(&context.branch_current_from_conj, |v, i| v * i);
    let reference_branch_power_to = context
        .branch_voltage_to
        .zip_map(&context.branch_current_to_conj, |v, i| v * i);
    let reference_loss = reference_power.iter().sum::<Complex>();

    let (k_delta_active, k_delta_reactive) =
        delta_voltage_sensitivity(network, context.voltage(), &k_active, &k_reactive)?;
    let delta_active = context.sensitivities(k_delta_active);
    let delta_reactive = context.sensitivities(k_delta_reactive);
    let active = context.sensitivities(k_active);
    let reactive = context.sensitivities(k_reactive);

    tracing::debug!(
        rows = rows.len(),
        condition_number,
        "power flow linearized"
    );
    timer.stop_and_log();

    Ok(LinearizedModel {
        method: settings.method,
        reference: reference.label(),
        condition_number,
        reference_voltage: context.voltage().clone(),
        reference_power,
        reference_branch_power_from,
        reference_branch_power_to,
        reference_loss,
        active,
        reactive,
        delta_active,
        delta_reactive,
    })
}

fn check_islands(network: &NetworkModel) -> SolverResult<()> {
    let floating = rows_disconnected_from_source(network.grid());
    if floating.is_empty() {
        return Ok(());
    }
    let labels = network.index().node_row_labels();
    let rows: Vec<String> = floating.iter().map(|&r| labels[r].clone()).collect();
    tracing::warn!(rows = rows.len(), "network has rows without a path to the source");
    Err(SolverError::Islanded { rows })
}

type VoltageSensitivity = (DMatrix<Complex>, DMatrix<Complex>, Real);

/// Phase-pair power `S_Δ` as wye row power at the reference:
/// `S = diag(V) Hᵀ diag(1/(H V)) S_Δ`, so
/// `∂V/∂P_Δ = K_P Re(M) + K_Q Im(M)` and `∂V/∂Q_Δ = K_Q Re(M) - K_P Im(M)`.
///
/// Only pairs that carry a delta DER need a non-zero pair voltage.
fn delta_voltage_sensitivity(
    network: &NetworkModel,
    v: &DVector<Complex>,
    k_active: &DMatrix<Complex>,
    k_reactive: &DMatrix<Complex>,
) -> SolverResult<(DMatrix<Complex>, DMatrix<Complex>)> {
    let n = v.len();
    let mut used = vec![false; n];
    for (_, (row, _)) in network.der_delta_incidence().iter() {
        used[row] = true;
    }

    let mut pair_voltage = DVector::<Complex>::zeros(n);
    for (h, (row, col)) in network.node_transformation().iter() {
        pair_voltage[row] += v[col] * *h;
    }

    let mut m_re = DMatrix::<Complex>::zeros(n, n);
    let mut m_im = DMatrix::<Complex>::zeros(n, n);
    for (h, (pair, row)) in network.node_transformation().iter() {
        if !used[pair] {
            continue;
        }
        let across = pair_voltage[pair];
        let magnitude = across.norm();
        if magnitude.is_nan() || magnitude <= MIN_PAIR_VOLTAGE {
            let labels = network.index().node_row_labels();
            return Err(SolverError::InvalidReference {
                reason: format!("no phase-to-phase voltage across pair at '{}'", labels[pair]),
            });
        }
        let m = v[row] * *h / across;
        m_re[(row, pair)] = Complex::new(m.re, 0.0);
        m_im[(row, pair)] = Complex::new(m.im, 0.0);
    }

    let delta_active = k_active * &m_re + k_reactive * &m_im;
    let delta_reactive = k_reactive * &m_re - k_active * &m_im;
    Ok((delta_active, delta_reactive))
}

/// `∂V/∂P = Y_nn⁻¹ diag(1/conj(V_n))`, `∂V/∂Q = -j ∂V/∂P`.
fn fixed_point(
    y: &DMatrix<Complex>,
    v: &DVector<Complex>,
    rows: &[usize],
    bound: Real,
) -> SolverResult<VoltageSensitivity> {
    let n = v.len();
    let y_nn = y.select_rows(rows).select_columns(rows);
    let (y_inv, condition) = invert_checked(&y_nn, bound, "non-source admittance block")?;

    let mut k_active = DMatrix::zeros(n, n);
    let mut k_reactive = DMatrix::zeros(n, n);
    for (i, &a) in rows.iter().enumerate() {
        for (j, &b) in rows.iter().enumerate() {
            let m = y_inv[(i, j)] / v[b].conj();
            k_active[(a, b)] = m;
            k_reactive[(a, b)] = -Complex::i() * m;
        }
    }
    Ok((k_active, k_reactive, condition))
}

/// Inverse polar Jacobian, mapped back to complex voltage:
/// `dV = diag(V/|V|) d|V| + j diag(V) dθ`.
fn jacobian(
    y: &DMatrix<Complex>,
    v: &DVector<Complex>,
    rows: &[usize],
    bound: Real,
) -> SolverResult<VoltageSensitivity> {
    let n = v.len();
    let m = rows.len();
    let jac = polar_jacobian(y, v, rows);
    let (inv, condition) = invert_checked(&jac, bound, "power flow jacobian")?;

    // inverse blocks: [[dθ/dP, dθ/dQ], [d|V|/dP, d|V|/dQ]]
    let mut k_active = DMatrix::zeros(n, n);
    let mut k_reactive = DMatrix::zeros(n, n);
    for (i, &a) in rows.iter().enumerate() {
        let unit = unit_phasor(v[a]);
        let rotate = Complex::i() * v[a];
        for (j, &b) in rows.iter().enumerate() {
            k_active[(a, b)] = unit * inv[(m + i, j)] + rotate * inv[(i, j)];
            k_reactive[(a, b)] = unit * inv[(m + i, m + j)] + rotate * inv[(i, m + j)];
        }
    }
    Ok((k_active, k_reactive, condition))
}
