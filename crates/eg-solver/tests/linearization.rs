//! Integration tests for the power-flow linearizer.

use eg_core::{Complex, Real};
use eg_network::NetworkModel;
use eg_project::{
    DerConnection, DerDef, DerKindDef, ElectricGridDef, LineDef, LineImpedanceDef, LineTypeDef,
    NodeDef, NodeKindDef, Phase, TransformerDef,
};
use eg_solver::{
    LinearizationMethod, LinearizationSettings, LinearizedModel, ReferenceKind, ReferencePoint,
    SolverError, linearize, no_load_voltage, numerical_polar_jacobian, polar_jacobian,
};
use nalgebra::{DMatrix, DVector};

fn node(name: &str, kv: f64, phases: &[Phase], slack: bool) -> NodeDef {
    NodeDef {
        name: name.to_string(),
        phases: phases.to_vec(),
        nominal_voltage_kv: kv,
        kind: if slack {
            NodeKindDef::Slack {
                voltage_magnitude_pu: 1.0,
                voltage_angle_deg: 0.0,
            }
        } else {
            NodeKindDef::Pq
        },
        rated_capacity_kva: None,
    }
}

fn ohm_line(name: &str, from: &str, to: &str, r: f64, x: f64) -> LineDef {
    LineDef {
        name: name.to_string(),
        from_node: from.to_string(),
        to_node: to.to_string(),
        phases: None,
        impedance: LineImpedanceDef::Ohms {
            resistance_ohm: r,
            reactance_ohm: x,
            susceptance_us: 0.0,
        },
        rated_power_kva: None,
    }
}

fn empty_grid(name: &str) -> ElectricGridDef {
    ElectricGridDef {
        name: name.to_string(),
        base_power_mva: 1.0,
        base_frequency_hz: 60.0,
        nodes: vec![],
        line_types: vec![],
        lines: vec![],
        transformers: vec![],
    }
}

/// Slack plus two load buses in a chain. At 1 kV / 1 MVA ohms equal per-unit.
fn three_node() -> ElectricGridDef {
    let mut def = empty_grid("three_node");
    def.nodes = vec![
        node("s", 1.0, &[Phase::A], true),
        node("n1", 1.0, &[Phase::A], false),
        node("n2", 1.0, &[Phase::A], false),
    ];
    def.lines = vec![
        ohm_line("l1", "s", "n1", 0.1, 0.2),
        ohm_line("l2", "n1", "n2", 0.3, 0.1),
    ];
    def
}

/// Three-phase feeder: substation transformer, coupled overhead line with
/// charging, and a single-phase lateral.
fn feeder() -> ElectricGridDef {
    let mut def = empty_grid("feeder");
    def.nodes = vec![
        node("source", 12.47, &Phase::ALL, true),
        node("lv", 0.48, &Phase::ALL, false),
        node("n1", 0.48, &Phase::ALL, false),
        node("n2", 0.48, &[Phase::B], false),
    ];
    def.line_types = vec![LineTypeDef {
        name: "oh".to_string(),
        resistance_ohm_per_km: vec![0.35, 0.12, 0.35, 0.11, 0.12, 0.35],
        reactance_ohm_per_km: vec![0.70, 0.30, 0.70, 0.27, 0.30, 0.70],
        capacitance_nf_per_km: vec![10.0, -2.0, 10.0, -1.5, -2.0, 10.0],
    }];
    def.transformers = vec![TransformerDef {
        name: "sub".to_string(),
        from_node: "source".to_string(),
        to_node: "lv".to_string(),
        phases: None,
        rated_power_kva: 500.0,
        primary_voltage_kv: 12.47,
        secondary_voltage_kv: 0.48,
        resistance_percent: 1.0,
        reactance_percent: 5.0,
        tap_ratio: 1.0,
        phase_shift_deg: 0.0,
    }];
    def.lines = vec![
        LineDef {
            name: "main".to_string(),
            from_node: "lv".to_string(),
            to_node: "n1".to_string(),
            phases: None,
            impedance: LineImpedanceDef::LineType {
                line_type: "oh".to_string(),
                length_km: 0.1,
            },
            rated_power_kva: Some(300.0),
        },
        LineDef {
            phases: Some(vec![Phase::B]),
            ..ohm_line("lateral", "n1", "n2", 0.01, 0.005)
        },
    ];
    def
}

fn settings(method: LinearizationMethod, reference: ReferenceKind) -> LinearizationSettings {
    LinearizationSettings {
        method,
        reference,
        ..LinearizationSettings::default()
    }
}

fn relative_close(a: Real, b: Real, rel: Real) -> bool {
    (a - b).abs() <= rel * b.abs().max(1e-12)
}

fn max_abs_diff(a: &DMatrix<Complex>, b: &DMatrix<Complex>) -> Real {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, Real::max)
}

#[test]
fn three_node_matches_hand_reference() {
    let network = NetworkModel::from_records(&three_node(), &[]).unwrap();
    let expected_p = [[0.1, 0.1], [0.1, 0.4]];
    let expected_q = [[0.2, 0.2], [0.2, 0.3]];

    for method in [LinearizationMethod::FixedPoint, LinearizationMethod::Jacobian] {
        let model =
            LinearizedModel::build(&network, &settings(method, ReferenceKind::FlatStart)).unwrap();
        let dvp = &model.active().voltage_magnitude;
        let dvq = &model.reactive().voltage_magnitude;

        for i in 0..2 {
            for j in 0..2 {
                assert!(
                    relative_close(dvp[(i + 1, j + 1)], expected_p[i][j], 1e-6),
                    "{method:?} d|V|/dP[{i}][{j}] = {}",
                    dvp[(i + 1, j + 1)]
                );
                assert!(relative_close(dvq[(i + 1, j + 1)], expected_q[i][j], 1e-6));
            }
        }
        // source row and column stay zero
        for k in 0..3 {
            assert_eq!(dvp[(0, k)], 0.0);
            assert_eq!(dvp[(k, 0)], 0.0);
        }
        // more load (negative injection) lowers voltage, most at the far end
        assert!(dvp[(2, 2)] > dvp[(1, 1)]);
        assert!(dvp[(1, 1)] > 0.0);
    }
}

#[test]
fn three_node_branch_and_loss_sensitivities() {
    let network = NetworkModel::from_records(&three_node(), &[]).unwrap();
    let model = LinearizedModel::build(
        &network,
        &settings(LinearizationMethod::FixedPoint, ReferenceKind::FlatStart),
    )
    .unwrap();
    let s = model.active();

    // power injected at n2 leaves l2 at its to end and enters at the from end
    assert!((s.branch_power_to[(1, 2)] - Complex::new(1.0, 0.0)).norm() < 1e-9);
    assert!((s.branch_power_from[(1, 2)] + Complex::new(1.0, 0.0)).norm() < 1e-9);
    assert!((s.branch_power_from[(0, 2)] + Complex::new(1.0, 0.0)).norm() < 1e-9);
    // no current flows at flat start, so losses are second order
    assert!(s.loss.iter().all(|l| l.norm() < 1e-9));
    assert!(model.reference_loss().norm() < 1e-12);
}

#[test]
fn methods_agree_at_no_load_reference() {
    let network = NetworkModel::from_records(&feeder(), &[]).unwrap();
    let fixed = LinearizedModel::build(
        &network,
        &settings(LinearizationMethod::FixedPoint, ReferenceKind::NoLoad),
    )
    .unwrap();
    let jac = LinearizedModel::build(
        &network,
        &settings(LinearizationMethod::Jacobian, ReferenceKind::NoLoad),
    )
    .unwrap();

    let scale = fixed.active().voltage.camax().max(1.0);
    assert!(max_abs_diff(&fixed.active().voltage, &jac.active().voltage) < 1e-8 * scale);
    assert!(max_abs_diff(&fixed.reactive().voltage, &jac.reactive().voltage) < 1e-8 * scale);
    assert_eq!(fixed.method(), LinearizationMethod::FixedPoint);
    assert_eq!(jac.reference(), "no_load");
}

#[test]
fn analytic_jacobian_matches_finite_differences_on_feeder() {
    let network = NetworkModel::from_records(&feeder(), &[]).unwrap();
    let v = no_load_voltage(&network, 1e12).unwrap();
    let y = network.node_admittance().to_dense();
    let rows = network.index().non_source_rows();
    let analytic = polar_jacobian(&y, &v, rows);
    let numeric = numerical_polar_jacobian(&y, &v, rows, 1e-6);
    let scale = analytic.amax();
    assert!((&analytic - &numeric).amax() < 1e-6 * scale);
}

/// Fixed-point AC power flow used as the nonlinear truth.
fn solve_power_flow(network: &NetworkModel, injection: &DVector<Complex>) -> DVector<Complex> {
    solve_power_flow_with(network, |_| injection.clone())
}

/// Same, with row injections that depend on the current voltage.
fn solve_power_flow_with(
    network: &NetworkModel,
    injection: impl Fn(&DVector<Complex>) -> DVector<Complex>,
) -> DVector<Complex> {
    let y = network.node_admittance();
    let rows = network.index().non_source_rows();
    let y_inv = y.select(rows, rows).try_inverse().unwrap();
    let mut v = no_load_voltage(network, 1e12).unwrap();
    let w: DVector<Complex> = DVector::from_iterator(rows.len(), rows.iter().map(|&r| v[r]));
    for _ in 0..200 {
        let s = injection(&v);
        let rhs = DVector::from_iterator(
            rows.len(),
            rows.iter().map(|&r| (s[r] / v[r]).conj()),
        );
        let next = &w + &y_inv * rhs;
        for (k, &r) in rows.iter().enumerate() {
            v[r] = next[k];
        }
    }
    v
}

#[test]
fn linear_model_tracks_nonlinear_power_flow_for_small_loads() {
    let network = NetworkModel::from_records(&feeder(), &[]).unwrap();
    let model = LinearizedModel::build(&network, &LinearizationSettings::default()).unwrap();

    let dim = network.node_dim();
    let mut dp = DVector::zeros(dim);
    let mut dq = DVector::zeros(dim);
    for &r in network.index().non_source_rows() {
        dp[r] = -0.005;
        dq[r] = -0.002;
    }
    let injection = DVector::from_fn(dim, |r, _| Complex::new(dp[r], dq[r]));

    let exact = solve_power_flow(&network, &injection).map(|v| v.norm());
    let approx = model.approximate_voltage_magnitude(&dp, &dq).unwrap();
    let reference = model.reference_voltage_magnitude();

    let change = (&exact - &reference).amax();
    let error = (&exact - &approx).amax();
    assert!(change > 1e-4, "loads should move the voltage, moved {change}");
    assert!(error < 0.05 * change, "linear error {error} vs change {change}");
}

#[test]
fn der_projection_applies_phase_weights() {
    let ders = vec![DerDef {
        name: "heat_pump".to_string(),
        node: "n2".to_string(),
        phases: None,
        connection: DerConnection::Wye,
        kind: DerKindDef::Load,
        active_power_kw: 5.0,
        reactive_power_kvar: 1.0,
        profile: None,
    }];
    let network = NetworkModel::from_records(&three_node(), &ders).unwrap();
    let model = LinearizedModel::build(
        &network,
        &settings(LinearizationMethod::FixedPoint, ReferenceKind::FlatStart),
    )
    .unwrap();
    let der = model.der_sensitivities(&network);

    assert_eq!(der.active.voltage_magnitude.shape(), (3, 1));
    // single-phase DER carries all three-phase power on one row
    assert!(relative_close(der.active.voltage_magnitude[(2, 0)], 3.0 * 0.4, 1e-9));
    assert!(relative_close(der.reactive.voltage_magnitude[(1, 0)], 3.0 * 0.2, 1e-9));
}

/// Slack and one load bus, three uncoupled phases.
fn balanced_pair() -> ElectricGridDef {
    let mut def = empty_grid("balanced_pair");
    def.nodes = vec![
        node("s", 1.0, &Phase::ALL, true),
        node("n", 1.0, &Phase::ALL, false),
    ];
    def.lines = vec![ohm_line("l", "s", "n", 0.02, 0.04)];
    def
}

fn load(name: &str, connection: DerConnection, phases: Option<Vec<Phase>>) -> DerDef {
    DerDef {
        name: name.to_string(),
        node: "n".to_string(),
        phases,
        connection,
        kind: DerKindDef::Load,
        active_power_kw: 30.0,
        reactive_power_kvar: 10.0,
        profile: None,
    }
}

#[test]
fn balanced_delta_load_matches_wye_load() {
    let ders = vec![
        load("wye", DerConnection::Wye, None),
        load("delta", DerConnection::Delta, None),
    ];
    let network = NetworkModel::from_records(&balanced_pair(), &ders).unwrap();

    for method in [LinearizationMethod::FixedPoint, LinearizationMethod::Jacobian] {
        let model =
            LinearizedModel::build(&network, &settings(method, ReferenceKind::FlatStart)).unwrap();
        let der = model.der_sensitivities(&network);
        for s in [&der.active, &der.reactive] {
            let wye = s.voltage.column(0).into_owned();
            let delta = s.voltage.column(1).into_owned();
            assert!((&wye - &delta).camax() < 1e-9 * wye.camax(), "{method:?}");
            assert!(wye.camax() > 0.0);
        }
    }
}

#[test]
fn delta_load_on_one_pair_tracks_nonlinear_power_flow() {
    let ders = vec![load("welder", DerConnection::Delta, Some(vec![Phase::A, Phase::B]))];
    let network = NetworkModel::from_records(&balanced_pair(), &ders).unwrap();
    let model = LinearizedModel::build(&network, &LinearizationSettings::default()).unwrap();
    let der = model.der_sensitivities(&network);

    let index = network.index();
    let n = index.node_id("n").unwrap();
    let a = index.node_phase_row(n, Phase::A).unwrap();
    let b = index.node_phase_row(n, Phase::B).unwrap();

    // 30 kW + 10 kvar consumed on a 1 MVA base, all of it across a-b
    let (p, q) = (-0.03, -0.01);
    let across = Complex::new(p, q) * 3.0;
    let exact = solve_power_flow_with(&network, |v| {
        let mut s = DVector::zeros(v.len());
        let ratio = across / (v[a] - v[b]);
        s[a] = v[a] * ratio;
        s[b] = -v[b] * ratio;
        s
    })
    .map(|v| v.norm());

    let reference = model.reference_voltage_magnitude();
    let approx = &reference
        + der.active.voltage_magnitude.column(0) * p
        + der.reactive.voltage_magnitude.column(0) * q;

    let change = (&exact - &reference).amax();
    let error = (&exact - &approx).amax();
    assert!(change > 1e-4, "load should move the voltage, moved {change}");
    assert!(error < 0.05 * change, "linear error {error} vs change {change}");
}

#[test]
fn islanded_rows_fail_before_factorization() {
    let mut def = three_node();
    def.nodes.push(node("far", 1.0, &[Phase::A], false));
    def.nodes.push(node("far2", 1.0, &[Phase::A], false));
    def.lines.push(ohm_line("island", "far", "far2", 0.1, 0.1));
    let network = NetworkModel::from_records(&def, &[]).unwrap();

    let err = LinearizedModel::build(&network, &LinearizationSettings::default()).unwrap_err();
    assert_eq!(
        err,
        SolverError::Islanded {
            rows: vec!["far.a".to_string(), "far2.a".to_string()]
        }
    );
    assert!(err.is_linearization_failure());
}

#[test]
fn condition_bound_is_enforced() {
    let network = NetworkModel::from_records(&feeder(), &[]).unwrap();
    let strict = LinearizationSettings {
        max_condition_number: 1.0,
        reference: ReferenceKind::FlatStart,
        ..LinearizationSettings::default()
    };
    let err = LinearizedModel::build(&network, &strict).unwrap_err();
    assert!(matches!(err, SolverError::IllConditioned { .. }));

    let model = LinearizedModel::build(&network, &LinearizationSettings::default()).unwrap();
    assert!(model.condition_number() >= 1.0);
    assert!(model.condition_number() <= 1e12);
}

#[test]
fn supplied_reference_is_checked() {
    let network = NetworkModel::from_records(&three_node(), &[]).unwrap();
    let short = ReferencePoint::Supplied(DVector::from_element(2, Complex::new(1.0, 0.0)));
    assert_eq!(
        linearize(&network, &short, &LinearizationSettings::default()).unwrap_err(),
        SolverError::ReferenceDimension {
            expected: 3,
            actual: 2
        }
    );

    let collapsed = ReferencePoint::Supplied(DVector::from_vec(vec![
        Complex::new(1.0, 0.0),
        Complex::new(0.0, 0.0),
        Complex::new(1.0, 0.0),
    ]));
    assert!(matches!(
        linearize(&network, &collapsed, &LinearizationSettings::default()),
        Err(SolverError::InvalidReference { .. })
    ));

    let loaded = ReferencePoint::Supplied(DVector::from_vec(vec![
        Complex::new(1.0, 0.0),
        Complex::new(0.97, -0.01),
        Complex::new(0.95, -0.02),
    ]));
    let model = linearize(&network, &loaded, &LinearizationSettings::default()).unwrap();
    assert_eq!(model.reference(), "supplied");
    assert!(model.reference_loss().re > 0.0);
}

#[test]
fn linearization_is_bit_reproducible() {
    let network = NetworkModel::from_records(&feeder(), &[]).unwrap();
    let jacobian = settings(LinearizationMethod::Jacobian, ReferenceKind::NoLoad);
    let a = LinearizedModel::build(&network, &jacobian).unwrap();
    let b = LinearizedModel::build(&network, &jacobian).unwrap();
    assert_eq!(a, b);
    for (x, y) in a.active().voltage.iter().zip(b.active().voltage.iter()) {
        assert_eq!(x.re.to_bits(), y.re.to_bits());
        assert_eq!(x.im.to_bits(), y.im.to_bits());
    }
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn radial_chain() -> impl Strategy<Value = ElectricGridDef> {
        proptest::collection::vec((0usize..1000, 0.01f64..0.5, 0.01f64..0.5), 1..8).prop_map(
            |links| {
                let mut def = empty_grid("random");
                def.nodes.push(node("n0", 1.0, &[Phase::A], true));
                for (i, (parent, r, x)) in links.into_iter().enumerate() {
                    let child = i + 1;
                    def.nodes.push(node(&format!("n{child}"), 1.0, &[Phase::A], false));
                    def.lines.push(ohm_line(
                        &format!("l{child}"),
                        &format!("n{}", parent % child),
                        &format!("n{child}"),
                        r,
                        x,
                    ));
                }
                def
            },
        )
    }

    proptest! {
        #[test]
        fn flat_start_sensitivities_are_path_resistances(def in radial_chain()) {
            let network = NetworkModel::from_records(&def, &[]).unwrap();
            let fixed = LinearizedModel::build(
                &network,
                &settings(LinearizationMethod::FixedPoint, ReferenceKind::FlatStart),
            ).unwrap();
            let jac = LinearizedModel::build(
                &network,
                &settings(LinearizationMethod::Jacobian, ReferenceKind::FlatStart),
            ).unwrap();

            let dvp = &fixed.active().voltage_magnitude;
            prop_assert!(dvp.iter().all(|v| *v >= -1e-12));
            prop_assert!(max_abs_diff(&fixed.active().voltage, &jac.active().voltage) < 1e-9);
            for i in 1..dvp.nrows() {
                // own-row sensitivity dominates its column (shared path resistance)
                for j in 1..dvp.nrows() {
                    prop_assert!(dvp[(j, i)] <= dvp[(i, i)] + 1e-12);
                }
            }
        }
    }
}
