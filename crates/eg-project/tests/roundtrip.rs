use chrono::{TimeZone, Utc};
use eg_project::schema::*;
use eg_project::{ProjectError, ValidationError, load_json, load_yaml, parse_yaml, save_json, save_yaml};

fn radial_scenario() -> ScenarioDef {
    ScenarioDef {
        name: "radial".to_string(),
        grid: ElectricGridDef {
            name: "feeder".to_string(),
            base_power_mva: 1.0,
            base_frequency_hz: 60.0,
            nodes: vec![
                NodeDef {
                    name: "source".to_string(),
                    phases: Phase::ALL.to_vec(),
                    nominal_voltage_kv: 4.16,
                    kind: NodeKindDef::Slack {
                        voltage_magnitude_pu: 1.0,
                        voltage_angle_deg: 0.0,
                    },
                    rated_capacity_kva: None,
                },
                NodeDef {
                    name: "n1".to_string(),
                    phases: Phase::ALL.to_vec(),
                    nominal_voltage_kv: 4.16,
                    kind: NodeKindDef::Pq,
                    rated_capacity_kva: Some(500.0),
                },
            ],
            line_types: vec![LineTypeDef {
                name: "oh".to_string(),
                resistance_ohm_per_km: vec![0.3, 0.1, 0.3, 0.1, 0.1, 0.3],
                reactance_ohm_per_km: vec![0.6, 0.2, 0.6, 0.2, 0.2, 0.6],
                capacitance_nf_per_km: vec![],
            }],
            lines: vec![LineDef {
                name: "l1".to_string(),
                from_node: "source".to_string(),
                to_node: "n1".to_string(),
                phases: None,
                impedance: LineImpedanceDef::LineType {
                    line_type: "oh".to_string(),
                    length_km: 1.2,
                },
                rated_power_kva: Some(1000.0),
            }],
            transformers: vec![],
        },
        timesteps: TimestepsDef {
            start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            interval_s: 900,
            count: 4,
        },
        ders: vec![DerDef {
            name: "load1".to_string(),
            node: "n1".to_string(),
            phases: None,
            connection: DerConnection::Wye,
            kind: DerKindDef::Load,
            active_power_kw: 120.0,
            reactive_power_kvar: 30.0,
            profile: None,
        }],
    }
}

#[test]
fn roundtrip_yaml_radial_scenario() {
    let scenario = radial_scenario();
    let path = std::env::temp_dir().join("eg_project_roundtrip_radial.yaml");

    save_yaml(&path, &scenario).unwrap();
    let loaded = load_yaml(&path).unwrap();

    assert_eq!(scenario, loaded);
}

#[test]
fn roundtrip_json_radial_scenario() {
    let scenario = radial_scenario();
    let path = std::env::temp_dir().join("eg_project_roundtrip_radial.json");

    save_json(&path, &scenario).unwrap();
    let loaded = load_json(&path).unwrap();

    assert_eq!(scenario, loaded);
}

#[test]
fn yaml_defaults_are_applied() {
    let yaml = r#"
name: minimal
grid:
  name: g
  nodes:
    - name: s
      nominal_voltage_kv: 0.4
      kind:
        type: Slack
    - name: n
      nominal_voltage_kv: 0.4
  lines:
    - name: l
      from_node: s
      to_node: n
      impedance:
        type: Ohms
        resistance_ohm: 0.1
        reactance_ohm: 0.05
timesteps:
  start: 2026-01-01T00:00:00Z
  interval_s: 3600
  count: 24
"#;
    let scenario = parse_yaml(yaml).unwrap();
    assert_eq!(scenario.grid.base_power_mva, 1.0);
    assert_eq!(scenario.grid.base_frequency_hz, 60.0);
    assert_eq!(scenario.grid.nodes[1].phases, Phase::ALL.to_vec());
    assert_eq!(scenario.grid.nodes[1].kind, NodeKindDef::Pq);
    assert_eq!(
        scenario.grid.nodes[0].kind,
        NodeKindDef::Slack {
            voltage_magnitude_pu: 1.0,
            voltage_angle_deg: 0.0
        }
    );
    assert!(scenario.ders.is_empty());
}

#[test]
fn zero_timesteps_rejected() {
    let mut scenario = radial_scenario();
    scenario.timesteps.count = 0;
    let path = std::env::temp_dir().join("eg_project_zero_timesteps.yaml");
    let err = save_yaml(&path, &scenario).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Validation(ValidationError::InvalidValue { .. })
    ));
}

#[test]
fn malformed_line_type_rejected() {
    let mut scenario = radial_scenario();
    scenario.grid.line_types[0].reactance_ohm_per_km.pop();
    let err = eg_project::validate_scenario(&scenario).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidLineType { .. }));
}
