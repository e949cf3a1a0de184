//! Scenario record definitions.
//!
//! A scenario is one read-only snapshot of equipment and topology records:
//! the electric grid, its DERs/loads and the time index they are defined on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioDef {
    pub name: String,
    pub grid: ElectricGridDef,
    pub timesteps: TimestepsDef,
    #[serde(default)]
    pub ders: Vec<DerDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElectricGridDef {
    pub name: String,
    #[serde(default = "default_base_power_mva")]
    pub base_power_mva: f64,
    #[serde(default = "default_base_frequency_hz")]
    pub base_frequency_hz: f64,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub line_types: Vec<LineTypeDef>,
    #[serde(default)]
    pub lines: Vec<LineDef>,
    #[serde(default)]
    pub transformers: Vec<TransformerDef>,
}

fn default_base_power_mva() -> f64 {
    1.0
}

fn default_base_frequency_hz() -> f64 {
    60.0
}

/// Conductor phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    /// Nominal angle offset of this phase in a balanced positive sequence.
    pub fn angle_offset_deg(self) -> f64 {
        match self {
            Phase::A => 0.0,
            Phase::B => -120.0,
            Phase::C => 120.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::A => "a",
            Phase::B => "b",
            Phase::C => "c",
        }
    }
}

fn default_phases() -> Vec<Phase> {
    Phase::ALL.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDef {
    pub name: String,
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,
    pub nominal_voltage_kv: f64,
    #[serde(default)]
    pub kind: NodeKindDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_capacity_kva: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum NodeKindDef {
    /// Voltage-controlled reference bus.
    Slack {
        #[serde(default = "default_voltage_magnitude_pu")]
        voltage_magnitude_pu: f64,
        #[serde(default)]
        voltage_angle_deg: f64,
    },
    /// Fixed-injection bus.
    #[default]
    Pq,
}

fn default_voltage_magnitude_pu() -> f64 {
    1.0
}

/// Line type with per-km phase matrices.
///
/// Matrices are given as the upper triangle packed column by column, so 1,
/// 3 or 6 entries for 1, 2 or 3 phases. A line with fewer phases than the
/// type uses the leading block:
/// ```yaml
/// resistance_ohm_per_km: [r11, r12, r22, r13, r23, r33]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineTypeDef {
    pub name: String,
    pub resistance_ohm_per_km: Vec<f64>,
    pub reactance_ohm_per_km: Vec<f64>,
    #[serde(default)]
    pub capacitance_nf_per_km: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineDef {
    pub name: String,
    pub from_node: String,
    pub to_node: String,
    /// Connected phases; the from-node phases when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<Phase>>,
    pub impedance: LineImpedanceDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_power_kva: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LineImpedanceDef {
    /// Coupled phase impedance from a line type and a length.
    LineType { line_type: String, length_km: f64 },
    /// Uncoupled per-phase series impedance and total shunt susceptance.
    Ohms {
        resistance_ohm: f64,
        reactance_ohm: f64,
        #[serde(default)]
        susceptance_us: f64,
    },
    /// Per-unit values, optionally on their own base.
    PerUnit {
        resistance_pu: f64,
        reactance_pu: f64,
        #[serde(default)]
        susceptance_pu: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_voltage_kv: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_power_mva: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformerDef {
    pub name: String,
    pub from_node: String,
    pub to_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<Phase>>,
    pub rated_power_kva: f64,
    pub primary_voltage_kv: f64,
    pub secondary_voltage_kv: f64,
    pub resistance_percent: f64,
    pub reactance_percent: f64,
    #[serde(default = "default_tap_ratio")]
    pub tap_ratio: f64,
    #[serde(default)]
    pub phase_shift_deg: f64,
}

fn default_tap_ratio() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimestepsDef {
    pub start: DateTime<Utc>,
    pub interval_s: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DerKindDef {
    Load,
    Generator,
    Storage,
    FlexibleBuilding,
}

impl DerKindDef {
    pub fn as_str(self) -> &'static str {
        match self {
            DerKindDef::Load => "Load",
            DerKindDef::Generator => "Generator",
            DerKindDef::Storage => "Storage",
            DerKindDef::FlexibleBuilding => "FlexibleBuilding",
        }
    }
}

/// How a DER is connected across its phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DerConnection {
    /// Phase to neutral.
    #[default]
    Wye,
    /// Phase to phase: `ab`, `bc`, `ca` on three phases, one pair on two.
    Delta,
}

impl DerConnection {
    pub fn as_str(self) -> &'static str {
        match self {
            DerConnection::Wye => "wye",
            DerConnection::Delta => "delta",
        }
    }
}

/// DER or load record.
///
/// Powers are given in the element's own convention: consumption positive
/// for loads and buildings, generation positive for generators, discharge
/// positive for storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerDef {
    pub name: String,
    pub node: String,
    /// Connected phases; the node phases when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<Phase>>,
    #[serde(default)]
    pub connection: DerConnection,
    pub kind: DerKindDef,
    pub active_power_kw: f64,
    #[serde(default)]
    pub reactive_power_kvar: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileDef>,
}

/// Explicit time series, one value per timestep.
///
/// When `reactive_power_kvar` is empty the nominal power factor is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProfileDef {
    pub active_power_kw: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactive_power_kvar: Vec<f64>,
}
