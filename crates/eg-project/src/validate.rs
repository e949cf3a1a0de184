//! Record-level value checks.
//!
//! Structural checks (duplicate names, dangling references, slack count)
//! belong to the grid builder; this module only rejects values that no
//! model could be built from.

use crate::schema::{
    DerConnection, DerDef, ElectricGridDef, LineDef, LineImpedanceDef, LineTypeDef, NodeDef,
    Phase, ScenarioDef, TimestepsDef, TransformerDef,
};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid phases for {context}: {reason}")]
    InvalidPhases { context: String, reason: String },

    #[error("Invalid line type {name}: {reason}")]
    InvalidLineType { name: String, reason: String },
}

pub fn validate_scenario(scenario: &ScenarioDef) -> Result<(), ValidationError> {
    if scenario.name.trim().is_empty() {
        return Err(invalid("scenario.name", "\"\"", "must not be empty"));
    }
    validate_grid(&scenario.grid)?;
    validate_timesteps(&scenario.timesteps)?;
    for der in &scenario.ders {
        validate_der(der)?;
    }
    Ok(())
}

fn validate_grid(grid: &ElectricGridDef) -> Result<(), ValidationError> {
    positive("grid.base_power_mva", grid.base_power_mva)?;
    positive("grid.base_frequency_hz", grid.base_frequency_hz)?;

    for node in &grid.nodes {
        validate_node(node)?;
    }
    for line_type in &grid.line_types {
        validate_line_type(line_type)?;
    }
    for line in &grid.lines {
        validate_line(line)?;
    }
    for transformer in &grid.transformers {
        validate_transformer(transformer)?;
    }
    Ok(())
}

fn validate_node(node: &NodeDef) -> Result<(), ValidationError> {
    validate_phase_set(&node.phases, &format!("node '{}'", node.name))?;
    positive(
        &format!("node '{}'.nominal_voltage_kv", node.name),
        node.nominal_voltage_kv,
    )?;
    if let Some(capacity) = node.rated_capacity_kva {
        positive(&format!("node '{}'.rated_capacity_kva", node.name), capacity)?;
    }
    if let crate::schema::NodeKindDef::Slack {
        voltage_magnitude_pu,
        voltage_angle_deg,
    } = node.kind
    {
        positive(
            &format!("node '{}'.voltage_magnitude_pu", node.name),
            voltage_magnitude_pu,
        )?;
        finite(
            &format!("node '{}'.voltage_angle_deg", node.name),
            voltage_angle_deg,
        )?;
    }
    Ok(())
}

fn validate_line_type(line_type: &LineTypeDef) -> Result<(), ValidationError> {
    let entries = line_type.resistance_ohm_per_km.len();
    if triangle_dimension(entries).is_none() {
        return Err(ValidationError::InvalidLineType {
            name: line_type.name.clone(),
            reason: format!("{entries} resistance entries is not a 1, 2 or 3 phase triangle"),
        });
    }
    if line_type.reactance_ohm_per_km.len() != entries {
        return Err(ValidationError::InvalidLineType {
            name: line_type.name.clone(),
            reason: "reactance and resistance entry counts differ".to_string(),
        });
    }
    if !line_type.capacitance_nf_per_km.is_empty()
        && line_type.capacitance_nf_per_km.len() != entries
    {
        return Err(ValidationError::InvalidLineType {
            name: line_type.name.clone(),
            reason: "capacitance and resistance entry counts differ".to_string(),
        });
    }
    for v in line_type
        .resistance_ohm_per_km
        .iter()
        .chain(&line_type.reactance_ohm_per_km)
        .chain(&line_type.capacitance_nf_per_km)
    {
        finite(&format!("line type '{}'", line_type.name), *v)?;
    }
    Ok(())
}

fn validate_line(line: &LineDef) -> Result<(), ValidationError> {
    if let Some(phases) = &line.phases {
        validate_phase_set(phases, &format!("line '{}'", line.name))?;
    }
    if let Some(rating) = line.rated_power_kva {
        positive(&format!("line '{}'.rated_power_kva", line.name), rating)?;
    }
    match &line.impedance {
        LineImpedanceDef::LineType { length_km, .. } => {
            positive(&format!("line '{}'.length_km", line.name), *length_km)?;
        }
        LineImpedanceDef::Ohms {
            resistance_ohm,
            reactance_ohm,
            susceptance_us,
        } => {
            non_negative(&format!("line '{}'.resistance_ohm", line.name), *resistance_ohm)?;
            finite(&format!("line '{}'.reactance_ohm", line.name), *reactance_ohm)?;
            finite(&format!("line '{}'.susceptance_us", line.name), *susceptance_us)?;
        }
        LineImpedanceDef::PerUnit {
            resistance_pu,
            reactance_pu,
            susceptance_pu,
            base_voltage_kv,
            base_power_mva,
        } => {
            non_negative(&format!("line '{}'.resistance_pu", line.name), *resistance_pu)?;
            finite(&format!("line '{}'.reactance_pu", line.name), *reactance_pu)?;
            finite(&format!("line '{}'.susceptance_pu", line.name), *susceptance_pu)?;
            if let Some(v) = base_voltage_kv {
                positive(&format!("line '{}'.base_voltage_kv", line.name), *v)?;
            }
            if let Some(s) = base_power_mva {
                positive(&format!("line '{}'.base_power_mva", line.name), *s)?;
            }
        }
    }
    Ok(())
}

fn validate_transformer(t: &TransformerDef) -> Result<(), ValidationError> {
    if let Some(phases) = &t.phases {
        validate_phase_set(phases, &format!("transformer '{}'", t.name))?;
    }
    positive(&format!("transformer '{}'.rated_power_kva", t.name), t.rated_power_kva)?;
    positive(
        &format!("transformer '{}'.primary_voltage_kv", t.name),
        t.primary_voltage_kv,
    )?;
    positive(
        &format!("transformer '{}'.secondary_voltage_kv", t.name),
        t.secondary_voltage_kv,
    )?;
    non_negative(
        &format!("transformer '{}'.resistance_percent", t.name),
        t.resistance_percent,
    )?;
    finite(
        &format!("transformer '{}'.reactance_percent", t.name),
        t.reactance_percent,
    )?;
    positive(&format!("transformer '{}'.tap_ratio", t.name), t.tap_ratio)?;
    finite(
        &format!("transformer '{}'.phase_shift_deg", t.name),
        t.phase_shift_deg,
    )?;
    Ok(())
}

fn validate_timesteps(timesteps: &TimestepsDef) -> Result<(), ValidationError> {
    if timesteps.interval_s <= 0 {
        return Err(invalid(
            "timesteps.interval_s",
            &timesteps.interval_s.to_string(),
            "must be positive",
        ));
    }
    if timesteps.count == 0 {
        return Err(invalid("timesteps.count", "0", "must be at least one"));
    }
    Ok(())
}

fn validate_der(der: &DerDef) -> Result<(), ValidationError> {
    if let Some(phases) = &der.phases {
        validate_phase_set(phases, &format!("der '{}'", der.name))?;
        if der.connection == DerConnection::Delta && phases.len() < 2 {
            return Err(ValidationError::InvalidPhases {
                context: format!("der '{}'", der.name),
                reason: "delta connection needs at least two phases".to_string(),
            });
        }
    }
    finite(&format!("der '{}'.active_power_kw", der.name), der.active_power_kw)?;
    finite(
        &format!("der '{}'.reactive_power_kvar", der.name),
        der.reactive_power_kvar,
    )?;
    if let Some(profile) = &der.profile {
        for v in profile
            .active_power_kw
            .iter()
            .chain(&profile.reactive_power_kvar)
        {
            finite(&format!("der '{}'.profile", der.name), *v)?;
        }
    }
    Ok(())
}

/// Number of phases described by an upper-triangle entry count.
pub fn triangle_dimension(entries: usize) -> Option<usize> {
    match entries {
        1 => Some(1),
        3 => Some(2),
        6 => Some(3),
        _ => None,
    }
}

fn validate_phase_set(phases: &[Phase], context: &str) -> Result<(), ValidationError> {
    if phases.is_empty() {
        return Err(ValidationError::InvalidPhases {
            context: context.to_string(),
            reason: "no phases connected".to_string(),
        });
    }
    let mut seen = HashSet::new();
    for phase in phases {
        if !seen.insert(phase) {
            return Err(ValidationError::InvalidPhases {
                context: context.to_string(),
                reason: format!("phase '{}' listed twice", phase.as_str()),
            });
        }
    }
    Ok(())
}

fn invalid(field: &str, value: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn finite(field: &str, v: f64) -> Result<(), ValidationError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, &v.to_string(), "must be finite"))
    }
}

fn positive(field: &str, v: f64) -> Result<(), ValidationError> {
    finite(field, v)?;
    if v > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &v.to_string(), "must be positive"))
    }
}

fn non_negative(field: &str, v: f64) -> Result<(), ValidationError> {
    finite(field, v)?;
    if v >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &v.to_string(), "must not be negative"))
    }
}
