//! Linearization settings.

use serde::{Deserialize, Serialize};

/// Default bound on the 1-norm condition number of the factorized block.
pub const DEFAULT_MAX_CONDITION_NUMBER: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearizationMethod {
    /// Global fixed-point linearization through the reduced admittance.
    #[default]
    FixedPoint,
    /// Inverse of the polar power-flow Jacobian.
    Jacobian,
}

impl LinearizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinearizationMethod::FixedPoint => "fixed_point",
            LinearizationMethod::Jacobian => "jacobian",
        }
    }
}

/// Reference point chosen from configuration. Explicit operating points
/// are passed as [`crate::ReferencePoint::Supplied`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    FlatStart,
    #[default]
    NoLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearizationSettings {
    pub method: LinearizationMethod,
    pub reference: ReferenceKind,
    pub max_condition_number: f64,
}

impl Default for LinearizationSettings {
    fn default() -> Self {
        Self {
            method: LinearizationMethod::default(),
            reference: ReferenceKind::default(),
            max_condition_number: DEFAULT_MAX_CONDITION_NUMBER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = LinearizationSettings::default();
        assert_eq!(s.method, LinearizationMethod::FixedPoint);
        assert_eq!(s.reference, ReferenceKind::NoLoad);
        assert_eq!(s.max_condition_number, 1e12);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let s: LinearizationSettings = serde_yaml::from_str("method: jacobian\n").unwrap();
        assert_eq!(s.method, LinearizationMethod::Jacobian);
        assert_eq!(s.reference, ReferenceKind::NoLoad);
    }
}
