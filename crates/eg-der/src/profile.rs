//! Power time series of one DER in its own sign convention, in kW / kvar.

use eg_graph::Der;
use eg_project::ProfileDef;

use crate::error::{DerError, DerResult};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PowerProfile {
    pub active_power_kw: Vec<f64>,
    pub reactive_power_kvar: Vec<f64>,
}

impl PowerProfile {
    /// Nominal power repeated over `len` steps.
    pub fn constant(active_power_kw: f64, reactive_power_kvar: f64, len: usize) -> Self {
        Self {
            active_power_kw: vec![active_power_kw; len],
            reactive_power_kvar: vec![reactive_power_kvar; len],
        }
    }

    /// Profile from a record. An empty reactive series keeps the nominal
    /// power factor of the DER (or its nominal reactive power when the
    /// nominal active power is zero).
    pub fn from_record(der: &Der, def: &ProfileDef) -> Self {
        let reactive_power_kvar = if def.reactive_power_kvar.is_empty() {
            if der.active_power_kw != 0.0 {
                let ratio = der.reactive_power_kvar / der.active_power_kw;
                def.active_power_kw.iter().map(|p| p * ratio).collect()
            } else {
                vec![der.reactive_power_kvar; def.active_power_kw.len()]
            }
        } else {
            def.reactive_power_kvar.clone()
        };
        Self {
            active_power_kw: def.active_power_kw.clone(),
            reactive_power_kvar,
        }
    }

    pub fn len(&self) -> usize {
        self.active_power_kw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_power_kw.is_empty()
    }

    /// Apparent power per step in kVA.
    pub fn apparent_power_kva(&self) -> impl Iterator<Item = f64> + '_ {
        self.active_power_kw
            .iter()
            .zip(&self.reactive_power_kvar)
            .map(|(p, q)| p.hypot(*q))
    }

    /// Both series must carry one finite value per timestep.
    pub fn check_alignment(&self, der: &str, expected: usize) -> DerResult<()> {
        for (series, values) in [
            ("active_power_kw", &self.active_power_kw),
            ("reactive_power_kvar", &self.reactive_power_kvar),
        ] {
            if values.len() != expected {
                return Err(DerError::ProfileAlignment {
                    der: der.to_string(),
                    series,
                    expected,
                    actual: values.len(),
                });
            }
            if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                return Err(eg_core::EgError::NonFinite {
                    what: series,
                    value: *bad,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apparent_power_combines_both_series() {
        let p = PowerProfile {
            active_power_kw: vec![3.0, 0.0],
            reactive_power_kvar: vec![4.0, 2.0],
        };
        let s: Vec<f64> = p.apparent_power_kva().collect();
        assert_eq!(s, vec![5.0, 2.0]);
    }

    #[test]
    fn misaligned_reactive_series_reported() {
        let p = PowerProfile {
            active_power_kw: vec![1.0, 2.0, 3.0],
            reactive_power_kvar: vec![0.0],
        };
        let err = p.check_alignment("pv", 3).unwrap_err();
        assert_eq!(
            err,
            DerError::ProfileAlignment {
                der: "pv".to_string(),
                series: "reactive_power_kvar",
                expected: 3,
                actual: 1,
            }
        );
    }
}
