//! Per-unit system of one network.
//!
//! One three-phase power base `S` for the whole network and one voltage
//! base per node (its nominal line-to-line voltage). Impedances use
//! `Z = V² / S`; node-phase rows then carry phase voltages on `V / √3` and
//! phase powers on `S / 3`.

use eg_core::{PerUnitBase, Real, ensure_positive, kv, mva};
use eg_graph::{Grid, Node};

use crate::error::NetworkResult;

/// Rows carry phase powers on one third of the three-phase base.
pub const PHASE_POWER_SHARE: Real = 1.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerUnitSystem {
    base_power_mva: Real,
    base_frequency_hz: Real,
}

impl PerUnitSystem {
    pub fn new(base_power_mva: Real, base_frequency_hz: Real) -> NetworkResult<Self> {
        ensure_positive(base_power_mva, "base power")?;
        ensure_positive(base_frequency_hz, "base frequency")?;
        Ok(Self {
            base_power_mva,
            base_frequency_hz,
        })
    }

    pub fn from_grid(grid: &Grid) -> NetworkResult<Self> {
        Self::new(grid.base_power_mva(), grid.base_frequency_hz())
    }

    pub fn base_power_mva(&self) -> Real {
        self.base_power_mva
    }

    pub fn base_frequency_hz(&self) -> Real {
        self.base_frequency_hz
    }

    /// Angular frequency ω = 2πf in rad/s.
    pub fn angular_frequency(&self) -> Real {
        2.0 * std::f64::consts::PI * self.base_frequency_hz
    }

    /// Base at an arbitrary voltage level.
    pub fn base_at(&self, voltage_kv: Real) -> NetworkResult<PerUnitBase> {
        Ok(PerUnitBase::new(kv(voltage_kv), mva(self.base_power_mva))?)
    }

    /// Base at a node's voltage level.
    pub fn node_base(&self, node: &Node) -> NetworkResult<PerUnitBase> {
        self.base_at(node.nominal_voltage_kv)
    }

    /// Three-phase power in kW (or kvar / kVA) to per-unit of the system base.
    pub fn power_pu(&self, kw: Real) -> Real {
        kw * 1e-3 / self.base_power_mva
    }

    /// Per-unit of the system base back to kW.
    pub fn power_kw(&self, pu: Real) -> Real {
        pu * self.base_power_mva * 1e3
    }
}
