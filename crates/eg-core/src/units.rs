// eg-core/src/units.rs

use uom::si::f64::{ElectricPotential as UomElectricPotential, Power as UomPower};

use crate::numeric::{Real, ensure_positive};
use crate::EgResult;

// Public canonical unit types (SI, f64)
pub type Voltage = UomElectricPotential;
pub type Power = UomPower;

#[inline]
pub fn kv(v: f64) -> Voltage {
    use uom::si::electric_potential::kilovolt;
    Voltage::new::<kilovolt>(v)
}

#[inline]
pub fn mva(v: f64) -> Power {
    use uom::si::power::megawatt;
    Power::new::<megawatt>(v)
}

/// Base quantities of a per-unit system.
///
/// Power is the system-wide three-phase base; voltage is the line-to-line
/// base of one voltage level. Impedance base follows as `V² / S`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerUnitBase {
    voltage: Voltage,
    power: Power,
}

impl PerUnitBase {
    pub fn new(voltage: Voltage, power: Power) -> EgResult<Self> {
        use uom::si::electric_potential::volt;
        use uom::si::power::watt;
        ensure_positive(voltage.get::<volt>(), "base voltage")?;
        ensure_positive(power.get::<watt>(), "base power")?;
        Ok(Self { voltage, power })
    }

    pub fn voltage(&self) -> Voltage {
        self.voltage
    }

    pub fn power(&self) -> Power {
        self.power
    }

    pub fn impedance_ohm(&self) -> Real {
        use uom::si::electric_potential::volt;
        use uom::si::power::watt;
        let v = self.voltage.get::<volt>();
        v * v / self.power.get::<watt>()
    }

    pub fn admittance_siemens(&self) -> Real {
        1.0 / self.impedance_ohm()
    }

    /// Re-express a per-unit impedance given on `other` in this base.
    pub fn rebase_impedance(&self, z_pu: Real, other: &PerUnitBase) -> Real {
        z_pu * other.impedance_ohm() / self.impedance_ohm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_smoke() {
        let _v = kv(4.16);
        let _s = mva(1.0);
    }

    #[test]
    fn impedance_base_is_v_squared_over_s() {
        let base = PerUnitBase::new(kv(4.16), mva(1.0)).unwrap();
        assert!((base.impedance_ohm() - 17.3056).abs() < 1e-9);
        assert!((base.admittance_siemens() * base.impedance_ohm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rebase_keeps_ohmic_value() {
        let system = PerUnitBase::new(kv(12.47), mva(10.0)).unwrap();
        let own = PerUnitBase::new(kv(12.47), mva(1.0)).unwrap();
        let z_own = 0.05;
        let z_sys = system.rebase_impedance(z_own, &own);
        assert!((z_sys * system.impedance_ohm() - z_own * own.impedance_ohm()).abs() < 1e-9);
    }

    #[test]
    fn zero_base_rejected() {
        assert!(PerUnitBase::new(kv(0.0), mva(1.0)).is_err());
        assert!(PerUnitBase::new(kv(1.0), mva(-1.0)).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rebase_preserves_ohms_across_bases(
                kv_a in 0.2f64..140.0,
                kv_b in 0.2f64..140.0,
                mva_a in 0.01f64..100.0,
                mva_b in 0.01f64..100.0,
                z in -5.0f64..5.0,
            ) {
                let a = PerUnitBase::new(kv(kv_a), mva(mva_a)).unwrap();
                let b = PerUnitBase::new(kv(kv_b), mva(mva_b)).unwrap();
                let ohms = z * b.impedance_ohm();
                let z_a = a.rebase_impedance(z, &b);
                prop_assert!((z_a * a.impedance_ohm() - ohms).abs() <= 1e-9 * (1.0 + ohms.abs()));
                prop_assert!((b.rebase_impedance(z_a, &a) - z).abs() <= 1e-9 * (1.0 + z.abs()));
            }
        }
    }
}
