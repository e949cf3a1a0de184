use crate::EgError;

/// Floating point type used throughout the system
pub type Real = f64;

/// Complex phasor / admittance type
pub type Complex = num_complex::Complex64;

/// One tolerance for everything
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn nearly_equal_complex(a: Complex, b: Complex, tol: Tolerances) -> bool {
    let diff = (a - b).norm();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.norm().max(b.norm())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, EgError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(EgError::NonFinite { what, value: v })
    }
}

pub fn ensure_positive(v: Real, what: &'static str) -> Result<Real, EgError> {
    let v = ensure_finite(v, what)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(EgError::NonPositive { what, value: v })
    }
}

/// Complex phasor from magnitude and angle in degrees.
pub fn phasor(magnitude: Real, angle_deg: Real) -> Complex {
    Complex::from_polar(magnitude, angle_deg.to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn nearly_equal_complex_uses_modulus() {
        let tol = Tolerances::default();
        let a = Complex::new(1.0, -2.0);
        assert!(nearly_equal_complex(a, a + Complex::new(1e-13, 0.0), tol));
        assert!(!nearly_equal_complex(a, a.conj(), tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn ensure_positive_rejects_zero() {
        assert!(matches!(
            ensure_positive(0.0, "base"),
            Err(EgError::NonPositive { .. })
        ));
        assert_eq!(ensure_positive(2.5, "base").unwrap(), 2.5);
    }

    #[test]
    fn phasor_rotates_by_degrees() {
        let p = phasor(1.0, -120.0);
        assert!((p.norm() - 1.0).abs() < 1e-12);
        assert!((p.arg().to_degrees() + 120.0).abs() < 1e-9);
    }
}
