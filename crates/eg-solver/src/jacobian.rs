//! Polar power-flow Jacobian.
//!
//! Row power is `S = diag(V) conj(Y V)`. With `V = |V| e^{jθ}` and
//! `I = Y V`:
//!
//! ```text
//! ∂S/∂θ   = j diag(V) conj(diag(I) - Y diag(V))
//! ∂S/∂|V| = diag(V) conj(Y diag(V/|V|)) + conj(diag(I)) diag(V/|V|)
//! ```

use eg_core::{Complex, Real};
use nalgebra::{DMatrix, DVector};

/// Complex row power injections `V ⊙ conj(Y V)`.
pub fn row_power(y: &DMatrix<Complex>, v: &DVector<Complex>) -> DVector<Complex> {
    let current = y * v;
    v.zip_map(&current, |vi, ii| vi * ii.conj())
}

/// Derivatives of complex row power with respect to angle and magnitude.
#[derive(Debug, Clone)]
pub struct PowerDerivatives {
    pub d_angle: DMatrix<Complex>,
    pub d_magnitude: DMatrix<Complex>,
}

pub fn power_derivatives(y: &DMatrix<Complex>, v: &DVector<Complex>) -> PowerDerivatives {
    let n = v.len();
    let current = y * v;
    let unit = v.map(unit_phasor);

    let d_angle = DMatrix::from_fn(n, n, |a, b| {
        let mut inner = -y[(a, b)] * v[b];
        if a == b {
            inner += current[a];
        }
        Complex::i() * v[a] * inner.conj()
    });
    let d_magnitude = DMatrix::from_fn(n, n, |a, b| {
        let mut e = v[a] * (y[(a, b)] * unit[b]).conj();
        if a == b {
            e += current[a].conj() * unit[a];
        }
        e
    });
    PowerDerivatives {
        d_angle,
        d_magnitude,
    }
}

/// Real polar Jacobian over `rows`:
///
/// ```text
/// [ ∂P/∂θ  ∂P/∂|V| ]
/// [ ∂Q/∂θ  ∂Q/∂|V| ]
/// ```
pub fn polar_jacobian(y: &DMatrix<Complex>, v: &DVector<Complex>, rows: &[usize]) -> DMatrix<Real> {
    let d = power_derivatives(y, v);
    let m = rows.len();
    let mut jac = DMatrix::zeros(2 * m, 2 * m);
    for (i, &a) in rows.iter().enumerate() {
        for (j, &b) in rows.iter().enumerate() {
            jac[(i, j)] = d.d_angle[(a, b)].re;
            jac[(i, m + j)] = d.d_magnitude[(a, b)].re;
            jac[(m + i, j)] = d.d_angle[(a, b)].im;
            jac[(m + i, m + j)] = d.d_magnitude[(a, b)].im;
        }
    }
    jac
}

/// Central-difference counterpart of [`polar_jacobian`], perturbing the
/// angle and magnitude of each row in turn.
pub fn numerical_polar_jacobian(
    y: &DMatrix<Complex>,
    v: &DVector<Complex>,
    rows: &[usize],
    epsilon: Real,
) -> DMatrix<Real> {
    let m = rows.len();
    let mut jac = DMatrix::zeros(2 * m, 2 * m);

    for (j, &b) in rows.iter().enumerate() {
        let steps: [(usize, fn(Complex, Real) -> Complex); 2] = [(0, rotate), (m, stretch)];
        for (offset, perturb) in steps {
            let mut plus = v.clone();
            let mut minus = v.clone();
            plus[b] = perturb(v[b], epsilon);
            minus[b] = perturb(v[b], -epsilon);
            let ds = (row_power(y, &plus) - row_power(y, &minus)) / Complex::new(2.0 * epsilon, 0.0);
            for (i, &a) in rows.iter().enumerate() {
                jac[(i, offset + j)] = ds[a].re;
                jac[(m + i, offset + j)] = ds[a].im;
            }
        }
    }
    jac
}

fn rotate(v: Complex, h: Real) -> Complex {
    Complex::from_polar(v.norm(), v.arg() + h)
}

fn stretch(v: Complex, h: Real) -> Complex {
    Complex::from_polar(v.norm() + h, v.arg())
}

pub(crate) fn unit_phasor(v: Complex) -> Complex {
    let norm = v.norm();
    if norm > 0.0 { v / norm } else { Complex::new(0.0, 0.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eg_core::phasor;

    fn two_bus() -> (DMatrix<Complex>, DVector<Complex>) {
        let y = Complex::new(0.2, 0.4).inv();
        let shunt = Complex::new(0.0, 0.01);
        let y_bus = DMatrix::from_row_slice(2, 2, &[y + shunt, -y, -y, y + shunt]);
        let v = DVector::from_vec(vec![phasor(1.0, 0.0), phasor(0.96, -2.5)]);
        (y_bus, v)
    }

    #[test]
    fn analytic_matches_central_differences() {
        let (y, v) = two_bus();
        let rows = [0, 1];
        let analytic = polar_jacobian(&y, &v, &rows);
        let numeric = numerical_polar_jacobian(&y, &v, &rows, 1e-6);
        let diff = (&analytic - &numeric).amax();
        assert!(diff < 1e-7, "max difference {diff}");
    }

    #[test]
    fn row_power_balances_losses() {
        let (y, v) = two_bus();
        let s = row_power(&y, &v);
        // total injection equals series and shunt consumption: P_loss >= 0
        assert!(s.iter().map(|x| x.re).sum::<f64>() > 0.0);
    }
}
