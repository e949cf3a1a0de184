//! Factorization with singularity and conditioning checks.

use eg_core::Real;
use nalgebra::{ComplexField, DMatrix};

use crate::error::{SolverError, SolverResult};

/// Induced 1-norm: largest absolute column sum.
pub fn one_norm<T>(m: &DMatrix<T>) -> Real
where
    T: ComplexField<RealField = Real>,
{
    m.column_iter()
        .map(|c| c.iter().map(|v| v.clone().modulus()).sum::<Real>())
        .fold(0.0, Real::max)
}

/// Invert `a` through LU, rejecting singular and ill-conditioned blocks.
///
/// Returns the inverse and the condition number `‖A‖₁ ‖A⁻¹‖₁`.
pub fn invert_checked<T>(a: &DMatrix<T>, bound: Real, what: &str) -> SolverResult<(DMatrix<T>, Real)>
where
    T: ComplexField<RealField = Real>,
{
    if a.is_empty() {
        return Ok((a.clone(), 1.0));
    }
    let inverse = a.clone().lu().try_inverse().ok_or_else(|| SolverError::Singular {
        what: what.to_string(),
    })?;
    let condition = one_norm(a) * one_norm(&inverse);
    if !condition.is_finite() || condition > bound {
        tracing::warn!(what, condition, bound, "factorization rejected");
        return Err(SolverError::IllConditioned {
            what: what.to_string(),
            condition,
            bound,
        });
    }
    Ok((inverse, condition))
}
