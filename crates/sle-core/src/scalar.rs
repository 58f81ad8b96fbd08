//! Scalar kernel: the compile-time real/complex façade every other crate
//! in the stack is generic over, plus small basis-polynomial helpers.

use nalgebra::ComplexField;
use num_complex::Complex64;

/// The scalar field a solver context is built over.
///
/// Every numerical module (`BV`, `ST`, `FN`, the Krylov core) is generic
/// over `S: Scalar`. Code paths that only make sense for complex
/// arithmetic (the CISS core) check [`Scalar::IS_COMPLEX`] at setup time
/// and fail with a precondition error rather than miscomputing deep
/// inside an iteration.
pub trait Scalar: ComplexField<RealField = Self::Real> + Copy + Send + Sync + 'static {
    /// The associated real field (itself, for real scalars).
    type Real: nalgebra::RealField + Copy + Send + Sync + 'static;

    /// `true` for complex scalar types, `false` for real ones.
    const IS_COMPLEX: bool;

    /// Lift a real value into this scalar type.
    fn from_real_part(re: Self::Real) -> Self;

    /// Build a value from an independent real/imaginary draw; `im` is
    /// ignored by real scalar types.
    fn from_draw(re: f64, im: f64) -> Self;

    /// Convert the associated real field to a plain `f64`. Every
    /// concrete `Scalar` in this workspace has `Real = f64`; this method
    /// lets generic code (the Schur-Parlett 2x2 block formula) reach
    /// host-precision transcendental functions without assuming that
    /// equality at the type level.
    fn real_to_f64(r: Self::Real) -> f64;

    /// Inverse of [`Scalar::real_to_f64`].
    fn real_from_f64(x: f64) -> Self::Real;
}

impl Scalar for f64 {
    type Real = f64;
    const IS_COMPLEX: bool = false;

    fn from_real_part(re: f64) -> Self {
        re
    }

    fn from_draw(re: f64, _im: f64) -> Self {
        re
    }

    fn real_to_f64(r: f64) -> f64 {
        r
    }

    fn real_from_f64(x: f64) -> f64 {
        x
    }
}

impl Scalar for Complex64 {
    type Real = f64;
    const IS_COMPLEX: bool = true;

    fn from_real_part(re: f64) -> Self {
        Complex64::new(re, 0.0)
    }

    fn from_draw(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    fn real_to_f64(r: f64) -> f64 {
        r
    }

    fn real_from_f64(x: f64) -> f64 {
        x
    }
}

/// Evaluate `sum_i coeffs[i] * x^i` by Horner's method.
///
/// Shared by `FN`'s rational variant (numerator/denominator polynomials)
/// and by `ST`'s polynomial-pencil monomial composition.
pub fn horner<S: Scalar>(coeffs: &[S], x: S) -> S {
    let mut acc = S::zero();
    for &c in coeffs.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

/// Derivative of [`horner`] at `x`, by Horner's method on the
/// coefficient-times-power-derivative sequence.
pub fn horner_derivative<S: Scalar>(coeffs: &[S], x: S) -> S {
    if coeffs.len() < 2 {
        return S::zero();
    }
    let mut acc = S::zero();
    for (i, &c) in coeffs.iter().enumerate().skip(1).rev() {
        acc = acc * x + c * small_int::<S>(i);
    }
    acc
}

/// `n` as a scalar, built by repeated addition (avoids a `NumCast` bound
/// for the handful of small integers this module needs).
fn small_int<S: Scalar>(n: usize) -> S {
    let mut v = S::zero();
    for _ in 0..n {
        v += S::one();
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horner_matches_direct_evaluation_real() {
        // p(x) = 1 + 2x + 3x^2
        let coeffs = [1.0, 2.0, 3.0];
        let x = 2.0;
        let expected = 1.0 + 2.0 * x + 3.0 * x * x;
        assert!((horner(&coeffs, x) - expected).abs() < 1e-12);
    }

    #[test]
    fn horner_derivative_matches_direct_evaluation() {
        // p'(x) = 2 + 6x
        let coeffs = [1.0, 2.0, 3.0];
        let x = 2.0;
        let expected = 2.0 + 6.0 * x;
        assert!((horner_derivative(&coeffs, x) - expected).abs() < 1e-10);
    }

    #[test]
    fn complex_scalar_reports_complex() {
        assert!(Complex64::IS_COMPLEX);
        assert!(!f64::IS_COMPLEX);
    }
}
