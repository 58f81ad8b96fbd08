//! Scalar function evaluation: a tagged variant plus outer/inner scaling,
//! `x -> beta * f(alpha * x)`.

use crate::error::{FnError, Result};
use nalgebra::ComplexField;
use sle_core::{CoreError, Scalar};

/// The elementary function a [`FunctionHandle`] evaluates, before scaling.
#[derive(Debug, Clone)]
pub enum FnKind<S: Scalar> {
    /// `p(x) / q(x)`, `num`/`den` in ascending-power order.
    Rational { num: Vec<S>, den: Vec<S> },
    Exp,
    Sqrt,
    Log,
}

impl<S: Scalar> FnKind<S> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            FnKind::Rational { .. } => "rational",
            FnKind::Exp => "exp",
            FnKind::Sqrt => "sqrt",
            FnKind::Log => "log",
        }
    }
}

/// `x -> beta * f(alpha * x)`, the unit the Krylov/CISS/ST layers all
/// build spectral transforms and preconditioner splits out of.
#[derive(Debug, Clone)]
pub struct FunctionHandle<S: Scalar> {
    kind: FnKind<S>,
    alpha: S,
    beta: S,
}

impl<S: Scalar> FunctionHandle<S> {
    pub fn new(kind: FnKind<S>) -> Self {
        Self {
            kind,
            alpha: S::one(),
            beta: S::one(),
        }
    }

    pub fn with_scale(mut self, alpha: S, beta: S) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    pub fn kind(&self) -> &FnKind<S> {
        &self.kind
    }

    pub fn alpha(&self) -> S {
        self.alpha
    }

    pub fn beta(&self) -> S {
        self.beta
    }

    /// `beta * f(alpha * x)`.
    pub fn evaluate_function(&self, x: S) -> Result<S> {
        let arg = self.alpha * x;
        let value = eval_raw(&self.kind, arg)?;
        Ok(self.beta * value)
    }

    /// `alpha * beta * f'(alpha * x)`.
    pub fn evaluate_derivative(&self, x: S) -> Result<S> {
        let arg = self.alpha * x;
        let value = eval_raw_derivative(&self.kind, arg)?;
        Ok(self.alpha * self.beta * value)
    }
}

fn is_negative_real<S: Scalar>(x: S) -> bool {
    !S::IS_COMPLEX && x.real() < S::Real::zero()
}

fn is_nonpositive_real<S: Scalar>(x: S) -> bool {
    !S::IS_COMPLEX && x.real() <= S::Real::zero()
}

fn eval_raw<S: Scalar>(kind: &FnKind<S>, x: S) -> Result<S> {
    match kind {
        FnKind::Rational { num, den } => {
            let d = sle_core::horner(den, x);
            if d.is_zero() {
                return Err(FnError::Core(CoreError::DomainError(
                    "rational function denominator vanishes at the given argument".to_string(),
                )));
            }
            Ok(sle_core::horner(num, x) / d)
        }
        FnKind::Exp => Ok(x.exp()),
        FnKind::Sqrt => {
            if is_negative_real(x) {
                return Err(FnError::Core(CoreError::DomainError(
                    "sqrt of a negative real argument under real scalars".to_string(),
                )));
            }
            Ok(x.sqrt())
        }
        FnKind::Log => {
            if is_nonpositive_real(x) {
                return Err(FnError::Core(CoreError::DomainError(
                    "log of a non-positive real argument under real scalars".to_string(),
                )));
            }
            Ok(x.ln())
        }
    }
}

fn eval_raw_derivative<S: Scalar>(kind: &FnKind<S>, x: S) -> Result<S> {
    match kind {
        FnKind::Rational { num, den } => {
            let p = sle_core::horner(num, x);
            let q = sle_core::horner(den, x);
            if q.is_zero() {
                return Err(FnError::Core(CoreError::DomainError(
                    "rational function denominator vanishes at the given argument".to_string(),
                )));
            }
            let p_prime = sle_core::horner_derivative(num, x);
            let q_prime = sle_core::horner_derivative(den, x);
            Ok((p_prime * q - p * q_prime) / (q * q))
        }
        FnKind::Exp => Ok(x.exp()),
        FnKind::Sqrt => {
            if is_negative_real(x) {
                return Err(FnError::Core(CoreError::DomainError(
                    "sqrt of a negative real argument under real scalars".to_string(),
                )));
            }
            if x.is_zero() {
                return Err(FnError::Core(CoreError::DerivativeUndefined(
                    "sqrt is not differentiable at 0".to_string(),
                )));
            }
            let two = S::one() + S::one();
            Ok(S::one() / (two * x.sqrt()))
        }
        FnKind::Log => {
            if is_nonpositive_real(x) {
                return Err(FnError::Core(CoreError::DomainError(
                    "log of a non-positive real argument under real scalars".to_string(),
                )));
            }
            Ok(S::one() / x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_of_negative_real_is_a_domain_error() {
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        assert!(f.evaluate_function(-1.0).is_err());
    }

    #[test]
    fn sqrt_derivative_at_zero_is_undefined() {
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        assert!(f.evaluate_derivative(0.0).is_err());
    }

    #[test]
    fn sqrt_matches_known_value() {
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        let v = f.evaluate_function(9.0).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
    }

    #[test]
    fn outer_inner_scaling_is_applied() {
        // beta * sqrt(alpha * x) with alpha=4, beta=2, x=1 -> 2*sqrt(4) = 4
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt).with_scale(4.0, 2.0);
        let v = f.evaluate_function(1.0).unwrap();
        assert!((v - 4.0).abs() < 1e-12);
    }

    #[test]
    fn rational_matches_direct_division() {
        // (1 + x) / (2 + x) at x=3 -> 4/5
        let f = FunctionHandle::new(FnKind::Rational {
            num: vec![1.0, 1.0],
            den: vec![2.0, 1.0],
        });
        let v = f.evaluate_function(3.0).unwrap();
        assert!((v - 0.8).abs() < 1e-12);
    }

    #[test]
    fn exp_derivative_equals_itself() {
        let f = FunctionHandle::new(FnKind::<f64>::Exp);
        let x = 1.5;
        assert!((f.evaluate_function(x).unwrap() - f.evaluate_derivative(x).unwrap()).abs() < 1e-10);
    }
}
