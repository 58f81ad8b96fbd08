//! Dense matrix function evaluation: symmetric/Hermitian fast path, and
//! general matrices via a Schur-Parlett recurrence or one of three
//! iterative algorithms specialized for the matrix square root.

use crate::error::{FnError, Result};
use crate::scalar_fn::{FnKind, FunctionHandle};
use nalgebra::DMatrix;
use num_complex::Complex64;
use sle_core::{dense, CoreError, Scalar};

/// Whether the caller already knows the argument is symmetric/Hermitian;
/// drives the fast eigendecomposition path instead of a full Schur form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryHint {
    Symmetric,
    General(MatrixFnMethod),
}

/// Algorithm used for a general (non-symmetric) matrix argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFnMethod {
    /// Schur-Parlett recurrence; works for any [`FnKind`].
    Schur,
    /// Denman-Beavers product-form iteration; square root only.
    DenmanBeavers { inv: bool },
    /// Newton-Schulz iteration; square root only.
    NewtonSchulz,
    /// Sadeghi's higher-order iteration; square root only.
    Sadeghi,
}

const MAX_ITERATIONS: usize = 50;

fn convergence_tolerance<S: Scalar>(n: usize) -> S::Real {
    let mut nn = S::Real::zero();
    for _ in 0..n {
        nn += S::Real::one();
    }
    let mut two = S::Real::zero();
    two += S::Real::one();
    two += S::Real::one();
    nn.sqrt() * S::Real::default_epsilon() / two
}

/// Evaluate `beta * f(alpha * A)` for a dense matrix argument.
pub fn evaluate_matrix<S>(f: &FunctionHandle<S>, a: &DMatrix<S>, hint: SymmetryHint) -> Result<DMatrix<S>>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    let n = a.nrows();
    if a.ncols() != n {
        return Err(FnError::Core(CoreError::SizeMismatch(
            "evaluate_matrix: argument must be square".to_string(),
        )));
    }

    match hint {
        SymmetryHint::Symmetric => evaluate_symmetric(f, a),
        SymmetryHint::General(MatrixFnMethod::Schur) => evaluate_schur(f, a),
        SymmetryHint::General(method) => {
            if !matches!(f.kind(), FnKind::Sqrt) {
                return Err(FnError::UnsupportedMethodForFunction {
                    method: format!("{:?}", method),
                    variant: f.kind().name().to_string(),
                });
            }
            match method {
                MatrixFnMethod::DenmanBeavers { inv } => denman_beavers_sqrt(a, inv),
                MatrixFnMethod::NewtonSchulz => newton_schulz_sqrt(a),
                MatrixFnMethod::Sadeghi => sadeghi_sqrt(a),
                MatrixFnMethod::Schur => unreachable!(),
            }
        }
    }
}

fn evaluate_symmetric<S>(f: &FunctionHandle<S>, a: &DMatrix<S>) -> Result<DMatrix<S>>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    let (eigenvalues, q) = dense::symmetric_eig(a)?;
    let n = a.nrows();
    let mut lambda = DMatrix::<S>::zeros(n, n);
    for i in 0..n {
        let lifted = S::from_real_part(eigenvalues[i]);
        lambda[(i, i)] = f.evaluate_function(lifted)?;
    }
    Ok(&q * lambda * q.adjoint())
}

/// Schur-Parlett recurrence, handling real quasi-triangular 2x2 blocks
/// via the closed-form `f(M) = alpha*I + beta*M` identity for a block
/// with complex-conjugate eigenvalues `a +- i*b`.
fn evaluate_schur<S>(f: &FunctionHandle<S>, a: &DMatrix<S>) -> Result<DMatrix<S>>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    let (q, t) = dense::schur(a)?;
    let n = t.nrows();

    let blocks = detect_blocks(&t, n);
    let mut ft = DMatrix::<S>::zeros(n, n);

    // Diagonal blocks.
    for &(start, size) in &blocks {
        if size == 1 {
            ft[(start, start)] = f.evaluate_function(t[(start, start)])?;
        } else {
            let (alpha, beta) = complex_pair_linear_coeffs(f, &t, start)?;
            for r in 0..2 {
                for c in 0..2 {
                    let identity = if r == c { S::one() } else { S::zero() };
                    ft[(start + r, start + c)] = alpha * identity + beta * t[(start + r, start + c)];
                }
            }
        }
    }

    // Off-diagonal blocks, increasing super-diagonal distance.
    for gap in 1..blocks.len() {
        for i in 0..blocks.len() - gap {
            let j = i + gap;
            let (si, ni) = blocks[i];
            let (sj, nj) = blocks[j];

            let t_ii = t.view((si, si), (ni, ni)).clone_owned();
            let t_jj = t.view((sj, sj), (nj, nj)).clone_owned();
            let t_ij = t.view((si, sj), (ni, nj)).clone_owned();
            let f_ii = ft.view((si, si), (ni, ni)).clone_owned();
            let f_jj = ft.view((sj, sj), (nj, nj)).clone_owned();

            let mut rhs = &t_ij * &f_jj - &f_ii * &t_ij;
            for k in i + 1..j {
                let (sk, nk) = blocks[k];
                let t_kj = t.view((sk, sj), (nk, nj)).clone_owned();
                let f_ik = ft.view((si, sk), (ni, nk)).clone_owned();
                let t_ik = t.view((si, sk), (ni, nk)).clone_owned();
                let f_kj = ft.view((sk, sj), (nk, nj)).clone_owned();
                rhs += &f_ik * &t_kj - &t_ik * &f_kj;
            }

            let x = dense::sylvester(&t_ii, &t_jj, &rhs)?;
            for r in 0..ni {
                for c in 0..nj {
                    ft[(si + r, sj + c)] = x[(r, c)];
                }
            }
        }
    }

    Ok(&q * ft * q.adjoint())
}

/// Detect the (1 or 2)-sized diagonal block structure of a real quasi-
/// triangular (or genuinely triangular, for complex scalars) Schur
/// factor: a subdiagonal entry distinguishable from zero marks a 2x2
/// block housing a complex-conjugate eigenvalue pair.
fn detect_blocks<S: Scalar>(t: &DMatrix<S>, n: usize) -> Vec<(usize, usize)> {
    let tol = S::Real::default_epsilon() * S::real_from_f64(1e4);
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < n {
        if S::IS_COMPLEX || i + 1 >= n {
            blocks.push((i, 1));
            i += 1;
            continue;
        }
        let sub = t[(i + 1, i)].abs();
        let scale = t[(i, i)].abs().max(t[(i + 1, i + 1)].abs()).max(S::Real::one());
        if sub > tol * scale {
            blocks.push((i, 2));
            i += 2;
        } else {
            blocks.push((i, 1));
            i += 1;
        }
    }
    blocks
}

/// For a real 2x2 block with eigenvalues `a +- i*b` (`b != 0`), return
/// `(alpha, beta)` such that `f(block) = alpha*I + beta*block`. Only
/// reached for a real `S` (2x2 blocks never arise when `S` is complex,
/// since a genuinely triangular Schur factor results), so the complex
/// arithmetic needed to evaluate `f` at the complex eigenvalue `a+bi` is
/// done by hand over `f64` rather than through `S`.
fn complex_pair_linear_coeffs<S>(f: &FunctionHandle<S>, t: &DMatrix<S>, start: usize) -> Result<(S, S)>
where
    S: Scalar,
{
    let a11 = S::real_to_f64(t[(start, start)].real());
    let a12 = S::real_to_f64(t[(start, start + 1)].real());
    let a21 = S::real_to_f64(t[(start + 1, start)].real());
    let a22 = S::real_to_f64(t[(start + 1, start + 1)].real());

    let trace = a11 + a22;
    let a = trace / 2.0;
    let det = a11 * a22 - a12 * a21;
    let disc = a * a - det; // = -b^2, b = sqrt(-disc)
    let b = (-disc).sqrt();

    let alpha_re = S::real_to_f64(f.alpha().real());
    let beta_re = S::real_to_f64(f.beta().real());
    let lambda = Complex64::new(alpha_re * a, alpha_re * b);
    let raw = eval_complex_value(f.kind(), lambda)?;
    let f_lambda = raw * beta_re;

    let beta_coeff = f_lambda.im / b;
    let alpha_coeff = f_lambda.re - a * beta_coeff;
    Ok((S::from_real_part(S::real_from_f64(alpha_coeff)), S::from_real_part(S::real_from_f64(beta_coeff))))
}

/// Evaluate a [`FnKind`] at an arbitrary complex argument, reading its
/// (necessarily real, per the caller above) coefficients out as `f64`.
fn eval_complex_value<S: Scalar>(kind: &FnKind<S>, z: Complex64) -> Result<Complex64> {
    match kind {
        FnKind::Rational { num, den } => {
            let num_c: Vec<Complex64> = num.iter().map(|c| Complex64::new(S::real_to_f64(c.real()), 0.0)).collect();
            let den_c: Vec<Complex64> = den.iter().map(|c| Complex64::new(S::real_to_f64(c.real()), 0.0)).collect();
            let q = horner_complex(&den_c, z);
            if q == Complex64::new(0.0, 0.0) {
                return Err(FnError::Core(CoreError::DomainError(
                    "rational function denominator vanishes at the given argument".to_string(),
                )));
            }
            Ok(horner_complex(&num_c, z) / q)
        }
        FnKind::Exp => Ok(z.exp()),
        FnKind::Sqrt => Ok(z.sqrt()),
        FnKind::Log => Ok(z.ln()),
    }
}

fn horner_complex(coeffs: &[Complex64], z: Complex64) -> Complex64 {
    let mut acc = Complex64::new(0.0, 0.0);
    for &c in coeffs.iter().rev() {
        acc = acc * z + c;
    }
    acc
}

fn denman_beavers_sqrt<S: Scalar>(a: &DMatrix<S>, inv: bool) -> Result<DMatrix<S>> {
    let n = a.nrows();
    let tol = convergence_tolerance::<S>(n);
    let id = DMatrix::<S>::identity(n, n);

    let mut x = if inv { id.clone() } else { a.clone() };
    let mut m = a.clone();

    for _ in 0..MAX_ITERATIONS {
        let m_inv = dense::invert(&m)?;
        let x_new = scale_matrix(&(&x * (&id + &m_inv)), half::<S>());
        let m_new = scale_matrix(&(&id + scale_matrix(&(&m + &m_inv), half::<S>())), half::<S>());

        let residual = (&id - &m_new).norm();
        x = x_new;
        m = m_new;
        if residual <= tol {
            return Ok(x);
        }
    }
    Err(FnError::Core(CoreError::MatrixFunctionNotConverged {
        max_iterations: MAX_ITERATIONS,
        residual: 0.0,
    }))
}

fn newton_schulz_sqrt<S: Scalar>(a: &DMatrix<S>) -> Result<DMatrix<S>> {
    let n = a.nrows();
    let tol = convergence_tolerance::<S>(n);
    let id = DMatrix::<S>::identity(n, n);
    let norm_a = a.norm();
    let mut x = scale_matrix(a, S::one() / S::from_real_part(norm_a));
    let mut y = id.clone();

    for _ in 0..MAX_ITERATIONS {
        let yx = &y * &x;
        let three_i_minus_yx = scale_matrix(&id, three::<S>()) - &yx;
        let x_new = scale_matrix(&(&x * &three_i_minus_yx), half::<S>());
        let y_new = scale_matrix(&(&three_i_minus_yx * &y), half::<S>());

        let residual = (&id - &yx).norm();
        x = x_new;
        y = y_new;
        if residual <= tol {
            let sqrt_norm = norm_a.sqrt();
            return Ok(scale_matrix(&x, S::from_real_part(sqrt_norm)));
        }
    }
    Err(FnError::Core(CoreError::MatrixFunctionNotConverged {
        max_iterations: MAX_ITERATIONS,
        residual: 0.0,
    }))
}

fn sadeghi_sqrt<S: Scalar>(a: &DMatrix<S>) -> Result<DMatrix<S>> {
    let n = a.nrows();
    let tol = convergence_tolerance::<S>(n);
    let id = DMatrix::<S>::identity(n, n);

    let norm_a = a.norm();
    let rescale = norm_a > S::Real::one();
    let a_scaled = if rescale {
        scale_matrix(a, S::one() / S::from_real_part(norm_a))
    } else {
        a.clone()
    };

    let mut x = id.clone();
    let mut m = a_scaled.clone();

    for _ in 0..MAX_ITERATIONS {
        let m2 = &m * &m;
        let inner = scale_matrix(&id, fifteen::<S>()) - scale_matrix(&m, five::<S>()) + m2;
        let g = scale_matrix(&(scale_matrix(&id, five::<S>()) + &m * inner), S::one() / sixteen::<S>());

        let gg = &g * &g;
        let gg_inv = dense::invert(&gg)?;

        let x_new = &x * &g;
        let m_new = &m * gg_inv;

        let residual = (&id - &m_new).norm();
        x = x_new;
        m = m_new;
        if residual <= tol {
            let result = if rescale {
                scale_matrix(&x, S::from_real_part(norm_a.sqrt()))
            } else {
                x
            };
            return Ok(result);
        }
    }
    Err(FnError::Core(CoreError::MatrixFunctionNotConverged {
        max_iterations: MAX_ITERATIONS,
        residual: 0.0,
    }))
}

fn scale_matrix<S: Scalar>(m: &DMatrix<S>, s: S) -> DMatrix<S> {
    m * s
}

fn half<S: Scalar>() -> S {
    S::one() / (S::one() + S::one())
}

fn three<S: Scalar>() -> S {
    S::one() + S::one() + S::one()
}

fn five<S: Scalar>() -> S {
    three::<S>() + S::one() + S::one()
}

fn fifteen<S: Scalar>() -> S {
    five::<S>() * three::<S>()
}

fn sixteen<S: Scalar>() -> S {
    fifteen::<S>() + S::one()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar_fn::{FnKind, FunctionHandle};

    fn spd_3x3() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            3,
            &[
                4.0, 0.2, 0.1, //
                0.2, 9.0, 0.3, //
                0.1, 0.3, 16.0,
            ],
        )
    }

    #[test]
    fn symmetric_sqrt_squares_back_to_original() {
        let a = spd_3x3();
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        let root = evaluate_matrix(&f, &a, SymmetryHint::Symmetric).unwrap();
        let squared = &root * &root;
        assert!((squared - a).norm() < 1e-8);
    }

    #[test]
    fn denman_beavers_sqrt_matches_symmetric_path() {
        let a = spd_3x3();
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        let via_eig = evaluate_matrix(&f, &a, SymmetryHint::Symmetric).unwrap();
        let via_db = evaluate_matrix(
            &f,
            &a,
            SymmetryHint::General(MatrixFnMethod::DenmanBeavers { inv: false }),
        )
        .unwrap();
        assert!((via_eig - via_db).norm() < 1e-6);
    }

    #[test]
    fn newton_schulz_sqrt_squares_back_to_original() {
        let a = spd_3x3();
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        let root = evaluate_matrix(&f, &a, SymmetryHint::General(MatrixFnMethod::NewtonSchulz)).unwrap();
        let squared = &root * &root;
        assert!((squared - a).norm() < 1e-6);
    }

    #[test]
    fn sadeghi_sqrt_squares_back_to_original() {
        let a = spd_3x3();
        let f = FunctionHandle::new(FnKind::<f64>::Sqrt);
        let root = evaluate_matrix(&f, &a, SymmetryHint::General(MatrixFnMethod::Sadeghi)).unwrap();
        let squared = &root * &root;
        assert!((squared - a).norm() < 1e-6);
    }

    #[test]
    fn schur_exp_matches_symmetric_path_for_symmetric_input() {
        let a = spd_3x3();
        let f = FunctionHandle::new(FnKind::<f64>::Exp);
        let via_eig = evaluate_matrix(&f, &a, SymmetryHint::Symmetric).unwrap();
        let via_schur = evaluate_matrix(&f, &a, SymmetryHint::General(MatrixFnMethod::Schur)).unwrap();
        assert!((via_eig - via_schur).norm() < 1e-6);
    }

    #[test]
    fn newton_schulz_rejects_non_sqrt_function() {
        let a = spd_3x3();
        let f = FunctionHandle::new(FnKind::<f64>::Exp);
        assert!(evaluate_matrix(&f, &a, SymmetryHint::General(MatrixFnMethod::NewtonSchulz)).is_err());
    }
}
