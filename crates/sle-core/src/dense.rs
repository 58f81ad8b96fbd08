//! Dense LA adapter: a thin wrapper over the BLAS/LAPACK-like primitives
//! §6 assumes are available (`gemm`, `getrf`/`getri`, `gees`, `trsyl`,
//! `syev`, `trevc`). Everything here operates on small, fully local
//! dense matrices — the projected/moment matrices the eigensolvers work
//! with, never the large sparse operator.

use crate::error::{CoreError, Result};
use crate::scalar::Scalar;
use nalgebra::{DMatrix, DVector};
use nalgebra_lapack::{Schur as LapackSchur, SymmetricEigen};

/// `c <- alpha * a * b + beta * c` (GEMM).
pub fn gemm<S: Scalar>(alpha: S, a: &DMatrix<S>, b: &DMatrix<S>, beta: S, c: &mut DMatrix<S>) {
    c.gemm(alpha, a, b, beta);
}

/// Dense inverse via LU factorization (stands in for `getrf`+`getri`).
pub fn invert<S: Scalar>(a: &DMatrix<S>) -> Result<DMatrix<S>> {
    a.clone()
        .try_inverse()
        .ok_or(CoreError::FactorizationZeroPivot)
}

/// Real or complex Schur decomposition `A = Q T Q^H`, `T`
/// (quasi-)triangular (GEES).
pub fn schur<S>(a: &DMatrix<S>) -> Result<(DMatrix<S>, DMatrix<S>)>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    let decomp = LapackSchur::new(a.clone()).ok_or(CoreError::LapackRoutineUnavailable(
        "GEES (Schur decomposition) failed to converge".to_string(),
    ))?;
    let (q, t) = decomp.unpack();
    Ok((q, t))
}

/// Symmetric/Hermitian eigendecomposition `A = Q diag(lambda) Q^H`
/// (SYEV/HEEV).
pub fn symmetric_eig<S>(a: &DMatrix<S>) -> Result<(DVector<S::Real>, DMatrix<S>)>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    let eig = SymmetricEigen::new(a.clone());
    Ok((eig.eigenvalues, eig.eigenvectors))
}

/// One-sided Sylvester solve `A X - X B = C` (stands in for TRSYL).
///
/// `A` is `m x m`, `B` is `n x n`, `C` (and the result) is `m x n`.
/// Solved by vectorizing into the Kronecker-product linear system
/// `(I_n ⊗ A - B^T ⊗ I_m) vec(X) = vec(C)` and dense LU — adequate for
/// the small diagonal blocks `FN`'s Schur-based √ uses this for; a
/// genuine TRSYL exploits the (quasi-)triangular structure for less
/// work, which does not matter at the sizes involved here (≤2×2
/// diagonal blocks).
pub fn sylvester<S: Scalar>(a: &DMatrix<S>, b: &DMatrix<S>, c: &DMatrix<S>) -> Result<DMatrix<S>> {
    let m = a.nrows();
    let n = b.nrows();
    if c.nrows() != m || c.ncols() != n {
        return Err(CoreError::SizeMismatch(
            "sylvester: C must be m x n for A (m x m), B (n x n)".to_string(),
        ));
    }

    let mut kron = DMatrix::<S>::zeros(m * n, m * n);
    let id_m = DMatrix::<S>::identity(m, m);
    let id_n = DMatrix::<S>::identity(n, n);

    // I_n ⊗ A
    for bi in 0..n {
        for r in 0..m {
            for cidx in 0..m {
                kron[(bi * m + r, bi * m + cidx)] += a[(r, cidx)] * id_n[(bi, bi)];
            }
        }
    }
    // - B^T ⊗ I_m
    for r in 0..n {
        for cidx in 0..n {
            let coeff = -b[(cidx, r)];
            for k in 0..m {
                kron[(r * m + k, cidx * m + k)] += coeff * id_m[(k, k)];
            }
        }
    }

    let mut rhs = DVector::<S>::zeros(m * n);
    for col in 0..n {
        for row in 0..m {
            rhs[col * m + row] = c[(row, col)];
        }
    }

    let lu = kron.lu();
    let sol = lu
        .solve(&rhs)
        .ok_or(CoreError::FactorizationZeroPivot)?;

    let mut x = DMatrix::<S>::zeros(m, n);
    for col in 0..n {
        for row in 0..m {
            x[(row, col)] = sol[col * m + row];
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_recovers_identity() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let inv = invert(&a).unwrap();
        let product = &a * &inv;
        assert!((product - DMatrix::<f64>::identity(2, 2)).norm() < 1e-12);
    }

    #[test]
    fn sylvester_solves_small_system() {
        // A=2 (1x1), B=3 (1x1): 2x - x*3 = -x = C => x = -C
        let a = DMatrix::from_row_slice(1, 1, &[2.0]);
        let b = DMatrix::from_row_slice(1, 1, &[3.0]);
        let c = DMatrix::from_row_slice(1, 1, &[5.0]);
        let x = sylvester(&a, &b, &c).unwrap();
        assert!((x[(0, 0)] - (-5.0)).abs() < 1e-10);
    }
}
