//! `Eps`: the solver-selection façade over the Krylov-via-`ST` method
//! and the CISS contour-integral method, grounded in the host project's
//! `AnalysisConfig`/`AnalysisPipeline`/`AnalysisResults` split.

use crate::ciss::{CissConfig, CissSolver};
use crate::error::{CissError, Result};
use crate::krylov_eps::{KrylovEps, KrylovEpsConfig, Which};
use crate::region::Region;
use nalgebra::DMatrix;
use sle_core::{ConvergedReason, LocalMatrixHandle, RandomSource, Scalar};
use sle_st::St;

/// Which method `Eps` dispatches to, and the structural assumption it
/// fixes about the pencil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// Arnoldi/Lanczos through an attached `ST`. Standard or
    /// generalized, real or complex scalars.
    Krylov,
    /// Contour-integral spectral slicing. Complex scalars only.
    Ciss,
}

#[derive(Debug, Clone)]
pub struct EpsResult<S: Scalar> {
    pub eigenvalues: Vec<S>,
    /// Imaginary part of each eigenvalue when `S` is real and the
    /// underlying Ritz pair came from a 2x2 block in a real quasi-
    /// triangular Schur factor (a genuine complex-conjugate pair). Zero
    /// whenever `S` is already complex, since the eigenvalue itself
    /// already carries the imaginary part in that case.
    pub eigenvalues_imag: Vec<S::Real>,
    pub eigenvectors: DMatrix<S>,
    pub converged_reason: ConvergedReason,
}

type Monitor = Box<dyn FnMut(usize, usize, &[f64]) + Send>;

/// Eigensolver configuration and dispatch, mirroring
/// `AnalysisConfig`/`AnalysisPipeline`: a config struct mutated by
/// setters, consumed on `solve`.
pub struct Eps<S: Scalar> {
    problem_kind: ProblemKind,
    st: Option<St<S>>,
    a: Option<LocalMatrixHandle<S>>,
    b: Option<LocalMatrixHandle<S>>,
    region: Option<Region>,
    n: usize,
    nev: usize,
    ncv: usize,
    mpd: usize,
    which: Which,
    tol: f64,
    max_it: usize,
    ciss_config: CissConfig,
    monitor: Option<Monitor>,
}

impl<S> Eps<S>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    pub fn new(problem_kind: ProblemKind) -> Self {
        Self {
            problem_kind,
            st: None,
            a: None,
            b: None,
            region: None,
            n: 0,
            nev: 1,
            ncv: 0,
            mpd: 0,
            which: Which::LargestMagnitude,
            tol: 1e-8,
            max_it: 20,
            ciss_config: CissConfig::default(),
            monitor: None,
        }
    }

    /// Bind the operator for the `Krylov` method: the size of the
    /// problem `st` was built over plus the `ST` itself.
    pub fn set_st(&mut self, n: usize, st: St<S>) -> &mut Self {
        self.n = n;
        self.st = Some(st);
        self
    }

    /// Bind the matrix pencil and search region for the `Ciss` method.
    pub fn set_ciss_problem(
        &mut self,
        n: usize,
        a: LocalMatrixHandle<S>,
        b: Option<LocalMatrixHandle<S>>,
        region: Region,
    ) -> &mut Self {
        self.n = n;
        self.region = Some(region);
        self.a = Some(a);
        self.b = b;
        self
    }

    /// `mpd` is accepted for API completeness (the host project uses it
    /// to cap per-restart growth) but the `Krylov` method here re-solves
    /// from scratch each attempt rather than growing a thick-restart
    /// subspace, so it is currently unused.
    pub fn set_dimensions(&mut self, nev: usize, ncv: usize, mpd: usize) -> &mut Self {
        self.nev = nev;
        self.ncv = ncv;
        self.mpd = mpd;
        self
    }

    pub fn set_which(&mut self, which: Which) -> &mut Self {
        self.which = which;
        self
    }

    pub fn set_tolerances(&mut self, tol: f64, max_it: usize) -> &mut Self {
        self.tol = tol;
        self.max_it = max_it;
        self
    }

    pub fn set_ciss_config(&mut self, config: CissConfig) -> &mut Self {
        self.ciss_config = config;
        self
    }

    /// Register a progress callback invoked once per outer iteration
    /// with `(iteration, nconv, residuals)`. Called unconditionally so a
    /// caller can observe progress without coupling the solver to any
    /// particular UI.
    pub fn set_monitor(&mut self, monitor: impl FnMut(usize, usize, &[f64]) + Send + 'static) -> &mut Self {
        self.monitor = Some(Box::new(monitor));
        self
    }

    pub fn solve(&mut self, rng: &mut impl RandomSource) -> Result<EpsResult<S>> {
        match self.problem_kind {
            ProblemKind::Krylov => self.solve_krylov(rng),
            ProblemKind::Ciss => self.solve_ciss(rng),
        }
    }

    fn solve_krylov(&mut self, rng: &mut impl RandomSource) -> Result<EpsResult<S>> {
        let st = self.st.take().ok_or(CissError::ExtractionUnsupported)?;
        let config = KrylovEpsConfig {
            nev: self.nev,
            ncv: self.ncv,
            which: self.which,
            tol: self.tol,
            max_it: self.max_it,
        };
        let mut solver = KrylovEps::new(st, self.n, config);
        let result = solver.solve(rng)?;
        if let Some(monitor) = self.monitor.as_mut() {
            let nconv = result
                .residuals
                .iter()
                .filter(|&&r| r < self.tol)
                .count();
            monitor(1, nconv, &result.residuals);
        }
        Ok(EpsResult {
            eigenvalues_imag: result.eigenvalues_imag,
            eigenvalues: result.eigenvalues,
            eigenvectors: result.eigenvectors,
            converged_reason: result.converged_reason,
        })
    }

    fn solve_ciss(&mut self, rng: &mut impl RandomSource) -> Result<EpsResult<S>> {
        if !S::IS_COMPLEX {
            return Err(CissError::RealScalarsUnsupported);
        }
        let a = self.a.take().ok_or(CissError::ExtractionUnsupported)?;
        let b = self.b.take();
        let region = self.region.ok_or(CissError::ExtractionUnsupported)?;
        let mut solver = CissSolver::new(a, b, region, self.ciss_config);
        let result = solver.solve(rng)?;
        if let Some(monitor) = self.monitor.as_mut() {
            monitor(1, result.eigenvalues.len(), &result.residuals);
        }
        let nconv = result.eigenvalues.len();
        Ok(EpsResult {
            eigenvalues: result.eigenvalues,
            eigenvalues_imag: vec![S::Real::zero(); nconv],
            eigenvectors: result.eigenvectors,
            converged_reason: result.converged_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_core::{ChaChaRandomSource, KspConfig};

    fn tridiagonal(n: usize) -> DMatrix<num_complex::Complex64> {
        use num_complex::Complex64;
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = Complex64::new(2.0, 0.0);
            if i > 0 {
                m[(i, i - 1)] = Complex64::new(-1.0, 0.0);
            }
            if i + 1 < n {
                m[(i, i + 1)] = Complex64::new(-1.0, 0.0);
            }
        }
        m
    }

    #[test]
    fn eps_krylov_dispatch_forwards_the_monitor() {
        let n = 6;
        let mut st: St<num_complex::Complex64> = St::new(KspConfig::direct());
        st.set_matrices(vec![LocalMatrixHandle::dense(tridiagonal(n))]);
        st.set_shift(num_complex::Complex64::new(0.0, 0.0)).unwrap();

        let mut eps = Eps::new(ProblemKind::Krylov);
        eps.set_st(n, st);
        eps.set_dimensions(1, 5, 0);
        eps.set_which(Which::LargestMagnitude);
        eps.set_tolerances(1e-6, 5);

        let monitored = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = monitored.clone();
        eps.set_monitor(move |_iter, _nconv, _residuals| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let mut rng = ChaChaRandomSource::from_seed(3);
        let result = eps.solve(&mut rng).unwrap();
        assert_eq!(result.eigenvalues.len(), 1);
        assert!(monitored.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn eps_ciss_rejects_real_scalars() {
        let mut eps: Eps<f64> = Eps::new(ProblemKind::Ciss);
        eps.set_ciss_problem(3, LocalMatrixHandle::dense(DMatrix::identity(3, 3)), None, Region::disk(num_complex::Complex64::new(0.0, 0.0), 1.0));
        let mut rng = ChaChaRandomSource::from_seed(1);
        assert!(matches!(eps.solve(&mut rng), Err(CissError::RealScalarsUnsupported)));
    }
}
