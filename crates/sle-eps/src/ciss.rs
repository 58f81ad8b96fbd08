//! Contour-integral spectral slicing (CISS): locate every eigenvalue of
//! a (generalized) eigenproblem inside a region of the complex plane by
//! numerical integration of the resolvent.

use crate::error::{CissError, Result};
use crate::region::Region;
use nalgebra::{linalg::SVD, ComplexField, DMatrix};
use num_complex::Complex64;
use sle_core::{dense, ConvergedReason, CoreError, LocalMatrixHandle, RandomSource, Scalar};
use std::f64::consts::PI;

/// Tunable parameters of one CISS context; mirrors the CLI flag table.
#[derive(Debug, Clone, Copy)]
pub struct CissConfig {
    pub points: usize,
    pub block_size: usize,
    pub max_block_size: usize,
    pub moment_size: usize,
    pub partitions: usize,
    /// Halves the quadrature cost via conjugate symmetry: the operator
    /// is real-valued (even though carried through this complex-valued
    /// pipeline), and the search region is centered on the real axis,
    /// so the shifted solve at `conj(omega)` is the conjugate of the
    /// solve at `omega` and never needs its own factorization.
    pub real_matrices: bool,
    pub delta: f64,
    pub spurious_threshold: f64,
    pub tol: f64,
    pub refine_inner: usize,
    pub refine_outer: usize,
    pub refine_blocksize: usize,
}

impl Default for CissConfig {
    fn default() -> Self {
        let points = 32;
        Self {
            points,
            block_size: 8,
            max_block_size: 64,
            moment_size: (points / 4).max(1),
            partitions: 1,
            real_matrices: false,
            delta: 1e-12,
            spurious_threshold: 1e-4,
            tol: 1e-8,
            // The source initializes both counters to 1 and treats an
            // explicit 0 as "disable this refinement loop".
            refine_inner: 1,
            refine_outer: 1,
            refine_blocksize: 1,
        }
    }
}

pub struct CissResult<S: Scalar> {
    pub eigenvalues: Vec<S>,
    pub eigenvectors: DMatrix<S>,
    pub residuals: Vec<f64>,
    pub converged_reason: ConvergedReason,
}

fn to_c64<S: Scalar>(s: S) -> Complex64 {
    Complex64::new(S::real_to_f64(s.real()), S::real_to_f64(s.imaginary()))
}

fn from_c64<S: Scalar>(z: Complex64) -> S {
    S::from_draw(z.re, z.im)
}

/// The moment/rank/Rayleigh-Ritz/filter result of one CISS pass (steps
/// 5-8), carried between inner-refinement iterations.
struct RankFiltered<S: Scalar> {
    k: usize,
    kept_idx: Vec<usize>,
    eigenvalues: Vec<S>,
    eigenvectors: DMatrix<S>,
    residuals: Vec<f64>,
}

impl<S: Scalar> RankFiltered<S> {
    fn empty(n: usize) -> Self {
        Self {
            k: 0,
            kept_idx: Vec::new(),
            eigenvalues: Vec::new(),
            eigenvectors: DMatrix::zeros(n, 0),
            residuals: Vec::new(),
        }
    }
}

/// One contour-integral eigensolver instance bound to a (generalized)
/// pencil and a search region.
pub struct CissSolver<S: Scalar> {
    a: LocalMatrixHandle<S>,
    b: Option<LocalMatrixHandle<S>>,
    region: Region,
    config: CissConfig,
}

impl<S> CissSolver<S>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    pub fn new(a: LocalMatrixHandle<S>, b: Option<LocalMatrixHandle<S>>, region: Region, config: CissConfig) -> Self {
        Self { a, b, region, config }
    }

    fn quadrature(&self) -> Vec<(Complex64, Complex64, Complex64)> {
        let n = self.config.points;
        (0..n)
            .map(|i| {
                let theta = 2.0 * PI * (i as f64 + 0.5) / (n as f64);
                let p = Complex64::new(theta.cos(), self.region.vscale * theta.sin());
                let omega = self.region.center + self.region.radius * p;
                let w = Complex64::new(self.region.vscale * theta.cos(), theta.sin());
                (omega, p, w)
            })
            .collect()
    }

    fn shifted_system(&self, omega: Complex64) -> DMatrix<S> {
        let mut t = self.a.as_dense();
        let n = t.nrows();
        match &self.b {
            Some(b) => {
                let bd = b.as_dense();
                t -= bd * from_c64::<S>(omega);
            }
            None => {
                for i in 0..n {
                    t[(i, i)] -= from_c64::<S>(omega);
                }
            }
        }
        t
    }

    fn rhs_block(&self, v: &DMatrix<S>) -> DMatrix<S> {
        match &self.b {
            Some(b) => b.as_dense() * v,
            None => v.clone(),
        }
    }

    fn solve_node(&self, omega: Complex64, v: &DMatrix<S>) -> Result<DMatrix<S>> {
        let t = self.shifted_system(omega);
        let rhs = self.rhs_block(v);
        t.lu()
            .solve(&rhs)
            .ok_or(CissError::Core(CoreError::FactorizationZeroPivot))
    }

    /// Block shifted solves at every quadrature node. When
    /// `config.real_matrices` holds, only the first half of the nodes
    /// (plus an unpaired middle node for an odd count) are actually
    /// factored and solved: the node at index `n-1-i` is the complex
    /// conjugate of the node at index `i` (the contour is symmetric
    /// about the real axis), and for a real operator and a real
    /// starting block `v`, the resolvent solve at the conjugate point
    /// is just the conjugate of the solve already computed.
    fn solve_nodes(&self, nodes: &[(Complex64, Complex64, Complex64)], v: &DMatrix<S>) -> Result<Vec<DMatrix<S>>> {
        let n = nodes.len();
        if !self.config.real_matrices {
            return nodes.iter().map(|(omega, _, _)| self.solve_node(*omega, v)).collect();
        }
        let mut ys: Vec<Option<DMatrix<S>>> = (0..n).map(|_| None).collect();
        for i in 0..n {
            let mirror = n - 1 - i;
            if mirror < i {
                continue;
            }
            let y = self.solve_node(nodes[i].0, v)?;
            if mirror != i {
                ys[mirror] = Some(y.map(|z| z.conjugate()));
            }
            ys[i] = Some(y);
        }
        Ok(ys.into_iter().map(|y| y.expect("every node is solved directly or filled from its mirror")).collect())
    }

    /// `||A x - lambda B x|| / ||x||`, the genuine residual a
    /// convergence check needs (as opposed to the reliability ratio
    /// `tau` step 8 uses to reject spurious pairs, which says nothing
    /// about how accurately a kept pair actually solves the pencil).
    fn residual_norm(&self, lambda: S, x: &DMatrix<S>) -> f64 {
        let a_dense = self.a.as_dense();
        let ax = &a_dense * x;
        let bx = match &self.b {
            Some(b) => b.as_dense() * x,
            None => x.clone(),
        };
        let r = ax - bx * lambda;
        let rn = S::real_to_f64(r.norm());
        let xn = S::real_to_f64(x.norm());
        if xn > 0.0 {
            rn / xn
        } else {
            rn
        }
    }

    /// Steps 5-8: numerical rank of the stacked moments, the
    /// Rayleigh-Ritz projection, and the spurious-pair filter.
    fn rank_and_filter(&self, n: usize, l: usize, m: usize, moments: &[DMatrix<S>]) -> Result<RankFiltered<S>> {
        // Step 5: numerical rank of the stacked moment block, standing
        // in for the block-Hankel SVD (same rank, since no additional
        // shift information is folded in beyond the moments already
        // computed).
        let stacked = hconcat_many(&moments[..m]);
        let svd = SVD::new(stacked.clone(), true, false);
        let sigmas: Vec<f64> = svd.singular_values.iter().map(|&s| S::real_to_f64(s)).collect();
        let sigma0 = sigmas.iter().copied().fold(0.0, f64::max).max(1.0);
        let u = svd.u.expect("compute_u was requested");
        let k = sigmas
            .iter()
            .filter(|s| **s / sigma0 > self.config.delta)
            .count()
            .max(1)
            .min(l * m)
            .min(u.ncols());
        // Step 6: orthonormal basis of the retained column span.
        let s_ortho = u.columns(0, k).into_owned();

        // Step 7: Rayleigh-Ritz. A_gen(K,K)/B_gen; solved via a dense
        // Schur decomposition of B_gen^{-1} A_gen rather than a full QZ.
        let a_dense = self.a.as_dense();
        let h_a = s_ortho.adjoint() * &a_dense * &s_ortho;
        let h_b = match &self.b {
            Some(b) => s_ortho.adjoint() * b.as_dense() * &s_ortho,
            None => DMatrix::<S>::identity(k, k),
        };
        let h_b_inv = dense::invert(&h_b)?;
        let c = h_b_inv * &h_a;
        let (q, t) = dense::schur(&c)?;
        let ritz_vectors = &s_ortho * &q;

        // Step 8: spurious filter (inside-region + reliability ratio).
        let mut taus = Vec::with_capacity(k);
        for i in 0..k {
            let col = q.column(i);
            let numer: f64 = (0..k).map(|j| to_c64::<S>(col[j]).norm_sqr()).sum();
            let denom: f64 = (0..k)
                .map(|j| to_c64::<S>(col[j]).norm_sqr() / sigmas[j].max(1e-300))
                .sum::<f64>()
                * numer;
            taus.push(if denom > 0.0 { numer * numer / denom } else { 0.0 });
        }
        let max_tau = taus.iter().copied().fold(0.0, f64::max).max(1e-300);

        let mut kept_idx = Vec::new();
        for i in 0..k {
            let lambda = to_c64(t[(i, i)]);
            let in_region = self.region.contains(lambda);
            let reliable = taus[i] >= self.config.spurious_threshold * max_tau;
            if in_region && reliable {
                kept_idx.push(i);
            }
        }

        let mut eigenvalues = Vec::with_capacity(kept_idx.len());
        let mut vectors = DMatrix::<S>::zeros(n, kept_idx.len());
        let mut residuals = Vec::with_capacity(kept_idx.len());
        for (col, &i) in kept_idx.iter().enumerate() {
            let lambda = t[(i, i)];
            let x = ritz_vectors.column(i).into_owned();
            residuals.push(self.residual_norm(lambda, &x));
            eigenvalues.push(lambda);
            vectors.column_mut(col).copy_from(&x);
        }

        Ok(RankFiltered { k, kept_idx, eigenvalues, eigenvectors: vectors, residuals })
    }

    /// Run the main CISS pipeline: quadrature, block shifted solves,
    /// moment accumulation, adaptive `L` growth (steps 1-4), then the
    /// inner/outer refinement loops (steps 9-10) around the rank/
    /// Rayleigh-Ritz/filter step (steps 5-8).
    pub fn solve(&mut self, rng: &mut impl RandomSource) -> Result<CissResult<S>> {
        if !S::IS_COMPLEX {
            return Err(CissError::RealScalarsUnsupported);
        }

        let n = self.a.as_dense().nrows();
        let nodes = self.quadrature();
        let mut l = self.config.block_size;

        let mut v = random_block::<S>(n, l, rng);

        // Step 2: block shifted solves, one factorization per node.
        let mut ys = self.solve_nodes(&nodes, &v)?;

        // Step 3: moments S_0 .. S_{2M-2}, needed for the block Hankel.
        let m = self.config.moment_size.max(1);
        let moment_count = 2 * m - 1;
        let mut moments = accumulate_moments::<S>(&nodes, &ys, moment_count);

        // Step 4: eigen-count estimate and adaptive L growth.
        let ehat = eigen_count_estimate::<S>(&self.region, &v, &moments[0]);
        let eta = 10f64.powf(-self.config.tol.log10() / self.config.points as f64);
        let l_add_f = (ehat * eta / m as f64).ceil() - l as f64;
        if l_add_f > 0.0 && l < self.config.max_block_size {
            let add = (l_add_f as usize).min(self.config.max_block_size - l);
            if add > 0 {
                let extra = random_block::<S>(n, add, rng);
                let extra_ys = self.solve_nodes(&nodes, &extra)?;
                let mut new_ys = Vec::with_capacity(ys.len());
                for (y, ey) in ys.iter().zip(extra_ys.iter()) {
                    new_ys.push(hconcat(y, ey));
                }
                v = hconcat(&v, &extra);
                l += add;
                ys = new_ys;
                moments = accumulate_moments::<S>(&nodes, &ys, moment_count);
            }
        }

        self.refine_and_finish(n, l, m, v, &nodes, moments, rng)
    }

    /// Steps 9/10: re-run the rank/Rayleigh-Ritz/filter step up to
    /// `refine_outer+1` outer passes of `refine_inner+1` inner passes
    /// each, re-seeding `V` from the current Ritz vectors whenever the
    /// retained rank saturates the moment block's capacity (signalling
    /// the subspace hasn't yet settled), and stopping once the true
    /// residual of every kept pair is within tolerance.
    #[allow(clippy::too_many_arguments)]
    fn refine_and_finish(
        &mut self,
        n: usize,
        l: usize,
        m: usize,
        mut v: DMatrix<S>,
        nodes: &[(Complex64, Complex64, Complex64)],
        mut moments: Vec<DMatrix<S>>,
        rng: &mut impl RandomSource,
    ) -> Result<CissResult<S>> {
        let moment_count = moments.len();
        let mut last = RankFiltered::empty(n);
        let mut converged = false;

        for outer in 0..=self.config.refine_outer {
            for inner in 0..=self.config.refine_inner {
                let pass = self.rank_and_filter(n, l, m, &moments)?;
                let saturated = pass.k == l * m;
                let refine_again = !pass.kept_idx.is_empty() && saturated && inner != self.config.refine_inner;
                last = pass;
                if !refine_again {
                    break;
                }

                let reseed_cols = last.eigenvectors.ncols().min(l);
                v = last.eigenvectors.columns(0, reseed_cols).into_owned();
                if reseed_cols < l {
                    v = hconcat(&v, &random_block::<S>(n, l - reseed_cols, rng));
                }
                let ys = self.solve_nodes(nodes, &v)?;
                moments = accumulate_moments::<S>(nodes, &ys, moment_count);
            }

            if last.kept_idx.is_empty() {
                break;
            }

            let max_error = last.residuals.iter().copied().fold(0.0, f64::max);
            if max_error <= self.config.tol {
                converged = true;
                break;
            }
            if outer == self.config.refine_outer {
                break;
            }

            // Outer refinement exhausted the inner loop without
            // converging: restart the next pass from a fresh random
            // block rather than the (already-tried) current subspace.
            v = random_block::<S>(n, l, rng);
            let ys = self.solve_nodes(nodes, &v)?;
            moments = accumulate_moments::<S>(nodes, &ys, moment_count);
        }

        if last.kept_idx.is_empty() {
            return Ok(CissResult {
                eigenvalues: Vec::new(),
                eigenvectors: DMatrix::zeros(n, 0),
                residuals: Vec::new(),
                converged_reason: ConvergedReason::ConvergedTolerance,
            });
        }

        Ok(CissResult {
            eigenvalues: last.eigenvalues,
            eigenvectors: last.eigenvectors,
            residuals: last.residuals,
            converged_reason: if converged {
                ConvergedReason::ConvergedTolerance
            } else {
                ConvergedReason::DivergedIts
            },
        })
    }
}

fn random_block<S: Scalar>(n: usize, l: usize, rng: &mut impl RandomSource) -> DMatrix<S> {
    let mut m = DMatrix::<S>::zeros(n, l);
    for c in 0..l {
        for r in 0..n {
            m[(r, c)] = S::from_draw(rng.next_rademacher(), 0.0);
        }
    }
    m
}

fn hconcat<S: Scalar>(a: &DMatrix<S>, b: &DMatrix<S>) -> DMatrix<S> {
    let mut out = DMatrix::<S>::zeros(a.nrows(), a.ncols() + b.ncols());
    out.columns_mut(0, a.ncols()).copy_from(a);
    out.columns_mut(a.ncols(), b.ncols()).copy_from(b);
    out
}

fn hconcat_many<S: Scalar>(blocks: &[DMatrix<S>]) -> DMatrix<S> {
    let n = blocks[0].nrows();
    let total: usize = blocks.iter().map(|b| b.ncols()).sum();
    let mut out = DMatrix::<S>::zeros(n, total);
    let mut offset = 0;
    for b in blocks {
        out.columns_mut(offset, b.ncols()).copy_from(b);
        offset += b.ncols();
    }
    out
}

/// `S_k = sum_i p_i^k * w_i * Y_i / N` for `k = 0..count`.
fn accumulate_moments<S: Scalar>(
    nodes: &[(Complex64, Complex64, Complex64)],
    ys: &[DMatrix<S>],
    count: usize,
) -> Vec<DMatrix<S>> {
    let n = ys[0].nrows();
    let l = ys[0].ncols();
    let num_nodes = nodes.len() as f64;
    let mut moments = vec![DMatrix::<S>::zeros(n, l); count];
    for (idx, (_, p, w)) in nodes.iter().enumerate() {
        let mut pk = Complex64::new(1.0, 0.0);
        for k in 0..count {
            let coeff = from_c64::<S>(pk * *w / num_nodes);
            moments[k] += &ys[idx] * coeff;
            pk *= *p;
        }
    }
    moments
}

fn eigen_count_estimate<S: Scalar>(region: &Region, v: &DMatrix<S>, s0: &DMatrix<S>) -> f64 {
    let l = v.ncols() as f64;
    let mut acc = Complex64::new(0.0, 0.0);
    for j in 0..v.ncols() {
        let vj = v.column(j);
        let sj = s0.column(j);
        let mut dot = S::zero();
        for r in 0..vj.nrows() {
            dot += vj[r].conjugate() * sj[r];
        }
        acc += to_c64(dot);
    }
    (acc * region.radius / l).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_core::{ChaChaRandomSource, LocalMatrixHandle};

    fn laplacian(n: usize) -> DMatrix<Complex64> {
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
    fn ciss_finds_eigenvalues_inside_a_disk_on_a_laplacian() {
        let n = 10;
        let a = laplacian(n);
        let config = CissConfig {
            points: 16,
            block_size: 4,
            moment_size: 4,
            ..Default::default()
        };
        let region = Region::disk(Complex64::new(2.0, 0.0), 0.6);
        let mut solver = CissSolver::new(LocalMatrixHandle::dense(a), None, region, config);
        let mut rng = ChaChaRandomSource::from_seed(11);
        let result = solver.solve(&mut rng).unwrap();

        assert!(!result.eigenvalues.is_empty());
        assert_eq!(result.residuals.len(), result.eigenvalues.len());
        for lambda in &result.eigenvalues {
            assert!((lambda.re - 2.0).abs() < 1.0);
        }
        for &r in &result.residuals {
            assert!(r < 1.0);
        }
    }

    #[test]
    fn ciss_rejects_real_scalars_at_setup() {
        let a = DMatrix::<f64>::identity(3, 3);
        let region = Region::disk(Complex64::new(0.0, 0.0), 1.0);
        let mut solver = CissSolver::new(LocalMatrixHandle::dense(a), None, region, CissConfig::default());
        let mut rng = ChaChaRandomSource::from_seed(1);
        assert!(matches!(solver.solve(&mut rng), Err(CissError::RealScalarsUnsupported)));
    }

    #[test]
    fn ciss_real_matrices_flag_matches_full_quadrature_results() {
        let n = 10;
        let a = laplacian(n);
        let region = Region::disk(Complex64::new(2.0, 0.0), 0.6);

        let full_config = CissConfig { points: 16, block_size: 4, moment_size: 4, ..Default::default() };
        let mut full = CissSolver::new(LocalMatrixHandle::dense(a.clone()), None, region, full_config);
        let mut rng_full = ChaChaRandomSource::from_seed(11);
        let full_result = full.solve(&mut rng_full).unwrap();

        let halved_config = CissConfig { real_matrices: true, ..full_config };
        let mut halved = CissSolver::new(LocalMatrixHandle::dense(a), None, region, halved_config);
        let mut rng_halved = ChaChaRandomSource::from_seed(11);
        let halved_result = halved.solve(&mut rng_halved).unwrap();

        assert_eq!(full_result.eigenvalues.len(), halved_result.eigenvalues.len());
        for (full_lambda, halved_lambda) in full_result.eigenvalues.iter().zip(halved_result.eigenvalues.iter()) {
            assert!((full_lambda - halved_lambda).norm() < 1e-8);
        }
    }
}
