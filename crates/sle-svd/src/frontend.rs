//! `Svd`: the standard/generalized SVD façade over [`CyclicSvd`],
//! wrapping the cyclic driver the same way `Eps` wraps CISS/Krylov.

use crate::cyclic::{CyclicSvd, CyclicSvdConfig, Which};
use crate::error::Result;
use nalgebra::DMatrix;
use sle_core::{LocalMatrixHandle, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvdKind {
    Standard,
    Generalized,
}

pub struct SvdFrontendResult<S: Scalar> {
    pub singular_values: Vec<S::Real>,
    pub u: DMatrix<S>,
    pub v: DMatrix<S>,
}

pub struct Svd<S: Scalar> {
    kind: SvdKind,
    a: Option<LocalMatrixHandle<S>>,
    b: Option<LocalMatrixHandle<S>>,
    config: CyclicSvdConfig,
}

impl<S> Svd<S>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    pub fn new(kind: SvdKind) -> Self {
        Self { kind, a: None, b: None, config: CyclicSvdConfig::default() }
    }

    pub fn set_operators(&mut self, a: LocalMatrixHandle<S>, b: Option<LocalMatrixHandle<S>>) -> &mut Self {
        self.a = Some(a);
        self.b = match self.kind {
            SvdKind::Standard => None,
            SvdKind::Generalized => b,
        };
        self
    }

    pub fn set_dimensions(&mut self, nsv: usize) -> &mut Self {
        self.config.nsv = nsv;
        self
    }

    pub fn set_which(&mut self, which: Which) -> &mut Self {
        self.config.which = which;
        self
    }

    pub fn set_tolerances(&mut self, tol: f64) -> &mut Self {
        self.config.tol = tol;
        self
    }

    pub fn solve(&mut self) -> Result<SvdFrontendResult<S>> {
        let a = self.a.clone().expect("set_operators must be called before solve");
        let b = self.b.clone();
        let mut solver = CyclicSvd::new(a, b, self.config);
        let result = solver.solve()?;
        Ok(SvdFrontendResult {
            singular_values: result.singular_values,
            u: result.u,
            v: result.v,
        })
    }
}
