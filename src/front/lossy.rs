//! Lossy frontal matrix: exact partial factorization whose factors are
//! stored in reduced (f32) precision and expanded on the fly during the
//! solve sweeps.

use faer::linalg::matmul::matmul;
use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Accum, Mat, MatMut, MatRef, Par};

use crate::linalg::dense;
use crate::sparse::csr::CsrMatrix;
use crate::{E, I};

use super::{AssembledFront, FactorError, FactorStats, Front, FrontParams};

/// Column-major reduced-precision store.
#[derive(Debug, Default)]
struct ReducedMat {
    data: Vec<f32>,
    nrows: I,
    ncols: I,
}

impl ReducedMat {
    fn from_mat(m: &Mat<E>) -> Self {
        let mut data = Vec::with_capacity(m.nrows() * m.ncols());
        for j in 0..m.ncols() {
            for i in 0..m.nrows() {
                data.push(m[(i, j)] as f32);
            }
        }
        Self {
            data,
            nrows: m.nrows(),
            ncols: m.ncols(),
        }
    }

    fn expand(&self) -> Mat<E> {
        Mat::from_fn(self.nrows, self.ncols, |i, j| {
            self.data[j * self.nrows + i] as E
        })
    }

    fn len(&self) -> I {
        self.data.len()
    }
}

#[derive(Debug)]
pub struct FrontalMatrixLossy {
    fr: AssembledFront,
    piv: Vec<I>,
    params: FrontParams,
    f11s: ReducedMat,
    f12s: ReducedMat,
    f21s: ReducedMat,
}

impl FrontalMatrixLossy {
    pub fn new(params: FrontParams) -> Self {
        Self {
            fr: AssembledFront::default(),
            piv: Vec::new(),
            params,
            f11s: ReducedMat::default(),
            f12s: ReducedMat::default(),
            f21s: ReducedMat::default(),
        }
    }
}

impl Front for FrontalMatrixLossy {
    fn build(
        &mut self,
        a: &CsrMatrix,
        sep_begin: I,
        sep_end: I,
        upd: &[I],
    ) -> Result<(), FactorError> {
        self.fr.build(a, sep_begin, sep_end, upd)
    }

    fn extend_add(&mut self, child_f22: MatRef<'_, E>, map: &[I]) {
        self.fr.extend_add(child_f22, map);
    }

    fn partial_factor(&mut self, stats: &mut FactorStats) -> Result<(), FactorError> {
        let ds = self.fr.dim_sep;
        let du = self.fr.dim_upd;
        if ds == 0 {
            return Ok(());
        }
        dense::getrf(&mut self.fr.f11, &mut self.piv, self.params.pivot_threshold)
            .map_err(|e| FactorError::SingularFront { col: e.col })?;
        stats.flops += (2 * ds * ds * ds / 3) as u64;
        if du > 0 {
            dense::laswp(self.fr.f12.as_mut(), &self.piv);
            dense::solve_unit_lower(self.fr.f11.as_ref(), self.fr.f12.as_mut());
            dense::solve_upper_from_right(self.fr.f11.as_ref(), &mut self.fr.f21);
            matmul(
                self.fr.f22.as_mut(),
                Accum::Add,
                self.fr.f21.as_ref(),
                self.fr.f12.as_ref(),
                -1.,
                Par::Seq,
            );
            stats.flops += (2 * ds * ds * du + 2 * du * du * ds) as u64;
        }
        self.f11s = ReducedMat::from_mat(&self.fr.f11);
        self.f12s = ReducedMat::from_mat(&self.fr.f12);
        self.f21s = ReducedMat::from_mat(&self.fr.f21);
        self.fr.f11 = Mat::new();
        self.fr.f12 = Mat::new();
        self.fr.f21 = Mat::new();
        stats.factor_nonzeros += self.factor_nonzeros();
        Ok(())
    }

    fn fwd_solve(&self, mut b_sep: MatMut<'_, E>, b_upd: MatMut<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        let f11 = self.f11s.expand();
        dense::laswp(b_sep.rb_mut(), &self.piv);
        dense::solve_unit_lower(f11.as_ref(), b_sep.rb_mut());
        if self.fr.dim_upd > 0 {
            let f21 = self.f21s.expand();
            matmul(b_upd, Accum::Add, f21.as_ref(), b_sep.rb(), -1., Par::Seq);
        }
    }

    fn bwd_solve(&self, mut y_sep: MatMut<'_, E>, y_upd: MatRef<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        if self.fr.dim_upd > 0 {
            let f12 = self.f12s.expand();
            matmul(y_sep.rb_mut(), Accum::Add, f12.as_ref(), y_upd, -1., Par::Seq);
        }
        let f11 = self.f11s.expand();
        dense::solve_upper(f11.as_ref(), y_sep);
    }

    fn f22(&self) -> MatRef<'_, E> {
        self.fr.f22.as_ref()
    }

    fn release_work_memory(&mut self) {
        self.fr.release_f22();
    }

    fn factor_nonzeros(&self) -> I {
        self.f11s.len() + self.f12s.len() + self.f21s.len()
    }

    fn maximum_rank(&self) -> I {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossy_front_solves_to_single_precision() {
        let n = 24;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 3.));
            if i + 1 < n {
                t.push((i, i + 1, -1.));
                t.push((i + 1, i, -1.));
            }
        }
        let a = CsrMatrix::from_triplets(n, &t).unwrap();
        let params = FrontParams {
            pivot_threshold: 1e-14,
            rel_tol: 1e-4,
            abs_tol: 1e-10,
            leaf: 8,
        };
        let mut f = FrontalMatrixLossy::new(params);
        f.build(&a, 0, n, &[]).unwrap();
        f.partial_factor(&mut FactorStats::default()).unwrap();

        let x_true = Mat::from_fn(n, 1, |i, _| ((i % 3) + 1) as E);
        let mut b = Mat::<E>::zeros(n, 1);
        let xs: Vec<E> = (0..n).map(|i| x_true[(i, 0)]).collect();
        let mut bs = vec![0.; n];
        a.spmv(&xs, &mut bs);
        for i in 0..n {
            b[(i, 0)] = bs[i];
        }
        let mut bupd = Mat::<E>::zeros(0, 1);
        f.fwd_solve(b.as_mut(), bupd.as_mut());
        f.bwd_solve(b.as_mut(), bupd.as_ref());
        let err = &b - &x_true;
        // Single-precision factors bound the accuracy.
        assert!(err.norm_l2() < 1e-4);
        assert!(err.norm_l2() > 0.);
    }
}
