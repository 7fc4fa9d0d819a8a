//! # Dense Frontal Matrix
//!
//! Exact partial factorization of a front: LU with partial row pivoting on
//! `F11`, pivots and `L^-1` applied to `F12`, `U^-1` applied to `F21` from
//! the right, and the Schur update `F22 <- F22 - F21 F12`.

use faer::linalg::matmul::matmul;
use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Accum, MatMut, MatRef, Par};

use crate::linalg::dense;
use crate::sparse::csr::CsrMatrix;
use crate::{E, I};

use super::{AssembledFront, FactorError, FactorStats, Front, FrontParams};

#[derive(Debug)]
pub struct FrontalMatrixDense {
    fr: AssembledFront,
    piv: Vec<I>,
    params: FrontParams,
}

impl FrontalMatrixDense {
    pub fn new(params: FrontParams) -> Self {
        Self {
            fr: AssembledFront::default(),
            piv: Vec::new(),
            params,
        }
    }
}

impl Front for FrontalMatrixDense {
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
        stats.factor_nonzeros += self.factor_nonzeros();
        Ok(())
    }

    fn fwd_solve(&self, mut b_sep: MatMut<'_, E>, b_upd: MatMut<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        dense::laswp(b_sep.rb_mut(), &self.piv);
        dense::solve_unit_lower(self.fr.f11.as_ref(), b_sep.rb_mut());
        if self.fr.dim_upd > 0 {
            matmul(
                b_upd,
                Accum::Add,
                self.fr.f21.as_ref(),
                b_sep.rb(),
                -1.,
                Par::Seq,
            );
        }
    }

    fn bwd_solve(&self, mut y_sep: MatMut<'_, E>, y_upd: MatRef<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        if self.fr.dim_upd > 0 {
            matmul(
                y_sep.rb_mut(),
                Accum::Add,
                self.fr.f12.as_ref(),
                y_upd,
                -1.,
                Par::Seq,
            );
        }
        dense::solve_upper(self.fr.f11.as_ref(), y_sep);
    }

    fn f22(&self) -> MatRef<'_, E> {
        self.fr.f22.as_ref()
    }

    fn release_work_memory(&mut self) {
        self.fr.release_f22();
    }

    fn factor_nonzeros(&self) -> I {
        self.fr.dim_sep * self.fr.dim_sep + 2 * self.fr.dim_sep * self.fr.dim_upd
    }

    fn maximum_rank(&self) -> I {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn tridiagonal(n: I) -> CsrMatrix {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.));
            if i + 1 < n {
                t.push((i, i + 1, -1.));
                t.push((i + 1, i, -1.));
            }
        }
        CsrMatrix::from_triplets(n, &t).unwrap()
    }

    fn factored_front(a: &CsrMatrix, sep_end: I, upd: Vec<I>) -> FrontalMatrixDense {
        let params = FrontParams {
            pivot_threshold: 1e-14,
            rel_tol: 1e-4,
            abs_tol: 1e-10,
            leaf: 8,
        };
        let mut f = FrontalMatrixDense::new(params);
        f.build(a, 0, sep_end, &upd).unwrap();
        let mut stats = FactorStats::default();
        f.partial_factor(&mut stats).unwrap();
        f
    }

    #[test]
    fn test_schur_complement_of_tridiagonal() {
        // Eliminate rows 0..3 of the 4x4 second-difference matrix; the
        // Schur complement on the trailing unknown is 2 - 3/4... built up
        // as the continued fraction 2 - 1/(2 - 1/(2 - 1/2)) = 5/4.
        let a = tridiagonal(4);
        let f = factored_front(&a, 3, vec![3]);
        assert!((f.f22()[(0, 0)] - 5. / 4.).abs() < 1e-14);
    }

    #[test]
    fn test_fwd_bwd_solve_roundtrip() {
        // One front covering the whole matrix acts as a direct solver.
        let n = 6;
        let a = tridiagonal(n);
        let f = factored_front(&a, n, vec![]);
        let x_true = Mat::from_fn(n, 1, |i, _| (i + 1) as E);
        let mut b = Mat::<E>::zeros(n, 1);
        {
            let xs: Vec<E> = (0..n).map(|i| x_true[(i, 0)]).collect();
            let mut bs = vec![0.; n];
            a.spmv(&xs, &mut bs);
            for i in 0..n {
                b[(i, 0)] = bs[i];
            }
        }
        let mut bupd = Mat::<E>::zeros(0, 1);
        f.fwd_solve(b.as_mut(), bupd.as_mut());
        f.bwd_solve(b.as_mut(), bupd.as_ref());
        let err = &b - &x_true;
        assert!(err.norm_l2() < 1e-12);
    }

    #[test]
    fn test_singular_front_is_reported() {
        let a = CsrMatrix::from_triplets(2, &[(0, 0, 1.)]).unwrap();
        let params = FrontParams {
            pivot_threshold: 1e-14,
            rel_tol: 1e-4,
            abs_tol: 1e-10,
            leaf: 8,
        };
        let mut f = FrontalMatrixDense::new(params);
        f.build(&a, 0, 2, &[]).unwrap();
        let mut stats = FactorStats::default();
        assert_eq!(
            f.partial_factor(&mut stats),
            Err(FactorError::SingularFront { col: 1 })
        );
    }
}
