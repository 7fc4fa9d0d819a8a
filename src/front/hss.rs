//! # HSS Frontal Matrix
//!
//! Hierarchically compressed triangular factors, with coupling blocks tiled
//! at the leaf level of the separator partition tree. Selected only when
//! the parent front is itself compressed, so compression propagates down a
//! chain of large separators.

use faer::linalg::matmul::matmul;
use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Accum, Mat, MatMut, MatRef, Par};

use crate::linalg::dense;
use crate::sparse::csr::CsrMatrix;
use crate::sparse::graph::PartitionTree;
use crate::{E, I};

use super::lowrank::{uniform_tiles, HierFactor, TileMatrix};
use super::{AssembledFront, FactorError, FactorStats, Front, FrontParams};

#[derive(Debug)]
pub struct FrontalMatrixHss {
    fr: AssembledFront,
    piv: Vec<I>,
    params: FrontParams,
    ptree: PartitionTree,
    f11c: HierFactor,
    f12c: TileMatrix,
    f21c: TileMatrix,
}

impl FrontalMatrixHss {
    pub fn new(params: FrontParams, ptree: PartitionTree) -> Self {
        Self {
            fr: AssembledFront::default(),
            piv: Vec::new(),
            params,
            ptree,
            f11c: HierFactor::default(),
            f12c: TileMatrix::default(),
            f21c: TileMatrix::default(),
        }
    }
}

impl Front for FrontalMatrixHss {
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
        let ptree = if self.ptree.size == ds {
            self.ptree.clone()
        } else {
            PartitionTree::balanced(ds, self.params.leaf)
        };
        if du > 0 {
            dense::laswp(self.fr.f12.as_mut(), &self.piv);
            dense::solve_unit_lower(self.fr.f11.as_ref(), self.fr.f12.as_mut());
            dense::solve_upper_from_right(self.fr.f11.as_ref(), &mut self.fr.f21);
            stats.flops += (2 * ds * ds * du) as u64;
            let sep_tiles = ptree.leaf_sizes();
            let upd_tiles = uniform_tiles(du, self.params.leaf);
            self.f12c = TileMatrix::compress(
                self.fr.f12.as_ref(),
                &sep_tiles,
                &upd_tiles,
                self.params.rel_tol,
                self.params.abs_tol,
            );
            self.f21c = TileMatrix::compress(
                self.fr.f21.as_ref(),
                &upd_tiles,
                &sep_tiles,
                self.params.rel_tol,
                self.params.abs_tol,
            );
            let f21d = self.f21c.to_dense();
            let f12d = self.f12c.to_dense();
            matmul(
                self.fr.f22.as_mut(),
                Accum::Add,
                f21d.as_ref(),
                f12d.as_ref(),
                -1.,
                Par::Seq,
            );
            stats.flops += (2 * du * du * ds) as u64;
            self.fr.f12 = Mat::new();
            self.fr.f21 = Mat::new();
        }
        let lu = std::mem::replace(&mut self.fr.f11, Mat::new());
        self.f11c = HierFactor::compress(lu, &ptree, self.params.rel_tol, self.params.abs_tol);
        stats.factor_nonzeros += self.factor_nonzeros();
        stats.maximum_rank = stats.maximum_rank.max(self.maximum_rank());
        Ok(())
    }

    fn fwd_solve(&self, mut b_sep: MatMut<'_, E>, b_upd: MatMut<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        dense::laswp(b_sep.rb_mut(), &self.piv);
        self.f11c.solve_unit_lower(b_sep.rb_mut());
        if self.fr.dim_upd > 0 {
            self.f21c.apply_sub(b_sep.rb(), b_upd);
        }
    }

    fn bwd_solve(&self, mut y_sep: MatMut<'_, E>, y_upd: MatRef<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        if self.fr.dim_upd > 0 {
            self.f12c.apply_sub(y_upd, y_sep.rb_mut());
        }
        self.f11c.solve_upper(y_sep);
    }

    fn f22(&self) -> MatRef<'_, E> {
        self.fr.f22.as_ref()
    }

    fn release_work_memory(&mut self) {
        self.fr.release_f22();
    }

    fn factor_nonzeros(&self) -> I {
        self.f11c.nonzeros() + self.f12c.nonzeros() + self.f21c.nonzeros()
    }

    fn maximum_rank(&self) -> I {
        self.f11c
            .max_rank()
            .max(self.f12c.max_rank())
            .max(self.f21c.max_rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hss_front_matches_dense_solve() {
        let n = 48;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.));
            if i + 1 < n {
                t.push((i, i + 1, -1.));
                t.push((i + 1, i, -1.));
            }
        }
        let a = CsrMatrix::from_triplets(n, &t).unwrap();
        let params = FrontParams {
            pivot_threshold: 1e-14,
            rel_tol: 1e-12,
            abs_tol: 1e-15,
            leaf: 8,
        };
        let upd: Vec<I> = (40..48).collect();
        let mut h = FrontalMatrixHss::new(params, PartitionTree::balanced(40, 8));
        h.build(&a, 0, 40, &upd).unwrap();
        h.partial_factor(&mut FactorStats::default()).unwrap();

        let mut d = super::super::dense::FrontalMatrixDense::new(params);
        d.build(&a, 0, 40, &upd).unwrap();
        d.partial_factor(&mut FactorStats::default()).unwrap();

        let err = h.f22().to_owned() - d.f22().to_owned();
        assert!(err.norm_l2() < 1e-8);

        let mut bh = Mat::from_fn(40, 1, |i, _| ((3 * i) % 11) as E - 5.);
        let mut bd = bh.clone();
        let mut uh = Mat::<E>::zeros(8, 1);
        let mut ud = Mat::<E>::zeros(8, 1);
        h.fwd_solve(bh.as_mut(), uh.as_mut());
        d.fwd_solve(bd.as_mut(), ud.as_mut());
        h.bwd_solve(bh.as_mut(), uh.as_ref());
        d.bwd_solve(bd.as_mut(), ud.as_ref());
        let err = &bh - &bd;
        assert!(err.norm_l2() < 1e-8);
    }
}
