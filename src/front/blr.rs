//! # Block Low-Rank Frontal Matrix
//!
//! Keeps the pivot block dense but stores the coupling blocks `F12`/`F21`
//! as a flat grid of low-rank tiles. Tile rows follow the separator
//! partition tree computed during separator reordering; the update side is
//! tiled evenly at the compression leaf size.

use faer::linalg::matmul::matmul;
use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Accum, Mat, MatMut, MatRef, Par};

use crate::linalg::dense;
use crate::sparse::csr::CsrMatrix;
use crate::sparse::graph::PartitionTree;
use crate::{E, I};

use super::lowrank::{uniform_tiles, TileMatrix};
use super::{AssembledFront, FactorError, FactorStats, Front, FrontParams};

#[derive(Debug)]
pub struct FrontalMatrixBlr {
    fr: AssembledFront,
    piv: Vec<I>,
    params: FrontParams,
    ptree: PartitionTree,
    f12c: TileMatrix,
    f21c: TileMatrix,
}

impl FrontalMatrixBlr {
    pub fn new(params: FrontParams, ptree: PartitionTree) -> Self {
        Self {
            fr: AssembledFront::default(),
            piv: Vec::new(),
            params,
            ptree,
            f12c: TileMatrix::default(),
            f21c: TileMatrix::default(),
        }
    }

    fn sep_tiles(&self) -> Vec<I> {
        if self.ptree.size == self.fr.dim_sep {
            self.ptree.leaf_sizes()
        } else {
            uniform_tiles(self.fr.dim_sep, self.params.leaf)
        }
    }
}

impl Front for FrontalMatrixBlr {
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
            stats.flops += (2 * ds * ds * du) as u64;

            let sep_tiles = self.sep_tiles();
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
            // Schur update from the truncated factors, so that the
            // factorization and the solves apply the same operator.
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
        stats.factor_nonzeros += self.factor_nonzeros();
        stats.maximum_rank = stats.maximum_rank.max(self.maximum_rank());
        Ok(())
    }

    fn fwd_solve(&self, mut b_sep: MatMut<'_, E>, b_upd: MatMut<'_, E>) {
        if self.fr.dim_sep == 0 {
            return;
        }
        dense::laswp(b_sep.rb_mut(), &self.piv);
        dense::solve_unit_lower(self.fr.f11.as_ref(), b_sep.rb_mut());
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
        dense::solve_upper(self.fr.f11.as_ref(), y_sep);
    }

    fn f22(&self) -> MatRef<'_, E> {
        self.fr.f22.as_ref()
    }

    fn release_work_memory(&mut self) {
        self.fr.release_f22();
    }

    fn factor_nonzeros(&self) -> I {
        self.fr.dim_sep * self.fr.dim_sep + self.f12c.nonzeros() + self.f21c.nonzeros()
    }

    fn maximum_rank(&self) -> I {
        self.f12c.max_rank().max(self.f21c.max_rank())
    }
}
