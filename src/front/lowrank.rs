//! # Low-Rank Compression Kernel
//!
//! Rank-revealing truncated factorization by column-pivoted modified
//! Gram-Schmidt, plus the two aggregate shapes built on it:
//! - [`TileMatrix`]: a flat grid of independently compressed tiles (BLR).
//! - [`HierFactor`]: triangular factors with the off-diagonal blocks of a
//!   partition tree compressed level by level (HODLR/HSS).
//!
//! Every block behaves as if computed exactly and then truncated to the
//! requested relative/absolute tolerance; the solve paths apply the same
//! truncated factors.

use faer::linalg::matmul::matmul;
use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Accum, Mat, MatMut, MatRef, Par};

use crate::linalg::dense;
use crate::sparse::graph::PartitionTree;
use crate::{E, I};

/// `m x n` block approximated as `u * v` with `u: m x r`, `v: r x n`.
#[derive(Debug, Clone)]
pub(crate) struct LowRank {
    pub u: Mat<E>,
    pub v: Mat<E>,
}

impl LowRank {
    /// Truncated factorization of `block`. Stops when the largest residual
    /// column norm drops below `max(abs_tol, rel_tol * |block|)` or the
    /// rank reaches `max_rank`.
    pub fn compress(block: MatRef<'_, E>, rel_tol: E, abs_tol: E, max_rank: I) -> Self {
        let m = block.nrows();
        let n = block.ncols();
        let rmax = max_rank.min(m.min(n));
        let mut resid = block.to_owned();
        let mut norms2: Vec<E> = (0..n)
            .map(|j| {
                let mut s = 0.;
                for i in 0..m {
                    s += resid[(i, j)] * resid[(i, j)];
                }
                s
            })
            .collect();
        let tol = abs_tol.max(rel_tol * norms2.iter().cloned().fold(0., E::max).sqrt());
        let mut us: Vec<Vec<E>> = Vec::new();
        let mut vs: Vec<Vec<E>> = Vec::new();
        while us.len() < rmax {
            let mut jmax = 0;
            for j in 1..n {
                if norms2[j] > norms2[jmax] {
                    jmax = j;
                }
            }
            // Incrementally downdated norms drift; recompute the winner.
            let mut nrm2 = 0.;
            for i in 0..m {
                nrm2 += resid[(i, jmax)] * resid[(i, jmax)];
            }
            norms2[jmax] = nrm2;
            let nrm = nrm2.sqrt();
            if nrm <= tol {
                break;
            }
            let q: Vec<E> = (0..m).map(|i| resid[(i, jmax)] / nrm).collect();
            let mut vrow = vec![0.; n];
            for j in 0..n {
                let mut c = 0.;
                for i in 0..m {
                    c += q[i] * resid[(i, j)];
                }
                if c != 0. {
                    for i in 0..m {
                        resid[(i, j)] -= c * q[i];
                    }
                }
                vrow[j] = c;
                norms2[j] = (norms2[j] - c * c).max(0.);
            }
            us.push(q);
            vs.push(vrow);
        }
        let r = us.len();
        let u = Mat::from_fn(m, r, |i, k| us[k][i]);
        let v = Mat::from_fn(r, n, |k, j| vs[k][j]);
        Self { u, v }
    }

    pub fn rank(&self) -> I {
        self.u.ncols()
    }

    pub fn nonzeros(&self) -> I {
        self.u.nrows() * self.rank() + self.rank() * self.v.ncols()
    }

    /// `out <- out - u (v rhs)`.
    pub fn apply_sub(&self, rhs: MatRef<'_, E>, out: MatMut<'_, E>) {
        if self.rank() == 0 {
            return;
        }
        let mut t = Mat::<E>::zeros(self.rank(), rhs.ncols());
        matmul(t.as_mut(), Accum::Replace, self.v.as_ref(), rhs, 1., Par::Seq);
        matmul(out, Accum::Add, self.u.as_ref(), t.as_ref(), -1., Par::Seq);
    }

    pub fn to_dense(&self) -> Mat<E> {
        let mut out = Mat::<E>::zeros(self.u.nrows(), self.v.ncols());
        matmul(
            out.as_mut(),
            Accum::Replace,
            self.u.as_ref(),
            self.v.as_ref(),
            1.,
            Par::Seq,
        );
        out
    }
}

/// A block kept dense when the low-rank factors would not pay for
/// themselves.
#[derive(Debug, Clone)]
pub(crate) enum Block {
    Dense(Mat<E>),
    LowRank(LowRank),
}

impl Block {
    pub fn compress(block: MatRef<'_, E>, rel_tol: E, abs_tol: E) -> Self {
        let (m, n) = (block.nrows(), block.ncols());
        let budget_rank = if m + n == 0 { 0 } else { (m * n) / (m + n) };
        let lr = LowRank::compress(block, rel_tol, abs_tol, budget_rank);
        if lr.rank() >= budget_rank && lr.rank() < m.min(n) {
            // The truncation did not converge within the paying rank.
            Block::Dense(block.to_owned())
        } else if lr.rank() * (m + n) >= m * n {
            Block::Dense(block.to_owned())
        } else {
            Block::LowRank(lr)
        }
    }

    pub fn rank(&self) -> I {
        match self {
            Block::Dense(_) => 0,
            Block::LowRank(lr) => lr.rank(),
        }
    }

    pub fn nonzeros(&self) -> I {
        match self {
            Block::Dense(m) => m.nrows() * m.ncols(),
            Block::LowRank(lr) => lr.nonzeros(),
        }
    }

    /// `out <- out - B rhs`.
    pub fn apply_sub(&self, rhs: MatRef<'_, E>, out: MatMut<'_, E>) {
        match self {
            Block::Dense(m) => matmul(out, Accum::Add, m.as_ref(), rhs, -1., Par::Seq),
            Block::LowRank(lr) => lr.apply_sub(rhs, out),
        }
    }

    pub fn to_dense(&self) -> Mat<E> {
        match self {
            Block::Dense(m) => m.clone(),
            Block::LowRank(lr) => lr.to_dense(),
        }
    }
}

/// Grid of compressed tiles covering one coupling block.
#[derive(Debug, Default)]
pub(crate) struct TileMatrix {
    nrows: I,
    ncols: I,
    row_off: Vec<I>,
    col_off: Vec<I>,
    /// Row-major over the tile grid.
    blocks: Vec<Block>,
}

impl TileMatrix {
    pub fn compress(
        m: MatRef<'_, E>,
        row_tiles: &[I],
        col_tiles: &[I],
        rel_tol: E,
        abs_tol: E,
    ) -> Self {
        let offsets = |tiles: &[I]| {
            let mut off = vec![0];
            for &t in tiles {
                off.push(off.last().unwrap() + t);
            }
            off
        };
        let row_off = offsets(row_tiles);
        let col_off = offsets(col_tiles);
        let mut blocks = Vec::with_capacity(row_tiles.len() * col_tiles.len());
        for r in 0..row_tiles.len() {
            for c in 0..col_tiles.len() {
                let sub = m.submatrix(
                    row_off[r],
                    col_off[c],
                    row_off[r + 1] - row_off[r],
                    col_off[c + 1] - col_off[c],
                );
                blocks.push(Block::compress(sub, rel_tol, abs_tol));
            }
        }
        Self {
            nrows: m.nrows(),
            ncols: m.ncols(),
            row_off,
            col_off,
            blocks,
        }
    }

    /// `out <- out - T rhs`.
    pub fn apply_sub(&self, rhs: MatRef<'_, E>, mut out: MatMut<'_, E>) {
        let nct = self.col_off.len() - 1;
        for (k, block) in self.blocks.iter().enumerate() {
            let (r, c) = (k / nct, k % nct);
            block.apply_sub(
                rhs.subrows(self.col_off[c], self.col_off[c + 1] - self.col_off[c]),
                out.rb_mut()
                    .subrows_mut(self.row_off[r], self.row_off[r + 1] - self.row_off[r]),
            );
        }
    }

    pub fn to_dense(&self) -> Mat<E> {
        let mut out = Mat::<E>::zeros(self.nrows, self.ncols);
        let nct = self.col_off.len() - 1;
        for (k, block) in self.blocks.iter().enumerate() {
            let (r, c) = (k / nct, k % nct);
            let d = block.to_dense();
            for j in 0..d.ncols() {
                for i in 0..d.nrows() {
                    out[(self.row_off[r] + i, self.col_off[c] + j)] = d[(i, j)];
                }
            }
        }
        out
    }

    pub fn nonzeros(&self) -> I {
        self.blocks.iter().map(Block::nonzeros).sum()
    }

    pub fn max_rank(&self) -> I {
        self.blocks.iter().map(Block::rank).max().unwrap_or(0)
    }
}

/// Even tile sizes for an index range without partition information.
pub(crate) fn uniform_tiles(n: I, leaf: I) -> Vec<I> {
    let leaf = leaf.max(1);
    if n == 0 {
        return vec![];
    }
    let nt = n.div_ceil(leaf);
    let base = n / nt;
    let extra = n % nt;
    (0..nt).map(|t| base + if t < extra { 1 } else { 0 }).collect()
}

#[derive(Debug, Clone, Copy)]
struct HierNode {
    off: I,
    size: I,
    /// Indices of the two children in the node array, and the block index
    /// of this node's off-diagonal pair.
    children: Option<(I, I, I)>,
}

/// Triangular factors of an eliminated pivot block with the off-diagonal
/// blocks of the partition hierarchy stored compressed. Diagonal leaf
/// blocks stay dense inside `lu`; compressed regions of `lu` are cleared.
#[derive(Debug)]
pub(crate) struct HierFactor {
    lu: Mat<E>,
    nodes: Vec<HierNode>,
    lower: Vec<Block>,
    upper: Vec<Block>,
}

impl Default for HierFactor {
    fn default() -> Self {
        Self {
            lu: Mat::new(),
            nodes: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
        }
    }
}

impl HierFactor {
    /// Compresses the off-diagonal blocks of the factored `lu` along
    /// `tree`.
    pub fn compress(mut lu: Mat<E>, tree: &PartitionTree, rel_tol: E, abs_tol: E) -> Self {
        let mut hf = Self {
            lu: Mat::new(),
            nodes: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
        };
        if lu.nrows() > 0 {
            hf.flatten(&mut lu, tree, 0, rel_tol, abs_tol);
        }
        hf.lu = lu;
        hf
    }

    fn flatten(
        &mut self,
        lu: &mut Mat<E>,
        node: &PartitionTree,
        off: I,
        rel_tol: E,
        abs_tol: E,
    ) -> I {
        let id = self.nodes.len();
        self.nodes.push(HierNode {
            off,
            size: node.size,
            children: None,
        });
        if node.children.len() == 2 {
            let s1 = node.children[0].size;
            let s2 = node.size - s1;
            let blk = self.lower.len();
            self.lower.push(Block::compress(
                lu.as_ref().submatrix(off + s1, off, s2, s1),
                rel_tol,
                abs_tol,
            ));
            self.upper.push(Block::compress(
                lu.as_ref().submatrix(off, off + s1, s1, s2),
                rel_tol,
                abs_tol,
            ));
            for j in 0..s1 {
                for i in 0..s2 {
                    lu[(off + s1 + i, off + j)] = 0.;
                }
            }
            for j in 0..s2 {
                for i in 0..s1 {
                    lu[(off + i, off + s1 + j)] = 0.;
                }
            }
            let l = self.flatten(lu, &node.children[0], off, rel_tol, abs_tol);
            let r = self.flatten(lu, &node.children[1], off + s1, rel_tol, abs_tol);
            self.nodes[id].children = Some((l, r, blk));
        }
        id
    }

    /// `b <- L^-1 b` using the compressed lower blocks.
    pub fn solve_unit_lower(&self, mut b: MatMut<'_, E>) {
        if !self.nodes.is_empty() {
            self.solve_lower_node(0, &mut b);
        }
    }

    fn solve_lower_node(&self, id: I, b: &mut MatMut<'_, E>) {
        let node = self.nodes[id];
        match node.children {
            None => {
                dense::solve_unit_lower(
                    self.lu.as_ref().submatrix(node.off, node.off, node.size, node.size),
                    b.rb_mut().subrows_mut(node.off, node.size),
                );
            }
            Some((l, r, blk)) => {
                let s1 = self.nodes[l].size;
                let s2 = self.nodes[r].size;
                self.solve_lower_node(l, b);
                let b1 = (*b).rb().subrows(node.off, s1).to_owned();
                self.lower[blk].apply_sub(b1.as_ref(), b.rb_mut().subrows_mut(node.off + s1, s2));
                self.solve_lower_node(r, b);
            }
        }
    }

    /// `b <- U^-1 b` using the compressed upper blocks.
    pub fn solve_upper(&self, mut b: MatMut<'_, E>) {
        if !self.nodes.is_empty() {
            self.solve_upper_node(0, &mut b);
        }
    }

    fn solve_upper_node(&self, id: I, b: &mut MatMut<'_, E>) {
        let node = self.nodes[id];
        match node.children {
            None => {
                dense::solve_upper(
                    self.lu.as_ref().submatrix(node.off, node.off, node.size, node.size),
                    b.rb_mut().subrows_mut(node.off, node.size),
                );
            }
            Some((l, r, blk)) => {
                let s1 = self.nodes[l].size;
                let s2 = self.nodes[r].size;
                self.solve_upper_node(r, b);
                let b2 = (*b).rb().subrows(node.off + s1, s2).to_owned();
                self.upper[blk].apply_sub(b2.as_ref(), b.rb_mut().subrows_mut(node.off, s1));
                self.solve_upper_node(l, b);
            }
        }
    }

    pub fn nonzeros(&self) -> I {
        let leaves: I = self
            .nodes
            .iter()
            .filter(|n| n.children.is_none())
            .map(|n| n.size * n.size)
            .sum();
        let blocks: I = self.lower.iter().chain(self.upper.iter()).map(Block::nonzeros).sum();
        leaves + blocks
    }

    pub fn max_rank(&self) -> I {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .map(Block::rank)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth_block(m: I, n: I) -> Mat<E> {
        // Smooth kernel, numerically low-rank.
        Mat::from_fn(m, n, |i, j| 1. / (1. + (i as E - j as E).abs()))
    }

    #[test]
    fn test_compress_recovers_block_within_tolerance() {
        let a = smooth_block(24, 20);
        let lr = LowRank::compress(a.as_ref(), 1e-8, 1e-14, 20);
        assert!(lr.rank() < 20);
        let err = &a - lr.to_dense();
        assert!(err.norm_l2() <= 1e-6 * a.norm_l2());
    }

    #[test]
    fn test_compress_exact_rank_one() {
        let a = Mat::from_fn(8, 8, |i, j| ((i + 1) * (j + 1)) as E);
        let lr = LowRank::compress(a.as_ref(), 1e-12, 1e-14, 8);
        assert_eq!(lr.rank(), 1);
        let err = &a - lr.to_dense();
        assert!(err.norm_l2() < 1e-10);
    }

    #[test]
    fn test_apply_sub_matches_dense() {
        let a = smooth_block(16, 12);
        let lr = LowRank::compress(a.as_ref(), 1e-12, 1e-14, 12);
        let x = Mat::from_fn(12, 2, |i, j| (i + j + 1) as E);
        let mut y_lr = Mat::<E>::zeros(16, 2);
        lr.apply_sub(x.as_ref(), y_lr.as_mut());
        let y_dense = &a * &x;
        let err = &y_lr + &y_dense;
        assert!(err.norm_l2() < 1e-8);
    }

    #[test]
    fn test_tile_matrix_roundtrip() {
        let a = smooth_block(20, 20);
        let t = TileMatrix::compress(a.as_ref(), &[8, 12], &[5, 5, 10], 1e-10, 1e-14);
        let err = &a - t.to_dense();
        assert!(err.norm_l2() < 1e-7 * a.norm_l2());
        assert!(t.nonzeros() > 0);
    }

    #[test]
    fn test_hier_factor_solves_match_dense() {
        let n = 32;
        // Diagonally dominant, factored without pivot swaps.
        let a = Mat::from_fn(n, n, |i, j| {
            if i == j {
                n as E
            } else {
                1. / (1. + (i as E - j as E).abs())
            }
        });
        let mut lu = a.clone();
        let mut piv = Vec::new();
        dense::getrf(&mut lu, &mut piv, 1e-14).unwrap();
        assert!(piv.iter().enumerate().all(|(k, &p)| k == p));
        let tree = PartitionTree::balanced(n, 4);
        let hf = HierFactor::compress(lu.clone(), &tree, 1e-12, 1e-15);

        let b = Mat::from_fn(n, 1, |i, _| (i % 5) as E + 1.);
        let mut x_h = b.clone();
        hf.solve_unit_lower(x_h.as_mut());
        hf.solve_upper(x_h.as_mut());

        let mut x_d = b.clone();
        dense::solve_unit_lower(lu.as_ref(), x_d.as_mut());
        dense::solve_upper(lu.as_ref(), x_d.as_mut());

        let err = &x_h - &x_d;
        assert!(err.norm_l2() < 1e-8 * x_d.norm_l2());
    }
}
