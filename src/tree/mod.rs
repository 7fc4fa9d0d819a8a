//! # Elimination Tree
//!
//! The forest of frontal nodes driving the numeric phases:
//! - Symbolic factorization computes each node's update set bottom-up over
//!   the post-ordered separator tree.
//! - The factorization driver traverses the tree in post-order, assembling
//!   every front from the matrix and the children's Schur complements
//!   before its partial factorization.
//! - The multifrontal solve runs the forward sweep in post-order and the
//!   backward sweep in pre-order, moving right-hand-side updates along the
//!   same index maps used during assembly.
//!
//! Nodes own their children; counters travel in a [`FactorStats`] context
//! threaded through the traversals.

use faer::Mat;

use crate::front::{
    create_front, is_compressed, FactorError, FactorStats, Front, FrontCounter, FrontalMatrix,
};
use crate::options::SolverOptions;
use crate::ordering::MatrixReordering;
use crate::sparse::csr::CsrMatrix;
use crate::{E, I};

pub(crate) struct FrontalNode {
    pub sep_begin: I,
    pub sep_end: I,
    pub upd: Vec<I>,
    pub front: FrontalMatrix,
    pub lchild: Option<Box<FrontalNode>>,
    pub rchild: Option<Box<FrontalNode>>,
}

impl FrontalNode {
    pub fn dim_sep(&self) -> I {
        self.sep_end - self.sep_begin
    }

    pub fn dim_upd(&self) -> I {
        self.upd.len()
    }
}

/// Position of every child update index inside the parent's
/// separator-plus-update indexing. A single merge scan; ties cannot occur
/// because separators and update sets are disjoint.
pub(crate) fn upd_to_parent(
    child_upd: &[I],
    sep_begin: I,
    sep_end: I,
    parent_upd: &[I],
) -> Vec<I> {
    let ds = sep_end - sep_begin;
    let mut map = Vec::with_capacity(child_upd.len());
    let mut u = 0;
    for &g in child_upd {
        if g < sep_end {
            debug_assert!(g >= sep_begin);
            map.push(g - sep_begin);
        } else {
            while parent_upd[u] < g {
                u += 1;
            }
            debug_assert_eq!(parent_upd[u], g);
            map.push(ds + u);
        }
    }
    map
}

/// Update sets for all separators, bottom-up over the post-order array:
/// the sorted union of the children's update sets and the row structure of
/// the separator beyond its own range, minus the separator range itself.
fn symbolic_update_sets(a: &CsrMatrix, nd: &MatrixReordering) -> Vec<Vec<I>> {
    let tree = &nd.tree;
    let nsep = tree.separators();
    let mut upds: Vec<Vec<I>> = vec![Vec::new(); nsep];
    for s in 0..nsep {
        let (begin, end) = (tree.sep_begin[s], tree.sep_end[s]);
        let mut direct: Vec<I> = Vec::new();
        for i in begin..end {
            for k in a.row_ptr()[i]..a.row_ptr()[i + 1] {
                let j = a.col_ind()[k];
                if j >= end {
                    direct.push(j);
                }
            }
        }
        direct.sort_unstable();
        direct.dedup();
        let mut merged = direct;
        for ch in [tree.lchild[s], tree.rchild[s]].into_iter().flatten() {
            merged = merge_sorted(&merged, &upds[ch]);
        }
        merged.retain(|&j| j < begin || j >= end);
        upds[s] = merged;
    }
    upds
}

fn merge_sorted(a: &[I], b: &[I]) -> Vec<I> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

pub struct EliminationTree {
    root: Box<FrontalNode>,
    fc: FrontCounter,
    stats: FactorStats,
}

impl EliminationTree {
    /// Symbolic factorization: computes the update sets against the
    /// permuted matrix and instantiates a front for every separator.
    pub fn new(opts: &SolverOptions, a: &CsrMatrix, nd: &MatrixReordering) -> Self {
        let mut upds = symbolic_update_sets(a, nd);
        let mut fc = FrontCounter::default();
        let root = Self::build_node(opts, nd, &mut upds, nd.tree.root(), true, &mut fc);
        Self {
            root,
            fc,
            stats: FactorStats::default(),
        }
    }

    fn build_node(
        opts: &SolverOptions,
        nd: &MatrixReordering,
        upds: &mut Vec<Vec<I>>,
        s: I,
        compressed_parent: bool,
        fc: &mut FrontCounter,
    ) -> Box<FrontalNode> {
        let (begin, end) = (nd.tree.sep_begin[s], nd.tree.sep_end[s]);
        let upd = std::mem::take(&mut upds[s]);
        let compressed = is_compressed(end - begin, upd.len(), compressed_parent, opts);
        let front = create_front(
            opts,
            end - begin,
            upd.len(),
            nd.partition_trees[s].as_ref(),
            compressed_parent,
            fc,
        );
        let lchild = nd.tree.lchild[s].map(|c| Self::build_node(opts, nd, upds, c, compressed, fc));
        let rchild = nd.tree.rchild[s].map(|c| Self::build_node(opts, nd, upds, c, compressed, fc));
        Box::new(FrontalNode {
            sep_begin: begin,
            sep_end: end,
            upd,
            front,
            lchild,
            rchild,
        })
    }

    pub fn front_counter(&self) -> FrontCounter {
        self.fc
    }

    /// Post-order numeric factorization of every front.
    pub fn multifrontal_factorization(
        &mut self,
        a: &CsrMatrix,
    ) -> Result<(), FactorError> {
        let mut stats = FactorStats::default();
        factor_node(&mut self.root, a, &mut stats)?;
        self.stats = stats;
        Ok(())
    }

    /// Forward then backward sweep on a block of right-hand sides given in
    /// factorization order.
    pub fn multifrontal_solve(&self, b: &mut Mat<E>) {
        let bupd = forward_solve(&self.root, b);
        backward_solve(&self.root, b, bupd);
    }

    pub fn factor_nonzeros(&self) -> I {
        self.stats.factor_nonzeros
    }

    pub fn maximum_rank(&self) -> I {
        self.stats.maximum_rank
    }

    pub fn flops(&self) -> u64 {
        self.stats.flops
    }

    /// Factor nonzeros an exact dense solver would store; used to report
    /// the compression ratio.
    pub fn dense_factor_nonzeros(&self) -> I {
        fn rec(n: &FrontalNode) -> I {
            let own = n.dim_sep() * n.dim_sep() + 2 * n.dim_sep() * n.dim_upd();
            own + n.lchild.as_deref().map_or(0, rec) + n.rchild.as_deref().map_or(0, rec)
        }
        rec(&self.root)
    }
}

fn factor_node(
    node: &mut FrontalNode,
    a: &CsrMatrix,
    stats: &mut FactorStats,
) -> Result<(), FactorError> {
    if let Some(ch) = &mut node.lchild {
        factor_node(ch, a, stats)?;
    }
    if let Some(ch) = &mut node.rchild {
        factor_node(ch, a, stats)?;
    }
    let FrontalNode {
        sep_begin,
        sep_end,
        upd,
        front,
        lchild,
        rchild,
    } = node;
    front.build(a, *sep_begin, *sep_end, upd)?;
    for ch in [lchild.as_deref_mut(), rchild.as_deref_mut()].into_iter().flatten() {
        let map = upd_to_parent(&ch.upd, *sep_begin, *sep_end, upd);
        front.extend_add(ch.front.f22(), &map);
        ch.front.release_work_memory();
    }
    front.partial_factor(stats)
}

/// Post-order forward substitution. Returns this node's post-solve update
/// contribution; the children's contributions are consumed here.
fn forward_solve(node: &FrontalNode, b: &mut Mat<E>) -> Mat<E> {
    let k = b.ncols();
    let ds = node.dim_sep();
    let mut bupd = Mat::<E>::zeros(node.dim_upd(), k);
    for ch in [node.lchild.as_deref(), node.rchild.as_deref()].into_iter().flatten() {
        let cb = forward_solve(ch, b);
        let map = upd_to_parent(&ch.upd, node.sep_begin, node.sep_end, &node.upd);
        for (r, &m) in map.iter().enumerate() {
            for j in 0..k {
                if m < ds {
                    b[(node.sep_begin + m, j)] += cb[(r, j)];
                } else {
                    bupd[(m - ds, j)] += cb[(r, j)];
                }
            }
        }
    }
    node.front.fwd_solve(
        b.as_mut().subrows_mut(node.sep_begin, ds),
        bupd.as_mut(),
    );
    bupd
}

/// Pre-order backward substitution: solve this separator, then hand each
/// child the slice of the solution its update set references.
fn backward_solve(node: &FrontalNode, y: &mut Mat<E>, yupd: Mat<E>) {
    let k = y.ncols();
    let ds = node.dim_sep();
    node.front.bwd_solve(
        y.as_mut().subrows_mut(node.sep_begin, ds),
        yupd.as_ref(),
    );
    for ch in [node.lchild.as_deref(), node.rchild.as_deref()].into_iter().flatten() {
        let map = upd_to_parent(&ch.upd, node.sep_begin, node.sep_end, &node.upd);
        let mut cupd = Mat::<E>::zeros(ch.dim_upd(), k);
        for (r, &m) in map.iter().enumerate() {
            for j in 0..k {
                cupd[(r, j)] = if m < ds {
                    y[(node.sep_begin + m, j)]
                } else {
                    yupd[(m - ds, j)]
                };
            }
        }
        backward_solve(ch, y, cupd);
    }
}
