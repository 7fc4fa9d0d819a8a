//! # Fill-Reducing Reordering
//!
//! Holds the permutation produced by nested dissection together with the
//! separator tree driving the multifrontal factorization:
//! - [`geometric`]: recursive coordinate bisection when the matrix comes
//!   from a regular stencil.
//! - [`bisection`]: graph nested dissection for everything else.
//! - [`separator_reordering`]: when compression is enabled, rewrites the
//!   row order inside each separator along a recursive bisection of its
//!   induced subgraph and records the resulting partition trees for the
//!   compressed front formats.

pub mod bisection;
pub mod geometric;

use derive_more::{Display, Error};

use crate::sparse::csr::CsrMatrix;
use crate::sparse::graph::{CsrGraph, PartitionTree};
use crate::I;

#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum ReorderingError {
    #[display("nested dissection produced an invalid separator tree")]
    InvalidSeparatorTree,

    #[display("the geometry does not match the matrix dimension")]
    GeometryMismatch,
}

/// Post-order array of separators. The root is the last entry; the
/// separator ranges partition `[0, N)` of the permuted matrix.
#[derive(Debug, Clone, Default)]
pub struct SeparatorTree {
    pub sep_begin: Vec<I>,
    pub sep_end: Vec<I>,
    pub parent: Vec<Option<I>>,
    pub lchild: Vec<Option<I>>,
    pub rchild: Vec<Option<I>>,
}

impl SeparatorTree {
    pub fn separators(&self) -> I {
        self.sep_begin.len()
    }

    pub fn root(&self) -> I {
        self.sep_begin.len() - 1
    }
}

/// Builds a [`SeparatorTree`] during the dissection recursion; children
/// must be pushed before their parent so the array ends up post-ordered.
#[derive(Default)]
pub struct SeparatorTreeBuilder {
    tree: SeparatorTree,
}

impl SeparatorTreeBuilder {
    pub fn push(&mut self, begin: I, end: I, lchild: Option<I>, rchild: Option<I>) -> I {
        let id = self.tree.sep_begin.len();
        self.tree.sep_begin.push(begin);
        self.tree.sep_end.push(end);
        self.tree.parent.push(None);
        self.tree.lchild.push(lchild);
        self.tree.rchild.push(rchild);
        if let Some(l) = lchild {
            self.tree.parent[l] = Some(id);
        }
        if let Some(r) = rchild {
            self.tree.parent[r] = Some(id);
        }
        id
    }

    pub fn finish(self) -> SeparatorTree {
        self.tree
    }
}

/// Permutation, separator tree, and (after separator reordering) the
/// per-separator partition trees.
#[derive(Debug, Clone)]
pub struct MatrixReordering {
    /// `perm[old] = new`.
    pub perm: Vec<I>,
    /// `iperm[new] = old`; `perm[iperm[i]] == i`.
    pub iperm: Vec<I>,
    pub tree: SeparatorTree,
    /// Indexed by separator, present for separators that went through
    /// separator reordering.
    pub partition_trees: Vec<Option<PartitionTree>>,
}

/// Computes the fill-reducing ordering of `a`. The geometric code is used
/// when `(nx, ny, nz, components)` exactly tile the matrix and the stencil
/// is at most `width <= 3` wide; the graph partitioner handles everything
/// else.
pub fn nested_dissection(
    a: &CsrMatrix,
    nx: I,
    ny: I,
    nz: I,
    components: I,
    width: I,
    leaf: I,
) -> Result<MatrixReordering, ReorderingError> {
    let n = a.n();
    let geometric = nx.max(1) * ny.max(1) * nz.max(1) * components.max(1) == n
        && (nx > 1 || ny > 1 || nz > 1)
        && width >= 1
        && width <= 3;
    let (perm, iperm, tree) = if geometric {
        geometric::nested_dissection(nx.max(1), ny.max(1), nz.max(1), components.max(1), width, leaf)
    } else {
        bisection::nested_dissection(&CsrGraph::from_matrix(a), leaf)
    };
    let nsep = tree.separators();
    if nsep == 0 || tree.sep_end[tree.root()] != n {
        return Err(ReorderingError::InvalidSeparatorTree);
    }
    Ok(MatrixReordering {
        perm,
        iperm,
        tree,
        partition_trees: vec![None; nsep],
    })
}

/// Recursively bisects each separator of the already-permuted matrix `a`,
/// rewrites the local row order, and stores the per-separator partition
/// trees. Rows never move across separators, so the separator tree and the
/// symbolic structure of the factorization are computed afterwards against
/// the final order.
pub fn separator_reordering(nd: &mut MatrixReordering, a: &mut CsrMatrix, leaf: I, conn_level: I) {
    let n = a.n();
    let g = CsrGraph::from_matrix(a);
    let mut order = vec![0; n];
    for s in 0..nd.tree.separators() {
        let (begin, end) = (nd.tree.sep_begin[s], nd.tree.sep_end[s]);
        let (arrangement, ptree) = g.recursive_bisection(leaf, conn_level, begin, end);
        for (p, &old) in arrangement.iter().enumerate() {
            order[old] = begin + p;
        }
        nd.partition_trees[s] = Some(ptree);
    }
    let mut iorder = vec![0; n];
    for (old, &new) in order.iter().enumerate() {
        iorder[new] = old;
    }
    a.permute(&order, &iorder);
    // Fold the local rearrangement into the stored permutation.
    for p in nd.perm.iter_mut() {
        *p = order[*p];
    }
    let old_iperm = nd.iperm.clone();
    for new in 0..n {
        nd.iperm[new] = old_iperm[iorder[new]];
    }
}
