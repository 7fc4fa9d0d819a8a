//! # Sparsity Graph
//!
//! Compressed sparse row representation of the (symmetrized) structure of
//! the coefficient matrix. Used by the nested-dissection reordering and, when
//! compression is enabled, to recursively bisect each separator's induced
//! subgraph into the partition tree that fixes the low-rank tile boundaries.

use crate::ordering::bisection::two_way_partition;
use crate::sparse::csr::CsrMatrix;
use crate::I;

/// Recursive 2-way split of a separator, recorded as nested sizes.
///
/// Leaves are contiguous index ranges in the reordered separator; their
/// sizes are used as tile boundaries by the compressed front formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTree {
    pub size: I,
    pub children: Vec<PartitionTree>,
}

impl PartitionTree {
    pub fn new(size: I) -> Self {
        Self {
            size,
            children: Vec::new(),
        }
    }

    /// Balanced fallback partition for fronts that never went through
    /// separator reordering.
    pub fn balanced(size: I, leaf: I) -> Self {
        let mut tree = PartitionTree::new(size);
        if size > 2 * leaf.max(1) {
            let half = size / 2;
            tree.children = vec![
                PartitionTree::balanced(half, leaf),
                PartitionTree::balanced(size - half, leaf),
            ];
        }
        tree
    }

    /// Sizes of the leaves, left to right.
    pub fn leaf_sizes(&self) -> Vec<I> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<I>) {
        if self.children.is_empty() {
            out.push(self.size);
        } else {
            for c in &self.children {
                c.collect_leaves(out);
            }
        }
    }
}

/// Compressed sparse row graph over the vertices `[0, n)`.
#[derive(Debug, Clone)]
pub struct CsrGraph {
    ptr: Vec<I>,
    ind: Vec<I>,
}

impl CsrGraph {
    pub fn new(ptr: Vec<I>, ind: Vec<I>) -> Self {
        Self { ptr, ind }
    }

    /// Structure of `a`, which should have a symmetric pattern.
    pub fn from_matrix(a: &CsrMatrix) -> Self {
        Self {
            ptr: a.row_ptr().to_vec(),
            ind: a.col_ind().to_vec(),
        }
    }

    pub fn vertices(&self) -> I {
        self.ptr.len() - 1
    }

    pub fn edges(&self) -> I {
        self.ind.len()
    }

    pub fn neighbors(&self, v: I) -> &[I] {
        &self.ind[self.ptr[v]..self.ptr[v + 1]]
    }

    /// Recursively bisects the separator `[sep_begin, sep_end)`.
    ///
    /// Returns the new arrangement (new local position -> old global index)
    /// together with the partition tree describing the splits. With
    /// `conn_level == 1` the bisection also counts length-2 connections
    /// running through neighbors outside the separator.
    pub fn recursive_bisection(
        &self,
        leaf: I,
        conn_level: I,
        sep_begin: I,
        sep_end: I,
    ) -> (Vec<I>, PartitionTree) {
        let dim = sep_end - sep_begin;
        let leaf = leaf.max(1);
        if dim <= 2 * leaf {
            return ((sep_begin..sep_end).collect(), PartitionTree::new(dim));
        }
        let mut arrangement = Vec::with_capacity(dim);
        let mut local = vec![I::MAX; self.vertices()];
        let verts: Vec<I> = (sep_begin..sep_end).collect();
        let tree = self.split_recursive(
            leaf,
            conn_level,
            sep_begin,
            sep_end,
            verts,
            &mut local,
            &mut arrangement,
        );
        (arrangement, tree)
    }

    fn split_recursive(
        &self,
        leaf: I,
        conn_level: I,
        sep_begin: I,
        sep_end: I,
        verts: Vec<I>,
        local: &mut [I],
        out: &mut Vec<I>,
    ) -> PartitionTree {
        let mut tree = PartitionTree::new(verts.len());
        if verts.len() <= 2 * leaf {
            out.extend_from_slice(&verts);
            return tree;
        }
        let sg = self.extract_subgraph(conn_level, sep_begin, sep_end, &verts, local);
        let part = two_way_partition(&sg);
        let mut p0 = Vec::new();
        let mut p1 = Vec::new();
        for (k, &v) in verts.iter().enumerate() {
            if part[k] {
                p1.push(v);
            } else {
                p0.push(v);
            }
        }
        if p0.is_empty() || p1.is_empty() {
            out.extend_from_slice(&verts);
            return tree;
        }
        tree.children = vec![
            self.split_recursive(leaf, conn_level, sep_begin, sep_end, p0, local, out),
            self.split_recursive(leaf, conn_level, sep_begin, sep_end, p1, local, out),
        ];
        tree
    }

    /// Extracts the subgraph induced by `verts` (all inside
    /// `[sep_begin, sep_end)`), with local vertex numbering. When
    /// `conn_level > 0`, two vertices of the part also become adjacent if
    /// they share a neighbor outside the part.
    fn extract_subgraph(
        &self,
        conn_level: I,
        sep_begin: I,
        sep_end: I,
        verts: &[I],
        local: &mut [I],
    ) -> CsrGraph {
        for (k, &v) in verts.iter().enumerate() {
            local[v] = k;
        }
        let in_part = |v: I, local: &[I]| v >= sep_begin && v < sep_end && local[v] != I::MAX;
        let mut ptr = Vec::with_capacity(verts.len() + 1);
        let mut ind = Vec::new();
        let mut mark = vec![false; verts.len()];
        ptr.push(0);
        for &v in verts {
            for m in mark.iter_mut() {
                *m = false;
            }
            for &c in self.neighbors(v) {
                if c == v {
                    continue;
                }
                if in_part(c, local) {
                    let lc = local[c];
                    if !mark[lc] {
                        mark[lc] = true;
                        ind.push(lc);
                    }
                } else if conn_level > 0 {
                    for &cc in self.neighbors(c) {
                        if cc != v && in_part(cc, local) {
                            let lcc = local[cc];
                            if !mark[lcc] {
                                mark[lcc] = true;
                                ind.push(lcc);
                            }
                        }
                    }
                }
            }
            ptr.push(ind.len());
        }
        for &v in verts {
            local[v] = I::MAX;
        }
        CsrGraph::new(ptr, ind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::E;

    fn path_graph(n: I) -> CsrGraph {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 1. as E));
            if i + 1 < n {
                t.push((i, i + 1, 1.));
                t.push((i + 1, i, 1.));
            }
        }
        CsrGraph::from_matrix(&CsrMatrix::from_triplets(n, &t).unwrap())
    }

    #[test]
    fn test_partition_tree_leaves() {
        let tree = PartitionTree::balanced(100, 16);
        let leaves = tree.leaf_sizes();
        assert_eq!(leaves.iter().sum::<I>(), 100);
        assert!(leaves.iter().all(|&s| s <= 32));
    }

    #[test]
    fn test_recursive_bisection_is_a_permutation() {
        let g = path_graph(64);
        let (arrangement, tree) = g.recursive_bisection(4, 0, 8, 56);
        assert_eq!(arrangement.len(), 48);
        let mut sorted = arrangement.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (8..56).collect::<Vec<_>>());
        assert_eq!(tree.size, 48);
        assert_eq!(tree.leaf_sizes().iter().sum::<I>(), 48);
    }

    #[test]
    fn test_small_separator_is_a_single_leaf() {
        let g = path_graph(16);
        let (arrangement, tree) = g.recursive_bisection(8, 0, 0, 10);
        assert_eq!(arrangement, (0..10).collect::<Vec<_>>());
        assert!(tree.children.is_empty());
    }
}
