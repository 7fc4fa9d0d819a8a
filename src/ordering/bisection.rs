//! Graph nested dissection by recursive two-way partitioning.
//!
//! Stands in for an external graph partitioner: level sets grown from a
//! pseudo-peripheral vertex are cut at the median, and the boundary
//! vertices of the cut form the vertex separator. Produces the same
//! post-order separator-tree contract an external package would.

use crate::sparse::graph::CsrGraph;
use crate::I;

use super::{SeparatorTree, SeparatorTreeBuilder};

/// Breadth-first level of every vertex of `g` reachable from `start`,
/// `I::MAX` for unreachable ones. Returns the levels and the last vertex
/// visited (a vertex of maximal level).
fn bfs_levels(g: &CsrGraph, start: I) -> (Vec<I>, I) {
    let mut level = vec![I::MAX; g.vertices()];
    let mut queue = std::collections::VecDeque::new();
    level[start] = 0;
    queue.push_back(start);
    let mut last = start;
    while let Some(v) = queue.pop_front() {
        last = v;
        for &w in g.neighbors(v) {
            if w != v && level[w] == I::MAX {
                level[w] = level[v] + 1;
                queue.push_back(w);
            }
        }
    }
    (level, last)
}

/// Splits the vertices of `g` in two halves of roughly equal size.
///
/// Used during separator reordering to build the partition trees that fix
/// compression tile boundaries; `true` marks the second half.
pub fn two_way_partition(g: &CsrGraph) -> Vec<bool> {
    let n = g.vertices();
    if n <= 1 {
        return vec![false; n];
    }
    // Double BFS towards a pseudo-peripheral vertex.
    let (_, far) = bfs_levels(g, 0);
    let (level, _) = bfs_levels(g, far);
    let maxlev = level.iter().filter(|&&l| l != I::MAX).max().copied().unwrap_or(0);
    // Cut at the level where the cumulative count passes one half;
    // unreachable vertices land in the second part.
    let mut count = vec![0; maxlev + 2];
    for &l in &level {
        if l != I::MAX {
            count[l] += 1;
        }
    }
    let mut cut = maxlev;
    let mut cum = 0;
    for (l, &c) in count.iter().enumerate() {
        cum += c;
        if 2 * cum >= n {
            cut = l;
            break;
        }
    }
    let part: Vec<bool> = level.iter().map(|&l| l == I::MAX || l > cut).collect();
    if part.iter().all(|&p| p) || part.iter().all(|&p| !p) {
        // Degenerate cut; fall back to an even index split.
        return (0..n).map(|v| 2 * v >= n).collect();
    }
    part
}

/// Nested dissection of the whole graph. Returns `perm` (`perm[old] = new`),
/// its inverse, and the post-order separator tree.
pub fn nested_dissection(g: &CsrGraph, leaf: I) -> (Vec<I>, Vec<I>, SeparatorTree) {
    let n = g.vertices();
    let mut perm = vec![0; n];
    let mut builder = SeparatorTreeBuilder::default();
    let mut scratch = vec![I::MAX; n];
    let mut next = 0;
    let verts: Vec<I> = (0..n).collect();
    dissect(g, leaf.max(1), verts, &mut next, &mut perm, &mut builder, &mut scratch);
    let mut iperm = vec![0; n];
    for (old, &new) in perm.iter().enumerate() {
        iperm[new] = old;
    }
    (perm, iperm, builder.finish())
}

fn dissect(
    g: &CsrGraph,
    leaf: I,
    verts: Vec<I>,
    next: &mut I,
    perm: &mut [I],
    builder: &mut SeparatorTreeBuilder,
    scratch: &mut [I],
) -> I {
    if verts.len() > leaf {
        if let Some((a, b, sep)) = vertex_separator(g, &verts, scratch) {
            let l = dissect(g, leaf, a, next, perm, builder, scratch);
            let r = dissect(g, leaf, b, next, perm, builder, scratch);
            let begin = *next;
            for &v in &sep {
                perm[v] = *next;
                *next += 1;
            }
            return builder.push(begin, *next, Some(l), Some(r));
        }
    }
    let begin = *next;
    for &v in &verts {
        perm[v] = *next;
        *next += 1;
    }
    builder.push(begin, *next, None, None)
}

/// Splits `verts` into two parts plus a vertex separator. `None` when the
/// set cannot be split into two nonempty parts.
fn vertex_separator(
    g: &CsrGraph,
    verts: &[I],
    scratch: &mut [I],
) -> Option<(Vec<I>, Vec<I>, Vec<I>)> {
    // Local BFS restricted to `verts`; scratch holds levels keyed by
    // global vertex, I::MAX - 1 marking membership with no level yet.
    const UNSEEN: I = I::MAX - 1;
    for &v in verts {
        scratch[v] = UNSEEN;
    }
    let bfs = |start: I, scratch: &mut [I]| -> I {
        let mut queue = std::collections::VecDeque::new();
        scratch[start] = 0;
        queue.push_back(start);
        let mut last = start;
        while let Some(v) = queue.pop_front() {
            last = v;
            for &w in g.neighbors(v) {
                if w != v && scratch[w] == UNSEEN {
                    scratch[w] = scratch[v] + 1;
                    queue.push_back(w);
                }
            }
        }
        last
    };
    let far = bfs(verts[0], scratch);
    // Second sweep from the far end for flatter level sets.
    for &v in verts {
        if scratch[v] != UNSEEN {
            scratch[v] = UNSEEN;
        }
    }
    bfs(far, scratch);

    let reached: Vec<I> = verts.iter().copied().filter(|&v| scratch[v] != UNSEEN).collect();
    let result = if reached.len() < verts.len() {
        // Disconnected: reached component against the rest, with a single
        // borrowed vertex acting as the (already disconnected) separator.
        let mut rest: Vec<I> = verts.iter().copied().filter(|&v| scratch[v] == UNSEEN).collect();
        let sep = vec![rest.pop().unwrap()];
        if reached.is_empty() || rest.is_empty() {
            None
        } else {
            Some((reached, rest, sep))
        }
    } else {
        let maxlev = reached.iter().map(|&v| scratch[v]).max().unwrap_or(0);
        if maxlev < 2 {
            // Too shallow to cut; the caller keeps the set as a leaf.
            None
        } else {
            let mut count = vec![0; maxlev + 1];
            for &v in &reached {
                count[scratch[v]] += 1;
            }
            let mut cut = 1;
            let mut cum = 0;
            for l in 0..maxlev {
                cum += count[l];
                if 2 * cum >= verts.len() {
                    cut = l.max(1);
                    break;
                }
            }
            let mut a = Vec::new();
            let mut b = Vec::new();
            let mut sep = Vec::new();
            for &v in verts {
                let l = scratch[v];
                if l < cut {
                    a.push(v);
                } else if l > cut {
                    b.push(v);
                } else if g.neighbors(v).iter().any(|&w| w != v && scratch[w] != I::MAX && scratch[w] == cut + 1) {
                    sep.push(v);
                } else {
                    a.push(v);
                }
            }
            if a.is_empty() || b.is_empty() || sep.is_empty() {
                None
            } else {
                Some((a, b, sep))
            }
        }
    };
    for &v in verts {
        scratch[v] = I::MAX;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::csr::CsrMatrix;
    use crate::E;

    fn grid_graph(nx: I, ny: I) -> CsrGraph {
        let idx = |x: I, y: I| y * nx + x;
        let mut t = Vec::new();
        for y in 0..ny {
            for x in 0..nx {
                t.push((idx(x, y), idx(x, y), 1. as E));
                if x + 1 < nx {
                    t.push((idx(x, y), idx(x + 1, y), 1.));
                    t.push((idx(x + 1, y), idx(x, y), 1.));
                }
                if y + 1 < ny {
                    t.push((idx(x, y), idx(x, y + 1), 1.));
                    t.push((idx(x, y + 1), idx(x, y), 1.));
                }
            }
        }
        CsrGraph::from_matrix(&CsrMatrix::from_triplets(nx * ny, &t).unwrap())
    }

    #[test]
    fn test_nested_dissection_produces_a_permutation() {
        let g = grid_graph(6, 6);
        let (perm, iperm, tree) = nested_dissection(&g, 4);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..36).collect::<Vec<_>>());
        for i in 0..36 {
            assert_eq!(perm[iperm[i]], i);
        }
        // Separators partition [0, N) and are post-ordered.
        let mut covered = vec![false; 36];
        for s in 0..tree.separators() {
            assert!(tree.sep_begin[s] < tree.sep_end[s]);
            for k in tree.sep_begin[s]..tree.sep_end[s] {
                assert!(!covered[k]);
                covered[k] = true;
            }
            if let Some(p) = tree.parent[s] {
                assert!(p > s);
                assert!(tree.sep_begin[p] >= tree.sep_end[s]);
            }
        }
        assert!(covered.iter().all(|&c| c));
        assert_eq!(tree.root(), tree.separators() - 1);
    }

    #[test]
    fn test_two_way_partition_balances() {
        let g = grid_graph(8, 8);
        let part = two_way_partition(&g);
        let ones = part.iter().filter(|&&p| p).count();
        assert!(ones >= 16 && ones <= 48);
    }

    #[test]
    fn test_disconnected_graph_is_handled() {
        // Two disjoint paths.
        let mut t = Vec::new();
        for i in 0..8 {
            t.push((i, i, 1. as E));
        }
        for i in 0..3 {
            t.push((i, i + 1, 1.));
            t.push((i + 1, i, 1.));
        }
        for i in 4..7 {
            t.push((i, i + 1, 1.));
            t.push((i + 1, i, 1.));
        }
        let g = CsrGraph::from_matrix(&CsrMatrix::from_triplets(8, &t).unwrap());
        let (perm, _, tree) = nested_dissection(&g, 2);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
        assert!(tree.separators() >= 1);
    }
}
