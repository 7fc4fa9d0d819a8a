//! Geometric nested dissection for matrices coming from a regular
//! `nx x ny x nz` stencil with at most `components` unknowns per grid point
//! and a separator `width` matching the stencil width.

use crate::I;

use super::{SeparatorTree, SeparatorTreeBuilder};

#[derive(Clone, Copy)]
struct Grid {
    nx: I,
    ny: I,
    components: I,
}

impl Grid {
    fn id(&self, x: I, y: I, z: I, c: I) -> I {
        (((z * self.ny) + y) * self.nx + x) * self.components + c
    }
}

#[derive(Clone, Copy)]
struct Boxed {
    x: (I, I),
    y: (I, I),
    z: (I, I),
}

impl Boxed {
    fn points(&self) -> I {
        (self.x.1 - self.x.0) * (self.y.1 - self.y.0) * (self.z.1 - self.z.0)
    }

    fn longest_dim(&self) -> usize {
        let lens = [self.x.1 - self.x.0, self.y.1 - self.y.0, self.z.1 - self.z.0];
        let mut d = 0;
        for k in 1..3 {
            if lens[k] > lens[d] {
                d = k;
            }
        }
        d
    }

    fn range(&self, d: usize) -> (I, I) {
        [self.x, self.y, self.z][d]
    }

    fn with_range(mut self, d: usize, r: (I, I)) -> Self {
        match d {
            0 => self.x = r,
            1 => self.y = r,
            _ => self.z = r,
        }
        self
    }
}

/// Recursive coordinate bisection of the grid. Returns `perm`
/// (`perm[old] = new`), its inverse and the post-order separator tree.
pub fn nested_dissection(
    nx: I,
    ny: I,
    nz: I,
    components: I,
    width: I,
    leaf: I,
) -> (Vec<I>, Vec<I>, SeparatorTree) {
    let grid = Grid { nx, ny, components };
    let n = nx * ny * nz * components;
    let mut perm = vec![0; n];
    let mut builder = SeparatorTreeBuilder::default();
    let mut next = 0;
    let all = Boxed {
        x: (0, nx),
        y: (0, ny),
        z: (0, nz),
    };
    dissect(&grid, width.max(1), leaf.max(1), all, &mut next, &mut perm, &mut builder);
    let mut iperm = vec![0; n];
    for (old, &new) in perm.iter().enumerate() {
        iperm[new] = old;
    }
    (perm, iperm, builder.finish())
}

fn number_box(grid: &Grid, b: Boxed, next: &mut I, perm: &mut [I]) {
    for z in b.z.0..b.z.1 {
        for y in b.y.0..b.y.1 {
            for x in b.x.0..b.x.1 {
                for c in 0..grid.components {
                    perm[grid.id(x, y, z, c)] = *next;
                    *next += 1;
                }
            }
        }
    }
}

fn dissect(
    grid: &Grid,
    width: I,
    leaf: I,
    b: Boxed,
    next: &mut I,
    perm: &mut [I],
    builder: &mut SeparatorTreeBuilder,
) -> I {
    let d = b.longest_dim();
    let (lo, hi) = b.range(d);
    // A split needs room for two nonempty halves around the separator
    // plane.
    if b.points() * grid.components <= leaf || hi - lo < width + 2 {
        let begin = *next;
        number_box(grid, b, next, perm);
        return builder.push(begin, *next, None, None);
    }
    let mid = lo + (hi - lo - width) / 2;
    let left = dissect(grid, width, leaf, b.with_range(d, (lo, mid)), next, perm, builder);
    let right = dissect(
        grid,
        width,
        leaf,
        b.with_range(d, (mid + width, hi)),
        next,
        perm,
        builder,
    );
    let begin = *next;
    number_box(grid, b.with_range(d, (mid, mid + width)), next, perm);
    builder.push(begin, *next, Some(left), Some(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_nd_is_a_permutation() {
        let (perm, iperm, tree) = nested_dissection(8, 8, 1, 1, 1, 4);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>());
        for i in 0..64 {
            assert_eq!(perm[iperm[i]], i);
        }
        assert_eq!(tree.sep_end[tree.root()], 64);
    }

    #[test]
    fn test_separator_planes_number_last() {
        let (_, _, tree) = nested_dissection(8, 1, 1, 1, 1, 2);
        // Root separator is the middle plane, numbered after both halves.
        let root = tree.root();
        assert_eq!(tree.sep_end[root], 8);
        assert_eq!(tree.sep_end[root] - tree.sep_begin[root], 1);
        let (l, r) = (tree.lchild[root].unwrap(), tree.rchild[root].unwrap());
        assert!(tree.sep_end[l] <= tree.sep_begin[root]);
        assert!(tree.sep_end[r] <= tree.sep_begin[root]);
    }

    #[test]
    fn test_components_are_kept_together() {
        let (perm, _, _) = nested_dissection(4, 1, 1, 2, 1, 2);
        for p in 0..4 {
            // The two unknowns of one grid point stay adjacent.
            assert_eq!(perm[2 * p] + 1, perm[2 * p + 1]);
        }
    }
}
