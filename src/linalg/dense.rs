//! # Dense Factorization Kernels
//!
//! LU with partial row pivoting plus the pivot application and triangular
//! solves needed by the partial factorization of a front. The elimination
//! loops are written against column-major storage; the triangular and
//! matrix-matrix solves delegate to faer.

use derive_more::{Display, Error};
use faer::linalg::triangular_solve;
use faer::prelude::ReborrowMut;
use faer::{Mat, MatMut, MatRef, Par};

use crate::{E, I};

/// A pivot column whose largest entry is below the singularity threshold.
#[derive(Debug, Display, Error, PartialEq, Eq)]
#[display("zero pivot in column {col}")]
pub struct SingularPivot {
    pub col: I,
}

/// Factors `a = P * L * U` in place with partial row pivoting.
///
/// On return the strict lower triangle of `a` holds the unit-lower factor
/// and the upper triangle holds `U`. `piv[k]` records the row swapped into
/// position `k` at step `k`. A pivot column whose largest candidate is at
/// or below `threshold` times the largest entry of the input matrix fails
/// with [`SingularPivot`].
pub fn getrf(a: &mut Mat<E>, piv: &mut Vec<I>, threshold: E) -> Result<(), SingularPivot> {
    let n = a.nrows();
    piv.clear();
    piv.reserve(n);
    let mut amax = 0.;
    for j in 0..n {
        for i in 0..n {
            amax = E::max(amax, a[(i, j)].abs());
        }
    }
    for k in 0..n {
        let mut p = k;
        let mut pmax = a[(k, k)].abs();
        for r in k + 1..n {
            let v = a[(r, k)].abs();
            if v > pmax {
                pmax = v;
                p = r;
            }
        }
        if pmax <= threshold * amax {
            return Err(SingularPivot { col: k });
        }
        if p != k {
            swap_rows(a.as_mut(), k, p);
        }
        piv.push(p);
        let d = a[(k, k)];
        for r in k + 1..n {
            a[(r, k)] /= d;
        }
        for j in k + 1..n {
            let u = a[(k, j)];
            if u != 0. {
                for r in k + 1..n {
                    let l = a[(r, k)];
                    a[(r, j)] -= l * u;
                }
            }
        }
    }
    Ok(())
}

/// Applies the row interchanges recorded by [`getrf`] to `b`.
pub fn laswp(mut b: MatMut<'_, E>, piv: &[I]) {
    for (k, &p) in piv.iter().enumerate() {
        if p != k {
            swap_rows(b.rb_mut(), k, p);
        }
    }
}

pub fn swap_rows(mut m: MatMut<'_, E>, r1: I, r2: I) {
    if r1 == r2 {
        return;
    }
    for j in 0..m.ncols() {
        let t = m[(r1, j)];
        m[(r1, j)] = m[(r2, j)];
        m[(r2, j)] = t;
    }
}

/// `rhs <- L^-1 rhs` with `L` the unit-lower factor stored in `lu`.
pub fn solve_unit_lower(lu: MatRef<'_, E>, rhs: MatMut<'_, E>) {
    triangular_solve::solve_unit_lower_triangular_in_place(lu, rhs, Par::Seq);
}

/// `rhs <- U^-1 rhs` with `U` the upper factor stored in `lu`.
pub fn solve_upper(lu: MatRef<'_, E>, rhs: MatMut<'_, E>) {
    triangular_solve::solve_upper_triangular_in_place(lu, rhs, Par::Seq);
}

/// `x <- x U^-1`, solving from the right through the transposed system.
pub fn solve_upper_from_right(lu: MatRef<'_, E>, x: &mut Mat<E>) {
    let mut xt = x.as_ref().transpose().to_owned();
    triangular_solve::solve_lower_triangular_in_place(lu.transpose(), xt.as_mut(), Par::Seq);
    *x = xt.as_ref().transpose().to_owned();
}
