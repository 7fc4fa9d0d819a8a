//! Iterative refinement with the multifrontal factorization acting as an
//! approximate inverse. Handles a block of right-hand sides at once; the
//! stopping test is per column.

use faer::Mat;

use crate::linalg::vector_ops::max_col_norm;
use crate::sparse::csr::CsrMatrix;
use crate::{E, I};

use super::NoConvergence;

/// Refines `x` until `|r_j| <= rel_tol * |b_j| + abs_tol` for every column
/// `j`, where `r = b - A x`. `direct_solve` applies the factorization in
/// place.
pub fn iterative_refinement(
    a: &CsrMatrix,
    direct_solve: impl Fn(&mut Mat<E>),
    x: &mut Mat<E>,
    b: &Mat<E>,
    rel_tol: E,
    abs_tol: E,
    maxit: I,
    use_initial_guess: bool,
    verbose: bool,
) -> Result<I, NoConvergence> {
    let k = b.ncols();
    if !use_initial_guess {
        for j in 0..k {
            for i in 0..b.nrows() {
                x[(i, j)] = 0.;
            }
        }
    }
    let bnorms: Vec<E> = (0..k).map(|j| b.col(j).norm_l2()).collect();
    let mut its = 0;
    loop {
        let mut r = Mat::<E>::zeros(b.nrows(), k);
        a.spmv_mat(x, &mut r);
        for j in 0..k {
            for i in 0..b.nrows() {
                r[(i, j)] = b[(i, j)] - r[(i, j)];
            }
        }
        let converged = (0..k).all(|j| r.col(j).norm_l2() <= rel_tol * bnorms[j] + abs_tol);
        if verbose {
            println!("REFINEMENT it. {}\tres = {:e}", its, max_col_norm(r.as_ref()));
        }
        if converged {
            return Ok(its);
        }
        if its >= maxit {
            return Err(NoConvergence { iterations: its });
        }
        its += 1;
        direct_solve(&mut r);
        for j in 0..k {
            for i in 0..b.nrows() {
                x[(i, j)] += r[(i, j)];
            }
        }
    }
}
