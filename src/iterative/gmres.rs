//! # Restarted GMRES
//!
//! Left-preconditioned GMRES(m) with Givens-rotation least squares and a
//! selectable orthogonalization scheme. Convergence is measured on the
//! preconditioned residual, relative to its initial norm, with an absolute
//! floor; within one restart cycle the residual norm never increases.

use faer::{Col, ColMut, ColRef, Mat};

use crate::linalg::vector_ops::dot;
use crate::options::GramSchmidtType;
use crate::{E, I};

use super::NoConvergence;

/// Solves `A x = b` with the operator `spmv(x, y) : y <- A x` and the left
/// preconditioner `prec(v) : v <- M^-1 v`. Returns the iteration count.
#[allow(clippy::too_many_arguments)]
pub fn gmres(
    spmv: impl Fn(ColRef<'_, E>, ColMut<'_, E>),
    prec: impl Fn(ColMut<'_, E>),
    n: I,
    x: &mut Col<E>,
    b: ColRef<'_, E>,
    rel_tol: E,
    abs_tol: E,
    maxit: I,
    restart: I,
    gram_schmidt: GramSchmidtType,
    use_initial_guess: bool,
    verbose: bool,
) -> Result<I, NoConvergence> {
    let m = restart.max(1);
    if !use_initial_guess {
        for i in 0..n {
            x[i] = 0.;
        }
    }
    let mut v: Vec<Col<E>> = Vec::with_capacity(m + 1);
    let mut h = Mat::<E>::zeros(m + 1, m);
    let mut cs = vec![0.; m];
    let mut sn = vec![0.; m];
    let mut g = vec![0.; m + 1];
    let mut its = 0;
    let mut rho0 = 0.;
    let mut tol = abs_tol;

    loop {
        // Preconditioned residual for this cycle.
        let mut r = Col::<E>::zeros(n);
        if its == 0 && !use_initial_guess {
            for i in 0..n {
                r[i] = b[i];
            }
        } else {
            let mut ax = Col::<E>::zeros(n);
            spmv(x.as_ref(), ax.as_mut());
            for i in 0..n {
                r[i] = b[i] - ax[i];
            }
        }
        prec(r.as_mut());
        let beta = r.norm_l2();
        if its == 0 {
            rho0 = beta;
            tol = E::max(rel_tol * rho0, abs_tol);
        }
        if beta <= tol {
            return Ok(its);
        }
        v.clear();
        v.push((1. / beta) * &r);
        g.iter_mut().for_each(|gi| *gi = 0.);
        g[0] = beta;

        let mut k_used = 0;
        let mut rho = beta;
        for k in 0..m {
            its += 1;
            let mut w = Col::<E>::zeros(n);
            spmv(v[k].as_ref(), w.as_mut());
            prec(w.as_mut());
            match gram_schmidt {
                GramSchmidtType::Modified => {
                    for i in 0..=k {
                        let hik = dot(v[i].as_ref(), w.as_ref());
                        h[(i, k)] = hik;
                        for l in 0..n {
                            w[l] -= hik * v[i][l];
                        }
                    }
                }
                GramSchmidtType::Classical => {
                    let coeffs: Vec<E> =
                        (0..=k).map(|i| dot(v[i].as_ref(), w.as_ref())).collect();
                    for (i, &hik) in coeffs.iter().enumerate() {
                        h[(i, k)] = hik;
                        for l in 0..n {
                            w[l] -= hik * v[i][l];
                        }
                    }
                }
            }
            let wn = w.norm_l2();
            h[(k + 1, k)] = wn;
            // Apply the accumulated rotations, then the new one.
            for i in 0..k {
                let t = cs[i] * h[(i, k)] + sn[i] * h[(i + 1, k)];
                h[(i + 1, k)] = -sn[i] * h[(i, k)] + cs[i] * h[(i + 1, k)];
                h[(i, k)] = t;
            }
            let denom = (h[(k, k)] * h[(k, k)] + wn * wn).sqrt();
            if denom > 0. {
                cs[k] = h[(k, k)] / denom;
                sn[k] = wn / denom;
            } else {
                cs[k] = 1.;
                sn[k] = 0.;
            }
            h[(k, k)] = cs[k] * h[(k, k)] + sn[k] * wn;
            h[(k + 1, k)] = 0.;
            g[k + 1] = -sn[k] * g[k];
            g[k] *= cs[k];
            rho = g[k + 1].abs();
            k_used = k + 1;
            if verbose {
                println!("GMRES it. {}\tres = {:e}\trel.res = {:e}", its, rho, rho / rho0);
            }
            if rho <= tol || its >= maxit || wn == 0. {
                break;
            }
            v.push((1. / wn) * &w);
        }

        // y <- H^-1 g, x <- x + V y.
        let mut y = vec![0.; k_used];
        for i in (0..k_used).rev() {
            let mut s = g[i];
            for j in i + 1..k_used {
                s -= h[(i, j)] * y[j];
            }
            y[i] = s / h[(i, i)];
        }
        for (j, &yj) in y.iter().enumerate() {
            for l in 0..n {
                x[l] += yj * v[j][l];
            }
        }
        if rho <= tol {
            return Ok(its);
        }
        if its >= maxit {
            return Err(NoConvergence { iterations: its });
        }
    }
}
