//! BiCGStab with the standard two-term recurrence; the preconditioner is
//! applied to the search and stabilization directions. A breakdown of the
//! recurrence surfaces as non-convergence at the current iterate.

use faer::{Col, ColMut, ColRef};

use crate::linalg::vector_ops::dot;
use crate::{E, I};

use super::NoConvergence;

#[allow(clippy::too_many_arguments)]
pub fn bicgstab(
    spmv: impl Fn(ColRef<'_, E>, ColMut<'_, E>),
    prec: impl Fn(ColMut<'_, E>),
    n: I,
    x: &mut Col<E>,
    b: ColRef<'_, E>,
    rel_tol: E,
    abs_tol: E,
    maxit: I,
    use_initial_guess: bool,
    verbose: bool,
) -> Result<I, NoConvergence> {
    if !use_initial_guess {
        for i in 0..n {
            x[i] = 0.;
        }
    }
    let mut r = Col::<E>::zeros(n);
    if use_initial_guess {
        let mut ax = Col::<E>::zeros(n);
        spmv(x.as_ref(), ax.as_mut());
        for i in 0..n {
            r[i] = b[i] - ax[i];
        }
    } else {
        for i in 0..n {
            r[i] = b[i];
        }
    }
    let r0 = r.clone();
    let rho0 = r.norm_l2();
    let tol = E::max(rel_tol * rho0, abs_tol);
    if rho0 <= tol {
        return Ok(0);
    }

    let mut rho = 1.;
    let mut alpha = 1.;
    let mut omega = 1.;
    let mut p = Col::<E>::zeros(n);
    let mut v = Col::<E>::zeros(n);
    let mut its = 0;

    while its < maxit {
        its += 1;
        let rho_next = dot(r0.as_ref(), r.as_ref());
        if rho_next == 0. {
            return Err(NoConvergence { iterations: its });
        }
        if its == 1 {
            p.copy_from(&r);
        } else {
            let beta = (rho_next / rho) * (alpha / omega);
            for i in 0..n {
                p[i] = r[i] + beta * (p[i] - omega * v[i]);
            }
        }
        rho = rho_next;

        let mut phat = p.clone();
        prec(phat.as_mut());
        spmv(phat.as_ref(), v.as_mut());
        alpha = rho / dot(r0.as_ref(), v.as_ref());

        let mut s = Col::<E>::zeros(n);
        for i in 0..n {
            s[i] = r[i] - alpha * v[i];
        }
        if s.norm_l2() <= tol {
            for i in 0..n {
                x[i] += alpha * phat[i];
            }
            return Ok(its);
        }

        let mut shat = s.clone();
        prec(shat.as_mut());
        let mut t = Col::<E>::zeros(n);
        spmv(shat.as_ref(), t.as_mut());
        let tt = dot(t.as_ref(), t.as_ref());
        omega = if tt > 0. { dot(t.as_ref(), s.as_ref()) / tt } else { 0. };
        if omega == 0. {
            return Err(NoConvergence { iterations: its });
        }

        for i in 0..n {
            x[i] += alpha * phat[i] + omega * shat[i];
            r[i] = s[i] - omega * t[i];
        }
        let res = r.norm_l2();
        if verbose {
            println!("BiCGStab it. {}\tres = {:e}\trel.res = {:e}", its, res, res / rho0);
        }
        if res <= tol {
            return Ok(its);
        }
    }
    Err(NoConvergence { iterations: its })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::csr::CsrMatrix;

    #[test]
    fn test_bicgstab_converges_on_spd_system() {
        let n = 32;
        let mut tr = Vec::new();
        for i in 0..n {
            tr.push((i, i, 3.));
            if i + 1 < n {
                tr.push((i, i + 1, -1.));
                tr.push((i + 1, i, -1.));
            }
        }
        let a = CsrMatrix::from_triplets(n, &tr).unwrap();
        let x_true: Vec<E> = (0..n).map(|i| ((i * 3) % 7) as E - 3.).collect();
        let mut bs = vec![0.; n];
        a.spmv(&x_true, &mut bs);
        let b = Col::from_fn(n, |i| bs[i]);
        let mut x = Col::<E>::zeros(n);
        let spmv = |xi: ColRef<'_, E>, mut yi: ColMut<'_, E>| {
            let xv: Vec<E> = (0..n).map(|i| xi[i]).collect();
            let mut yv = vec![0.; n];
            a.spmv(&xv, &mut yv);
            for i in 0..n {
                yi[i] = yv[i];
            }
        };
        let its = bicgstab(
            spmv,
            |_| {},
            n,
            &mut x,
            b.as_ref(),
            1e-12,
            1e-14,
            200,
            false,
            false,
        )
        .unwrap();
        assert!(its > 0 && its < 200);
        for i in 0..n {
            assert!((x[i] - x_true[i]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_bicgstab_honors_maxit() {
        // An indefinite permutation matrix stalls the recurrence.
        let a = CsrMatrix::from_triplets(4, &[(0, 1, 1.), (1, 0, 1.), (2, 3, 1.), (3, 2, 1.)])
            .unwrap();
        let b = Col::from_fn(4, |i| (i + 1) as E);
        let mut x = Col::<E>::zeros(4);
        let spmv = |xi: ColRef<'_, E>, mut yi: ColMut<'_, E>| {
            let xv: Vec<E> = (0..4).map(|i| xi[i]).collect();
            let mut yv = vec![0.; 4];
            a.spmv(&xv, &mut yv);
            for i in 0..4 {
                yi[i] = yv[i];
            }
        };
        let res = bicgstab(spmv, |_| {}, 4, &mut x, b.as_ref(), 1e-30, 0., 3, false, false);
        if let Err(e) = res {
            assert!(e.iterations <= 3);
        }
    }
}
