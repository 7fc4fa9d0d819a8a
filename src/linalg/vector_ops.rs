use faer::{unzip, zip, ColRef, MatRef};

use crate::E;

pub(crate) fn dot(x: ColRef<'_, E>, y: ColRef<'_, E>) -> E {
    let mut acc = 0.;
    zip!(x, y).for_each(|unzip!(x, y)| acc += *x * *y);
    acc
}

/// Largest column norm of `m`, used for per-column convergence checks.
pub(crate) fn max_col_norm(m: MatRef<'_, E>) -> E {
    let mut worst = 0.;
    for j in 0..m.ncols() {
        worst = E::max(worst, m.col(j).norm_l2());
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::{Col, Mat};

    #[test]
    fn test_dot() {
        let x = Col::from_fn(3, |i| (i + 1) as E);
        let y = Col::from_fn(3, |i| (i + 1) as E);
        assert_eq!(dot(x.as_ref(), y.as_ref()), 14.);
    }

    #[test]
    fn test_max_col_norm() {
        let m = Mat::from_fn(2, 2, |i, j| if j == 1 { (i + 3) as E } else { 1. });
        assert_eq!(max_col_norm(m.as_ref()), 25f64.sqrt());
    }
}
