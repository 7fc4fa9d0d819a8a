//! End-to-end scenarios exercising the full set-matrix / reorder / factor /
//! solve pipeline, including the compression variants and the matching
//! branches.

use faer::Mat;
use rstest::rstest;
use rstest_reuse::{self, apply, template};

use crate::options::{CompressionType, KrylovSolver, MatchingJob};
use crate::sparse::csr::CsrMatrix;
use crate::{ReturnCode, SparseSolver, E, I};

fn identity(n: I) -> Vec<(I, I, E)> {
    (0..n).map(|i| (i, i, 1.)).collect()
}

fn laplacian_2d(nx: I, ny: I) -> Vec<(I, I, E)> {
    let idx = |x: I, y: I| y * nx + x;
    let mut t = Vec::new();
    for y in 0..ny {
        for x in 0..nx {
            t.push((idx(x, y), idx(x, y), 4.));
            if x + 1 < nx {
                t.push((idx(x, y), idx(x + 1, y), -1.));
                t.push((idx(x + 1, y), idx(x, y), -1.));
            }
            if y + 1 < ny {
                t.push((idx(x, y), idx(x, y + 1), -1.));
                t.push((idx(x, y + 1), idx(x, y), -1.));
            }
        }
    }
    t
}

fn tridiagonal(n: I) -> Vec<(I, I, E)> {
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 2.));
        if i + 1 < n {
            t.push((i, i + 1, -1.));
            t.push((i + 1, i, -1.));
        }
    }
    t
}

fn rhs_for(triplets: &[(I, I, E)], n: I, x: &Mat<E>) -> Mat<E> {
    let a = CsrMatrix::from_triplets(n, triplets).unwrap();
    let mut b = Mat::<E>::zeros(n, x.ncols());
    a.spmv_mat(x, &mut b);
    b
}

fn residual(triplets: &[(I, I, E)], n: I, x: &Mat<E>, b: &Mat<E>) -> E {
    let a = CsrMatrix::from_triplets(n, triplets).unwrap();
    let mut ax = Mat::<E>::zeros(n, x.ncols());
    a.spmv_mat(x, &mut ax);
    let mut worst = 0.;
    for j in 0..b.ncols() {
        let mut r = 0.;
        for i in 0..n {
            r += (b[(i, j)] - ax[(i, j)]) * (b[(i, j)] - ax[(i, j)]);
        }
        worst = E::max(worst, r.sqrt());
    }
    worst
}

#[test]
fn test_identity_direct() {
    let n = 10;
    let mut s = SparseSolver::new();
    s.options_mut().krylov_solver = KrylovSolver::Direct;
    s.set_matrix_from_triplets(n, &identity(n)).unwrap();
    let b = Mat::from_fn(n, 1, |i, _| (i + 1) as E);
    let mut x = Mat::<E>::zeros(n, 1);
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    for i in 0..n {
        assert_eq!(x[(i, 0)], (i + 1) as E);
    }
    assert_eq!(s.krylov_iterations(), 0);
}

#[test]
fn test_laplacian_8x8_direct_recovers_ones() {
    let n = 64;
    let t = laplacian_2d(8, 8);
    let mut s = SparseSolver::new();
    s.options_mut().krylov_solver = KrylovSolver::Direct;
    s.set_matrix_from_triplets(n, &t).unwrap();
    assert_eq!(s.reorder_geometric(8, 8, 1, 1, 1), ReturnCode::Success);
    let ones = Mat::from_fn(n, 1, |_, _| 1.);
    let b = rhs_for(&t, n, &ones);
    let mut x = Mat::<E>::zeros(n, 1);
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    for i in 0..n {
        assert!((x[(i, 0)] - 1.).abs() <= 1e-10);
    }
}

#[test]
fn test_singular_matrix_reports_zero_in_pivot() {
    let t = vec![(0, 0, 1.), (1, 1, 1.), (2, 2, 0.), (3, 3, 1.)];
    let mut s = SparseSolver::new();
    s.set_matrix_from_triplets(4, &t).unwrap();
    assert_eq!(s.factor(), ReturnCode::ZeroInPivot);
    // A failed factorization leaves the reordering usable.
    assert_eq!(s.factor(), ReturnCode::ZeroInPivot);
}

#[test]
fn test_zero_diagonal_needs_matching() {
    // Full rank, zero diagonal: a cyclic permutation with weights.
    let t = vec![(0, 1, 2.), (1, 2, 3.), (2, 3, 4.), (3, 0, 5.)];
    let mut without = SparseSolver::new();
    without.options_mut().nd_leaf_size = 1;
    without.set_matrix_from_triplets(4, &t).unwrap();
    assert_eq!(without.factor(), ReturnCode::ZeroInPivot);

    let mut with = SparseSolver::new();
    with.options_mut().nd_leaf_size = 1;
    with.options_mut().matching = MatchingJob::MaxCardinality;
    with.options_mut().krylov_solver = KrylovSolver::Direct;
    with.set_matrix_from_triplets(4, &t).unwrap();
    assert_eq!(with.factor(), ReturnCode::Success);
    let x_true = Mat::from_fn(4, 1, |i, _| (i + 1) as E);
    let b = rhs_for(&t, 4, &x_true);
    let mut x = Mat::<E>::zeros(4, 1);
    assert_eq!(with.solve(&b, &mut x, false), ReturnCode::Success);
    assert!(residual(&t, 4, &x, &b) < 1e-12);
}

#[test]
fn test_refinement_recovers_full_precision_from_lossy_factors() {
    let n = 64;
    let t = laplacian_2d(8, 8);
    let mut s = SparseSolver::new();
    {
        let opts = s.options_mut();
        opts.krylov_solver = KrylovSolver::Refine;
        opts.compression = CompressionType::Lossy;
        opts.compression_min_sep_size = 1;
        opts.compression_min_front_size = 1;
        opts.maxit = 20;
        opts.rel_tol = 1e-14;
        opts.abs_tol = 1e-12;
    }
    s.set_matrix_from_triplets(n, &t).unwrap();
    let x_true = Mat::from_fn(n, 1, |i, _| ((i % 7) as E) - 3.);
    let b = rhs_for(&t, n, &x_true);
    let mut x = Mat::<E>::zeros(n, 1);
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    // The reduced-precision factors alone cannot reach this residual.
    assert!(residual(&t, n, &x, &b) < 1e-10);
    assert!(s.krylov_iterations() >= 1);
    assert!(s.front_counter().lossy > 0);
}

#[test]
fn test_multiple_right_hand_sides() {
    let n = 16;
    let t = tridiagonal(n);
    let mut s = SparseSolver::new();
    s.options_mut().krylov_solver = KrylovSolver::Direct;
    s.set_matrix_from_triplets(n, &t).unwrap();
    let x_true = Mat::from_fn(n, 3, |i, j| (i * (j + 1)) as E / 8. - 1.);
    let b = rhs_for(&t, n, &x_true);
    let mut x = Mat::<E>::zeros(n, 3);
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    assert!(residual(&t, n, &x, &b) <= 1e-12);
}

#[test]
fn test_gmres_and_bicgstab_with_preconditioner() {
    let n = 64;
    let t = laplacian_2d(8, 8);
    for solver in [KrylovSolver::PrecGmres, KrylovSolver::PrecBicgstab] {
        let mut s = SparseSolver::new();
        s.options_mut().krylov_solver = solver;
        s.options_mut().rel_tol = 1e-12;
        s.set_matrix_from_triplets(n, &t).unwrap();
        let x_true = Mat::from_fn(n, 1, |i, _| (i as E).cos());
        let b = rhs_for(&t, n, &x_true);
        let mut x = Mat::<E>::zeros(n, 1);
        assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
        assert!(residual(&t, n, &x, &b) < 1e-8);
        // An exact preconditioner converges almost immediately.
        assert!(s.krylov_iterations() <= 3);
    }
}

#[test]
fn test_unpreconditioned_gmres_skips_factorization() {
    let n = 16;
    let t = tridiagonal(n);
    let mut s = SparseSolver::new();
    s.options_mut().krylov_solver = KrylovSolver::Gmres;
    s.options_mut().rel_tol = 1e-12;
    s.options_mut().maxit = 500;
    s.set_matrix_from_triplets(n, &t).unwrap();
    let x_true = Mat::from_fn(n, 1, |i, _| ((i % 3) as E) - 1.);
    let b = rhs_for(&t, n, &x_true);
    let mut x = Mat::<E>::zeros(n, 1);
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    assert_eq!(s.factor_nonzeros(), 0);
    assert!(residual(&t, n, &x, &b) < 1e-8);
    assert!(s.krylov_iterations() > 0);
}

#[test]
fn test_use_initial_guess_shortens_refinement() {
    let n = 64;
    let t = laplacian_2d(8, 8);
    let mut s = SparseSolver::new();
    s.options_mut().krylov_solver = KrylovSolver::Refine;
    s.set_matrix_from_triplets(n, &t).unwrap();
    let x_true = Mat::from_fn(n, 1, |i, _| (i as E) / 64.);
    let b = rhs_for(&t, n, &x_true);
    let mut x = x_true.clone();
    assert_eq!(s.solve(&b, &mut x, true), ReturnCode::Success);
    assert_eq!(s.krylov_iterations(), 0);
    assert!(residual(&t, n, &x, &b) < 1e-10);
}

#[template]
#[rstest]
fn compression_kinds(
    #[values(
        CompressionType::Blr,
        CompressionType::Hodlr,
        CompressionType::Hss,
        CompressionType::Lossy
    )]
    kind: CompressionType,
) {
}

#[apply(compression_kinds)]
fn test_compressed_factorization_solves_accurately(kind: CompressionType) {
    let n = 144;
    let t = laplacian_2d(12, 12);
    let mut s = SparseSolver::new();
    {
        let opts = s.options_mut();
        opts.compression = kind;
        opts.compression_min_sep_size = 4;
        opts.compression_min_front_size = 16;
        opts.compression_leaf_size = 4;
        opts.compression_rel_tol = 1e-10;
        opts.compression_abs_tol = 1e-14;
        opts.rel_tol = 1e-12;
        opts.nd_leaf_size = 4;
    }
    s.set_matrix_from_triplets(n, &t).unwrap();
    assert_eq!(s.factor(), ReturnCode::Success);
    let fc = s.front_counter();
    match kind {
        CompressionType::Blr => assert!(fc.blr > 0),
        CompressionType::Hodlr => assert!(fc.hodlr > 0),
        CompressionType::Hss => assert!(fc.hss > 0),
        CompressionType::Lossy => assert!(fc.lossy > 0),
        CompressionType::None => unreachable!(),
    }
    let x_true = Mat::from_fn(n, 1, |i, _| ((i * 5) % 9) as E - 4.);
    let b = rhs_for(&t, n, &x_true);
    let mut x = Mat::<E>::zeros(n, 1);
    // AUTO with compression and a single right-hand side runs
    // preconditioned GMRES.
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    assert!(residual(&t, n, &x, &b) < 1e-6);
}

#[test]
fn test_auto_uses_refinement_for_multiple_rhs() {
    let n = 144;
    let t = laplacian_2d(12, 12);
    let mut s = SparseSolver::new();
    {
        let opts = s.options_mut();
        opts.compression = CompressionType::Blr;
        opts.compression_min_sep_size = 4;
        opts.compression_min_front_size = 16;
        opts.compression_leaf_size = 4;
        opts.compression_rel_tol = 1e-10;
        opts.nd_leaf_size = 4;
    }
    s.set_matrix_from_triplets(n, &t).unwrap();
    let x_true = Mat::from_fn(n, 2, |i, j| ((i + j) % 5) as E);
    let b = rhs_for(&t, n, &x_true);
    let mut x = Mat::<E>::zeros(n, 2);
    assert_eq!(s.solve(&b, &mut x, false), ReturnCode::Success);
    assert!(residual(&t, n, &x, &b) < 1e-6);
}

#[test]
fn test_matching_scaling_unit_diagonal_property() {
    // Badly scaled but structurally healthy matrix.
    let t = vec![
        (0, 0, 1e8),
        (0, 1, 1.),
        (1, 0, 2.),
        (1, 1, 1e-8),
        (1, 2, 1e4),
        (2, 1, 3.),
        (2, 2, 1e-4),
    ];
    let a = CsrMatrix::from_triplets(3, &t).unwrap();
    let m = crate::sparse::matching::compute(&a, MatchingJob::MaxDiagonalProductScaling).unwrap();
    for i in 0..3 {
        let d = (m.dr[i] * a.get(i, m.cperm[i]) * m.dc[m.cperm[i]]).abs();
        assert!((d - 1.).abs() < 1e-12);
    }
}
