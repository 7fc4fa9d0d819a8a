//! # Sparse Solver Façade
//!
//! Ties the phases together: set matrix, reorder (matching, sparsity
//! symmetrization, nested dissection, separator reordering), symbolic and
//! numeric multifrontal factorization, and the outer solve with its
//! permutation/scaling vector transforms. Phases are idempotent: `factor`
//! reuses a valid reordering, `solve` auto-factors when needed, and
//! `set_csr_matrix` invalidates everything.

use faer::{Col, ColMut, ColRef, Mat};

use crate::front::{FactorError, FrontCounter};
use crate::iterative::{bicgstab, gmres, iterative_refinement, NoConvergence};
use crate::options::{CompressionType, KrylovSolver, MatchingJob, SolverOptions};
use crate::ordering::{self, MatrixReordering};
use crate::sparse::csr::{CsrMatrix, InvalidMatrixError};
use crate::sparse::matching::Matching;
use crate::tree::EliminationTree;
use crate::{ReturnCode, E, I};

/// Sequential sparse direct solver with optional compression and Krylov
/// refinement.
///
/// ```
/// use multifrontal::SparseSolver;
///
/// let mut solver = SparseSolver::new();
/// // 2x2 system [[2, -1], [-1, 2]] x = [1, 1].
/// solver
///     .set_csr_matrix(2, &[0, 2, 4], &[0, 1, 0, 1], &[2., -1., -1., 2.], true)
///     .unwrap();
/// let b = [1., 1.];
/// let mut x = [0., 0.];
/// solver.solve_vec(&b, &mut x, false);
/// assert!((x[0] - 1.).abs() < 1e-12 && (x[1] - 1.).abs() < 1e-12);
/// ```
pub struct SparseSolver {
    opts: SolverOptions,
    mat: Option<CsrMatrix>,
    nd: Option<MatrixReordering>,
    tree: Option<EliminationTree>,
    matching: Option<Matching>,
    reordered: bool,
    factored: bool,
    krylov_its: I,
}

impl Default for SparseSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseSolver {
    pub fn new() -> Self {
        Self {
            opts: SolverOptions::default(),
            mat: None,
            nd: None,
            tree: None,
            matching: None,
            reordered: false,
            factored: false,
            krylov_its: 0,
        }
    }

    pub fn with_options(opts: SolverOptions) -> Self {
        Self {
            opts,
            ..Self::new()
        }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.opts
    }

    pub fn options_mut(&mut self) -> &mut SolverOptions {
        &mut self.opts
    }

    /// Associates an `N x N` CSR matrix with the solver. Any previous
    /// reordering or factorization is invalidated.
    pub fn set_csr_matrix(
        &mut self,
        n: I,
        row_ptr: &[I],
        col_ind: &[I],
        values: &[E],
        symmetric_pattern: bool,
    ) -> Result<(), InvalidMatrixError> {
        self.mat = Some(CsrMatrix::from_csr(
            n,
            row_ptr,
            col_ind,
            values,
            symmetric_pattern,
        )?);
        self.invalidate();
        Ok(())
    }

    /// Triplet-based convenience constructor for tests and examples.
    pub fn set_matrix_from_triplets(
        &mut self,
        n: I,
        triplets: &[(I, I, E)],
    ) -> Result<(), InvalidMatrixError> {
        self.mat = Some(CsrMatrix::from_triplets(n, triplets)?);
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        self.nd = None;
        self.tree = None;
        self.matching = None;
        self.reordered = false;
        self.factored = false;
        self.krylov_its = 0;
    }

    /// Number of iterations taken by the outer Krylov solver in the last
    /// `solve` call.
    pub fn krylov_iterations(&self) -> I {
        self.krylov_its
    }

    /// Entries stored in the factors, after factorization.
    pub fn factor_nonzeros(&self) -> I {
        self.tree.as_ref().map_or(0, EliminationTree::factor_nonzeros)
    }

    /// `factor_nonzeros` scaled by the scalar size.
    pub fn factor_memory(&self) -> I {
        self.factor_nonzeros() * size_of::<E>()
    }

    /// Largest rank across all compressed front blocks.
    pub fn maximum_rank(&self) -> I {
        self.tree.as_ref().map_or(0, EliminationTree::maximum_rank)
    }

    /// Fronts per representation, decided during the symbolic phase.
    pub fn front_counter(&self) -> FrontCounter {
        self.tree
            .as_ref()
            .map_or(FrontCounter::default(), EliminationTree::front_counter)
    }

    /// Matrix reorderings for numerical stability and fill reduction,
    /// without geometry information.
    pub fn reorder(&mut self) -> ReturnCode {
        self.reorder_geometric(1, 1, 1, 1, 1)
    }

    /// Like [`SparseSolver::reorder`], with the matrix known to come from
    /// a regular `nx x ny x nz` grid with `components` unknowns per point
    /// and a stencil at most `width` points wide.
    pub fn reorder_geometric(
        &mut self,
        nx: I,
        ny: I,
        nz: I,
        components: I,
        width: I,
    ) -> ReturnCode {
        let Some(mat) = self.mat.as_mut() else {
            return ReturnCode::MatrixNotSet;
        };
        if self.opts.matching != MatchingJob::None {
            if self.opts.verbose {
                println!("# matching job: {}", self.opts.matching.description());
            }
            match mat.permute_and_scale(self.opts.matching) {
                Ok(m) => self.matching = Some(m),
                Err(_) => return ReturnCode::ReorderingError,
            }
        } else {
            self.matching = None;
        }
        let old_nnz = mat.nnz();
        mat.symmetrize_sparsity();
        if self.opts.verbose && mat.nnz() != old_nnz {
            println!(
                "# Matrix padded with zeros to get symmetric pattern, nnz {} -> {}.",
                old_nnz,
                mat.nnz()
            );
        }
        let mut nd = match ordering::nested_dissection(
            mat,
            nx,
            ny,
            nz,
            components,
            width,
            self.opts.nd_leaf_size,
        ) {
            Ok(nd) => nd,
            Err(_) => return ReturnCode::ReorderingError,
        };
        mat.permute(&nd.perm, &nd.iperm);
        if self.opts.compression != CompressionType::None {
            ordering::separator_reordering(
                &mut nd,
                mat,
                self.opts.compression_leaf_size,
                self.opts.separator_ordering_level,
            );
        }
        let tree = EliminationTree::new(&self.opts, mat, &nd);
        if self.opts.verbose {
            let fc = tree.front_counter();
            println!("# symbolic factorization: {} fronts", fc.total());
            println!("#   - nr of dense frontal matrices = {}", fc.dense);
            if fc.hss > 0 {
                println!("#   - nr of HSS frontal matrices = {}", fc.hss);
            }
            if fc.blr > 0 {
                println!("#   - nr of BLR frontal matrices = {}", fc.blr);
            }
            if fc.hodlr > 0 {
                println!("#   - nr of HODLR frontal matrices = {}", fc.hodlr);
            }
            if fc.lossy > 0 {
                println!("#   - nr of lossy frontal matrices = {}", fc.lossy);
            }
        }
        self.nd = Some(nd);
        self.tree = Some(tree);
        self.reordered = true;
        self.factored = false;
        ReturnCode::Success
    }

    /// Numeric multifrontal factorization; reuses a valid reordering and
    /// is a no-op when already factored.
    pub fn factor(&mut self) -> ReturnCode {
        if self.mat.is_none() {
            return ReturnCode::MatrixNotSet;
        }
        if self.factored {
            return ReturnCode::Success;
        }
        if !self.reordered {
            let rc = self.reorder();
            if rc != ReturnCode::Success {
                return rc;
            }
        }
        let (Some(mat), Some(tree)) = (self.mat.as_ref(), self.tree.as_mut()) else {
            return ReturnCode::MatrixNotSet;
        };
        match tree.multifrontal_factorization(mat) {
            Ok(()) => {
                if self.opts.verbose {
                    println!("# multifrontal factorization:");
                    println!("#   - factor nonzeros = {}", tree.factor_nonzeros());
                    println!("#   - factor flops = {}", tree.flops());
                    if self.opts.compression != CompressionType::None {
                        println!("#   - compression = {}", self.opts.compression.name());
                        println!("#   - maximum rank = {}", tree.maximum_rank());
                        println!(
                            "#   - factor nonzeros / dense nonzeros = {:.1} %",
                            100. * tree.factor_nonzeros() as E
                                / tree.dense_factor_nonzeros().max(1) as E
                        );
                    }
                }
                self.factored = true;
                ReturnCode::Success
            }
            Err(FactorError::SingularFront { .. }) => ReturnCode::ZeroInPivot,
            Err(FactorError::OutOfMemory) => ReturnCode::OutOfMemory,
        }
    }

    /// Single right-hand-side convenience wrapper over slices.
    pub fn solve_vec(&mut self, b: &[E], x: &mut [E], use_initial_guess: bool) -> ReturnCode {
        let n = b.len();
        let bm = Mat::from_fn(n, 1, |i, _| b[i]);
        let mut xm = Mat::from_fn(n, 1, |i, _| x[i]);
        let rc = self.solve(&bm, &mut xm, use_initial_guess);
        for i in 0..n {
            x[i] = xm[(i, 0)];
        }
        rc
    }

    /// Solves `A X = B` for one or more right-hand sides. Factors first
    /// when needed, unless an un-preconditioned Krylov solver was selected.
    pub fn solve(&mut self, b: &Mat<E>, x: &mut Mat<E>, use_initial_guess: bool) -> ReturnCode {
        if !self.factored
            && !matches!(
                self.opts.krylov_solver,
                KrylovSolver::Gmres | KrylovSolver::Bicgstab
            )
        {
            let rc = self.factor();
            if rc != ReturnCode::Success {
                return rc;
            }
        }
        let Some(mat) = self.mat.as_ref() else {
            return ReturnCode::MatrixNotSet;
        };
        let n = mat.n();
        let k = b.ncols();
        let tree = self.tree.as_ref();
        // Forward transforms into factorization coordinates.
        let to_old = |i: I| self.nd.as_ref().map_or(i, |nd| nd.iperm[i]);
        let scaling = self
            .matching
            .as_ref()
            .is_some_and(|m| m.job == MatchingJob::MaxDiagonalProductScaling);

        let mut xf = Mat::<E>::zeros(n, k);
        if use_initial_guess && self.opts.krylov_solver != KrylovSolver::Direct {
            match (&self.matching, scaling) {
                (Some(m), true) => {
                    for j in 0..k {
                        for i in 0..n {
                            let pi = to_old(m.cperm[i]);
                            xf[(i, j)] = x[(pi, j)] / m.dc[pi];
                        }
                    }
                }
                (Some(m), false) => {
                    for j in 0..k {
                        for i in 0..n {
                            xf[(i, j)] = x[(to_old(m.cperm[i]), j)];
                        }
                    }
                }
                (None, _) => {
                    for j in 0..k {
                        for i in 0..n {
                            xf[(i, j)] = x[(to_old(i), j)];
                        }
                    }
                }
            }
        }
        let mut bloc = Mat::<E>::zeros(n, k);
        match (&self.matching, scaling) {
            (Some(m), true) => {
                for j in 0..k {
                    for i in 0..n {
                        let pi = to_old(i);
                        bloc[(i, j)] = m.dr[pi] * b[(pi, j)];
                    }
                }
            }
            _ => {
                for j in 0..k {
                    for i in 0..n {
                        bloc[(i, j)] = b[(to_old(i), j)];
                    }
                }
            }
        }

        let spmv = |xi: ColRef<'_, E>, yi: ColMut<'_, E>| mat.spmv_col(xi, yi);
        let prec = |mut v: ColMut<'_, E>| {
            if let Some(tree) = tree {
                let mut w = Mat::from_fn(n, 1, |i, _| v[i]);
                tree.multifrontal_solve(&mut w);
                for i in 0..n {
                    v[i] = w[(i, 0)];
                }
            }
        };
        let identity_prec = |_: ColMut<'_, E>| {};

        let mut its = 0;
        let mut rc = ReturnCode::Success;
        let run_gmres = |xf: &mut Mat<E>, preconditioned: bool| -> (I, ReturnCode) {
            let mut its = 0;
            let mut rc = ReturnCode::Success;
            for j in 0..k {
                let bj = Col::from_fn(n, |i| bloc[(i, j)]);
                let mut xj = Col::from_fn(n, |i| xf[(i, j)]);
                let r = if preconditioned {
                    gmres(
                        spmv,
                        prec,
                        n,
                        &mut xj,
                        bj.as_ref(),
                        self.opts.rel_tol,
                        self.opts.abs_tol,
                        self.opts.maxit,
                        self.opts.gmres_restart,
                        self.opts.gram_schmidt,
                        use_initial_guess,
                        self.opts.verbose,
                    )
                } else {
                    gmres(
                        spmv,
                        identity_prec,
                        n,
                        &mut xj,
                        bj.as_ref(),
                        self.opts.rel_tol,
                        self.opts.abs_tol,
                        self.opts.maxit,
                        self.opts.gmres_restart,
                        self.opts.gram_schmidt,
                        use_initial_guess,
                        self.opts.verbose,
                    )
                };
                match r {
                    Ok(i) => its += i,
                    Err(NoConvergence { iterations }) => {
                        its += iterations;
                        rc = ReturnCode::NoConvergence;
                    }
                }
                for i in 0..n {
                    xf[(i, j)] = xj[i];
                }
            }
            (its, rc)
        };

        match self.opts.krylov_solver {
            KrylovSolver::Auto => {
                if self.opts.compression != CompressionType::None && k == 1 {
                    (its, rc) = run_gmres(&mut xf, true);
                } else {
                    match iterative_refinement(
                        mat,
                        |w| {
                            if let Some(tree) = tree {
                                tree.multifrontal_solve(w);
                            }
                        },
                        &mut xf,
                        &bloc,
                        self.opts.rel_tol,
                        self.opts.abs_tol,
                        self.opts.maxit,
                        use_initial_guess,
                        self.opts.verbose,
                    ) {
                        Ok(i) => its = i,
                        Err(NoConvergence { iterations }) => {
                            its = iterations;
                            rc = ReturnCode::NoConvergence;
                        }
                    }
                }
            }
            KrylovSolver::Direct => {
                xf.copy_from(&bloc);
                if let Some(tree) = tree {
                    tree.multifrontal_solve(&mut xf);
                }
            }
            KrylovSolver::Refine => {
                match iterative_refinement(
                    mat,
                    |w| {
                        if let Some(tree) = tree {
                            tree.multifrontal_solve(w);
                        }
                    },
                    &mut xf,
                    &bloc,
                    self.opts.rel_tol,
                    self.opts.abs_tol,
                    self.opts.maxit,
                    use_initial_guess,
                    self.opts.verbose,
                ) {
                    Ok(i) => its = i,
                    Err(NoConvergence { iterations }) => {
                        its = iterations;
                        rc = ReturnCode::NoConvergence;
                    }
                }
            }
            KrylovSolver::PrecGmres => (its, rc) = run_gmres(&mut xf, true),
            KrylovSolver::Gmres => (its, rc) = run_gmres(&mut xf, false),
            KrylovSolver::PrecBicgstab | KrylovSolver::Bicgstab => {
                let preconditioned = self.opts.krylov_solver == KrylovSolver::PrecBicgstab;
                for j in 0..k {
                    let bj = Col::from_fn(n, |i| bloc[(i, j)]);
                    let mut xj = Col::from_fn(n, |i| xf[(i, j)]);
                    let r = if preconditioned {
                        bicgstab(
                            spmv,
                            prec,
                            n,
                            &mut xj,
                            bj.as_ref(),
                            self.opts.rel_tol,
                            self.opts.abs_tol,
                            self.opts.maxit,
                            use_initial_guess,
                            self.opts.verbose,
                        )
                    } else {
                        bicgstab(
                            spmv,
                            identity_prec,
                            n,
                            &mut xj,
                            bj.as_ref(),
                            self.opts.rel_tol,
                            self.opts.abs_tol,
                            self.opts.maxit,
                            use_initial_guess,
                            self.opts.verbose,
                        )
                    };
                    match r {
                        Ok(i) => its += i,
                        Err(NoConvergence { iterations }) => {
                            its += iterations;
                            rc = ReturnCode::NoConvergence;
                        }
                    }
                    for i in 0..n {
                        xf[(i, j)] = xj[i];
                    }
                }
            }
        }

        // Back to the caller's row and column order.
        match (&self.matching, scaling) {
            (Some(m), true) => {
                for j in 0..k {
                    for i in 0..n {
                        let ipi = m.cperm[to_old(i)];
                        x[(ipi, j)] = xf[(i, j)] * m.dc[ipi];
                    }
                }
            }
            (Some(m), false) => {
                for j in 0..k {
                    for i in 0..n {
                        x[(m.cperm[to_old(i)], j)] = xf[(i, j)];
                    }
                }
            }
            (None, _) => {
                if let Some(nd) = self.nd.as_ref() {
                    for j in 0..k {
                        for i in 0..n {
                            x[(i, j)] = xf[(nd.perm[i], j)];
                        }
                    }
                } else {
                    x.copy_from(&xf);
                }
            }
        }
        self.krylov_its = its;
        if self.opts.verbose {
            println!("# solve: {} Krylov iterations", its);
        }
        rc
    }
}
