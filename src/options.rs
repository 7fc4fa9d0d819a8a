//! # Solver Configuration
//!
//! All knobs recognized by [`SparseSolver`](crate::SparseSolver), grouped in
//! a single [`SolverOptions`] struct. The defaults reproduce the behavior of
//! the plain direct solver: no matching, no compression, automatic Krylov
//! selection.

use serde::{Deserialize, Serialize};

use crate::{E, I};

/// Column-matching job applied before reordering for numerical stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchingJob {
    /// Do not permute or scale the matrix.
    #[default]
    None,
    /// Maximum-cardinality transversal on the sparsity pattern.
    MaxCardinality,
    /// Maximize the smallest diagonal entry.
    MaxSmallestDiagonal,
    /// Maximize the product of the diagonal entries.
    MaxDiagonalProduct,
    /// Maximize the diagonal product and also compute row/column scaling
    /// factors that make the permuted diagonal unit modulus.
    MaxDiagonalProductScaling,
}

impl MatchingJob {
    /// Whether this job produces row/column scaling vectors.
    pub fn scaling(self) -> bool {
        matches!(self, MatchingJob::MaxDiagonalProductScaling)
    }

    pub fn description(self) -> &'static str {
        match self {
            MatchingJob::None => "none",
            MatchingJob::MaxCardinality => "maximum cardinality",
            MatchingJob::MaxSmallestDiagonal => "maximum smallest diagonal value",
            MatchingJob::MaxDiagonalProduct => "maximum diagonal product",
            MatchingJob::MaxDiagonalProductScaling => {
                "maximum diagonal product with row and column scaling"
            }
        }
    }
}

/// Rank-structured representation used for large fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionType {
    /// Keep every front dense.
    #[default]
    None,
    /// Hierarchically semi-separable fronts.
    Hss,
    /// Block low-rank fronts.
    Blr,
    /// Hierarchically off-diagonal low-rank fronts.
    Hodlr,
    /// Dense factorization stored in reduced precision.
    Lossy,
}

impl CompressionType {
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Hss => "HSS",
            CompressionType::Blr => "BLR",
            CompressionType::Hodlr => "HODLR",
            CompressionType::Lossy => "lossy",
        }
    }
}

/// Outer solver wrapped around the multifrontal factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KrylovSolver {
    /// Pick based on compression and the number of right-hand sides:
    /// preconditioned GMRES for a compressed factorization with a single
    /// right-hand side, iterative refinement otherwise.
    #[default]
    Auto,
    /// A single application of the multifrontal solve.
    Direct,
    /// Iterative refinement with the factorization as approximate inverse.
    Refine,
    /// Restarted GMRES without preconditioning.
    Gmres,
    /// Restarted GMRES, left-preconditioned by the factorization.
    PrecGmres,
    /// BiCGStab without preconditioning.
    Bicgstab,
    /// BiCGStab, left-preconditioned by the factorization.
    PrecBicgstab,
}

/// Orthogonalization scheme used in the GMRES Arnoldi process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GramSchmidtType {
    /// Classical Gram-Schmidt: fewer synchronizations, less stable.
    Classical,
    /// Modified Gram-Schmidt: more stable.
    #[default]
    Modified,
}

/// Configuration for the sparse solver.
///
/// Obtain a mutable reference through
/// [`SparseSolver::options_mut`](crate::SparseSolver::options_mut) and set
/// fields before calling `reorder`/`factor`/`solve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Print progress information to stdout.
    pub verbose: bool,

    /// Column matching and scaling for numerical stability.
    pub matching: MatchingJob,

    /// Rank-structured compression applied to large fronts.
    pub compression: CompressionType,
    /// Minimum separator size for a front to be compressed.
    pub compression_min_sep_size: I,
    /// Minimum total front size for a front to be compressed.
    pub compression_min_front_size: I,
    /// Relative tolerance for low-rank truncation.
    pub compression_rel_tol: E,
    /// Absolute tolerance for low-rank truncation.
    pub compression_abs_tol: E,
    /// Leaf size of the separator partition tree; also the tile size used
    /// by the BLR format.
    pub compression_leaf_size: I,
    /// When 1, separator reordering also follows length-2 connections
    /// through neighbors outside the separator.
    pub separator_ordering_level: I,

    /// Outer Krylov solver.
    pub krylov_solver: KrylovSolver,
    /// Relative convergence tolerance of the outer solver.
    pub rel_tol: E,
    /// Absolute convergence tolerance of the outer solver.
    pub abs_tol: E,
    /// Maximum number of outer iterations.
    pub maxit: I,
    /// GMRES restart length.
    pub gmres_restart: I,
    /// GMRES orthogonalization scheme.
    pub gram_schmidt: GramSchmidtType,

    /// A pivot with magnitude below `pivot_threshold` times the largest
    /// entry of its column is treated as zero.
    pub pivot_threshold: E,
    /// Stop splitting in the nested-dissection recursion once a subgraph
    /// has at most this many vertices.
    pub nd_leaf_size: I,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            matching: MatchingJob::None,
            compression: CompressionType::None,
            compression_min_sep_size: 256,
            compression_min_front_size: 100_000,
            compression_rel_tol: 1e-4,
            compression_abs_tol: 1e-10,
            compression_leaf_size: 128,
            separator_ordering_level: 1,
            krylov_solver: KrylovSolver::Auto,
            rel_tol: 1e-6,
            abs_tol: 1e-10,
            maxit: 5000,
            gmres_restart: 30,
            gram_schmidt: GramSchmidtType::Modified,
            pivot_threshold: 1e-14,
            nd_leaf_size: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SolverOptions::default();
        assert_eq!(opts.matching, MatchingJob::None);
        assert_eq!(opts.compression, CompressionType::None);
        assert_eq!(opts.krylov_solver, KrylovSolver::Auto);
        assert_eq!(opts.gram_schmidt, GramSchmidtType::Modified);
        assert!(!opts.matching.scaling());
        assert!(MatchingJob::MaxDiagonalProductScaling.scaling());
    }

    #[test]
    fn test_job_descriptions_are_distinct() {
        let jobs = [
            MatchingJob::None,
            MatchingJob::MaxCardinality,
            MatchingJob::MaxSmallestDiagonal,
            MatchingJob::MaxDiagonalProduct,
            MatchingJob::MaxDiagonalProductScaling,
        ];
        for (i, a) in jobs.iter().enumerate() {
            for b in jobs.iter().skip(i + 1) {
                assert_ne!(a.description(), b.description());
            }
        }
    }
}
