//! # Frontal Matrices
//!
//! The per-node dense kernel of the multifrontal factorization. A front is
//! the assembled block two-by-two matrix `[F11 F12; F21 F22]` associated
//! with a separator; eliminating the separator factors `F11`, updates the
//! coupling blocks, and leaves the Schur complement in `F22` for the parent.
//!
//! Five representations share one operation set, selected per front from
//! the separator size and the compression options:
//! - [`dense::FrontalMatrixDense`]: exact partial factorization.
//! - [`blr::FrontalMatrixBlr`]: flat low-rank tiles on the coupling blocks.
//! - [`hodlr::FrontalMatrixHodlr`]: hierarchically compressed triangular
//!   factors.
//! - [`hss::FrontalMatrixHss`]: hierarchical factors with tiled coupling
//!   blocks; only used below a compressed parent.
//! - [`lossy::FrontalMatrixLossy`]: exact factorization stored in reduced
//!   precision.

pub mod blr;
pub mod dense;
pub mod hodlr;
pub mod hss;
pub mod lossy;
pub mod lowrank;

use derive_more::{Display, Error};
use enum_dispatch::enum_dispatch;
use faer::{Mat, MatMut, MatRef};

use crate::options::{CompressionType, SolverOptions};
use crate::sparse::csr::CsrMatrix;
use crate::sparse::graph::PartitionTree;
use crate::{E, I};

use blr::FrontalMatrixBlr;
use dense::FrontalMatrixDense;
use hodlr::FrontalMatrixHodlr;
use hss::FrontalMatrixHss;
use lossy::FrontalMatrixLossy;

/// Numeric failure during the factorization phase.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum FactorError {
    #[display("front is singular: zero pivot in column {col}")]
    SingularFront { col: I },

    #[display("front buffers exceed addressable memory")]
    OutOfMemory,
}

/// Counters accumulated across the factorization; threaded through the
/// traversal as a context handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactorStats {
    pub flops: u64,
    pub factor_nonzeros: I,
    pub maximum_rank: I,
}

/// Number of fronts of each kind, decided during the symbolic phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontCounter {
    pub dense: I,
    pub hss: I,
    pub blr: I,
    pub hodlr: I,
    pub lossy: I,
}

impl FrontCounter {
    pub fn total(&self) -> I {
        self.dense + self.hss + self.blr + self.hodlr + self.lossy
    }
}

/// Truncation and pivoting parameters captured by each front at creation.
#[derive(Debug, Clone, Copy)]
pub struct FrontParams {
    pub pivot_threshold: E,
    pub rel_tol: E,
    pub abs_tol: E,
    pub leaf: I,
}

impl FrontParams {
    pub fn from_options(opts: &SolverOptions) -> Self {
        Self {
            pivot_threshold: opts.pivot_threshold,
            rel_tol: opts.compression_rel_tol,
            abs_tol: opts.compression_abs_tol,
            leaf: opts.compression_leaf_size,
        }
    }
}

fn large_enough(dsep: I, dupd: I, opts: &SolverOptions) -> bool {
    dsep >= opts.compression_min_sep_size || dsep + dupd >= opts.compression_min_front_size
}

pub fn is_hss(dsep: I, dupd: I, compressed_parent: bool, opts: &SolverOptions) -> bool {
    opts.compression == CompressionType::Hss && compressed_parent && large_enough(dsep, dupd, opts)
}

pub fn is_blr(dsep: I, dupd: I, _compressed_parent: bool, opts: &SolverOptions) -> bool {
    opts.compression == CompressionType::Blr && large_enough(dsep, dupd, opts)
}

pub fn is_hodlr(dsep: I, dupd: I, _compressed_parent: bool, opts: &SolverOptions) -> bool {
    opts.compression == CompressionType::Hodlr && large_enough(dsep, dupd, opts)
}

pub fn is_lossy(dsep: I, dupd: I, _compressed_parent: bool, opts: &SolverOptions) -> bool {
    opts.compression == CompressionType::Lossy && large_enough(dsep, dupd, opts)
}

pub fn is_compressed(dsep: I, dupd: I, compressed_parent: bool, opts: &SolverOptions) -> bool {
    opts.compression != CompressionType::None
        && (is_hss(dsep, dupd, compressed_parent, opts)
            || is_blr(dsep, dupd, compressed_parent, opts)
            || is_hodlr(dsep, dupd, compressed_parent, opts)
            || is_lossy(dsep, dupd, compressed_parent, opts))
}

/// Picks the front representation for a node, falling back to dense when
/// the compression policy does not fire.
pub fn create_front(
    opts: &SolverOptions,
    dsep: I,
    dupd: I,
    partition: Option<&PartitionTree>,
    compressed_parent: bool,
    fc: &mut FrontCounter,
) -> FrontalMatrix {
    let params = FrontParams::from_options(opts);
    let ptree = || {
        partition
            .cloned()
            .unwrap_or_else(|| PartitionTree::balanced(dsep, params.leaf))
    };
    match opts.compression {
        CompressionType::Hss if is_hss(dsep, dupd, compressed_parent, opts) => {
            fc.hss += 1;
            FrontalMatrixHss::new(params, ptree()).into()
        }
        CompressionType::Blr if is_blr(dsep, dupd, compressed_parent, opts) => {
            fc.blr += 1;
            FrontalMatrixBlr::new(params, ptree()).into()
        }
        CompressionType::Hodlr if is_hodlr(dsep, dupd, compressed_parent, opts) => {
            fc.hodlr += 1;
            FrontalMatrixHodlr::new(params, ptree()).into()
        }
        CompressionType::Lossy if is_lossy(dsep, dupd, compressed_parent, opts) => {
            fc.lossy += 1;
            FrontalMatrixLossy::new(params).into()
        }
        _ => {
            fc.dense += 1;
            FrontalMatrixDense::new(params).into()
        }
    }
}

/// Operation set shared by every front representation.
#[enum_dispatch]
pub trait Front {
    /// Allocates `F11`/`F12`/`F21` from the permuted matrix and a zeroed
    /// `F22`.
    fn build(&mut self, a: &CsrMatrix, sep_begin: I, sep_end: I, upd: &[I])
    -> Result<(), FactorError>;

    /// Scatter-adds a child's Schur complement through the index map
    /// computed by the elimination tree.
    fn extend_add(&mut self, child_f22: MatRef<'_, E>, map: &[I]);

    /// Eliminates the separator block; afterwards `F11` holds a factored
    /// representation, `F12`/`F21` the corresponding coupling factors and
    /// `F22` the Schur complement.
    fn partial_factor(&mut self, stats: &mut FactorStats) -> Result<(), FactorError>;

    /// Forward-substitution step: pivots and `L^-1` applied to `b_sep`,
    /// `b_upd <- b_upd - F21 b_sep`.
    fn fwd_solve(&self, b_sep: MatMut<'_, E>, b_upd: MatMut<'_, E>);

    /// Backward-substitution step: `y_sep <- U^-1 (y_sep - F12 y_upd)`.
    fn bwd_solve(&self, y_sep: MatMut<'_, E>, y_upd: MatRef<'_, E>);

    /// The Schur complement, consumed by the parent's extend-add.
    fn f22(&self) -> MatRef<'_, E>;

    /// Frees the Schur complement once the parent has consumed it.
    fn release_work_memory(&mut self);

    /// Entries stored in the factored representation of this front.
    fn factor_nonzeros(&self) -> I;

    /// Largest rank over this front's compressed blocks; zero for exact
    /// representations.
    fn maximum_rank(&self) -> I;
}

/// Tagged-variant front; all dispatch is static.
#[enum_dispatch(Front)]
#[derive(Debug)]
pub enum FrontalMatrix {
    Dense(FrontalMatrixDense),
    Hss(FrontalMatrixHss),
    Blr(FrontalMatrixBlr),
    Hodlr(FrontalMatrixHodlr),
    Lossy(FrontalMatrixLossy),
}

/// Dense storage shared by every variant up to the elimination step.
#[derive(Debug)]
pub(crate) struct AssembledFront {
    pub dim_sep: I,
    pub dim_upd: I,
    pub f11: Mat<E>,
    pub f12: Mat<E>,
    pub f21: Mat<E>,
    pub f22: Mat<E>,
}

impl Default for AssembledFront {
    fn default() -> Self {
        Self {
            dim_sep: I::default(),
            dim_upd: I::default(),
            f11: Mat::new(),
            f12: Mat::new(),
            f21: Mat::new(),
            f22: Mat::new(),
        }
    }
}

impl AssembledFront {
    pub fn build(
        &mut self,
        a: &CsrMatrix,
        sep_begin: I,
        sep_end: I,
        upd: &[I],
    ) -> Result<(), FactorError> {
        let ds = sep_end - sep_begin;
        let du = upd.len();
        let total = ds + du;
        let elems = total.checked_mul(total).ok_or(FactorError::OutOfMemory)?;
        // The faer constructors below abort on allocation failure, so the
        // front's full footprint is reserved fallibly first.
        let mut probe: Vec<E> = Vec::new();
        probe
            .try_reserve_exact(elems)
            .map_err(|_| FactorError::OutOfMemory)?;
        drop(probe);
        self.dim_sep = ds;
        self.dim_upd = du;
        self.f11 = Mat::zeros(ds, ds);
        self.f12 = Mat::zeros(ds, du);
        self.f21 = Mat::zeros(du, ds);
        self.f22 = Mat::zeros(du, du);
        a.extract_f11(&mut self.f11, sep_begin, sep_end);
        a.extract_f12(&mut self.f12, sep_begin, sep_end, upd);
        a.extract_f21(&mut self.f21, sep_begin, sep_end, upd);
        Ok(())
    }

    /// Adds `child_f22[i, j]` into the assembled front at
    /// `(map[i], map[j])`, where positions below `dim_sep` land in the
    /// separator block.
    pub fn extend_add(&mut self, child_f22: MatRef<'_, E>, map: &[I]) {
        let ds = self.dim_sep;
        for (jc, &mj) in map.iter().enumerate() {
            for (ic, &mi) in map.iter().enumerate() {
                let v = child_f22[(ic, jc)];
                match (mi < ds, mj < ds) {
                    (true, true) => self.f11[(mi, mj)] += v,
                    (true, false) => self.f12[(mi, mj - ds)] += v,
                    (false, true) => self.f21[(mi - ds, mj)] += v,
                    (false, false) => self.f22[(mi - ds, mj - ds)] += v,
                }
            }
        }
    }

    pub fn release_f22(&mut self) {
        self.f22 = Mat::new();
    }
}
