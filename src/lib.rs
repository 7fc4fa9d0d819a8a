pub type E = f64;
pub type I = usize;

pub mod front;
pub mod interface;
pub mod iterative;
pub mod linalg;
pub mod options;
pub mod ordering;
pub mod solver;
pub mod sparse;
pub mod tree;

#[cfg(test)]
pub mod tests;

pub use options::SolverOptions;
pub use solver::SparseSolver;

/// Outcome codes reported at the solver façade.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ReturnCode {
    #[default]
    /// The operation completed successfully.
    Success,
    /// No matrix has been associated with the solver.
    MatrixNotSet,
    /// The fill-reducing reordering or the matching step failed.
    ReorderingError,
    /// A zero (or below-threshold) pivot was encountered during
    /// factorization.
    ZeroInPivot,
    /// The iterative solver did not reach the requested tolerance within
    /// the iteration limit. The last iterate is still returned.
    NoConvergence,
    /// The computed inertia is not reliable.
    InaccurateInertia,
    /// A front buffer could not be allocated.
    OutOfMemory,
}
