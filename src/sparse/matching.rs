//! # Matching and Scaling
//!
//! Weighted bipartite matching used to permute the columns of the matrix so
//! that its diagonal becomes dominant, optionally with row/column scaling.
//!
//! Two algorithms back the job set:
//! - A depth-first maximum transversal on the sparsity pattern
//!   (`MaxCardinality`).
//! - A shortest-augmenting-path matching on the weights
//!   `c[i][j] = ln(max_i |a_ij|) - ln |a_ij|` with dual potentials
//!   (`MaxSmallestDiagonal`, `MaxDiagonalProduct`,
//!   `MaxDiagonalProductScaling`). The dual solution yields row and column
//!   scalings under which every matched entry has unit modulus and every
//!   other entry has modulus at most one.

use derive_more::{Display, Error};

use crate::options::MatchingJob;
use crate::sparse::csr::CsrMatrix;
use crate::{E, I};

/// Result of a matching job.
///
/// `cperm[new] = old`: the column placed at position `new` of the permuted
/// matrix. `dr`/`dc` are indexed by row and by original column; both are
/// all-ones unless the job computes scalings.
#[derive(Debug, Clone)]
pub struct Matching {
    pub job: MatchingJob,
    pub cperm: Vec<I>,
    pub dr: Vec<E>,
    pub dc: Vec<E>,
}

#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum MatchingError {
    #[display("the matrix is structurally singular")]
    StructurallySingular,
}

/// Runs `job` on the pattern/values of `a` without modifying it.
pub fn compute(a: &CsrMatrix, job: MatchingJob) -> Result<Matching, MatchingError> {
    let n = a.n();
    let cperm = match job {
        MatchingJob::None => (0..n).collect(),
        MatchingJob::MaxCardinality => maximum_transversal(a)?,
        MatchingJob::MaxSmallestDiagonal
        | MatchingJob::MaxDiagonalProduct
        | MatchingJob::MaxDiagonalProductScaling => {
            let (cperm, u, v, cmax) = weighted_matching(a)?;
            if job.scaling() {
                let dr: Vec<E> = u.iter().map(|&ui| ui.exp()).collect();
                let dc: Vec<E> = v
                    .iter()
                    .zip(&cmax)
                    .map(|(&vj, &mj)| vj.exp() / mj)
                    .collect();
                return Ok(Matching {
                    job,
                    cperm,
                    dr,
                    dc,
                });
            }
            cperm
        }
    };
    Ok(Matching {
        job,
        cperm,
        dr: vec![1.; n],
        dc: vec![1.; n],
    })
}

/// Maximum transversal by repeated augmenting depth-first search.
/// Returns `cperm` with `cperm[i]` the column matched to row `i`.
fn maximum_transversal(a: &CsrMatrix) -> Result<Vec<I>, MatchingError> {
    let n = a.n();
    let mut col_of_row = vec![I::MAX; n];
    let mut row_of_col = vec![I::MAX; n];
    let mut visited = vec![I::MAX; n];
    for i in 0..n {
        if !augment(a, i, i, &mut col_of_row, &mut row_of_col, &mut visited) {
            return Err(MatchingError::StructurallySingular);
        }
    }
    Ok(col_of_row)
}

fn augment(
    a: &CsrMatrix,
    row: I,
    stamp: I,
    col_of_row: &mut [I],
    row_of_col: &mut [I],
    visited: &mut [I],
) -> bool {
    for k in a.row_ptr()[row]..a.row_ptr()[row + 1] {
        let j = a.col_ind()[k];
        if a.val()[k] == 0. || visited[j] == stamp {
            continue;
        }
        visited[j] = stamp;
        if row_of_col[j] == I::MAX || augment(a, row_of_col[j], stamp, col_of_row, row_of_col, visited)
        {
            row_of_col[j] = row;
            col_of_row[row] = j;
            return true;
        }
    }
    false
}

/// Shortest-augmenting-path minimum-cost perfect matching on the
/// logarithmic weights. Returns the matching, the dual potentials `u`
/// (rows) and `v` (columns), and the column maxima.
#[allow(clippy::type_complexity)]
fn weighted_matching(a: &CsrMatrix) -> Result<(Vec<I>, Vec<E>, Vec<E>, Vec<E>), MatchingError> {
    let n = a.n();
    // Column-major view with costs c[i][j] = ln(cmax[j]) - ln|a_ij|.
    let mut cmax: Vec<E> = vec![0.; n];
    for i in 0..n {
        for k in a.row_ptr()[i]..a.row_ptr()[i + 1] {
            let j = a.col_ind()[k];
            cmax[j] = cmax[j].max(a.val()[k].abs());
        }
    }
    if cmax.iter().any(|&m| m == 0.) {
        return Err(MatchingError::StructurallySingular);
    }
    let mut col_ptr = vec![0; n + 1];
    for &j in a.col_ind() {
        col_ptr[j + 1] += 1;
    }
    for j in 0..n {
        col_ptr[j + 1] += col_ptr[j];
    }
    let mut col_rows = vec![0; a.nnz()];
    let mut col_cost = vec![0.; a.nnz()];
    let mut fill = col_ptr.clone();
    for i in 0..n {
        for k in a.row_ptr()[i]..a.row_ptr()[i + 1] {
            let j = a.col_ind()[k];
            let v = a.val()[k].abs();
            if v == 0. {
                continue;
            }
            col_rows[fill[j]] = i;
            col_cost[fill[j]] = cmax[j].ln() - v.ln();
            fill[j] += 1;
        }
    }
    // Explicit zeros were skipped above; shrink each column accordingly.
    let mut cptr = vec![0; n + 1];
    let mut crows = Vec::with_capacity(a.nnz());
    let mut ccost = Vec::with_capacity(a.nnz());
    for j in 0..n {
        for k in col_ptr[j]..fill[j] {
            crows.push(col_rows[k]);
            ccost.push(col_cost[k]);
        }
        cptr[j + 1] = crows.len();
    }

    let mut u = vec![0.; n];
    let mut v = vec![0.; n];
    let mut row_of_col = vec![I::MAX; n];
    let mut col_of_row = vec![I::MAX; n];

    let mut dist = vec![E::INFINITY; n];
    let mut pred = vec![I::MAX; n];
    let mut finalized = vec![false; n];

    for j0 in 0..n {
        if cptr[j0] == cptr[j0 + 1] {
            return Err(MatchingError::StructurallySingular);
        }
        for i in 0..n {
            dist[i] = E::INFINITY;
            pred[i] = I::MAX;
            finalized[i] = false;
        }
        for k in cptr[j0]..cptr[j0 + 1] {
            let i = crows[k];
            let rc = ccost[k] - u[i] - v[j0];
            if rc < dist[i] {
                dist[i] = rc;
                pred[i] = j0;
            }
        }
        let free_row = loop {
            // Linear-scan Dijkstra step: cheapest unfinalized row.
            let mut best = I::MAX;
            let mut best_d = E::INFINITY;
            for i in 0..n {
                if !finalized[i] && dist[i] < best_d {
                    best_d = dist[i];
                    best = i;
                }
            }
            if best == I::MAX {
                return Err(MatchingError::StructurallySingular);
            }
            finalized[best] = true;
            if col_of_row[best] == I::MAX {
                break best;
            }
            let j = col_of_row[best];
            for k in cptr[j]..cptr[j + 1] {
                let i = crows[k];
                if finalized[i] {
                    continue;
                }
                let nd = best_d + ccost[k] - u[i] - v[j];
                if nd < dist[i] {
                    dist[i] = nd;
                    pred[i] = j;
                }
            }
        };
        // Johnson-style potential update: every row moves by its (capped)
        // distance, every column by the distance of its matched row. Keeps
        // all reduced costs non-negative and matched edges tight.
        let total = dist[free_row];
        for j in 0..n {
            let dj = if j == j0 {
                0.
            } else {
                let m = row_of_col[j];
                if m != I::MAX { dist[m].min(total) } else { total }
            };
            v[j] -= dj;
        }
        for i in 0..n {
            u[i] += dist[i].min(total);
        }
        // Augment along the predecessor chain.
        let mut i = free_row;
        loop {
            let j = pred[i];
            let next = row_of_col[j];
            row_of_col[j] = i;
            col_of_row[i] = j;
            if j == j0 {
                break;
            }
            i = next;
        }
    }
    Ok((col_of_row, u, v, cmax))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permuted_identity() -> CsrMatrix {
        // Full rank, zero diagonal.
        CsrMatrix::from_triplets(4, &[(0, 1, 2.), (1, 2, 3.), (2, 3, 4.), (3, 0, 5.)]).unwrap()
    }

    #[test]
    fn test_max_cardinality_repairs_zero_diagonal() {
        let a = permuted_identity();
        let m = compute(&a, MatchingJob::MaxCardinality).unwrap();
        for i in 0..4 {
            assert_ne!(a.get(i, m.cperm[i]), 0.);
        }
        assert!(m.dr.iter().all(|&d| d == 1.));
        assert!(m.dc.iter().all(|&d| d == 1.));
    }

    #[test]
    fn test_structurally_singular_is_reported() {
        let a = CsrMatrix::from_triplets(3, &[(0, 0, 1.), (1, 0, 1.), (2, 2, 1.)]).unwrap();
        assert!(matches!(
            compute(&a, MatchingJob::MaxCardinality),
            Err(MatchingError::StructurallySingular)
        ));
        assert!(matches!(
            compute(&a, MatchingJob::MaxDiagonalProductScaling),
            Err(MatchingError::StructurallySingular)
        ));
    }

    #[test]
    fn test_scaling_job_gives_unit_diagonal() {
        let a = CsrMatrix::from_triplets(
            3,
            &[
                (0, 0, 0.5),
                (0, 1, 4.),
                (1, 0, -3.),
                (1, 1, 1.),
                (1, 2, 0.25),
                (2, 1, 2.),
                (2, 2, 8.),
            ],
        )
        .unwrap();
        let m = compute(&a, MatchingJob::MaxDiagonalProductScaling).unwrap();
        for i in 0..3 {
            let j = m.cperm[i];
            let scaled = (m.dr[i] * a.get(i, j) * m.dc[j]).abs();
            assert!((scaled - 1.).abs() < 1e-12, "diagonal {} is {}", i, scaled);
        }
        // Off-diagonal entries of the scaled matrix are bounded by one.
        for i in 0..3 {
            for j in 0..3 {
                let s = (m.dr[i] * a.get(i, j) * m.dc[j]).abs();
                assert!(s <= 1. + 1e-12);
            }
        }
    }

    #[test]
    fn test_product_job_permutes_without_scaling() {
        let a = permuted_identity();
        let m = compute(&a, MatchingJob::MaxDiagonalProduct).unwrap();
        for i in 0..4 {
            assert_ne!(a.get(i, m.cperm[i]), 0.);
        }
        assert!(m.dr.iter().all(|&d| d == 1.));
        assert!(m.dc.iter().all(|&d| d == 1.));
    }
}
