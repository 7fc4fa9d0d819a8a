//! # Compressed Sparse Row Matrix
//!
//! Storage and the structural operations needed by the multifrontal solver:
//! - Validated construction from raw CSR arrays or from triplets.
//! - Sparse matrix-vector and matrix-matrix products.
//! - Symmetric permutation, sparsity symmetrization, and the column
//!   permutation plus row/column scaling produced by the matching step.
//! - Extraction of dense front blocks indexed by a separator range and a
//!   sorted update list.
//!
//! Rows always keep their column indices sorted in ascending order; every
//! mutating operation restores that invariant.

use derive_more::{Display, Error};
use faer::Mat;

use crate::options::MatchingJob;
use crate::sparse::matching::{self, Matching, MatchingError};
use crate::{E, I};

/// Errors detected while validating caller-supplied matrix data.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum InvalidMatrixError {
    #[display("row_ptr must start at 0 and be non-decreasing")]
    NonMonotoneRowPtr,

    #[display("column index out of range")]
    ColumnOutOfRange,

    #[display("array lengths are inconsistent with row_ptr")]
    LengthMismatch,

    #[display("row and column dimensions must agree")]
    NotSquare,
}

/// Square sparse matrix in compressed sparse row format.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    n: I,
    row_ptr: Vec<I>,
    col_ind: Vec<I>,
    val: Vec<E>,
    symmetric_pattern: bool,
}

impl CsrMatrix {
    /// Builds a matrix from raw CSR arrays, validating the structure.
    ///
    /// `symmetric_pattern` asserts that the sparsity pattern (not the
    /// values) is symmetric, which lets [`CsrMatrix::symmetrize_sparsity`]
    /// skip its scan.
    pub fn from_csr(
        n: I,
        row_ptr: &[I],
        col_ind: &[I],
        val: &[E],
        symmetric_pattern: bool,
    ) -> Result<Self, InvalidMatrixError> {
        if row_ptr.len() != n + 1 || row_ptr[0] != 0 {
            return Err(InvalidMatrixError::NonMonotoneRowPtr);
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(InvalidMatrixError::NonMonotoneRowPtr);
        }
        let nnz = row_ptr[n];
        if col_ind.len() != nnz || val.len() != nnz {
            return Err(InvalidMatrixError::LengthMismatch);
        }
        if col_ind.iter().any(|&c| c >= n) {
            return Err(InvalidMatrixError::ColumnOutOfRange);
        }
        let mut mat = Self {
            n,
            row_ptr: row_ptr.to_vec(),
            col_ind: col_ind.to_vec(),
            val: val.to_vec(),
            symmetric_pattern,
        };
        mat.sort_rows();
        Ok(mat)
    }

    /// Builds a matrix from `(row, col, value)` triplets, summing
    /// duplicates.
    pub fn from_triplets(n: I, triplets: &[(I, I, E)]) -> Result<Self, InvalidMatrixError> {
        if triplets.iter().any(|&(i, j, _)| i >= n || j >= n) {
            return Err(InvalidMatrixError::ColumnOutOfRange);
        }
        let mut entries = triplets.to_vec();
        entries.sort_by_key(|&(i, j, _)| (i, j));
        let mut row_ptr = vec![0; n + 1];
        let mut col_ind: Vec<I> = Vec::with_capacity(entries.len());
        let mut val: Vec<E> = Vec::with_capacity(entries.len());
        let mut last = None;
        for &(i, j, v) in &entries {
            if last == Some((i, j)) {
                *val.last_mut().unwrap() += v;
            } else {
                col_ind.push(j);
                val.push(v);
                row_ptr[i + 1] += 1;
                last = Some((i, j));
            }
        }
        for i in 0..n {
            row_ptr[i + 1] += row_ptr[i];
        }
        Ok(Self {
            n,
            row_ptr,
            col_ind,
            val,
            symmetric_pattern: false,
        })
    }

    pub fn n(&self) -> I {
        self.n
    }

    pub fn nnz(&self) -> I {
        self.col_ind.len()
    }

    pub fn row_ptr(&self) -> &[I] {
        &self.row_ptr
    }

    pub fn col_ind(&self) -> &[I] {
        &self.col_ind
    }

    pub fn val(&self) -> &[E] {
        &self.val
    }

    /// Value at `(i, j)`, or zero when the entry is not stored.
    pub fn get(&self, i: I, j: I) -> E {
        let row = &self.col_ind[self.row_ptr[i]..self.row_ptr[i + 1]];
        match row.binary_search(&j) {
            Ok(k) => self.val[self.row_ptr[i] + k],
            Err(_) => 0.,
        }
    }

    fn sort_rows(&mut self) {
        for i in 0..self.n {
            let lo = self.row_ptr[i];
            let hi = self.row_ptr[i + 1];
            let mut order: Vec<I> = (lo..hi).collect();
            if order.windows(2).all(|w| self.col_ind[w[0]] <= self.col_ind[w[1]]) {
                continue;
            }
            order.sort_by_key(|&k| self.col_ind[k]);
            let cols: Vec<I> = order.iter().map(|&k| self.col_ind[k]).collect();
            let vals: Vec<E> = order.iter().map(|&k| self.val[k]).collect();
            self.col_ind[lo..hi].copy_from_slice(&cols);
            self.val[lo..hi].copy_from_slice(&vals);
        }
    }

    /// `y <- A x` for a single vector.
    pub fn spmv(&self, x: &[E], y: &mut [E]) {
        for i in 0..self.n {
            let mut yi = 0.;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                yi += self.val[k] * x[self.col_ind[k]];
            }
            y[i] = yi;
        }
    }

    /// `y <- A x` over faer column views.
    pub fn spmv_col(&self, x: faer::ColRef<'_, E>, mut y: faer::ColMut<'_, E>) {
        for i in 0..self.n {
            let mut yi = 0.;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                yi += self.val[k] * x[self.col_ind[k]];
            }
            y[i] = yi;
        }
    }

    /// `Y <- A X` for a dense block of vectors.
    pub fn spmv_mat(&self, x: &Mat<E>, y: &mut Mat<E>) {
        for j in 0..x.ncols() {
            for i in 0..self.n {
                let mut yi = 0.;
                for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                    yi += self.val[k] * x[(self.col_ind[k], j)];
                }
                y[(i, j)] = yi;
            }
        }
    }

    /// Pads the pattern with explicit zeros so that `(i, j)` stored implies
    /// `(j, i)` stored. Values of existing entries are untouched.
    /// Idempotent; a no-op when the pattern is already known symmetric.
    pub fn symmetrize_sparsity(&mut self) {
        if self.symmetric_pattern {
            return;
        }
        // Entries whose transposed position is missing, grouped by the row
        // that must receive them.
        let mut missing: Vec<Vec<I>> = vec![Vec::new(); self.n];
        let mut any = false;
        for i in 0..self.n {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_ind[k];
                if j == i {
                    continue;
                }
                let row_j = &self.col_ind[self.row_ptr[j]..self.row_ptr[j + 1]];
                if row_j.binary_search(&i).is_err() {
                    missing[j].push(i);
                    any = true;
                }
            }
        }
        if any {
            let mut row_ptr = Vec::with_capacity(self.n + 1);
            let mut col_ind = Vec::with_capacity(self.nnz() + missing.iter().map(Vec::len).sum::<I>());
            let mut val = Vec::with_capacity(col_ind.capacity());
            row_ptr.push(0);
            for i in 0..self.n {
                let lo = self.row_ptr[i];
                let hi = self.row_ptr[i + 1];
                let mut extra = std::mem::take(&mut missing[i]);
                extra.sort_unstable();
                extra.dedup();
                let mut e = extra.iter().peekable();
                for k in lo..hi {
                    while let Some(&&c) = e.peek() {
                        if c < self.col_ind[k] {
                            col_ind.push(c);
                            val.push(0.);
                            e.next();
                        } else {
                            break;
                        }
                    }
                    col_ind.push(self.col_ind[k]);
                    val.push(self.val[k]);
                }
                for &c in e {
                    col_ind.push(c);
                    val.push(0.);
                }
                row_ptr.push(col_ind.len());
            }
            self.row_ptr = row_ptr;
            self.col_ind = col_ind;
            self.val = val;
        }
        self.symmetric_pattern = true;
    }

    /// Symmetric permutation: the stored matrix becomes `A'` with
    /// `A'[i, j] = A[iperm[i], iperm[j]]`. Rows are emitted in destination
    /// order with ascending column indices.
    pub fn permute(&mut self, perm: &[I], iperm: &[I]) {
        let mut row_ptr = Vec::with_capacity(self.n + 1);
        let mut col_ind = Vec::with_capacity(self.nnz());
        let mut val = Vec::with_capacity(self.nnz());
        row_ptr.push(0);
        for i in 0..self.n {
            let old = iperm[i];
            let lo = self.row_ptr[old];
            let hi = self.row_ptr[old + 1];
            let mut entries: Vec<(I, E)> = (lo..hi)
                .map(|k| (perm[self.col_ind[k]], self.val[k]))
                .collect();
            entries.sort_by_key(|&(c, _)| c);
            for (c, v) in entries {
                col_ind.push(c);
                val.push(v);
            }
            row_ptr.push(col_ind.len());
        }
        self.row_ptr = row_ptr;
        self.col_ind = col_ind;
        self.val = val;
    }

    /// Runs the matching job and applies its result: values become
    /// `Dr * A * Q * Dc` in place. The returned [`Matching`] is kept by the
    /// façade for the solve-phase vector transforms.
    pub fn permute_and_scale(&mut self, job: MatchingJob) -> Result<Matching, MatchingError> {
        let m = matching::compute(self, job)?;
        self.apply_matching(&m);
        Ok(m)
    }

    /// Scales values by `Dr`/`Dc` and applies the column permutation
    /// `A[i][j] <- A[i][cperm[j]]`.
    fn apply_matching(&mut self, m: &Matching) {
        // Position of each original column in the permuted matrix.
        let mut icperm = vec![0; self.n];
        for (new, &old) in m.cperm.iter().enumerate() {
            icperm[old] = new;
        }
        for i in 0..self.n {
            let lo = self.row_ptr[i];
            let hi = self.row_ptr[i + 1];
            let mut entries: Vec<(I, E)> = (lo..hi)
                .map(|k| {
                    let j = self.col_ind[k];
                    (icperm[j], m.dr[i] * self.val[k] * m.dc[j])
                })
                .collect();
            entries.sort_by_key(|&(c, _)| c);
            for (idx, (c, v)) in entries.into_iter().enumerate() {
                self.col_ind[lo + idx] = c;
                self.val[lo + idx] = v;
            }
        }
        // The column permutation is not symmetric, so the pattern must be
        // re-symmetrized before reordering.
        self.symmetric_pattern = false;
    }

    /// Copies the diagonal block with rows and columns in `[begin, end)`
    /// into `dest`, which must be zeroed, `(end-begin) x (end-begin)`.
    pub fn extract_f11(&self, dest: &mut Mat<E>, begin: I, end: I) {
        for i in begin..end {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_ind[k];
                if j < begin {
                    continue;
                }
                if j >= end {
                    break;
                }
                dest[(i - begin, j - begin)] = self.val[k];
            }
        }
    }

    /// Copies rows `[begin, end)` restricted to the sorted column set `upd`
    /// into `dest` (`(end-begin) x upd.len()`, zeroed).
    pub fn extract_f12(&self, dest: &mut Mat<E>, begin: I, end: I, upd: &[I]) {
        for i in begin..end {
            let mut u = 0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_ind[k];
                while u < upd.len() && upd[u] < j {
                    u += 1;
                }
                if u == upd.len() {
                    break;
                }
                if upd[u] == j {
                    dest[(i - begin, u)] = self.val[k];
                }
            }
        }
    }

    /// Copies rows in the sorted set `upd` restricted to columns
    /// `[begin, end)` into `dest` (`upd.len() x (end-begin)`, zeroed).
    pub fn extract_f21(&self, dest: &mut Mat<E>, begin: I, end: I, upd: &[I]) {
        for (r, &i) in upd.iter().enumerate() {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_ind[k];
                if j < begin {
                    continue;
                }
                if j >= end {
                    break;
                }
                dest[(r, j - begin)] = self.val[k];
            }
        }
    }
}
