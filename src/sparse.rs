//! Column-compressed sparse storage for the global left-hand side
//!
//! The LHS stores only the upper triangle of the free block and is treated
//! as symmetric. Structure and values are split: the structure is derived
//! once from the element incidence and shared read-only, while each
//! assembly pass (and each parallel worker) owns its own value array.

use crate::dofmap::IndexTable;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// Structural nonzero pattern of the free-block LHS.
///
/// For each free column `c` the pattern holds the free rows `r ≤ c` touched
/// together with `c` by at least one element. Row indices are ascending
/// within each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    n: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
}

impl SparsityPattern {
    /// Derive the pattern from per-element index tables.
    ///
    /// Walks every element's sorted table; each pair of free entries
    /// `(row, col)` with `row ≤ col` becomes a structural entry. Columns are
    /// collected as growable vectors and sorted + deduplicated afterwards.
    pub fn from_incidence(tables: &[IndexTable], n_free: usize) -> Self {
        let mut columns: Vec<Vec<usize>> = vec![Vec::new(); n_free];

        for table in tables {
            let entries = table.entries();
            for (i, &(_, row)) in entries.iter().enumerate() {
                if row >= n_free {
                    break;
                }
                for &(_, col) in &entries[i..] {
                    if col >= n_free {
                        break;
                    }
                    columns[col].push(row);
                }
            }
        }

        let mut col_ptr = Vec::with_capacity(n_free + 1);
        let mut row_idx = Vec::new();
        col_ptr.push(0);
        for rows in &mut columns {
            rows.sort_unstable();
            rows.dedup();
            row_idx.extend_from_slice(rows);
            col_ptr.push(row_idx.len());
        }

        Self {
            n: n_free,
            col_ptr,
            row_idx,
        }
    }

    /// Matrix dimension (the free DoF count).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Structural nonzero count.
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    pub fn row_idx(&self) -> &[usize] {
        &self.row_idx
    }

    /// Row indices of one column, ascending.
    pub fn column(&self, col: usize) -> &[usize] {
        &self.row_idx[self.col_ptr[col]..self.col_ptr[col + 1]]
    }
}

/// Upper-triangular sparse matrix over a shared [`SparsityPattern`].
///
/// Cloning the structure is an `Arc` bump, so parallel workers can split
/// off sibling accumulators that alias the same row/column pointers while
/// owning fresh value arrays.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    pattern: Arc<SparsityPattern>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// A zero matrix over the given structure.
    pub fn zeros(pattern: Arc<SparsityPattern>) -> Self {
        let nnz = pattern.nnz();
        Self {
            pattern,
            values: vec![0.0; nnz],
        }
    }

    /// A sibling matrix sharing this structure, with zeroed values.
    pub fn same_pattern_zeroed(&self) -> Self {
        Self::zeros(self.pattern.clone())
    }

    pub fn n(&self) -> usize {
        self.pattern.n
    }

    pub fn nnz(&self) -> usize {
        self.pattern.nnz()
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Reset all value slots to zero, keeping the structure.
    pub fn clear(&mut self) {
        self.values.fill(0.0);
    }

    /// Accumulate into a structurally present slot.
    ///
    /// Requires `row ≤ col`, both free, and the entry to exist in the
    /// pattern; the pattern is built so that every pair an element scatters
    /// is present.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let lo = self.pattern.col_ptr[col];
        let hi = self.pattern.col_ptr[col + 1];
        let slot = self.pattern.row_idx[lo..hi]
            .binary_search(&row)
            .expect("entry not present in sparsity pattern");
        self.values[lo + slot] += value;
    }

    /// Value at `(row, col)` with `row ≤ col`, or zero if not structural.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let lo = self.pattern.col_ptr[col];
        let hi = self.pattern.col_ptr[col + 1];
        match self.pattern.row_idx[lo..hi].binary_search(&row) {
            Ok(slot) => self.values[lo + slot],
            Err(_) => 0.0,
        }
    }

    /// Pointwise addition of another matrix over the same structure.
    pub fn join(&mut self, other: &SparseMatrix) {
        debug_assert!(Arc::ptr_eq(&self.pattern, &other.pattern));
        for (value, other_value) in self.values.iter_mut().zip(other.values.iter()) {
            *value += other_value;
        }
    }

    /// `y = A·x` treating the stored upper triangle as a symmetric matrix.
    pub fn sym_matvec(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.fill(0.0);
        for col in 0..self.pattern.n {
            for p in self.pattern.col_ptr[col]..self.pattern.col_ptr[col + 1] {
                let row = self.pattern.row_idx[p];
                let value = self.values[p];
                y[row] += value * x[col];
                if row != col {
                    y[col] += value * x[row];
                }
            }
        }
    }

    /// Expand to a dense symmetric matrix (debugging and tests).
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.pattern.n;
        let mut dense = DMatrix::zeros(n, n);
        for col in 0..n {
            for p in self.pattern.col_ptr[col]..self.pattern.col_ptr[col + 1] {
                let row = self.pattern.row_idx[p];
                dense[(row, col)] = self.values[p];
                dense[(col, row)] = self.values[p];
            }
        }
        dense
    }
}
