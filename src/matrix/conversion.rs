//! Conversion functions between matrix formats

use crate::matrix::{CscMatrix, CsrMatrix};
use num_traits::Num;

impl<T: Copy + Num> CsrMatrix<T> {
    /// Converts this CSR matrix to CSC format
    ///
    /// Row indices come out ascending within every column.
    pub fn to_csc(&self) -> CscMatrix<T> {
        // Count non-zeros per column
        let mut col_counts = vec![0; self.n_cols];

        for &col in &self.col_idx {
            col_counts[col] += 1;
        }

        // Compute column pointers via prefix sum
        let col_ptr = crate::utils::exclusive_scan(&col_counts);

        let nnz = self.nnz();
        let mut row_idx = vec![0; nnz];
        let mut values = vec![T::zero(); nnz];

        // Fill CSC matrix
        let mut next = col_ptr.clone();

        for i in 0..self.n_rows {
            for idx in self.row_ptr[i]..self.row_ptr[i + 1] {
                let col = self.col_idx[idx];
                let pos = next[col];

                row_idx[pos] = i;
                values[pos] = self.values[idx];

                next[col] += 1;
            }
        }

        CscMatrix::new(self.n_rows, self.n_cols, col_ptr, row_idx, values)
    }

    /// Converts to CSC keeping only the columns that hold entries
    ///
    /// Returns the compressed matrix and, for each of its columns, the
    /// original column index (ascending).
    pub fn to_csc_compressed(&self) -> (CscMatrix<T>, Vec<usize>) {
        let mut cols = self.col_idx.clone();
        cols.sort_unstable();
        cols.dedup();

        let mut renumbered = self.clone();
        for col in renumbered.col_idx.iter_mut() {
            // Every column index is present in `cols` by construction
            let original = *col;
            *col = cols.partition_point(|&c| c < original);
        }
        renumbered.n_cols = cols.len();

        (renumbered.to_csc(), cols)
    }

    /// Returns the transpose as a CSR matrix
    pub fn transpose(&self) -> CsrMatrix<T> {
        let csc = self.to_csc();
        CsrMatrix::new(self.n_cols, self.n_rows, csc.col_ptr, csc.row_idx, csc.values)
    }
}
