//! Compressed Sparse Row (CSR) matrix format implementation

use std::fmt;
use std::ops::AddAssign;

use num_traits::Num;

use crate::error::{ParError, Result};
use crate::utils::exclusive_scan;

/// A sparse matrix in Compressed Sparse Row (CSR) format
///
/// The CSR format stores a sparse matrix using three arrays:
/// - row_ptr: Array of size n_rows + 1 containing indices into col_idx and values arrays
/// - col_idx: Array of size nnz containing column indices of non-zero elements
/// - values: Array of size nnz containing the non-zero values
///
/// Both blocks of a distributed matrix are stored this way, with column
/// indices ascending inside every row.
#[derive(Clone, PartialEq)]
pub struct CsrMatrix<T> {
    /// Number of rows in the matrix
    pub n_rows: usize,

    /// Number of columns in the matrix
    pub n_cols: usize,

    /// Row pointers (size: n_rows + 1)
    /// row_ptr[i] is the index in col_idx and values where row i starts
    /// row_ptr[n_rows] is equal to nnz
    pub row_ptr: Vec<usize>,

    /// Column indices (size: nnz)
    pub col_idx: Vec<usize>,

    /// Non-zero values (size: nnz)
    pub values: Vec<T>,
}

impl<T> CsrMatrix<T>
where
    T: Copy + Num,
{
    /// Creates a new CSR matrix with the given dimensions and data
    ///
    /// # Panics
    ///
    /// Panics if the input arrays are inconsistent, see [`CsrMatrix::try_new`].
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        Self::try_new(n_rows, n_cols, row_ptr, col_idx, values)
            .unwrap_or_else(|e| panic!("{}", e))
    }

    /// Creates a new CSR matrix, reporting inconsistent input as an error
    ///
    /// - row_ptr.len() must be n_rows + 1
    /// - row_ptr[0] must be 0
    /// - col_idx.len() must equal values.len()
    /// - row_ptr[n_rows] must equal col_idx.len()
    /// - row_ptr must not decrease and every column index must be below n_cols
    pub fn try_new(
        n_rows: usize,
        n_cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self> {
        let fail = |msg: String| -> Result<Self> { Err(ParError::Construction(msg)) };

        if row_ptr.len() != n_rows + 1 {
            return fail("row_ptr.len() must be n_rows + 1".into());
        }
        if row_ptr[0] != 0 {
            return fail("row_ptr[0] must be 0".into());
        }
        if col_idx.len() != values.len() {
            return fail("col_idx.len() must equal values.len()".into());
        }
        if row_ptr[n_rows] != col_idx.len() {
            return fail("row_ptr[n_rows] must equal col_idx.len()".into());
        }
        if row_ptr.windows(2).any(|w| w[1] < w[0]) {
            return fail("row_ptr must be non-decreasing".into());
        }
        if let Some(&col) = col_idx.iter().find(|&&col| col >= n_cols) {
            return fail(format!(
                "Column index {} out of bounds (n_cols = {})",
                col, n_cols
            ));
        }

        Ok(Self {
            n_rows,
            n_cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Returns the number of non-zero elements in the matrix
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Returns an iterator over the non-zero elements in row i
    ///
    /// Each item is a tuple (col_idx, value) representing a non-zero element
    pub fn row_iter(&self, i: usize) -> impl Iterator<Item = (usize, &T)> {
        self.row_cols(i)
            .iter()
            .zip(self.row_values(i))
            .map(|(&col, val)| (col, val))
    }

    /// Column indices of row i
    pub fn row_cols(&self, i: usize) -> &[usize] {
        assert!(i < self.n_rows, "Row index out of bounds");
        &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Values of row i
    pub fn row_values(&self, i: usize) -> &[T] {
        assert!(i < self.n_rows, "Row index out of bounds");
        &self.values[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Iterates over all entries as (row, col, value)
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.n_rows).flat_map(move |i| self.row_iter(i).map(move |(j, &v)| (i, j, v)))
    }

    /// Creates an empty matrix with the given dimensions
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            row_ptr: vec![0; n_rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Creates an identity matrix of the given size
    pub fn identity(n: usize) -> Self {
        Self {
            n_rows: n,
            n_cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![T::one(); n],
        }
    }
}

impl<T> CsrMatrix<T>
where
    T: Copy + Num + AddAssign,
{
    /// Assembles a matrix from (row, col, value) triplets in any order
    ///
    /// Entries sharing a (row, col) position are summed. Column indices come
    /// out ascending within every row.
    ///
    /// # Panics
    ///
    /// Panics if a triplet lies outside `n_rows x n_cols`.
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        triplets.sort_unstable_by_key(|&(row, col, _)| (row, col));

        let mut counts = vec![0; n_rows];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            assert!(row < n_rows && col < n_cols, "Entry ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                // Duplicate position: merge into the entry just pushed
                if let Some(prev) = values.last_mut() {
                    *prev += val;
                }
                continue;
            }
            counts[row] += 1;
            col_idx.push(col);
            values.push(val);
            last = Some((row, col));
        }

        Self {
            n_rows,
            n_cols,
            row_ptr: exclusive_scan(&counts),
            col_idx,
            values,
        }
    }
}

impl<T: fmt::Debug + Copy + Num> fmt::Debug for CsrMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CsrMatrix {{")?;
        writeln!(f, "  dimensions: {} × {}", self.n_rows, self.n_cols)?;
        writeln!(f, "  nnz: {}", self.nnz())?;

        // Print a sample of the matrix content
        let max_rows_to_print = 5.min(self.n_rows);

        if max_rows_to_print > 0 {
            writeln!(f, "  content sample:")?;

            for i in 0..max_rows_to_print {
                write!(f, "    row {}: ", i)?;
                let start = self.row_ptr[i];
                let end = self.row_ptr[i + 1];

                if start == end {
                    writeln!(f, "(empty)")?;
                } else {
                    let max_elements = 5.min(end - start);

                    for j in start..(start + max_elements) {
                        write!(f, "({}, {:?}) ", self.col_idx[j], self.values[j])?;
                    }

                    if end - start > max_elements {
                        write!(f, "... ({} more)", end - start - max_elements)?;
                    }

                    writeln!(f)?;
                }
            }

            if self.n_rows > max_rows_to_print {
                writeln!(f, "    ... ({} more rows)", self.n_rows - max_rows_to_print)?;
            }
        }

        write!(f, "}}")
    }
}
