//! Compressed Sparse Column (CSC) matrix format implementation

use std::fmt;
use num_traits::Num;

/// A sparse matrix in Compressed Sparse Column (CSC) format
///
/// The CSC format stores a sparse matrix using three arrays:
/// - col_ptr: Array of size n_cols + 1 containing indices into row_idx and values arrays
/// - row_idx: Array of size nnz containing row indices of non-zero elements
/// - values: Array of size nnz containing the non-zero values
///
/// Used as the right operand of dot-product matrix multiplication, where
/// each column is merged against a row of the left operand.
#[derive(Clone, PartialEq)]
pub struct CscMatrix<T> {
    /// Number of rows in the matrix
    pub n_rows: usize,

    /// Number of columns in the matrix
    pub n_cols: usize,

    /// Column pointers (size: n_cols + 1)
    pub col_ptr: Vec<usize>,

    /// Row indices (size: nnz)
    pub row_idx: Vec<usize>,

    /// Non-zero values (size: nnz)
    pub values: Vec<T>,
}

impl<T> CscMatrix<T>
where
    T: Copy + Num,
{
    /// Creates a new CSC matrix with the given dimensions and data
    ///
    /// # Panics
    ///
    /// Panics if the input arrays are inconsistent:
    /// - col_ptr.len() must be n_cols + 1
    /// - row_idx.len() must equal values.len()
    /// - col_ptr[n_cols] must equal row_idx.len()
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(col_ptr.len(), n_cols + 1, "col_ptr.len() must be n_cols + 1");
        assert_eq!(row_idx.len(), values.len(), "row_idx.len() must equal values.len()");
        assert_eq!(
            col_ptr[n_cols], row_idx.len(),
            "col_ptr[n_cols] must equal row_idx.len()"
        );

        for &row in &row_idx {
            assert!(row < n_rows, "Row index {} out of bounds (n_rows = {})", row, n_rows);
        }

        Self {
            n_rows,
            n_cols,
            col_ptr,
            row_idx,
            values,
        }
    }

    /// Returns the number of non-zero elements in the matrix
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row indices of column j
    pub fn col_rows(&self, j: usize) -> &[usize] {
        assert!(j < self.n_cols, "Column index out of bounds");
        &self.row_idx[self.col_ptr[j]..self.col_ptr[j + 1]]
    }

    /// Values of column j
    pub fn col_values(&self, j: usize) -> &[T] {
        assert!(j < self.n_cols, "Column index out of bounds");
        &self.values[self.col_ptr[j]..self.col_ptr[j + 1]]
    }

    /// Returns an iterator over the non-zero elements in column j
    ///
    /// Each item is a tuple (row_idx, value) representing a non-zero element
    pub fn col_iter(&self, j: usize) -> impl Iterator<Item = (usize, &T)> {
        self.col_rows(j)
            .iter()
            .zip(self.col_values(j))
            .map(|(&row, val)| (row, val))
    }
}

impl<T: fmt::Debug + Copy + Num> fmt::Debug for CscMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CscMatrix {{")?;
        writeln!(f, "  dimensions: {} × {}", self.n_rows, self.n_cols)?;
        writeln!(f, "  nnz: {}", self.nnz())?;

        for j in 0..5.min(self.n_cols) {
            write!(f, "    col {}: ", j)?;
            for (i, val) in self.col_iter(j).take(5) {
                write!(f, "({}, {:?}) ", i, val)?;
            }
            writeln!(f)?;
        }
        if self.n_cols > 5 {
            writeln!(f, "    ... ({} more columns)", self.n_cols - 5)?;
        }

        write!(f, "}}")
    }
}
