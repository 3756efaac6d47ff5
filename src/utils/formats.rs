//! Conversions between the local block formats and `sprs`, used to
//! cross-check the sequential kernels

use crate::matrix::{CscMatrix, CsrMatrix};
use sprs::CsMat;
use num_traits::Num;

/// Converts a CSR block to a `sprs` CSR matrix
pub fn to_sprs_csr<T>(matrix: &CsrMatrix<T>) -> CsMat<T>
where
    T: Copy + Num + Default,
{
    CsMat::new(
        (matrix.n_rows, matrix.n_cols),
        matrix.row_ptr.clone(),
        matrix.col_idx.clone(),
        matrix.values.clone(),
    )
}

/// Converts a CSC block to a `sprs` CSC matrix
pub fn to_sprs_csc<T>(matrix: &CscMatrix<T>) -> CsMat<T>
where
    T: Copy + Num + Default,
{
    CsMat::new_csc(
        (matrix.n_rows, matrix.n_cols),
        matrix.col_ptr.clone(),
        matrix.row_idx.clone(),
        matrix.values.clone(),
    )
}

/// Converts any `sprs` matrix to a CSR block
pub fn from_sprs_csr<T>(matrix: CsMat<T>) -> CsrMatrix<T>
where
    T: Copy + Num + Default,
{
    let matrix = if matrix.is_csr() {
        matrix
    } else {
        matrix.to_csr()
    };

    let shape = matrix.shape();
    let (indptr, indices, data) = matrix.into_raw_storage();

    CsrMatrix::new(shape.0, shape.1, indptr, indices, data)
}

/// Converts any `sprs` matrix to a CSC block
pub fn from_sprs_csc<T>(matrix: CsMat<T>) -> CscMatrix<T>
where
    T: Copy + Num + Default,
{
    let matrix = if matrix.is_csc() {
        matrix
    } else {
        matrix.to_csc()
    };

    let shape = matrix.shape();
    let (indptr, indices, data) = matrix.into_raw_storage();

    CscMatrix::new(shape.0, shape.1, indptr, indices, data)
}
