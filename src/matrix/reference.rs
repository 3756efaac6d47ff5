//! Gathered, sequential reference kernels
//!
//! Distributed results are checked against these: every rank assembles the
//! whole matrix and vector and computes the product the simple way.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use num_traits::Num;

use crate::comm::{Tag, Transport, TransportExt};
use crate::error::Result;
use crate::matrix::{CsrMatrix, ParCsrMatrix};

const GATHER_TAG: Tag = 0x300;

/// Performs sparse matrix multiplication with a row-by-row ordered accumulator
///
/// Not optimized for performance, but a correct reference result. Exact
/// zeros produced by cancellation are dropped.
pub fn reference_spgemm<T>(a: &CsrMatrix<T>, b: &CsrMatrix<T>) -> CsrMatrix<T>
where
    T: Copy + Num + AddAssign,
{
    assert_eq!(
        a.n_cols, b.n_rows,
        "Matrix dimensions must be compatible for multiplication"
    );

    let mut row_ptr = Vec::with_capacity(a.n_rows + 1);
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    row_ptr.push(0);

    for i in 0..a.n_rows {
        let mut accum: BTreeMap<usize, T> = BTreeMap::new();

        for (k, &a_val) in a.row_iter(i) {
            for (j, &b_val) in b.row_iter(k) {
                *accum.entry(j).or_insert_with(T::zero) += a_val * b_val;
            }
        }

        for (j, val) in accum {
            if !val.is_zero() {
                col_idx.push(j);
                values.push(val);
            }
        }
        row_ptr.push(col_idx.len());
    }

    CsrMatrix::new(a.n_rows, b.n_cols, row_ptr, col_idx, values)
}

/// Dense `A * x`
pub fn reference_spmv(a: &CsrMatrix<f64>, x: &[f64]) -> Vec<f64> {
    assert_eq!(a.n_cols, x.len(), "Vector length must match the column count");
    (0..a.n_rows)
        .map(|i| a.row_iter(i).map(|(j, &v)| v * x[j]).sum())
        .collect()
}

/// Dense `A^T * x`
pub fn reference_spmv_t(a: &CsrMatrix<f64>, x: &[f64]) -> Vec<f64> {
    assert_eq!(a.n_rows, x.len(), "Vector length must match the row count");
    let mut y = vec![0.0; a.n_cols];
    for (i, j, v) in a.triplets() {
        y[j] += v * x[i];
    }
    y
}

/// Assembles the whole distributed matrix on every rank.
///
/// Collective over `comm`.
pub fn gather_global(comm: &dyn Transport, a: &ParCsrMatrix) -> Result<CsrMatrix<f64>> {
    let mut rows = Vec::with_capacity(a.local_nnz());
    let mut cols = Vec::with_capacity(a.local_nnz());
    let mut vals = Vec::with_capacity(a.local_nnz());
    for (i, j, v) in a.global_entries() {
        rows.push(i);
        cols.push(j);
        vals.push(v);
    }

    for dest in 0..comm.size() {
        comm.send_slice(dest, GATHER_TAG, &rows)?;
        comm.send_slice(dest, GATHER_TAG, &cols)?;
        comm.send_slice(dest, GATHER_TAG, &vals)?;
    }

    let mut triplets = Vec::new();
    for source in 0..comm.size() {
        let rows = comm.recv_vec::<usize>(source, GATHER_TAG)?;
        let cols = comm.recv_exact::<usize>(source, GATHER_TAG, rows.len())?;
        let vals = comm.recv_exact::<f64>(source, GATHER_TAG, rows.len())?;
        triplets.extend(rows.into_iter().zip(cols).zip(vals).map(|((i, j), v)| (i, j, v)));
    }

    let partition = a.partition();
    Ok(CsrMatrix::from_triplets(
        partition.global_num_rows,
        partition.global_num_cols,
        triplets,
    ))
}

/// Concatenates every rank's piece of a vector, in rank order.
///
/// Collective over `comm`.
pub fn gather_vector(comm: &dyn Transport, local: &[f64]) -> Result<Vec<f64>> {
    for dest in 0..comm.size() {
        comm.send_slice(dest, GATHER_TAG + 1, local)?;
    }
    let mut global = Vec::new();
    for source in 0..comm.size() {
        global.extend(comm.recv_vec::<f64>(source, GATHER_TAG + 1)?);
    }
    Ok(global)
}
