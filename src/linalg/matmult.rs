//! Dot-product sparse matrix-matrix multiplication.
//!
//! Every row of the left operand is merged against every column of the right
//! operand. Both sides translate their local indices into a shared global
//! index space through [`LocalToGlobal`], so blocks numbered differently
//! (an on-process block by offset, an off-process block by column map) can
//! be multiplied against the same rows.

use tracing::debug;

use crate::comm::Transport;
use crate::error::{ParError, Result};
use crate::matrix::{CscMatrix, CsrMatrix, ParCsrMatrix, Partition};

/// Translates a block's local index into the global index space.
pub trait LocalToGlobal {
    fn to_global(&self, local: usize) -> usize;
}

/// Explicit lookup table, e.g. an off-process column map.
#[derive(Debug, Clone, Copy)]
pub struct TableMap<'a>(pub &'a [usize]);

impl LocalToGlobal for TableMap<'_> {
    fn to_global(&self, local: usize) -> usize {
        self.0[local]
    }
}

/// Contiguous range starting at the given global index.
#[derive(Debug, Clone, Copy)]
pub struct OffsetMap(pub usize);

impl LocalToGlobal for OffsetMap {
    fn to_global(&self, local: usize) -> usize {
        self.0 + local
    }
}

/// Merges two index lists that are ascending once mapped to global indices,
/// summing `a * b` over the shared indices.
///
/// Returns `None` when the lists share no index.
pub fn sparse_dot(
    a_idx: &[usize],
    a_vals: &[f64],
    b_idx: &[usize],
    b_vals: &[f64],
    map_a: &dyn LocalToGlobal,
    map_b: &dyn LocalToGlobal,
) -> Option<f64> {
    let mut i = 0;
    let mut j = 0;
    let mut sum = 0.0;
    let mut overlap = false;

    while i < a_idx.len() && j < b_idx.len() {
        let ga = map_a.to_global(a_idx[i]);
        let gb = map_b.to_global(b_idx[j]);
        if ga < gb {
            i += 1;
        } else if gb < ga {
            j += 1;
        } else {
            sum += a_vals[i] * b_vals[j];
            overlap = true;
            i += 1;
            j += 1;
        }
    }

    overlap.then_some(sum)
}

/// `A * B` as (row of `A`, global column through `map_c`, value) triplets.
///
/// `map_a` maps the columns of `A` and `map_b` the rows of `B` into the same
/// index space. Row/column pairs without a shared index produce no entry.
pub fn seq_mm(
    a: &CsrMatrix<f64>,
    b: &CscMatrix<f64>,
    map_a: &dyn LocalToGlobal,
    map_b: &dyn LocalToGlobal,
    map_c: &dyn LocalToGlobal,
) -> Vec<(usize, usize, f64)> {
    let mut entries = Vec::new();
    for i in 0..a.n_rows {
        let (a_idx, a_vals) = (a.row_cols(i), a.row_values(i));
        if a_idx.is_empty() {
            continue;
        }
        for j in 0..b.n_cols {
            if let Some(value) =
                sparse_dot(a_idx, a_vals, b.col_rows(j), b.col_values(j), map_a, map_b)
            {
                entries.push((i, map_c.to_global(j), value));
            }
        }
    }
    entries
}

impl ParCsrMatrix {
    /// Distributed product `A * B`, finalized.
    ///
    /// The columns of `A` must be split like the rows of `B`. The rows of `B`
    /// matching `A`'s off-process columns are fetched with the flat
    /// communicator. Both operands must be finalized. Collective over `comm`.
    pub fn mult_matrix(&self, comm: &dyn Transport, b: &ParCsrMatrix) -> Result<ParCsrMatrix> {
        let pattern = self.comm()?;
        if !b.is_finalized() {
            return Err(ParError::NotFinalized("right operand has pending values"));
        }
        if !self.partition().transpose_compatible(b.partition()) {
            return Err(ParError::Construction(
                "column partition of the left operand must match the row partition of the right"
                    .into(),
            ));
        }

        let b_local = b.to_global_rows();
        let b_remote = pattern.communicate_rows(comm, &b_local)?;

        let mut entries = Vec::new();
        if self.on_proc().nnz() > 0 {
            let (csc, cols) = b_local.to_csc_compressed();
            entries.extend(seq_mm(
                self.on_proc(),
                &csc,
                &OffsetMap(self.partition().first_local_col),
                &OffsetMap(b.partition().first_local_row),
                &TableMap(&cols),
            ));
        }
        if self.off_proc().nnz() > 0 {
            let (csc, cols) = b_remote.to_csc_compressed();
            let map = TableMap(self.off_proc_column_map());
            entries.extend(seq_mm(self.off_proc(), &csc, &map, &map, &TableMap(&cols)));
        }

        let mut c = ParCsrMatrix::new(Partition::from_parts(self.partition(), b.partition())?);
        for (row, col, value) in entries {
            c.add_value(row, col, value)?;
        }
        c.finalize(comm)?;

        debug!(
            rank = c.partition().rank(),
            local_nnz = c.local_nnz(),
            fetched_rows = b_remote.n_rows,
            "computed distributed product"
        );
        Ok(c)
    }
}
