//! Sequential kernels and their distributed counterparts on
//! [`ParCsrMatrix`](crate::matrix::ParCsrMatrix).

pub mod matmult;
pub mod spmv;

pub use matmult::{seq_mm, sparse_dot, LocalToGlobal, OffsetMap, TableMap};
pub use spmv::{
    seq_spmv, seq_spmv_csc, seq_spmv_csc_cols, seq_spmv_t, seq_spmv_t_csc, seq_spmv_t_csc_cols,
    BlockSpmv,
};
