// Matrix data structures: local CSR/CSC blocks and the distributed matrix

pub mod conversion;
pub mod csc;
pub mod csr;
pub mod par_matrix;
pub mod partition;
pub mod reference;

pub use csc::CscMatrix;
pub use csr::CsrMatrix;
pub use par_matrix::ParCsrMatrix;
pub use partition::Partition;
pub use reference::{
    gather_global, gather_vector, reference_spgemm, reference_spmv, reference_spmv_t,
};
