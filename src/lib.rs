//! # parsparse: distributed sparse matrices with halo communicators
//!
//! The substrate of a parallel algebraic multigrid solver. A global sparse
//! matrix is split by rows across ranks; each rank stores its rows as two CSR
//! blocks:
//!
//! - the **on-process** block, whose columns the rank owns, and
//! - the **off-process** block, whose columns other ranks own, numbered
//!   against a sorted column map.
//!
//! A matrix-vector product needs the vector entries behind the off-process
//! columns (the halo). Two communicators fetch them:
//!
//! 1. [`ParComm`]: every rank exchanges directly with each owner it needs.
//! 2. [`TapComm`]: ranks are grouped into nodes; traffic between nodes is
//!    deduplicated and routed through one representative rank per node.
//!
//! Both produce identical halos. Ranks talk through the [`Transport`] trait;
//! [`LocalWorld`] runs a whole group in-process, one thread per rank.
//!
//! ## Usage
//!
//! ```
//! use parsparse::{LocalWorld, ParCsrMatrix, Partition, TopologyConfig, Transport};
//!
//! let world = LocalWorld::new(2);
//! let results = world.run(|comm| {
//!     let partition = Partition::uniform(comm.rank(), comm.size(), 4, 4).unwrap();
//!     let mut a = ParCsrMatrix::new(partition);
//!     for i in 0..2 {
//!         let g = a.local_row_map()[i];
//!         a.add_value(i, g, 2.0).unwrap();
//!         a.add_value(i, (g + 1) % 4, -1.0).unwrap();
//!     }
//!     a.finalize(&comm).unwrap();
//!     a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(1)).unwrap();
//!
//!     let x = vec![1.0; 2];
//!     let mut y = vec![0.0; 2];
//!     a.mult(&comm, &x, &mut y).unwrap();
//!     let mut z = vec![0.0; 2];
//!     a.tap_mult(&x, &mut z).unwrap();
//!     assert_eq!(y, z);
//!     y
//! });
//! assert_eq!(results, vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
//! ```

pub mod comm;
pub mod error;
pub mod linalg;
pub mod matrix;
pub mod utils;

pub use comm::{
    CommData, LocalComm, LocalWorld, ParComm, TapComm, TopologyConfig, Transport, TransportExt,
    PPN_ENV_VAR,
};
pub use error::{ParError, Result};
pub use linalg::{
    seq_mm, seq_spmv, seq_spmv_csc, seq_spmv_csc_cols, seq_spmv_t, seq_spmv_t_csc,
    seq_spmv_t_csc_cols, sparse_dot, BlockSpmv, LocalToGlobal, OffsetMap, TableMap,
};
pub use matrix::{
    gather_global, gather_vector, reference_spgemm, reference_spmv, reference_spmv_t, CscMatrix,
    CsrMatrix, ParCsrMatrix, Partition,
};
pub use utils::{from_sprs_csc, from_sprs_csr, to_sprs_csc, to_sprs_csr};

/// Version information for the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
