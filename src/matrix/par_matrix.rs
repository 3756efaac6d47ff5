//! Distributed matrix: the locally owned rows of a global sparse matrix,
//! split into an on-process and an off-process CSR block.

use tracing::debug;

use crate::comm::{ParComm, TapComm, TopologyConfig, Transport};
use crate::error::{ParError, Result};
use crate::matrix::{CsrMatrix, Partition};

/// Rows `first_local_row..first_local_row + local_num_rows` of a distributed
/// matrix.
///
/// Entries whose column this rank owns live in the on-process block, with
/// columns numbered `0..local_num_cols`. All other entries live in the
/// off-process block, with columns numbered against `off_proc_column_map`,
/// which is strictly ascending and holds each needed remote column once.
///
/// Values are accumulated with [`add_value`](Self::add_value) and become
/// usable after [`finalize`](Self::finalize), which also builds the flat
/// communicator. Adding values afterwards un-finalizes the matrix.
#[derive(Debug)]
pub struct ParCsrMatrix {
    partition: Partition,
    on_proc: CsrMatrix<f64>,
    off_proc: CsrMatrix<f64>,
    on_proc_column_map: Vec<usize>,
    off_proc_column_map: Vec<usize>,
    local_row_map: Vec<usize>,
    local_nnz: usize,

    /// (local row, global column, value) added since the last finalize
    pending: Vec<(usize, usize, f64)>,
    comm: Option<ParComm>,
    tap_comm: Option<TapComm>,
}

impl ParCsrMatrix {
    /// Empty matrix over `partition`.
    pub fn new(partition: Partition) -> Self {
        let rows = partition.local_num_rows;
        let cols = partition.local_num_cols;
        Self {
            on_proc: CsrMatrix::zeros(rows, cols),
            off_proc: CsrMatrix::zeros(rows, 0),
            on_proc_column_map: partition.rank_col_range(partition.rank()).collect(),
            off_proc_column_map: Vec::new(),
            local_row_map: partition.rank_row_range(partition.rank()).collect(),
            local_nnz: 0,
            pending: Vec::new(),
            comm: None,
            tap_comm: None,
            partition,
        }
    }

    /// Loads already split blocks.
    ///
    /// `on_proc` must be `local_num_rows x local_num_cols`; `off_proc` must
    /// have one column per entry of `off_proc_column_map`, which must be
    /// strictly ascending and free of locally owned columns. The result still
    /// needs [`finalize`](Self::finalize).
    pub fn from_blocks(
        partition: Partition,
        on_proc: CsrMatrix<f64>,
        off_proc: CsrMatrix<f64>,
        off_proc_column_map: Vec<usize>,
    ) -> Result<Self> {
        let rows = partition.local_num_rows;
        if on_proc.n_rows != rows || off_proc.n_rows != rows {
            return Err(ParError::Construction(format!(
                "blocks have {} and {} rows, partition owns {}",
                on_proc.n_rows, off_proc.n_rows, rows
            )));
        }
        if on_proc.n_cols != partition.local_num_cols {
            return Err(ParError::Construction(format!(
                "on-process block has {} columns, partition owns {}",
                on_proc.n_cols, partition.local_num_cols
            )));
        }
        if off_proc.n_cols != off_proc_column_map.len() {
            return Err(ParError::Construction(format!(
                "off-process block has {} columns but the column map holds {}",
                off_proc.n_cols,
                off_proc_column_map.len()
            )));
        }
        if off_proc_column_map.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ParError::Construction(
                "off-process column map must be strictly ascending".into(),
            ));
        }
        if let Some(&g) = off_proc_column_map
            .iter()
            .find(|&&g| {
                g >= partition.global_num_cols || partition.global_to_local_col(g).is_some()
            })
        {
            return Err(ParError::Construction(format!(
                "column {} cannot appear in the off-process column map of rank {}",
                g,
                partition.rank()
            )));
        }

        let mut matrix = Self::new(partition);
        matrix.local_nnz = on_proc.nnz() + off_proc.nnz();
        matrix.on_proc = on_proc;
        matrix.off_proc = off_proc;
        matrix.off_proc_column_map = off_proc_column_map;
        Ok(matrix)
    }

    /// Adds `value` at (`local_row`, `global_col`). Repeated positions are
    /// summed by the next [`finalize`](Self::finalize).
    pub fn add_value(&mut self, local_row: usize, global_col: usize, value: f64) -> Result<()> {
        if local_row >= self.partition.local_num_rows {
            return Err(ParError::IndexOutOfRange {
                index: local_row,
                context: "local rows",
            });
        }
        if global_col >= self.partition.global_num_cols {
            return Err(ParError::IndexOutOfRange {
                index: global_col,
                context: "global column space",
            });
        }
        self.pending.push((local_row, global_col, value));
        self.comm = None;
        self.tap_comm = None;
        Ok(())
    }

    /// Like [`add_value`](Self::add_value) with a global row, which must be
    /// owned by this rank.
    pub fn add_global_value(
        &mut self,
        global_row: usize,
        global_col: usize,
        value: f64,
    ) -> Result<()> {
        let local_row =
            self.partition
                .global_to_local_row(global_row)
                .ok_or(ParError::IndexOutOfRange {
                    index: global_row,
                    context: "rows owned by this rank",
                })?;
        self.add_value(local_row, global_col, value)
    }

    /// Classifies every entry, builds the off-process column map and the
    /// flat communicator.
    ///
    /// Collective over `comm`. Duplicate positions are summed; map entries no
    /// entry refers to are dropped. Any topology-aware communicator is
    /// discarded and must be rebuilt with [`init_tap_comm`](Self::init_tap_comm).
    pub fn finalize(&mut self, comm: &dyn Transport) -> Result<()> {
        let first_col = self.partition.first_local_col;
        let mut entries: Vec<(usize, usize, f64)> =
            Vec::with_capacity(self.local_nnz + self.pending.len());
        entries.extend(self.on_proc.triplets().map(|(i, j, v)| (i, first_col + j, v)));
        entries.extend(
            self.off_proc
                .triplets()
                .map(|(i, j, v)| (i, self.off_proc_column_map[j], v)),
        );
        entries.append(&mut self.pending);

        let mut on_entries = Vec::new();
        let mut off_entries = Vec::new();
        for (row, global, value) in entries {
            match self.partition.global_to_local_col(global) {
                Some(local) => on_entries.push((row, local, value)),
                None => off_entries.push((row, global, value)),
            }
        }

        let mut column_map: Vec<usize> = off_entries.iter().map(|&(_, g, _)| g).collect();
        column_map.sort_unstable();
        column_map.dedup();

        let off_entries: Vec<_> = off_entries
            .into_iter()
            .map(|(row, global, value)| (row, column_map.partition_point(|&c| c < global), value))
            .collect();

        let rows = self.partition.local_num_rows;
        self.on_proc = CsrMatrix::from_triplets(rows, self.partition.local_num_cols, on_entries);
        self.off_proc = CsrMatrix::from_triplets(rows, column_map.len(), off_entries);
        self.off_proc_column_map = column_map;
        self.local_nnz = self.on_proc.nnz() + self.off_proc.nnz();

        self.tap_comm = None;
        self.comm = Some(ParComm::new(comm, &self.partition, &self.off_proc_column_map)?);

        debug!(
            rank = self.partition.rank(),
            local_nnz = self.local_nnz,
            on_nnz = self.on_proc.nnz(),
            off_proc_num_cols = self.off_proc_column_map.len(),
            "finalized distributed matrix"
        );
        Ok(())
    }

    /// Builds the topology-aware communicator for the current column map.
    ///
    /// Collective over `comm`. Requires a finalized matrix. Call again after a
    /// topology change; built communicators keep the layout they were made
    /// with.
    pub fn init_tap_comm(&mut self, comm: &dyn Transport, config: &TopologyConfig) -> Result<()> {
        if self.comm.is_none() {
            return Err(ParError::NotFinalized("finalize() must run before init_tap_comm()"));
        }
        self.tap_comm = Some(TapComm::new(
            comm,
            &self.partition,
            &self.off_proc_column_map,
            config,
        )?);
        Ok(())
    }

    /// Whether [`finalize`](Self::finalize) ran since the last change.
    pub fn is_finalized(&self) -> bool {
        self.comm.is_some()
    }

    /// Flat communicator.
    pub fn comm(&self) -> Result<&ParComm> {
        self.comm
            .as_ref()
            .ok_or(ParError::NotFinalized("finalize() has not run since the last change"))
    }

    /// Topology-aware communicator.
    pub fn tap_comm(&self) -> Result<&TapComm> {
        self.tap_comm
            .as_ref()
            .ok_or(ParError::NotFinalized("init_tap_comm() has not run since the last finalize"))
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn on_proc(&self) -> &CsrMatrix<f64> {
        &self.on_proc
    }

    pub fn off_proc(&self) -> &CsrMatrix<f64> {
        &self.off_proc
    }

    /// Global column of each on-process column.
    pub fn on_proc_column_map(&self) -> &[usize] {
        &self.on_proc_column_map
    }

    /// Global column of each off-process column, strictly ascending.
    pub fn off_proc_column_map(&self) -> &[usize] {
        &self.off_proc_column_map
    }

    /// Global row of each local row.
    pub fn local_row_map(&self) -> &[usize] {
        &self.local_row_map
    }

    /// Stored entries over both blocks, as of the last finalize.
    pub fn local_nnz(&self) -> usize {
        self.local_nnz
    }

    pub fn on_proc_num_cols(&self) -> usize {
        self.on_proc.n_cols
    }

    pub fn off_proc_num_cols(&self) -> usize {
        self.off_proc_column_map.len()
    }

    /// Position of global column `g` in the off-process column map.
    pub fn off_proc_local_index(&self, g: usize) -> Result<usize> {
        self.off_proc_column_map
            .binary_search(&g)
            .map_err(|_| ParError::IndexOutOfRange {
                index: g,
                context: "off-process column map",
            })
    }

    /// Iterates over the stored entries as (global row, global column, value).
    pub fn global_entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let on = self
            .on_proc
            .triplets()
            .map(move |(i, j, v)| (self.local_row_map[i], self.on_proc_column_map[j], v));
        let off = self
            .off_proc
            .triplets()
            .map(move |(i, j, v)| (self.local_row_map[i], self.off_proc_column_map[j], v));
        on.chain(off)
    }

    /// Local rows with both blocks merged, indexed by global column.
    pub fn to_global_rows(&self) -> CsrMatrix<f64> {
        let first_row = self.partition.first_local_row;
        CsrMatrix::from_triplets(
            self.partition.local_num_rows,
            self.partition.global_num_cols,
            self.global_entries()
                .map(|(i, j, v)| (i - first_row, j, v))
                .collect(),
        )
    }
}
