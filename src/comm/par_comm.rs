//! One-level neighbour-exchange communicator.
//!
//! Every rank talks directly to every rank that owns a column it needs. The
//! schedule is discovered once from the off-process column map:
//!
//! 1. group the needed columns by owning rank (receive side),
//! 2. exchange request counts with an all-to-all,
//! 3. send the requested global columns point-to-point; each owner converts
//!    what it receives into local indices (send side).

use tracing::debug;

use crate::comm::pattern::{exchange_requests, group_requests, CommData, CommPattern};
use crate::comm::transport::{Tag, Transport};
use crate::error::{ParError, Result};
use crate::matrix::{CsrMatrix, Partition};

/// Tag block used by flat communicators.
pub(crate) const PAR_COMM_TAG: Tag = 0x100;

/// Halo exchange schedule for one distributed matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParComm {
    pattern: CommPattern,
    /// Length of the off-process buffer (column map size)
    recv_size: usize,
    /// Length of the on-process vector (locally owned columns)
    local_size: usize,
}

impl ParComm {
    /// Discovers the exchange schedule for `off_proc_column_map`.
    ///
    /// Collective over `comm`. The column map must be ascending and hold no
    /// column owned by the calling rank.
    pub fn new(
        comm: &dyn Transport,
        partition: &Partition,
        off_proc_column_map: &[usize],
    ) -> Result<Self> {
        Self::with_tag(comm, partition, off_proc_column_map, PAR_COMM_TAG)
    }

    pub(crate) fn with_tag(
        comm: &dyn Transport,
        partition: &Partition,
        off_proc_column_map: &[usize],
        tag: Tag,
    ) -> Result<Self> {
        let rank = comm.rank();
        if partition.num_procs() != comm.size() {
            return Err(ParError::Construction(format!(
                "partition over {} ranks used with a group of {}",
                partition.num_procs(),
                comm.size()
            )));
        }

        let requests = group_requests(
            off_proc_column_map
                .iter()
                .enumerate()
                .map(|(position, &global)| (global, position)),
            |global| match partition.col_owner(global) {
                Some(owner) if owner == rank => Err(ParError::Construction(format!(
                    "column {} is owned by rank {} but listed as off-process",
                    global, rank
                ))),
                Some(owner) => Ok(owner),
                None => Err(ParError::IndexOutOfRange {
                    index: global,
                    context: "global column space",
                }),
            },
        )?;

        let mut recv_data = CommData::default();
        let mut outgoing = Vec::with_capacity(requests.len());
        for (proc, globals, positions) in requests {
            recv_data.push_proc(proc, positions);
            outgoing.push((proc, globals));
        }

        let mut send_data = CommData::default();
        for (proc, globals) in exchange_requests(comm, &outgoing, tag)? {
            let local = globals
                .iter()
                .map(|&g| {
                    partition
                        .global_to_local_col(g)
                        .ok_or(ParError::IndexOutOfRange {
                            index: g,
                            context: "columns owned by the requested rank",
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            send_data.push_proc(proc, local);
        }

        debug!(
            rank,
            sends = send_data.num_msgs(),
            send_size = send_data.size_msgs(),
            recvs = recv_data.num_msgs(),
            recv_size = recv_data.size_msgs(),
            "built flat communicator"
        );

        Ok(Self {
            pattern: CommPattern::new(send_data, recv_data, tag),
            recv_size: off_proc_column_map.len(),
            local_size: partition.local_num_cols,
        })
    }

    /// Gathers the off-process entries of `x_on` from their owners.
    ///
    /// Slot `i` of the result holds the value of global column
    /// `off_proc_column_map[i]`.
    pub fn communicate(&self, comm: &dyn Transport, x_on: &[f64]) -> Result<Vec<f64>> {
        debug_assert_eq!(x_on.len(), self.local_size);
        let mut halo = vec![0.0; self.recv_size];
        self.pattern.forward(comm, x_on, &mut halo)?;
        Ok(halo)
    }

    /// Transpose exchange: sends every off-process slot back to its owner and
    /// returns the sums received for the locally owned columns.
    pub fn communicate_t(&self, comm: &dyn Transport, x_off: &[f64]) -> Result<Vec<f64>> {
        debug_assert_eq!(x_off.len(), self.recv_size);
        let mut local = vec![0.0; self.local_size];
        self.pattern.reverse(comm, x_off, &mut local)?;
        Ok(local)
    }

    /// Fetches the rows matching the off-process columns.
    ///
    /// `rows` holds the locally owned rows of a matrix whose row partition
    /// matches this communicator's column partition, with global column
    /// indices. Row `i` of the result is the row of global index
    /// `off_proc_column_map[i]`.
    pub fn communicate_rows(
        &self,
        comm: &dyn Transport,
        rows: &CsrMatrix<f64>,
    ) -> Result<CsrMatrix<f64>> {
        if rows.n_rows != self.local_size {
            return Err(ParError::Construction(format!(
                "row exchange needs {} local rows, got {}",
                self.local_size, rows.n_rows
            )));
        }

        let received = self.pattern.forward_rows(
            comm,
            |i| (rows.row_cols(i), rows.row_values(i)),
            self.recv_size,
        )?;

        let mut row_ptr = Vec::with_capacity(self.recv_size + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for (cols, vals) in received {
            col_idx.extend(cols);
            values.extend(vals);
            row_ptr.push(col_idx.len());
        }
        CsrMatrix::try_new(self.recv_size, rows.n_cols, row_ptr, col_idx, values)
    }

    /// Per-destination send lists (local column indices).
    pub fn send_data(&self) -> &CommData {
        &self.pattern.send_data
    }

    /// Per-source receive positions in the off-process buffer.
    pub fn recv_data(&self) -> &CommData {
        &self.pattern.recv_data
    }

    /// Messages sent per exchange.
    pub fn num_sends(&self) -> usize {
        self.pattern.send_data.num_msgs()
    }

    /// Messages received per exchange.
    pub fn num_recvs(&self) -> usize {
        self.pattern.recv_data.num_msgs()
    }

    /// Values sent per exchange.
    pub fn send_size(&self) -> usize {
        self.pattern.send_data.size_msgs()
    }

    /// Values received per exchange.
    pub fn recv_size(&self) -> usize {
        self.recv_size
    }

    /// Ranks this rank sends to, ascending.
    pub fn send_procs(&self) -> &[usize] {
        &self.pattern.send_data.procs
    }

    /// Ranks this rank receives from, ascending.
    pub fn recv_procs(&self) -> &[usize] {
        &self.pattern.recv_data.procs
    }
}
