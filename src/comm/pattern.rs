//! Fixed send/receive schedules shared by both communicators.
//!
//! A [`CommPattern`] is built once and replayed on every exchange. Send-side
//! index lists say which source entries to pack for each peer; receive-side
//! position lists say which destination slots each peer's message fills. The
//! slots are fixed at construction, so the result never depends on the order
//! in which messages arrive.

use std::collections::BTreeMap;

use crate::comm::transport::{Tag, Transport, TransportExt};
use crate::error::Result;

const FORWARD: Tag = 0;
const REVERSE: Tag = 1;
const ROW_SIZES: Tag = 2;
const ROW_COLS: Tag = 3;
const ROW_VALUES: Tag = 4;
const REQUESTS: Tag = 5;

/// Per-peer index lists stored in a compressed layout.
///
/// The indices for `procs[k]` are `indices[indptr[k]..indptr[k + 1]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommData {
    /// Peer ranks, ascending.
    pub procs: Vec<usize>,
    /// Offsets into `indices`, one more than `procs`.
    pub indptr: Vec<usize>,
    /// Concatenated per-peer index lists.
    pub indices: Vec<usize>,
}

impl Default for CommData {
    fn default() -> Self {
        Self {
            procs: Vec::new(),
            indptr: vec![0],
            indices: Vec::new(),
        }
    }
}

impl CommData {
    /// Appends the index list for one more peer.
    pub fn push_proc<I>(&mut self, proc: usize, indices: I)
    where
        I: IntoIterator<Item = usize>,
    {
        self.procs.push(proc);
        self.indices.extend(indices);
        self.indptr.push(self.indices.len());
    }

    /// Number of peers (messages per exchange).
    pub fn num_msgs(&self) -> usize {
        self.procs.len()
    }

    /// Total number of entries over all peers.
    pub fn size_msgs(&self) -> usize {
        self.indices.len()
    }

    /// Iterates over `(peer, indices)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.procs
            .iter()
            .enumerate()
            .map(move |(k, &proc)| (proc, &self.indices[self.indptr[k]..self.indptr[k + 1]]))
    }
}

/// A replayable exchange schedule over one transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommPattern {
    /// Source entries to pack, per destination.
    pub send_data: CommData,
    /// Destination slots to fill, per source.
    pub recv_data: CommData,
    tag: Tag,
}

impl CommPattern {
    pub(crate) fn new(send_data: CommData, recv_data: CommData, tag: Tag) -> Self {
        Self {
            send_data,
            recv_data,
            tag,
        }
    }

    /// `dst[recv positions] = src[send indices]` across the group.
    pub(crate) fn forward(
        &self,
        comm: &dyn Transport,
        src: &[f64],
        dst: &mut [f64],
    ) -> Result<()> {
        for (proc, indices) in self.send_data.iter() {
            let buffer: Vec<f64> = indices.iter().map(|&i| src[i]).collect();
            comm.send_slice(proc, self.tag + FORWARD, &buffer)?;
        }

        for (proc, positions) in self.recv_data.iter() {
            let values = comm.recv_exact::<f64>(proc, self.tag + FORWARD, positions.len())?;
            for (&pos, value) in positions.iter().zip(values) {
                dst[pos] = value;
            }
        }
        Ok(())
    }

    /// Transpose of [`forward`](Self::forward): every receive slot is sent back
    /// to its owner, which adds it into `dst` at the matching send index.
    pub(crate) fn reverse(
        &self,
        comm: &dyn Transport,
        src: &[f64],
        dst: &mut [f64],
    ) -> Result<()> {
        for (proc, positions) in self.recv_data.iter() {
            let buffer: Vec<f64> = positions.iter().map(|&p| src[p]).collect();
            comm.send_slice(proc, self.tag + REVERSE, &buffer)?;
        }

        for (proc, indices) in self.send_data.iter() {
            let values = comm.recv_exact::<f64>(proc, self.tag + REVERSE, indices.len())?;
            for (&idx, value) in indices.iter().zip(values) {
                dst[idx] += value;
            }
        }
        Ok(())
    }

    /// Exchanges whole sparse rows instead of single values.
    ///
    /// `rows(i)` yields the global columns and values of source row `i`. The
    /// result has one `(columns, values)` entry per destination slot, and
    /// `num_slots` slots in total.
    pub(crate) fn forward_rows<'a, F>(
        &self,
        comm: &dyn Transport,
        rows: F,
        num_slots: usize,
    ) -> Result<Vec<(Vec<usize>, Vec<f64>)>>
    where
        F: Fn(usize) -> (&'a [usize], &'a [f64]),
    {
        for (proc, indices) in self.send_data.iter() {
            let mut sizes = Vec::with_capacity(indices.len());
            let mut cols = Vec::new();
            let mut values = Vec::new();
            for &i in indices {
                let (row_cols, row_values) = rows(i);
                sizes.push(row_cols.len());
                cols.extend_from_slice(row_cols);
                values.extend_from_slice(row_values);
            }
            comm.send_slice(proc, self.tag + ROW_SIZES, &sizes)?;
            comm.send_slice(proc, self.tag + ROW_COLS, &cols)?;
            comm.send_slice(proc, self.tag + ROW_VALUES, &values)?;
        }

        let mut slots = vec![(Vec::new(), Vec::new()); num_slots];
        for (proc, positions) in self.recv_data.iter() {
            let sizes = comm.recv_exact::<usize>(proc, self.tag + ROW_SIZES, positions.len())?;
            let total = sizes.iter().sum();
            let cols = comm.recv_exact::<usize>(proc, self.tag + ROW_COLS, total)?;
            let values = comm.recv_exact::<f64>(proc, self.tag + ROW_VALUES, total)?;

            let mut start = 0;
            for (&pos, &size) in positions.iter().zip(&sizes) {
                slots[pos] = (
                    cols[start..start + size].to_vec(),
                    values[start..start + size].to_vec(),
                );
                start += size;
            }
        }
        Ok(slots)
    }
}

/// Groups `(global, position)` requests by the rank `owner` assigns them to.
///
/// Returns `(rank, globals, positions)` triples in ascending rank order, each
/// list keeping the input order.
pub(crate) fn group_requests<I, F>(
    requests: I,
    mut owner: F,
) -> Result<Vec<(usize, Vec<usize>, Vec<usize>)>>
where
    I: IntoIterator<Item = (usize, usize)>,
    F: FnMut(usize) -> Result<usize>,
{
    let mut grouped: BTreeMap<usize, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (global, position) in requests {
        let entry = grouped.entry(owner(global)?).or_default();
        entry.0.push(global);
        entry.1.push(position);
    }
    Ok(grouped
        .into_iter()
        .map(|(proc, (globals, positions))| (proc, globals, positions))
        .collect())
}

/// Two-phase request discovery.
///
/// Each rank lists, per peer, the global indices it needs from that peer.
/// Phase one exchanges the request counts with an all-to-all; phase two sends
/// the indices themselves point-to-point. Returns, in ascending rank order,
/// every peer that requested something from this rank with its request list.
pub(crate) fn exchange_requests(
    comm: &dyn Transport,
    requests: &[(usize, Vec<usize>)],
    tag: Tag,
) -> Result<Vec<(usize, Vec<usize>)>> {
    let mut counts = vec![0; comm.size()];
    for (proc, globals) in requests {
        counts[*proc] = globals.len();
    }
    let incoming = comm.alltoall_counts(&counts)?;

    for (proc, globals) in requests {
        if !globals.is_empty() {
            comm.send_slice(*proc, tag + REQUESTS, globals)?;
        }
    }

    let mut received = Vec::new();
    for (proc, &count) in incoming.iter().enumerate() {
        if count > 0 {
            received.push((proc, comm.recv_exact::<usize>(proc, tag + REQUESTS, count)?));
        }
    }
    Ok(received)
}
