//! Abstract process-group transport.
//!
//! The communicators in this crate only need a handful of primitives from the
//! process group they run on:
//!
//! - buffered point-to-point sends ([`Transport::send_bytes`]),
//! - blocking receives matched by source rank and tag ([`Transport::recv_bytes`]),
//! - a personalized all-to-all of counts ([`Transport::alltoall_counts`]),
//! - a grouping primitive ([`Transport::split`]).
//!
//! Any message-passing layer that provides these can back the communicators.
//! [`LocalComm`](crate::comm::LocalComm) implements them in-process.

use bytemuck::Pod;

use crate::error::{ParError, Result};

/// Message tag. Receives only match messages carrying the same tag.
pub type Tag = u32;

/// Tag reserved for the default all-to-all implementation.
pub(crate) const ALLTOALL_TAG: Tag = 0xFFFF_FF01;

/// Tag reserved for communicator splitting.
pub(crate) const SPLIT_TAG: Tag = 0xFFFF_FF02;

/// A group of ranks exchanging messages.
///
/// Ranks are numbered `0..size()` within the group. Sends are buffered: they
/// return once the payload has been handed to the transport, so a rank may post
/// every send of an exchange before waiting on any receive. Messages from one
/// source with one tag are received in the order they were sent.
pub trait Transport: Send {
    /// Rank of the calling process within this group.
    fn rank(&self) -> usize;

    /// Number of ranks in this group.
    fn size(&self) -> usize;

    /// Buffered send of a raw payload to `dest`.
    fn send_bytes(&self, dest: usize, tag: Tag, bytes: Vec<u8>) -> Result<()>;

    /// Blocks until the next message from `source` with `tag` is available.
    fn recv_bytes(&self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Partitions the group into sub-groups by `color`.
    ///
    /// Collective: every rank of the group must call it in the same order.
    /// Ranks of the new group are ordered by `key`, ties broken by the rank in
    /// this group.
    fn split(&self, color: usize, key: usize) -> Result<Box<dyn Transport>>;

    /// Personalized all-to-all of one count per rank.
    ///
    /// `counts[p]` is sent to rank `p`; entry `p` of the result is what rank
    /// `p` sent to this rank. The default implementation is built on
    /// point-to-point messages.
    fn alltoall_counts(&self, counts: &[usize]) -> Result<Vec<usize>> {
        if counts.len() != self.size() {
            return Err(ParError::Construction(format!(
                "alltoall needs {} counts, got {}",
                self.size(),
                counts.len()
            )));
        }

        for (dest, count) in counts.iter().enumerate() {
            self.send_bytes(dest, ALLTOALL_TAG, bytemuck::bytes_of(count).to_vec())?;
        }

        (0..self.size())
            .map(|source| {
                let bytes = self.recv_bytes(source, ALLTOALL_TAG)?;
                decode_count(source, &bytes)
            })
            .collect()
    }

    /// Gathers one count from every rank, in rank order.
    fn allgather_counts(&self, value: usize) -> Result<Vec<usize>> {
        self.alltoall_counts(&vec![value; self.size()])
    }
}

fn decode_count(source: usize, bytes: &[u8]) -> Result<usize> {
    let width = std::mem::size_of::<usize>();
    if bytes.len() != width {
        return Err(ParError::CommunicationMismatch {
            peer: source,
            expected: width,
            received: bytes.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(bytes))
}

/// Typed helpers over [`Transport`] for plain-old-data slices.
pub trait TransportExt: Transport {
    /// Sends a slice of `Pod` values.
    fn send_slice<T: Pod>(&self, dest: usize, tag: Tag, data: &[T]) -> Result<()> {
        self.send_bytes(dest, tag, bytemuck::cast_slice(data).to_vec())
    }

    /// Receives a vector of `Pod` values of any length.
    fn recv_vec<T: Pod>(&self, source: usize, tag: Tag) -> Result<Vec<T>> {
        let bytes = self.recv_bytes(source, tag)?;
        let width = std::mem::size_of::<T>();
        if width == 0 || bytes.len() % width != 0 {
            return Err(ParError::Transport(format!(
                "payload of {} bytes from rank {} is not a whole number of {}-byte values",
                bytes.len(),
                source,
                width
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Receives exactly `expected` values, failing on any size disagreement.
    fn recv_exact<T: Pod>(&self, source: usize, tag: Tag, expected: usize) -> Result<Vec<T>> {
        let values = self.recv_vec::<T>(source, tag)?;
        if values.len() != expected {
            return Err(ParError::CommunicationMismatch {
                peer: source,
                expected,
                received: values.len(),
            });
        }
        Ok(values)
    }
}

impl<C: Transport + ?Sized> TransportExt for C {}
