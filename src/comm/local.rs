//! In-process transport: one mailbox per rank over crossbeam channels.
//!
//! [`LocalWorld`] creates a group of [`LocalComm`] endpoints that behave like
//! the ranks of a message-passing job. Each endpoint is meant to be driven by
//! its own thread; [`LocalWorld::run`] does exactly that.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

use crate::comm::transport::{Tag, Transport, TransportExt, SPLIT_TAG};
use crate::error::{ParError, Result};

/// Identifies a communicator: the root group is `[0]`, every split appends
/// `[split sequence number, color]`.
type Context = Arc<[u64]>;

type MailKey = (Context, usize, Tag);

struct Envelope {
    context: Context,
    /// World rank of the sender.
    source: usize,
    tag: Tag,
    payload: Vec<u8>,
}

/// Incoming messages of one world rank, shared by every communicator that
/// rank belongs to.
struct Mailbox {
    receiver: Receiver<Envelope>,
    pending: Mutex<HashMap<MailKey, VecDeque<Vec<u8>>>>,
    timeout: Option<Duration>,
}

impl Mailbox {
    fn take(&self, key: MailKey) -> Result<Vec<u8>> {
        {
            let mut pending = self.lock_pending()?;
            if let Some(payload) = pending.get_mut(&key).and_then(VecDeque::pop_front) {
                return Ok(payload);
            }
        }

        loop {
            let envelope = match self.timeout {
                Some(timeout) => self.receiver.recv_timeout(timeout).map_err(|_| {
                    ParError::Transport(format!(
                        "timed out after {:?} waiting for rank {} (tag {:#x})",
                        timeout, key.1, key.2
                    ))
                })?,
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| ParError::Transport("mailbox disconnected".into()))?,
            };

            let incoming = (envelope.context, envelope.source, envelope.tag);
            if incoming == key {
                return Ok(envelope.payload);
            }
            self.lock_pending()?
                .entry(incoming)
                .or_default()
                .push_back(envelope.payload);
        }
    }

    fn lock_pending(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<MailKey, VecDeque<Vec<u8>>>>> {
        self.pending
            .lock()
            .map_err(|_| ParError::Transport("mailbox lock poisoned".into()))
    }
}

/// One rank's endpoint in an in-process group.
pub struct LocalComm {
    context: Context,
    /// World ranks of the group members, indexed by group rank.
    members: Arc<[usize]>,
    rank: usize,
    senders: Arc<[Sender<Envelope>]>,
    mailbox: Arc<Mailbox>,
    splits: AtomicU64,
}

impl LocalComm {
    /// World rank of this endpoint.
    pub fn world_rank(&self) -> usize {
        self.members[self.rank]
    }
}

impl Transport for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn send_bytes(&self, dest: usize, tag: Tag, bytes: Vec<u8>) -> Result<()> {
        let world_dest = *self.members.get(dest).ok_or(ParError::IndexOutOfRange {
            index: dest,
            context: "destination rank",
        })?;
        trace!(
            from = self.world_rank(),
            to = world_dest,
            tag,
            bytes = bytes.len(),
            "send"
        );
        self.senders[world_dest]
            .send(Envelope {
                context: self.context.clone(),
                source: self.world_rank(),
                tag,
                payload: bytes,
            })
            .map_err(|_| ParError::Transport(format!("rank {} has shut down", world_dest)))
    }

    fn recv_bytes(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        let world_source = *self.members.get(source).ok_or(ParError::IndexOutOfRange {
            index: source,
            context: "source rank",
        })?;
        self.mailbox.take((self.context.clone(), world_source, tag))
    }

    fn split(&self, color: usize, key: usize) -> Result<Box<dyn Transport>> {
        let sequence = self.splits.fetch_add(1, Ordering::Relaxed);

        for dest in 0..self.size() {
            self.send_slice(dest, SPLIT_TAG, &[color, key])?;
        }
        let mut group = Vec::new();
        for source in 0..self.size() {
            let entry = self.recv_exact::<usize>(source, SPLIT_TAG, 2)?;
            if entry[0] == color {
                group.push((entry[1], source));
            }
        }
        group.sort_unstable();

        let members: Arc<[usize]> = group
            .iter()
            .map(|&(_, source)| self.members[source])
            .collect::<Vec<_>>()
            .into();
        let rank = group
            .iter()
            .position(|&(_, source)| source == self.rank)
            .ok_or_else(|| ParError::Transport("split lost the calling rank".into()))?;

        let mut context = self.context.to_vec();
        context.push(sequence);
        context.push(color as u64);

        Ok(Box::new(LocalComm {
            context: context.into(),
            members,
            rank,
            senders: self.senders.clone(),
            mailbox: self.mailbox.clone(),
            splits: AtomicU64::new(0),
        }))
    }
}

/// Factory for an in-process group of ranks.
#[derive(Debug, Clone)]
pub struct LocalWorld {
    size: usize,
    timeout: Option<Duration>,
}

impl LocalWorld {
    /// A world of `size` ranks whose receives block indefinitely.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            timeout: None,
        }
    }

    /// Turns a receive that waits longer than `timeout` into a
    /// [`ParError::Transport`] instead of a hang.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Creates one endpoint per rank, indexed by rank.
    pub fn endpoints(&self) -> Vec<LocalComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..self.size).map(|_| unbounded()).unzip();
        let senders: Arc<[Sender<Envelope>]> = senders.into();
        let members: Arc<[usize]> = (0..self.size).collect::<Vec<_>>().into();
        let root: Context = vec![0].into();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| LocalComm {
                context: root.clone(),
                members: members.clone(),
                rank,
                senders: senders.clone(),
                mailbox: Arc::new(Mailbox {
                    receiver,
                    pending: Mutex::new(HashMap::new()),
                    timeout: self.timeout,
                }),
                splits: AtomicU64::new(0),
            })
            .collect()
    }

    /// Runs `f` once per rank, each on its own thread, and returns the results
    /// in rank order. A panic on any rank is propagated.
    pub fn run<F, R>(&self, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        let f = &f;
        let endpoints = self.endpoints();
        std::thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }
}
