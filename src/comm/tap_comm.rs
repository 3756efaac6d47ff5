//! Topology-aware two-level communicator.
//!
//! Ranks are grouped into nodes of `procs_per_node` consecutive ranks and the
//! first rank of every node acts as its representative. Columns owned by
//! another rank of the same node are exchanged directly inside the node.
//! Columns owned by other nodes travel in three steps:
//!
//! 1. **local gather**: ranks hand the values other nodes need to their
//!    representative,
//! 2. **inter-node exchange**: representatives swap the node-level,
//!    deduplicated data, one message per communicating node pair,
//! 3. **local scatter**: representatives pass each received value on to the
//!    ranks of their node that asked for it.
//!
//! The result matches [`ParComm`](crate::comm::ParComm) slot for slot.

use tracing::debug;

use crate::comm::config::TopologyConfig;
use crate::comm::pattern::{exchange_requests, group_requests, CommData, CommPattern};
use crate::comm::transport::{Tag, Transport};
use crate::error::{ParError, Result};
use crate::matrix::Partition;

const ON_NODE_TAG: Tag = 0x200;
const GATHER_TAG: Tag = 0x210;
const INTER_NODE_TAG: Tag = 0x220;
const SCATTER_TAG: Tag = 0x230;

/// Local rank of every node's representative.
const REPRESENTATIVE: usize = 0;

/// Node-aware halo exchange schedule for one distributed matrix.
pub struct TapComm {
    procs_per_node: usize,
    node: usize,
    num_nodes: usize,

    /// Ranks of this node
    local_comm: Box<dyn Transport>,
    /// Representatives of all nodes; `None` on other ranks
    rep_comm: Option<Box<dyn Transport>>,

    on_node: CommPattern,
    local_gather: CommPattern,
    inter_node: CommPattern,
    local_scatter: CommPattern,

    /// Columns this node sends to other nodes (representative only), ascending
    node_send_cols: Vec<usize>,
    /// Columns this node receives from other nodes (representative only), ascending
    node_recv_cols: Vec<usize>,

    recv_size: usize,
    local_size: usize,
}

impl TapComm {
    /// Builds the two-level schedule for `off_proc_column_map`.
    ///
    /// Collective over `comm`. `config.procs_per_node` is read here and never
    /// again.
    pub fn new(
        comm: &dyn Transport,
        partition: &Partition,
        off_proc_column_map: &[usize],
        config: &TopologyConfig,
    ) -> Result<Self> {
        let ppn = config.procs_per_node;
        if ppn == 0 {
            return Err(ParError::Construction(
                "processes per node must be at least 1".into(),
            ));
        }
        let rank = comm.rank();
        let num_procs = comm.size();
        if partition.num_procs() != num_procs {
            return Err(ParError::Construction(format!(
                "partition over {} ranks used with a group of {}",
                partition.num_procs(),
                num_procs
            )));
        }

        let node = config.node_of(rank);
        let num_nodes = config.num_nodes(num_procs);
        let node_ranks = config.node_ranks(node, num_procs);
        let node_first = node_ranks.start;

        let local_comm = comm.split(node, rank)?;
        debug_assert_eq!(local_comm.size(), node_ranks.len());
        let is_rep = local_comm.rank() == REPRESENTATIVE;
        let rep_split = comm.split(usize::from(!is_rep), rank)?;
        let rep_comm = is_rep.then_some(rep_split);

        // Split the needed columns by whether their owner shares this node.
        let mut on_node = Vec::new();
        let mut off_node = Vec::new();
        for (position, &global) in off_proc_column_map.iter().enumerate() {
            let owner = partition.col_owner(global).ok_or(ParError::IndexOutOfRange {
                index: global,
                context: "global column space",
            })?;
            if owner == rank {
                return Err(ParError::Construction(format!(
                    "column {} is owned by rank {} but listed as off-process",
                    global, rank
                )));
            }
            if config.node_of(owner) == node {
                on_node.push((global, position));
            } else {
                off_node.push((global, position));
            }
        }

        let local = local_comm.as_ref();
        let resolve_local = |g: usize| {
            partition.global_to_local_col(g).ok_or(ParError::IndexOutOfRange {
                index: g,
                context: "columns owned by the requested rank",
            })
        };

        // Direct exchange inside the node.
        let on_node_pattern = {
            let requests = group_requests(on_node, |g| {
                owner_of(partition, g).map(|owner| owner - node_first)
            })?;
            let mut recv_data = CommData::default();
            let mut outgoing = Vec::new();
            for (proc, globals, positions) in requests {
                recv_data.push_proc(proc, positions);
                outgoing.push((proc, globals));
            }
            let mut send_data = CommData::default();
            for (proc, globals) in exchange_requests(local, &outgoing, ON_NODE_TAG)? {
                let indices = globals
                    .iter()
                    .map(|&g| resolve_local(g))
                    .collect::<Result<Vec<_>>>()?;
                send_data.push_proc(proc, indices);
            }
            CommPattern::new(send_data, recv_data, ON_NODE_TAG)
        };

        // Every rank tells the representative what it needs from other nodes.
        let (my_globals, my_positions): (Vec<usize>, Vec<usize>) = off_node.into_iter().unzip();
        let outgoing = if my_globals.is_empty() {
            Vec::new()
        } else {
            vec![(REPRESENTATIVE, my_globals)]
        };
        let node_requests = exchange_requests(local, &outgoing, SCATTER_TAG)?;

        let mut node_recv_cols: Vec<usize> = node_requests
            .iter()
            .flat_map(|(_, globals)| globals.iter().copied())
            .collect();
        node_recv_cols.sort_unstable();
        node_recv_cols.dedup();

        let local_scatter = {
            let mut send_data = CommData::default();
            for (proc, globals) in &node_requests {
                let indices = globals
                    .iter()
                    .map(|g| position_in(&node_recv_cols, *g))
                    .collect::<Result<Vec<_>>>()?;
                send_data.push_proc(*proc, indices);
            }
            let mut recv_data = CommData::default();
            if !my_positions.is_empty() {
                recv_data.push_proc(REPRESENTATIVE, my_positions);
            }
            CommPattern::new(send_data, recv_data, SCATTER_TAG)
        };

        // Representatives agree on node-level traffic. Rank `n` of the
        // representative group is the representative of node `n`.
        let mut node_send_cols = Vec::new();
        let inter_node = match &rep_comm {
            Some(reps) => {
                let requests = group_requests(
                    node_recv_cols.iter().enumerate().map(|(pos, &g)| (g, pos)),
                    |g| owner_of(partition, g).map(|owner| config.node_of(owner)),
                )?;
                let mut recv_data = CommData::default();
                let mut outgoing = Vec::new();
                for (peer_node, globals, positions) in requests {
                    recv_data.push_proc(peer_node, positions);
                    outgoing.push((peer_node, globals));
                }

                let incoming = exchange_requests(reps.as_ref(), &outgoing, INTER_NODE_TAG)?;
                node_send_cols = incoming
                    .iter()
                    .flat_map(|(_, globals)| globals.iter().copied())
                    .collect();
                node_send_cols.sort_unstable();
                node_send_cols.dedup();

                let mut send_data = CommData::default();
                for (peer_node, globals) in &incoming {
                    let indices = globals
                        .iter()
                        .map(|g| position_in(&node_send_cols, *g))
                        .collect::<Result<Vec<_>>>()?;
                    send_data.push_proc(*peer_node, indices);
                }
                CommPattern::new(send_data, recv_data, INTER_NODE_TAG)
            }
            None => CommPattern::new(CommData::default(), CommData::default(), INTER_NODE_TAG),
        };

        // The representative collects the outgoing node data from its owners.
        let local_gather = {
            let requests = group_requests(
                node_send_cols.iter().enumerate().map(|(pos, &g)| (g, pos)),
                |g| owner_of(partition, g).map(|owner| owner - node_first),
            )?;
            let mut recv_data = CommData::default();
            let mut outgoing = Vec::new();
            for (proc, globals, positions) in requests {
                recv_data.push_proc(proc, positions);
                outgoing.push((proc, globals));
            }
            let mut send_data = CommData::default();
            for (proc, globals) in exchange_requests(local, &outgoing, GATHER_TAG)? {
                let indices = globals
                    .iter()
                    .map(|&g| resolve_local(g))
                    .collect::<Result<Vec<_>>>()?;
                send_data.push_proc(proc, indices);
            }
            CommPattern::new(send_data, recv_data, GATHER_TAG)
        };

        debug!(
            rank,
            node,
            num_nodes,
            representative = is_rep,
            on_node_msgs = on_node_pattern.send_data.num_msgs(),
            inter_node_msgs = inter_node.send_data.num_msgs(),
            node_send = node_send_cols.len(),
            node_recv = node_recv_cols.len(),
            "built topology-aware communicator"
        );

        Ok(Self {
            procs_per_node: ppn,
            node,
            num_nodes,
            local_comm,
            rep_comm,
            on_node: on_node_pattern,
            local_gather,
            inter_node,
            local_scatter,
            node_send_cols,
            node_recv_cols,
            recv_size: off_proc_column_map.len(),
            local_size: partition.local_num_cols,
        })
    }

    /// Gathers the off-process entries of `x_on`.
    ///
    /// Slot `i` of the result holds the value of global column
    /// `off_proc_column_map[i]`, exactly as with the flat communicator.
    pub fn communicate(&self, x_on: &[f64]) -> Result<Vec<f64>> {
        debug_assert_eq!(x_on.len(), self.local_size);
        let local = self.local_comm.as_ref();
        let mut halo = vec![0.0; self.recv_size];

        self.on_node.forward(local, x_on, &mut halo)?;

        let mut node_send = vec![0.0; self.node_send_cols.len()];
        self.local_gather.forward(local, x_on, &mut node_send)?;

        let mut node_recv = vec![0.0; self.node_recv_cols.len()];
        if let Some(reps) = &self.rep_comm {
            self.inter_node.forward(reps.as_ref(), &node_send, &mut node_recv)?;
        }

        self.local_scatter.forward(local, &node_recv, &mut halo)?;
        Ok(halo)
    }

    /// Transpose exchange: the phases of [`communicate`](Self::communicate)
    /// in reverse order, summing contributions for each owned column.
    pub fn communicate_t(&self, x_off: &[f64]) -> Result<Vec<f64>> {
        debug_assert_eq!(x_off.len(), self.recv_size);
        let local = self.local_comm.as_ref();

        let mut node_recv = vec![0.0; self.node_recv_cols.len()];
        self.local_scatter.reverse(local, x_off, &mut node_recv)?;

        let mut node_send = vec![0.0; self.node_send_cols.len()];
        if let Some(reps) = &self.rep_comm {
            self.inter_node.reverse(reps.as_ref(), &node_recv, &mut node_send)?;
        }

        let mut result = vec![0.0; self.local_size];
        self.local_gather.reverse(local, &node_send, &mut result)?;
        self.on_node.reverse(local, x_off, &mut result)?;
        Ok(result)
    }

    /// Processes per node this communicator was built with.
    pub fn procs_per_node(&self) -> usize {
        self.procs_per_node
    }

    /// Node hosting this rank.
    pub fn node(&self) -> usize {
        self.node
    }

    /// Number of nodes in the job.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Whether this rank represents its node.
    pub fn is_representative(&self) -> bool {
        self.rep_comm.is_some()
    }

    /// Messages this rank sends to other nodes per exchange.
    pub fn inter_node_sends(&self) -> usize {
        self.inter_node.send_data.num_msgs()
    }

    /// Messages this rank sends inside its node per exchange.
    pub fn intra_node_sends(&self) -> usize {
        self.on_node.send_data.num_msgs()
            + self.local_gather.send_data.num_msgs()
            + self.local_scatter.send_data.num_msgs()
    }

    /// Columns this node receives from other nodes (empty off the representative).
    pub fn node_recv_cols(&self) -> &[usize] {
        &self.node_recv_cols
    }

    /// Columns this node sends to other nodes (empty off the representative).
    pub fn node_send_cols(&self) -> &[usize] {
        &self.node_send_cols
    }
}

fn owner_of(partition: &Partition, g: usize) -> Result<usize> {
    partition.col_owner(g).ok_or(ParError::IndexOutOfRange {
        index: g,
        context: "global column space",
    })
}

fn position_in(sorted: &[usize], g: usize) -> Result<usize> {
    sorted.binary_search(&g).map_err(|_| ParError::IndexOutOfRange {
        index: g,
        context: "node-level column list",
    })
}

impl std::fmt::Debug for TapComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapComm")
            .field("procs_per_node", &self.procs_per_node)
            .field("node", &self.node)
            .field("num_nodes", &self.num_nodes)
            .field("representative", &self.is_representative())
            .field("on_node", &self.on_node)
            .field("local_gather", &self.local_gather)
            .field("inter_node", &self.inter_node)
            .field("local_scatter", &self.local_scatter)
            .finish()
    }
}
