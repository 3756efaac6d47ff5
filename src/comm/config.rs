//! Topology configuration for node-aware communication

use std::ops::Range;

use tracing::warn;

/// Environment variable holding the number of processes per node
pub const PPN_ENV_VAR: &str = "PPN";

/// How ranks map onto physical nodes
///
/// Ranks are packed onto nodes in order: node `n` holds ranks
/// `n * procs_per_node .. (n + 1) * procs_per_node`, the last node possibly
/// fewer. The value is read once when a topology-aware communicator is built;
/// changing it afterwards requires building a new communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Number of ranks sharing one node
    pub procs_per_node: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self { procs_per_node: 1 }
    }
}

impl TopologyConfig {
    /// Config with an explicit processes-per-node value
    pub fn with_procs_per_node(procs_per_node: usize) -> Self {
        Self { procs_per_node }
    }

    /// Reads [`PPN_ENV_VAR`] from the environment
    ///
    /// Missing values fall back to one process per node.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(PPN_ENV_VAR).ok().as_deref())
    }

    /// Parses a raw environment value
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::default(),
            Some(raw) => match raw.parse::<usize>() {
                Ok(procs_per_node) if procs_per_node > 0 => Self { procs_per_node },
                _ => {
                    warn!(value = raw, "ignoring invalid {} value", PPN_ENV_VAR);
                    Self::default()
                }
            },
        }
    }

    /// Node hosting `rank`
    pub fn node_of(&self, rank: usize) -> usize {
        rank / self.procs_per_node
    }

    /// Number of nodes needed for `num_procs` ranks
    pub fn num_nodes(&self, num_procs: usize) -> usize {
        (num_procs + self.procs_per_node - 1) / self.procs_per_node
    }

    /// Ranks hosted on `node`
    pub fn node_ranks(&self, node: usize, num_procs: usize) -> Range<usize> {
        let first = node * self.procs_per_node;
        first.min(num_procs)..(first + self.procs_per_node).min(num_procs)
    }
}
