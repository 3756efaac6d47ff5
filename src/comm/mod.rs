//! Process groups and the halo-exchange communicators built on them.

pub mod config;
pub mod local;
pub mod par_comm;
pub mod pattern;
pub mod tap_comm;
pub mod transport;

pub use config::{TopologyConfig, PPN_ENV_VAR};
pub use local::{LocalComm, LocalWorld};
pub use par_comm::ParComm;
pub use pattern::{CommData, CommPattern};
pub use tap_comm::TapComm;
pub use transport::{Tag, Transport, TransportExt};
