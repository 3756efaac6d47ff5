//! Error types for distributed matrix construction and communication.

/// Errors raised while building or exchanging data for a distributed matrix.
#[derive(Debug, thiserror::Error)]
pub enum ParError {
    /// Malformed partition, block layout or topology setting.
    #[error("construction error: {0}")]
    Construction(String),

    /// A peer sent a message whose length disagrees with the local schedule.
    #[error(
        "communication mismatch with rank {peer}: expected {expected} entries, received {received}"
    )]
    CommunicationMismatch {
        /// Rank (within the communicator used) that sent the message.
        peer: usize,
        /// Entry count the schedule expects.
        expected: usize,
        /// Entry count actually received.
        received: usize,
    },

    /// A global index has no local counterpart.
    #[error("index {index} out of range: {context}")]
    IndexOutOfRange {
        /// The offending (usually global) index.
        index: usize,
        /// What the index was looked up in.
        context: &'static str,
    },

    /// The operation needs a communicator that has not been built yet.
    #[error("matrix not ready: {0}")]
    NotFinalized(&'static str),

    /// The underlying transport failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ParError>;
