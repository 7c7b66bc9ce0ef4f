//! Errors raised while addressing, building and applying edits.

use thiserror::Error;

use crate::address::Address;
use crate::crdt::node::NodeType;

pub type Result<T> = std::result::Result<T, Error>;

/// A node variant refused an instruction it can never support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedInstructionError {
    /// The node does not accept this child at this position.
    #[error("cannot put into {node}: {reason}")]
    Unputable { node: NodeType, reason: String },

    /// The node has no child reachable this way.
    #[error("cannot get from {node}: {reason}")]
    Ungetable { node: NodeType, reason: String },

    /// The node has no tombstones.
    #[error("cannot delete from {node}")]
    Undelable { node: NodeType },
}

#[derive(Debug, Error)]
pub enum Error {
    /// Two consecutive positions, a trailing position, a bad key or an
    /// element that is neither a position nor a key.
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// An instruction that does not follow the wire layout.
    #[error("malformed instruction: {0}")]
    MalformedInstruction(String),

    #[error("position {position} out of range for length {length}")]
    IndexOutOfRange { position: usize, length: usize },

    #[error("invalid deletion range ({start}, {end})")]
    InvalidRange { start: usize, end: usize },

    /// No node lives at this address (yet).
    #[error("nothing at address {address}")]
    Unresolvable { address: Address },

    #[error(transparent)]
    Unsupported(#[from] UnsupportedInstructionError),

    /// A plain value that has no node representation, e.g. a float.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("expected a {expected} node, found {found}")]
    WrongType { expected: NodeType, found: NodeType },

    /// A child was filed under a key other than its own.
    #[error("child keyed {actual} cannot be stored under {expected}")]
    KeyMismatch { expected: String, actual: String },

    /// An operation failed part way through and was rolled back.
    #[error("operation rolled back: {0}")]
    OpApply(Box<Error>),

    /// An operation depends on addresses this tree does not have yet.
    #[error("operation not ready, {} missing dependencies", missing.len())]
    NotReady { missing: Vec<Address> },

    /// Two trees with different roots cannot be merged.
    #[error("root keys differ: {ours} vs {theirs}")]
    RootMismatch { ours: String, theirs: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
