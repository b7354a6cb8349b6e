use thiserror::Error;

use super::node::NodeId;

/// Errors that can occur during B-tree operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BTreeError {
    #[error("Invalid order: {0} (must be >= 3)")]
    InvalidOrder(usize),

    #[error("Path stack is empty")]
    EmptyStack,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Key has no successor")]
    SuccessorNotFound,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}

pub type BTreeResult<T> = Result<T, BTreeError>;
