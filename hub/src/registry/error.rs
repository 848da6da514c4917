use thiserror::Error;

use lumen_shared::{LifecycleError, NodeId};

/// Errors that can occur during registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Fleet is at capacity; the hello was refused
    #[error("Fleet is full ({capacity} nodes). Raise the capacity or retire a node before joining another")]
    FleetFull { capacity: usize },

    /// Operation referenced a nodeId with no record
    #[error("No record for node {node_id}. The node may have been erased after its grace period")]
    UnknownNode { node_id: NodeId },

    /// Keepalive carried a token that does not hash to the stored value
    #[error("Token mismatch for node {node_id}. A stale session may still be sending keepalives")]
    TokenMismatch { node_id: NodeId },

    /// Lifecycle machine refused the transition
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}
