use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Attempted an invalid lifecycle transition
    #[error("{from_state} node should never {operation}. (Cannot transition {from_state} -> {to_state})")]
    InvalidTransition {
        from_state: &'static str,
        to_state: &'static str,
        operation: &'static str,
    },
}

/// Membership states a node moves through, from first hello to erasure.
///
/// The only mutation path is [`NodeLifecycle::transition`]; call sites
/// never compare and assign states directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeLifecycle {
    /// Hello received, welcome not yet issued. Token hash is zero.
    Pending,
    /// Welcome issued, no keepalive seen yet.
    Authed,
    /// Keepalives flowing with healthy link metrics.
    Ready,
    /// Keepalives flowing but loss or drift is over threshold.
    Degraded,
    /// Keepalives stopped or transport dropped. Erased after the grace
    /// period unless the node rejoins first.
    Lost,
}

/// Inputs to the lifecycle machine. Each maps to exactly one registry
/// operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleOp {
    /// Welcome issued with a fresh session token.
    Welcome,
    /// Healthy keepalive.
    MarkReady,
    /// Keepalive with loss or drift over threshold.
    MarkDegraded,
    /// Keepalive timeout or transport disconnect.
    MarkLost,
    /// A known hardware address said hello again.
    Rejoin,
}

impl NodeLifecycle {
    pub fn name(&self) -> &'static str {
        match self {
            NodeLifecycle::Pending => "PENDING",
            NodeLifecycle::Authed => "AUTHED",
            NodeLifecycle::Ready => "READY",
            NodeLifecycle::Degraded => "DEGRADED",
            NodeLifecycle::Lost => "LOST",
        }
    }

    /// True for every state except LOST. Live records participate in
    /// token uniqueness checks and count toward fleet health.
    pub fn is_live(&self) -> bool {
        !matches!(self, NodeLifecycle::Lost)
    }

    /// True if the node receives zone deltas and stream frames.
    pub fn is_ready(&self) -> bool {
        matches!(self, NodeLifecycle::Ready)
    }

    /// A record in one of these states must hold a non-zero token hash
    /// (registry invariant A).
    pub fn requires_token(&self) -> bool {
        matches!(
            self,
            NodeLifecycle::Authed | NodeLifecycle::Ready | NodeLifecycle::Degraded
        )
    }

    /// Apply a lifecycle operation, returning the new state.
    ///
    /// # Panics
    ///
    /// Panics on an invalid transition. Consider using `try_transition`
    /// for non-panicking error handling.
    pub fn transition(self, op: LifecycleOp) -> NodeLifecycle {
        self.try_transition(op)
            .expect("transition called on invalid lifecycle state")
    }

    /// Try to apply a lifecycle operation, returning the new state.
    ///
    /// The complete transition table lives here; idempotent inputs
    /// (a second MarkLost, MarkReady on a READY node) succeed without
    /// changing state.
    pub fn try_transition(self, op: LifecycleOp) -> Result<NodeLifecycle, LifecycleError> {
        match (self, op) {
            // Rejoin resets any state back to the start of the handshake.
            (_, LifecycleOp::Rejoin) => Ok(NodeLifecycle::Pending),

            (NodeLifecycle::Pending, LifecycleOp::Welcome) => Ok(NodeLifecycle::Authed),
            (_, LifecycleOp::Welcome) => Err(LifecycleError::InvalidTransition {
                from_state: self.name(),
                to_state: NodeLifecycle::Authed.name(),
                operation: "be issued a welcome",
            }),

            (NodeLifecycle::Authed, LifecycleOp::MarkReady)
            | (NodeLifecycle::Ready, LifecycleOp::MarkReady)
            | (NodeLifecycle::Degraded, LifecycleOp::MarkReady) => Ok(NodeLifecycle::Ready),
            (_, LifecycleOp::MarkReady) => Err(LifecycleError::InvalidTransition {
                from_state: self.name(),
                to_state: NodeLifecycle::Ready.name(),
                operation: "be marked ready",
            }),

            (NodeLifecycle::Ready, LifecycleOp::MarkDegraded)
            | (NodeLifecycle::Degraded, LifecycleOp::MarkDegraded) => Ok(NodeLifecycle::Degraded),
            (_, LifecycleOp::MarkDegraded) => Err(LifecycleError::InvalidTransition {
                from_state: self.name(),
                to_state: NodeLifecycle::Degraded.name(),
                operation: "be marked degraded",
            }),

            // MarkLost is idempotent; a timeout sweep may race a
            // transport disconnect for the same node.
            (_, LifecycleOp::MarkLost) => Ok(NodeLifecycle::Lost),
        }
    }
}
