use std::net::SocketAddr;

pub mod channel;

/// The transport could not take the payload.
pub struct SendError;

/// The transport side has gone away.
pub struct RecvError;

/// Something that arrived on the control plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    /// One JSON control frame from the peer at this address.
    Frame(SocketAddr, String),
    /// The peer's control channel closed or dropped.
    Closed(SocketAddr),
}

/// A listening transport, opened once into its three endpoints.
pub trait Transport {
    fn open(
        self: Box<Self>,
    ) -> (
        Box<dyn ControlSender>,
        Box<dyn ControlReceiver>,
        Box<dyn StreamSender>,
    );
}

/// Queues one control frame for a peer. Implementations must not
/// block: the hub calls this while holding its state, so the actual
/// I/O happens on the transport's own time.
pub trait ControlSender: Send + Sync {
    fn send(&self, addr: &SocketAddr, payload: &str) -> Result<(), SendError>;
}

/// Non-blocking control-plane intake.
pub trait ControlReceiver: Send + Sync {
    /// Returns the next pending event, or None when the queue is dry.
    fn receive(&mut self) -> Result<Option<ControlEvent>, RecvError>;
}

/// Fire-and-forget datagram sender for stream frames.
pub trait StreamSender: Send + Sync {
    fn send(&self, addr: &SocketAddr, payload: &[u8]) -> Result<(), SendError>;
}
