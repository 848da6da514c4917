use std::net::SocketAddr;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use super::{
    ControlEvent, ControlReceiver as TransportControlReceiver,
    ControlSender as TransportControlSender, RecvError, SendError,
    StreamSender as TransportStreamSender, Transport,
};

/// Channel-backed transport. The hub side gets the boxed endpoints;
/// the caller keeps the raw channel ends and moves bytes however it
/// likes (a socket task in production, a test harness in tests).
pub struct ChannelTransport {
    control_out: Sender<(SocketAddr, String)>,
    control_in: Receiver<ControlEvent>,
    stream_out: Sender<(SocketAddr, Vec<u8>)>,
}

impl ChannelTransport {
    /// Build the hub-facing transport plus the far ends of all three
    /// queues.
    pub fn unbounded() -> (
        Self,
        Receiver<(SocketAddr, String)>,
        Sender<ControlEvent>,
        Receiver<(SocketAddr, Vec<u8>)>,
    ) {
        let (control_out, control_out_rx) = unbounded();
        let (control_in_tx, control_in) = unbounded();
        let (stream_out, stream_out_rx) = unbounded();
        (
            Self {
                control_out,
                control_in,
                stream_out,
            },
            control_out_rx,
            control_in_tx,
            stream_out_rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn open(
        self: Box<Self>,
    ) -> (
        Box<dyn TransportControlSender>,
        Box<dyn TransportControlReceiver>,
        Box<dyn TransportStreamSender>,
    ) {
        (
            Box::new(self.control_out),
            Box::new(ChannelControlReceiver::new(self.control_in)),
            Box::new(self.stream_out),
        )
    }
}

impl From<ChannelTransport> for Box<dyn Transport> {
    fn from(transport: ChannelTransport) -> Self {
        Box::new(transport)
    }
}

impl TransportControlSender for Sender<(SocketAddr, String)> {
    fn send(&self, addr: &SocketAddr, payload: &str) -> Result<(), SendError> {
        self.send((*addr, payload.to_string())).map_err(|_| SendError)
    }
}

struct ChannelControlReceiver {
    receiver: Receiver<ControlEvent>,
}

impl ChannelControlReceiver {
    fn new(receiver: Receiver<ControlEvent>) -> Self {
        Self { receiver }
    }
}

impl TransportControlReceiver for ChannelControlReceiver {
    fn receive(&mut self) -> Result<Option<ControlEvent>, RecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RecvError),
        }
    }
}

impl TransportStreamSender for Sender<(SocketAddr, Vec<u8>)> {
    fn send(&self, addr: &SocketAddr, payload: &[u8]) -> Result<(), SendError> {
        self.send((*addr, payload.to_vec())).map_err(|_| SendError)
    }
}
