use std::default::Default;

use lumen_shared::{MAX_NODES, PROTO_VERSION, STREAM_PORT};

/// Contains Config properties which will be used by the Hub
#[derive(Clone)]
pub struct HubConfig {
    /// Most nodes the registry will track at once; hellos beyond this
    /// are refused
    pub capacity: usize,
    /// Datagram port handed to nodes in the welcome; stream frames go
    /// to each node's control address at this port
    pub stream_port: u16,
    /// Control protocol version a hello must carry to be accepted
    pub proto_version: u8,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_NODES,
            stream_port: STREAM_PORT,
            proto_version: PROTO_VERSION,
        }
    }
}
