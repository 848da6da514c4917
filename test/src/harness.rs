use std::net::SocketAddr;

use crossbeam_channel::{Receiver, Sender};

use lumen_hub::transport::channel::ChannelTransport;
use lumen_hub::transport::ControlEvent;
use lumen_hub::{FleetEvent, FleetEvents, Hub, HubConfig};
use lumen_node::{NodeConfig, NodeControl};
use lumen_shared::{HwAddr, Micros, NodeMessage};

pub const NODE_FW: &str = "2.4.1";

/// One simulated node: the protocol state machine plus the wiring a
/// real deployment gets from its radio and RTOS loop.
pub struct TestNode {
    pub control: NodeControl,
    pub mac: HwAddr,
    pub addr: SocketAddr,
    /// Node clock reads hub clock + skew.
    pub skew_us: i64,
    /// Offline nodes drop traffic in both directions.
    pub online: bool,
    /// Discard this many inbound stream datagrams, simulating loss on
    /// the datagram socket only.
    pub drop_stream: usize,
}

impl TestNode {
    /// This node's reading of the given hub instant.
    pub fn now(&self, hub_now_us: Micros) -> Micros {
        let local = hub_now_us as i64 + self.skew_us;
        local.max(0) as Micros
    }
}

/// An in-memory fleet: one hub and any number of scripted nodes wired
/// together over channel transports, driven by an explicit clock so
/// every timeout and apply instant is exact.
pub struct FleetHarness {
    pub hub: Hub,
    /// Hub-epoch clock; advance it between pumps.
    pub now_us: Micros,
    nodes: Vec<TestNode>,
    control_out: Receiver<(SocketAddr, String)>,
    control_in: Sender<ControlEvent>,
    stream_out: Receiver<(SocketAddr, Vec<u8>)>,
    queued_to_hub: usize,
}

impl FleetHarness {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        let (transport, control_out, control_in, stream_out) = ChannelTransport::unbounded();
        let mut hub = Hub::new(config);
        hub.listen(transport);
        Self {
            hub,
            now_us: 1_000_000,
            nodes: Vec::new(),
            control_out,
            control_in,
            stream_out,
            queued_to_hub: 0,
        }
    }

    /// Register a scripted node. It exists but has not said hello yet.
    pub fn add_node(&mut self, mac: &str, skew_us: i64) -> usize {
        let index = self.nodes.len();
        let mac: HwAddr = mac.parse().unwrap();
        let addr = SocketAddr::from(([192, 168, 1, 10 + index as u8], 52_000 + index as u16));
        self.nodes.push(TestNode {
            control: NodeControl::new(NodeConfig::new(mac, NODE_FW, 120)),
            mac,
            addr,
            skew_us,
            online: true,
            drop_stream: 0,
        });
        index
    }

    /// Send the hello and run the handshake to completion. The
    /// welcome's keepalive kick promotes the node on the same pump, so
    /// it comes back READY.
    pub fn join(&mut self, index: usize) -> Vec<FleetEvents> {
        let hello = self.nodes[index].control.hello();
        self.send_from(index, &hello);
        self.settle()
    }

    /// Wipe a node's protocol state as a firmware reboot would, then
    /// rejoin with the given firmware version.
    pub fn reboot_node(&mut self, index: usize, fw: &str) -> Vec<FleetEvents> {
        let mac = self.nodes[index].mac;
        self.nodes[index].control = NodeControl::new(NodeConfig::new(mac, fw, 120));
        self.nodes[index].online = true;
        self.nodes[index].drop_stream = 0;
        self.join(index)
    }

    /// Stop a node responding without telling anyone, as a crash or
    /// radio dropout would.
    pub fn go_dark(&mut self, index: usize) {
        self.nodes[index].online = false;
    }

    /// Close a node's control connection the way an orderly transport
    /// teardown does.
    pub fn drop_connection(&mut self, index: usize) -> Vec<FleetEvents> {
        let addr = self.nodes[index].addr;
        self.nodes[index].online = false;
        self.control_in.send(ControlEvent::Closed(addr)).unwrap();
        self.queued_to_hub += 1;
        self.settle()
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.now_us += ms * 1_000;
    }

    pub fn advance_us(&mut self, us: u64) {
        self.now_us += us;
    }

    /// Deliver queued control traffic both ways until the wires go
    /// quiet, collecting every event batch the hub raised.
    pub fn settle(&mut self) -> Vec<FleetEvents> {
        let mut batches = Vec::new();
        loop {
            let mut moved = false;
            while let Ok((dest, payload)) = self.control_out.try_recv() {
                moved = true;
                self.deliver_control(dest, &payload);
            }
            if self.queued_to_hub > 0 {
                moved = true;
                self.queued_to_hub = 0;
            }
            let events = self.hub.receive_at(self.now_us);
            if !events.is_empty() {
                batches.push(events);
            }
            if !moved {
                break;
            }
        }
        batches
    }

    /// Let every online node send and apply whatever is due at the
    /// current time, then deliver it all.
    pub fn poll_nodes(&mut self) -> Vec<FleetEvents> {
        for index in 0..self.nodes.len() {
            if !self.nodes[index].online {
                continue;
            }
            let node_now = self.nodes[index].now(self.now_us);
            self.nodes[index].control.apply_due(node_now);
            if let Some(keepalive) = self.nodes[index].control.poll_keepalive(node_now) {
                self.send_from(index, &keepalive);
            }
        }
        self.settle()
    }

    /// Run one time-sync exchange for a node.
    pub fn ping_timesync(&mut self, index: usize) -> Vec<FleetEvents> {
        let node_now = self.nodes[index].now(self.now_us);
        if let Some(ping) = self.nodes[index].control.make_ts_ping(node_now) {
            self.send_from(index, &ping);
        }
        self.settle()
    }

    /// Run one hub maintenance tick and deliver everything it emitted,
    /// stream datagrams included.
    pub fn tick_hub(&mut self) -> Vec<FleetEvents> {
        let mut batches = Vec::new();
        let events = self.hub.tick_at(self.now_us);
        if !events.is_empty() {
            batches.push(events);
        }
        while let Ok((dest, bytes)) = self.stream_out.try_recv() {
            let Some(index) = self.nodes.iter().position(|n| n.addr.ip() == dest.ip()) else {
                continue;
            };
            if !self.nodes[index].online {
                continue;
            }
            if self.nodes[index].drop_stream > 0 {
                self.nodes[index].drop_stream -= 1;
                continue;
            }
            let node_now = self.nodes[index].now(self.now_us);
            let _ = self.nodes[index].control.handle_stream(&bytes, node_now);
        }
        batches.extend(self.settle());
        batches
    }

    /// Hand a message to the hub as if the node had sent it.
    pub fn send_from(&mut self, index: usize, message: &NodeMessage) {
        let node = &self.nodes[index];
        if !node.online {
            return;
        }
        let payload = message.to_json().unwrap();
        self.control_in
            .send(ControlEvent::Frame(node.addr, payload))
            .unwrap();
        self.queued_to_hub += 1;
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut TestNode {
        &mut self.nodes[index]
    }

    pub fn node_now(&self, index: usize) -> Micros {
        self.nodes[index].now(self.now_us)
    }

    fn deliver_control(&mut self, dest: SocketAddr, payload: &str) {
        let Some(index) = self.nodes.iter().position(|n| n.addr == dest) else {
            return;
        };
        if !self.nodes[index].online {
            return;
        }
        let node_now = self.nodes[index].now(self.now_us);
        let replies = self.nodes[index]
            .control
            .handle_control(payload, node_now)
            .unwrap();
        for reply in replies {
            let json = reply.to_json().unwrap();
            self.control_in
                .send(ControlEvent::Frame(dest, json))
                .unwrap();
            self.queued_to_hub += 1;
        }
    }
}

impl Default for FleetHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect one event type out of every batch a pump produced.
pub fn read_all<V, I>(batches: &mut [FleetEvents]) -> Vec<I>
where
    V: FleetEvent,
    V::Iter: Iterator<Item = I>,
{
    batches
        .iter_mut()
        .flat_map(|batch| batch.read::<V>())
        .collect()
}
