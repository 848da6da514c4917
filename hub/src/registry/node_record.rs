use std::net::SocketAddr;

use lumen_shared::{
    HelloCaps, HelloTopo, HwAddr, Micros, NodeId, NodeLifecycle, OtaPhase,
};

/// Link quality from the most recent keepalive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkMetrics {
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Stream loss in hundredths of a percent.
    pub loss_pct: u32,
    /// Node clock drift against the hub epoch, signed µs.
    pub drift_us: i64,
    pub uptime_s: u32,
}

// NodeRecord
//
// One fleet member. Created on first hello, kept across rejoins of the
// same hardware address, erased only after the LOST grace period runs
// out. All lifecycle mutation goes through Registry methods so the
// transition table stays the single authority.
#[derive(Clone, Debug)]
pub struct NodeRecord {
    node_id: NodeId,
    addr: HwAddr,
    state: NodeLifecycle,
    token: String,
    token_hash: u32,
    caps: HelloCaps,
    topo: HelloTopo,
    fw: String,
    metrics: LinkMetrics,
    ota_phase: OtaPhase,
    stream_addr: Option<SocketAddr>,
    joined_at_us: Micros,
    last_seen_us: Micros,
    lost_at_us: Option<Micros>,
    keepalive_count: u64,
    stream_sent: u64,
}

impl NodeRecord {
    pub(crate) fn new(
        node_id: NodeId,
        addr: HwAddr,
        caps: HelloCaps,
        topo: HelloTopo,
        fw: String,
        now_us: Micros,
    ) -> Self {
        Self {
            node_id,
            addr,
            state: NodeLifecycle::Pending,
            token: String::new(),
            token_hash: 0,
            caps,
            topo,
            fw,
            metrics: LinkMetrics::default(),
            ota_phase: OtaPhase::Idle,
            stream_addr: None,
            joined_at_us: now_us,
            last_seen_us: now_us,
            lost_at_us: None,
            keepalive_count: 0,
            stream_sent: 0,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn addr(&self) -> HwAddr {
        self.addr
    }

    pub fn state(&self) -> NodeLifecycle {
        self.state
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_hash(&self) -> u32 {
        self.token_hash
    }

    pub fn caps(&self) -> HelloCaps {
        self.caps
    }

    pub fn topo(&self) -> HelloTopo {
        self.topo
    }

    pub fn fw(&self) -> &str {
        &self.fw
    }

    pub fn metrics(&self) -> LinkMetrics {
        self.metrics
    }

    pub fn ota_phase(&self) -> OtaPhase {
        self.ota_phase
    }

    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.stream_addr
    }

    pub fn joined_at_us(&self) -> Micros {
        self.joined_at_us
    }

    pub fn last_seen_us(&self) -> Micros {
        self.last_seen_us
    }

    /// When this record went LOST, if it is.
    pub fn lost_at_us(&self) -> Option<Micros> {
        self.lost_at_us
    }

    pub fn keepalive_count(&self) -> u64 {
        self.keepalive_count
    }

    pub fn stream_sent(&self) -> u64 {
        self.stream_sent
    }

    // Crate-internal mutation, reserved for the Registry.

    pub(crate) fn set_state(&mut self, state: NodeLifecycle, now_us: Micros) {
        self.state = state;
        self.lost_at_us = match state {
            NodeLifecycle::Lost => Some(now_us),
            _ => None,
        };
    }

    pub(crate) fn set_token(&mut self, token: String, token_hash: u32) {
        self.token = token;
        self.token_hash = token_hash;
    }

    pub(crate) fn clear_token(&mut self) {
        self.token.clear();
        self.token_hash = 0;
    }

    pub(crate) fn set_hello(&mut self, caps: HelloCaps, topo: HelloTopo, fw: String) {
        self.caps = caps;
        self.topo = topo;
        self.fw = fw;
    }

    pub(crate) fn set_ota_phase(&mut self, phase: OtaPhase) {
        self.ota_phase = phase;
    }

    pub(crate) fn set_stream_addr(&mut self, addr: SocketAddr) {
        self.stream_addr = Some(addr);
    }

    pub(crate) fn record_keepalive(&mut self, metrics: LinkMetrics, now_us: Micros) {
        self.metrics = metrics;
        self.last_seen_us = now_us;
        self.keepalive_count += 1;
    }

    pub(crate) fn touch(&mut self, now_us: Micros) {
        self.last_seen_us = now_us;
    }

    pub(crate) fn count_stream_send(&mut self) {
        self.stream_sent += 1;
    }
}
