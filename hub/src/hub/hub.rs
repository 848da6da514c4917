use std::{collections::HashMap, net::SocketAddr};

use log::{info, trace, warn};

use lumen_shared::{
    GlobalField, Hello, HubMessage, Keepalive, Micros, NodeId, NodeLifecycle, NodeMessage,
    OtaManifest, OtaStatus, TsPing, TsPong, ZoneField, ZoneId, APPLY_AHEAD_US,
};

use crate::{
    batch::DeltaBatcher,
    clock::HubClock,
    error::HubError,
    events::FleetEvents,
    ota::{OtaDispatcher, OtaError, OtaProgress},
    registry::Registry,
    stream::StreamFanout,
    transport::{ControlEvent, ControlReceiver, ControlSender, StreamSender, Transport},
    HubConfig,
};

/// The coordination hub for a fleet of lighting nodes. Owns the
/// registry, the delta batcher, the stream fanout and the update
/// dispatcher; transport callbacks and the periodic tick both funnel
/// through it.
///
/// All state changes happen on the caller's thread. Outbound traffic
/// goes onto transport queues, never directly to a socket, so callers
/// can hold a lock around any method here without stalling on I/O.
pub struct Hub {
    // Config
    config: HubConfig,
    clock: HubClock,
    // Transport
    control_sender: Option<Box<dyn ControlSender>>,
    control_receiver: Option<Box<dyn ControlReceiver>>,
    stream_sender: Option<Box<dyn StreamSender>>,
    // Fleet
    registry: Registry,
    batcher: DeltaBatcher,
    fanout: StreamFanout,
    ota: OtaDispatcher,
    control_addrs: HashMap<SocketAddr, NodeId>,
    node_addrs: HashMap<NodeId, SocketAddr>,
    // Events
    incoming_events: FleetEvents,
}

impl Hub {
    /// Create a new Hub
    pub fn new(config: HubConfig) -> Self {
        let registry = Registry::with_capacity(config.capacity);
        Self {
            config,
            clock: HubClock::new(),
            control_sender: None,
            control_receiver: None,
            stream_sender: None,
            registry,
            batcher: DeltaBatcher::new(),
            fanout: StreamFanout::new(),
            ota: OtaDispatcher::new(),
            control_addrs: HashMap::new(),
            node_addrs: HashMap::new(),
            incoming_events: FleetEvents::new(),
        }
    }

    /// Attach a listening transport
    pub fn listen<T: Into<Box<dyn Transport>>>(&mut self, transport: T) {
        let boxed: Box<dyn Transport> = transport.into();
        let (control_sender, control_receiver, stream_sender) = boxed.open();
        self.control_sender = Some(control_sender);
        self.control_receiver = Some(control_receiver);
        self.stream_sender = Some(stream_sender);
    }

    /// Returns whether or not the Hub has a transport attached and is
    /// processing node traffic
    pub fn is_listening(&self) -> bool {
        self.control_sender.is_some()
    }

    pub fn epoch_now(&self) -> Micros {
        self.clock.epoch_now()
    }

    // Intake

    /// Must be called regularly; drains and handles everything the
    /// transport has queued, then returns the events that produced.
    pub fn receive(&mut self) -> FleetEvents {
        let now_us = self.clock.epoch_now();
        self.receive_at(now_us)
    }

    /// Intake with an explicit clock reading.
    pub fn receive_at(&mut self, now_us: Micros) -> FleetEvents {
        loop {
            match self.next_control_event() {
                Ok(Some(ControlEvent::Frame(addr, payload))) => {
                    self.handle_frame(addr, &payload, now_us);
                }
                Ok(Some(ControlEvent::Closed(addr))) => {
                    self.handle_closed(addr, now_us);
                }
                Ok(None) => break,
                Err(()) => {
                    warn!("control receiver disconnected");
                    self.incoming_events.push_error(HubError::RecvError);
                    break;
                }
            }
        }

        // return all produced events and reset the buffer
        std::mem::replace(&mut self.incoming_events, FleetEvents::new())
    }

    // Maintenance

    /// Periodic maintenance: liveness sweep, update deadline, batch
    /// drain and stream fanout. Call on a short cadence (the batch and
    /// stream periods gate themselves).
    pub fn tick(&mut self) -> FleetEvents {
        let now_us = self.clock.epoch_now();
        self.tick_at(now_us)
    }

    /// Maintenance with an explicit clock reading.
    pub fn tick_at(&mut self, now_us: Micros) -> FleetEvents {
        let report = self.registry.tick(now_us);
        for node_id in report.lost {
            self.incoming_events.push_lost(node_id);
        }
        for erased in report.erased {
            if let Some(addr) = self.node_addrs.remove(&erased.node_id) {
                self.control_addrs.remove(&addr);
            }
            self.incoming_events.push_erasure(erased.node_id, erased.addr);
        }

        if let Some(outcome) = self.ota.tick(&mut self.registry, now_us) {
            self.incoming_events.push_update_outcome(outcome);
        }

        if let Some(batch) = self.batcher.tick(now_us) {
            let live_targets = self.control_targets(false);
            let ready_targets = self.control_targets(true);
            for message in batch.messages() {
                let targets = if matches!(message, HubMessage::ZonesUpdate(_)) {
                    &ready_targets
                } else {
                    &live_targets
                };
                for addr in targets {
                    self.send_control(addr, &message);
                }
            }
        }

        match self.fanout.tick(now_us, &self.batcher, &mut self.registry) {
            Ok(Some(stream_tick)) => {
                if let Some(sender) = self.stream_sender.as_ref() {
                    for (_, addr) in &stream_tick.targets {
                        if sender.send(addr, &stream_tick.frame).is_err() {
                            warn!("Hub Error: Cannot send stream frame to {:?}", addr);
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(err) => self.incoming_events.push_error(HubError::Codec(err)),
        }

        std::mem::replace(&mut self.incoming_events, FleetEvents::new())
    }

    // Operator surface

    /// Set one fleet-wide output field; the change rides the next
    /// batch.
    pub fn set_global(&mut self, field: GlobalField, value: u8) -> bool {
        self.batcher.set_global(field, value)
    }

    pub fn define_zone(&mut self, id: ZoneId, start: u16, end: u16) -> Result<(), HubError> {
        self.batcher.define_zone(id, start, end)?;
        Ok(())
    }

    pub fn set_zone(&mut self, id: ZoneId, field: ZoneField, value: u8) -> Result<bool, HubError> {
        Ok(self.batcher.set_zone(id, field, value)?)
    }

    /// Start a firmware update for one node.
    pub fn begin_update(
        &mut self,
        node_id: NodeId,
        manifest: OtaManifest,
    ) -> Result<(), OtaError> {
        let now_us = self.clock.epoch_now();
        self.begin_update_at(node_id, manifest, now_us)
    }

    pub fn begin_update_at(
        &mut self,
        node_id: NodeId,
        manifest: OtaManifest,
        now_us: Micros,
    ) -> Result<(), OtaError> {
        let command = self
            .ota
            .begin_update(&self.registry, node_id, manifest, now_us)?;
        self.send_to_node(node_id, &HubMessage::OtaUpdate(command));
        Ok(())
    }

    // Views

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn health(&self) -> super::HealthSnapshot {
        self.health_at(self.clock.epoch_now())
    }

    pub fn health_at(&self, now_us: Micros) -> super::HealthSnapshot {
        super::HealthSnapshot {
            uptime_us: now_us,
            nodes: self.registry.len(),
            pending: self.registry.count_in(NodeLifecycle::Pending),
            authed: self.registry.count_in(NodeLifecycle::Authed),
            ready: self.registry.count_in(NodeLifecycle::Ready),
            degraded: self.registry.count_in(NodeLifecycle::Degraded),
            lost: self.registry.count_in(NodeLifecycle::Lost),
            stream_seq: self.fanout.seq(),
            batches: self.batcher.batches_drained(),
            update_active: self.ota.session().is_some(),
        }
    }

    pub fn node_table(&self) -> Vec<super::NodeRow> {
        self.node_table_at(self.clock.epoch_now())
    }

    pub fn node_table_at(&self, now_us: Micros) -> Vec<super::NodeRow> {
        let mut rows: Vec<super::NodeRow> = self
            .registry
            .iter()
            .map(|record| super::NodeRow {
                node_id: record.node_id(),
                addr: record.addr(),
                state: record.state(),
                fw: record.fw().to_string(),
                rssi: record.metrics().rssi,
                loss_pct: record.metrics().loss_pct,
                drift_us: record.metrics().drift_us,
                uptime_s: record.metrics().uptime_s,
                last_seen_age_us: now_us.saturating_sub(record.last_seen_us()),
                ota_phase: record.ota_phase(),
                stream_sent: record.stream_sent(),
            })
            .collect();
        rows.sort_by_key(|row| row.node_id);
        rows
    }

    // Private methods

    fn next_control_event(&mut self) -> Result<Option<ControlEvent>, ()> {
        let Some(receiver) = self.control_receiver.as_mut() else {
            return Ok(None);
        };
        match receiver.receive() {
            Ok(event) => Ok(event),
            Err(_) => Err(()),
        }
    }

    fn handle_frame(&mut self, addr: SocketAddr, payload: &str, now_us: Micros) {
        let message = match NodeMessage::from_json(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("malformed control frame from {}: {}", addr, err);
                self.incoming_events.push_error(HubError::Parse(err));
                return;
            }
        };
        match message {
            NodeMessage::Hello(hello) => self.handle_hello(addr, hello, now_us),
            NodeMessage::Keepalive(ka) => self.handle_keepalive(&ka, now_us),
            NodeMessage::TsPing(ping) => self.handle_ts_ping(addr, ping, now_us),
            NodeMessage::OtaStatus(status) => self.handle_ota_status(&status),
        }
    }

    fn handle_hello(&mut self, addr: SocketAddr, hello: Hello, now_us: Micros) {
        if hello.proto != self.config.proto_version {
            warn!(
                "hello from {} speaks proto {} (want {}), ignoring",
                hello.mac, hello.proto, self.config.proto_version
            );
            return;
        }

        let outcome = match self.registry.register(&hello, now_us) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("hello from {} refused: {}", hello.mac, err);
                self.incoming_events.push_error(HubError::Registry(err));
                return;
            }
        };
        let node_id = outcome.node_id;

        if outcome.rejoined {
            if let Some(update_outcome) = self.ota.handle_rejoin(node_id, &hello.fw) {
                self.incoming_events.push_update_outcome(update_outcome);
            }
        }

        // One control address per node; a rejoin from a new connection
        // supersedes the old mapping.
        if let Some(old_addr) = self.node_addrs.insert(node_id, addr) {
            if old_addr != addr {
                self.control_addrs.remove(&old_addr);
            }
        }
        self.control_addrs.insert(addr, node_id);

        let stream_addr = SocketAddr::new(addr.ip(), self.config.stream_port);
        if let Err(err) = self.registry.set_stream_addr(node_id, stream_addr) {
            warn!("could not record stream address for {}: {}", node_id, err);
        }

        let welcome = match self
            .registry
            .issue_welcome(node_id, self.config.stream_port, now_us)
        {
            Ok(welcome) => welcome,
            Err(err) => {
                warn!("could not welcome node {}: {}", node_id, err);
                self.incoming_events.push_error(HubError::Registry(err));
                return;
            }
        };
        self.send_control(&addr, &HubMessage::Welcome(welcome));
        self.incoming_events.push_auth(node_id);

        let snapshot = self.batcher.snapshot(now_us + APPLY_AHEAD_US);
        self.send_control(&addr, &HubMessage::StateSnapshot(snapshot));

        self.incoming_events
            .push_join(node_id, hello.mac, outcome.rejoined);
    }

    fn handle_keepalive(&mut self, ka: &Keepalive, now_us: Micros) {
        match self.registry.keepalive(ka, now_us) {
            Ok(outcome) => match outcome.transition {
                Some((_, NodeLifecycle::Ready)) => {
                    self.incoming_events.push_ready(outcome.node_id)
                }
                Some((_, NodeLifecycle::Degraded)) => {
                    self.incoming_events.push_degrade(outcome.node_id)
                }
                _ => {}
            },
            Err(err) => {
                warn!("keepalive refused: {}", err);
                self.incoming_events.push_error(HubError::Registry(err));
            }
        }
    }

    fn handle_ts_ping(&mut self, addr: SocketAddr, ping: TsPing, now_us: Micros) {
        trace!("ts_ping from node {} (t1 {})", ping.node_id, ping.t1);
        let pong = TsPong {
            t1: ping.t1,
            t2: now_us,
            t3: now_us,
        };
        self.send_control(&addr, &HubMessage::TsPong(pong));
    }

    fn handle_ota_status(&mut self, status: &OtaStatus) {
        match self.ota.report_status(&mut self.registry, status) {
            Ok(OtaProgress::Concluded(outcome)) => {
                self.incoming_events.push_update_outcome(outcome);
            }
            Ok(_) => {}
            Err(err) => {
                warn!("update report from node {} refused: {}", status.node_id, err);
                self.incoming_events.push_error(HubError::Ota(err));
            }
        }
    }

    fn handle_closed(&mut self, addr: SocketAddr, now_us: Micros) {
        let Some(node_id) = self.control_addrs.remove(&addr) else {
            trace!("control channel {} closed before any hello", addr);
            return;
        };
        self.node_addrs.remove(&node_id);
        info!("control channel for node {} closed", node_id);
        match self.registry.mark_lost(node_id, now_us) {
            Ok(Some(_)) => self.incoming_events.push_lost(node_id),
            Ok(None) => {}
            Err(err) => warn!("could not mark {} lost: {}", node_id, err),
        }
    }

    /// Control addresses for delta fanout. `ready_only` narrows from
    /// every authed-or-better node down to READY.
    fn control_targets(&self, ready_only: bool) -> Vec<SocketAddr> {
        self.registry
            .iter()
            .filter(|record| {
                if ready_only {
                    record.state().is_ready()
                } else {
                    record.state().is_live() && record.state() != NodeLifecycle::Pending
                }
            })
            .filter_map(|record| self.node_addrs.get(&record.node_id()).copied())
            .collect()
    }

    fn send_to_node(&mut self, node_id: NodeId, message: &HubMessage) {
        let Some(addr) = self.node_addrs.get(&node_id).copied() else {
            warn!("no control channel for node {}, dropping message", node_id);
            return;
        };
        self.send_control(&addr, message);
    }

    fn send_control(&mut self, addr: &SocketAddr, message: &HubMessage) {
        let Some(sender) = self.control_sender.as_ref() else {
            warn!("not listening; control message to {:?} dropped", addr);
            return;
        };
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("could not encode control message: {}", err);
                return;
            }
        };
        if sender.send(addr, &payload).is_err() {
            warn!("Hub Error: Cannot send control message to {:?}", addr);
            self.incoming_events.push_error(HubError::SendError);
        }
    }
}
