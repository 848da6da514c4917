use log::{info, trace, warn};

use lumen_shared::{
    stream_seq_newer, CodecError, GlobalState, Hello, HelloCaps, HelloTopo, HubMessage, HwAddr,
    Keepalive, MessageParseError, Micros, NodeId, NodeMessage, OtaManifest, OtaPhase, OtaStatus,
    ParameterSet, StreamFrame, StreamSeq, ZoneRow, ZoneState, APPLY_AHEAD_US, APPLY_AT_CLAMP_US,
    KEEPALIVE_PERIOD_MS, PROTO_VERSION,
};

use crate::scheduler::{CommandScheduler, ScheduledCommand};
use crate::timesync::TimeSync;

/// Identity and capabilities sent in the hello.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub mac: HwAddr,
    pub fw: String,
    pub caps: HelloCaps,
    pub topo: HelloTopo,
}

impl NodeConfig {
    pub fn new(mac: HwAddr, fw: &str, leds: u16) -> Self {
        Self {
            mac,
            fw: fw.to_string(),
            caps: HelloCaps {
                stream: true,
                ota: true,
                clock: true,
            },
            topo: HelloTopo { leds, channels: 1 },
        }
    }
}

struct Session {
    node_id: NodeId,
    token: String,
    stream_port: u16,
}

// NodeControl
//
// The node side of the control protocol, free of any I/O: the embedding
// feeds it inbound payloads and clock readings, and sends whatever
// messages come back. All times are node-local µs; hub-epoch instants
// only enter through the time-sync filter.
pub struct NodeControl {
    config: NodeConfig,
    session: Option<Session>,
    timesync: TimeSync,
    scheduler: CommandScheduler,
    // Applied output state
    global: GlobalState,
    zones: Vec<ZoneState>,
    // Link bookkeeping
    rssi: i8,
    last_keepalive_us: Option<Micros>,
    last_stream_seq: Option<StreamSeq>,
    stream_received: u64,
    stream_missed: u64,
    // Firmware update
    ota_phase: OtaPhase,
    ota_manifest: Option<OtaManifest>,
}

impl NodeControl {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            session: None,
            timesync: TimeSync::new(),
            scheduler: CommandScheduler::new(),
            global: GlobalState::default(),
            zones: Vec::new(),
            rssi: 0,
            last_keepalive_us: None,
            last_stream_seq: None,
            stream_received: 0,
            stream_missed: 0,
            ota_phase: OtaPhase::Idle,
            ota_manifest: None,
        }
    }

    // Outbound

    /// First message on every fresh control connection.
    pub fn hello(&self) -> NodeMessage {
        NodeMessage::Hello(Hello {
            mac: self.config.mac,
            fw: self.config.fw.clone(),
            proto: PROTO_VERSION,
            caps: self.config.caps,
            topo: self.config.topo,
        })
    }

    /// Periodic keepalive, if one is due. The welcome reply already
    /// counted as one, so the first poll fires a full period later.
    pub fn poll_keepalive(&mut self, now_us: Micros) -> Option<NodeMessage> {
        self.session.as_ref()?;
        let due = match self.last_keepalive_us {
            None => true,
            Some(last) => now_us.saturating_sub(last) >= KEEPALIVE_PERIOD_MS * 1_000,
        };
        if !due {
            return None;
        }
        self.build_keepalive(now_us)
    }

    /// Start a time-sync exchange. Cadence is the embedding's call.
    pub fn make_ts_ping(&mut self, now_us: Micros) -> Option<NodeMessage> {
        let session = self.session.as_ref()?;
        let ping = self.timesync.make_ping(session.node_id, now_us);
        Some(NodeMessage::TsPing(ping))
    }

    /// Report firmware update progress. An error report also clears the
    /// local manifest; the hub has already given up on the session.
    pub fn report_ota(
        &mut self,
        phase: OtaPhase,
        detail: Option<String>,
        now_us: Micros,
    ) -> Option<NodeMessage> {
        let session = self.session.as_ref()?;
        self.ota_phase = phase;
        if phase.is_error() {
            self.ota_manifest = None;
        }
        trace!("reporting update phase {} at {}us", phase.name(), now_us);
        Some(NodeMessage::OtaStatus(OtaStatus {
            node_id: session.node_id,
            phase,
            detail,
            fw: Some(self.config.fw.clone()),
        }))
    }

    // Inbound

    /// Handle one control frame; returns the replies to send.
    pub fn handle_control(
        &mut self,
        payload: &str,
        now_us: Micros,
    ) -> Result<Vec<NodeMessage>, MessageParseError> {
        let message = HubMessage::from_json(payload)?;
        let mut replies = Vec::new();
        match message {
            HubMessage::Welcome(welcome) => {
                info!(
                    "welcomed as node {} (stream port {})",
                    welcome.node_id, welcome.stream_port
                );
                self.session = Some(Session {
                    node_id: welcome.node_id,
                    token: welcome.token,
                    stream_port: welcome.stream_port,
                });
                // New session, new hub epoch: drop everything keyed to
                // the old one.
                self.timesync = TimeSync::new();
                self.scheduler = CommandScheduler::new();
                self.last_stream_seq = None;
                self.stream_received = 0;
                self.stream_missed = 0;
                self.ota_phase = OtaPhase::Idle;
                self.ota_manifest = None;
                // Keepalive kick: reach READY without waiting a period.
                self.last_keepalive_us = None;
                if let Some(kick) = self.build_keepalive(now_us) {
                    replies.push(kick);
                }
            }
            HubMessage::StateSnapshot(snapshot) => {
                let due = self.resolve_apply_at(snapshot.apply_at, now_us);
                self.scheduler.push(due, ScheduledCommand::Snapshot(snapshot));
            }
            HubMessage::EffectChange(change) => {
                let due = self.resolve_apply_at(change.apply_at, now_us);
                self.scheduler.push(due, ScheduledCommand::Effect(change));
            }
            HubMessage::ParameterSet(parameters) => {
                let due = self.resolve_apply_at(parameters.apply_at, now_us);
                self.scheduler
                    .push(due, ScheduledCommand::Parameters(parameters));
            }
            HubMessage::ZonesUpdate(zones) => {
                let due = self.resolve_apply_at(zones.apply_at, now_us);
                self.scheduler.push(due, ScheduledCommand::Zones(zones));
            }
            HubMessage::TsPong(pong) => {
                self.timesync.handle_pong(&pong, now_us);
            }
            HubMessage::OtaUpdate(update) => {
                if self.session.is_none() {
                    warn!("update command before welcome, ignoring");
                } else {
                    info!(
                        "update command: fw {} ({} bytes) from {}",
                        update.version, update.size, update.url
                    );
                    self.ota_manifest = Some(OtaManifest {
                        url: update.url,
                        version: update.version,
                        size: update.size,
                    });
                    if let Some(reply) =
                        self.report_ota(OtaPhase::Downloading, None, now_us)
                    {
                        replies.push(reply);
                    }
                }
            }
        }
        Ok(replies)
    }

    /// Apply every scheduled command whose due time has arrived.
    /// Returns how many were applied.
    pub fn apply_due(&mut self, now_us: Micros) -> usize {
        let due = self.scheduler.take_due(now_us);
        let count = due.len();
        for command in due {
            match command {
                ScheduledCommand::Snapshot(snapshot) => {
                    trace!("applying snapshot ({} zones)", snapshot.zones.len());
                    self.global = snapshot.global;
                    self.zones = snapshot.zones;
                }
                ScheduledCommand::Effect(change) => {
                    trace!("applying effect {}", change.effect);
                    self.global.effect = change.effect;
                }
                ScheduledCommand::Parameters(parameters) => {
                    self.apply_parameters(&parameters);
                }
                ScheduledCommand::Zones(zones) => {
                    for row in &zones.zones {
                        self.apply_zone_row(row);
                    }
                }
            }
        }
        count
    }

    /// Take in one stream datagram. Returns whether the frame was newer
    /// than anything seen this session (stale frames are dropped).
    pub fn handle_stream(&mut self, bytes: &[u8], _now_us: Micros) -> Result<bool, CodecError> {
        let frame = StreamFrame::decode(bytes)?;

        if let Some(last) = self.last_stream_seq {
            if !stream_seq_newer(frame.seq, last) {
                trace!("stale stream frame {} (have {})", frame.seq, last);
                return Ok(false);
            }
            let gap = frame.seq.wrapping_sub(last);
            if gap > 1 {
                self.stream_missed += u64::from(gap - 1);
            }
        }
        self.last_stream_seq = Some(frame.seq);
        self.stream_received += 1;

        self.global = frame.global;
        for zone_frame in &frame.zones {
            let Some(zone) = self.zones.iter_mut().find(|z| z.id == zone_frame.id) else {
                trace!("stream frame names unknown zone {}", zone_frame.id);
                continue;
            };
            zone.effect = zone_frame.effect;
            zone.brightness = zone_frame.brightness;
            zone.blend = zone_frame.blend;
        }
        Ok(true)
    }

    // Views

    pub fn is_joined(&self) -> bool {
        self.session.is_some()
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.session.as_ref().map(|s| s.node_id)
    }

    pub fn stream_port(&self) -> Option<u16> {
        self.session.as_ref().map(|s| s.stream_port)
    }

    pub fn global(&self) -> &GlobalState {
        &self.global
    }

    pub fn zones(&self) -> &[ZoneState] {
        &self.zones
    }

    pub fn timesync(&self) -> &TimeSync {
        &self.timesync
    }

    pub fn pending_commands(&self) -> usize {
        self.scheduler.len()
    }

    pub fn ota_phase(&self) -> OtaPhase {
        self.ota_phase
    }

    pub fn ota_manifest(&self) -> Option<&OtaManifest> {
        self.ota_manifest.as_ref()
    }

    /// Packet loss over the stream frames expected since the last
    /// keepalive, in hundredths of a percent. No frames at all reads
    /// as zero loss, so a demoted node that stops being streamed to
    /// reports healthy again instead of pinning its last bad ratio.
    pub fn loss_centi_pct(&self) -> u32 {
        let total = self.stream_received + self.stream_missed;
        if total == 0 {
            return 0;
        }
        ((self.stream_missed * 10_000) / total) as u32
    }

    /// Signal strength reported in keepalives; the radio layer updates
    /// it.
    pub fn set_rssi(&mut self, rssi: i8) {
        self.rssi = rssi;
    }

    // Private

    fn build_keepalive(&mut self, now_us: Micros) -> Option<NodeMessage> {
        let loss_pct = self.loss_centi_pct();
        // Offset moves during acquisition are not drift; only report
        // shifts seen after lock.
        let drift_us = if self.timesync.is_locked() {
            self.timesync.last_shift_us()
        } else {
            0
        };
        let session = self.session.as_ref()?;
        let message = NodeMessage::Keepalive(Keepalive {
            node_id: session.node_id,
            token: session.token.clone(),
            rssi: self.rssi,
            loss_pct,
            drift_us,
            uptime_s: (now_us / 1_000_000) as u32,
        });
        self.last_keepalive_us = Some(now_us);
        // Each keepalive reports the interval since the previous one.
        self.stream_received = 0;
        self.stream_missed = 0;
        Some(message)
    }

    /// Convert a hub-epoch applyAt into a local due time. Unlocked
    /// sync applies immediately; a resolved instant implausibly far
    /// from now means the offset is bad, so fall back to a short local
    /// deferral instead of freezing or double-applying.
    fn resolve_apply_at(&self, apply_at_hub: Micros, now_us: Micros) -> Micros {
        if !self.timesync.is_locked() {
            return now_us;
        }
        let local = self.timesync.hub_to_local(apply_at_hub);
        if local.abs_diff(now_us) > APPLY_AT_CLAMP_US {
            warn!(
                "applyAt {}us resolves to {}us, {}us from now; clamping",
                apply_at_hub,
                local,
                local.abs_diff(now_us)
            );
            return now_us + APPLY_AHEAD_US;
        }
        local
    }

    fn apply_parameters(&mut self, parameters: &ParameterSet) {
        if let Some(brightness) = parameters.brightness {
            self.global.brightness = brightness;
        }
        if let Some(speed) = parameters.speed {
            self.global.speed = speed;
        }
        if let Some(palette) = parameters.palette {
            self.global.palette = palette;
        }
        if let Some(hue) = parameters.hue {
            self.global.hue = hue;
        }
        if let Some(intensity) = parameters.intensity {
            self.global.intensity = intensity;
        }
        if let Some(saturation) = parameters.saturation {
            self.global.saturation = saturation;
        }
        if let Some(complexity) = parameters.complexity {
            self.global.complexity = complexity;
        }
        if let Some(variation) = parameters.variation {
            self.global.variation = variation;
        }
    }

    fn apply_zone_row(&mut self, row: &ZoneRow) {
        let Some(zone) = self.zones.iter_mut().find(|z| z.id == row.id) else {
            warn!("zone update names unknown zone {}, skipping", row.id);
            return;
        };
        if let Some(effect) = row.effect {
            zone.effect = effect;
        }
        if let Some(brightness) = row.brightness {
            zone.brightness = brightness;
        }
        if let Some(speed) = row.speed {
            zone.speed = speed;
        }
        if let Some(palette) = row.palette {
            zone.palette = palette;
        }
        if let Some(blend) = row.blend {
            zone.blend = blend;
        }
    }
}
