use serde::{Deserialize, Serialize};

use crate::ota::OtaPhase;
use crate::types::{HwAddr, NodeId};

use super::MessageParseError;

/// Control-plane messages a node sends to the hub, tagged by the short
/// `t` field on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum NodeMessage {
    #[serde(rename = "hello")]
    Hello(Hello),
    #[serde(rename = "ka")]
    Keepalive(Keepalive),
    #[serde(rename = "ts_ping")]
    TsPing(TsPing),
    #[serde(rename = "ota_status")]
    OtaStatus(OtaStatus),
}

impl NodeMessage {
    pub fn from_json(payload: &str) -> Result<Self, MessageParseError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> Result<String, MessageParseError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// First message on a fresh control connection. `mac` is the durable
/// identity; everything else describes what this node can do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub mac: HwAddr,
    /// Firmware version string, compared against an update manifest
    /// when the node rejoins mid-session.
    pub fw: String,
    pub proto: u8,
    pub caps: HelloCaps,
    pub topo: HelloTopo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloCaps {
    /// Node listens for stream frames on the advertised port.
    pub stream: bool,
    /// Node accepts firmware update commands.
    pub ota: bool,
    /// Node runs the time-sync filter and can honor applyAt.
    pub clock: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloTopo {
    pub leds: u16,
    pub channels: u8,
}

/// Periodic liveness + link quality. The token must match the one the
/// welcome issued; a mismatch is logged and the message dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keepalive {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub token: String,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Observed stream loss in hundredths of a percent.
    pub loss_pct: u32,
    /// Node clock drift against the hub epoch, from the time-sync
    /// filter. Signed; positive means the node runs fast.
    pub drift_us: i64,
    pub uptime_s: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsPing {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    /// Node-local send time, µs. Echoed back untouched in the pong.
    pub t1: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtaStatus {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub phase: OtaPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Firmware version after a successful apply, if the node knows it
    /// before rebooting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw: Option<String>,
}
