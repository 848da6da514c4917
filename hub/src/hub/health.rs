use serde::Serialize;

use lumen_shared::{HwAddr, Micros, NodeId, NodeLifecycle, OtaPhase, StreamSeq};

/// Aggregate fleet view for a dashboard poll. Plain data; how it gets
/// served is someone else's problem.
#[derive(Clone, Debug, Serialize)]
pub struct HealthSnapshot {
    pub uptime_us: Micros,
    pub nodes: usize,
    pub pending: usize,
    pub authed: usize,
    pub ready: usize,
    pub degraded: usize,
    pub lost: usize,
    pub stream_seq: StreamSeq,
    pub batches: u64,
    pub update_active: bool,
}

impl HealthSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One node's row in the fleet table.
#[derive(Clone, Debug, Serialize)]
pub struct NodeRow {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub addr: HwAddr,
    pub state: NodeLifecycle,
    pub fw: String,
    pub rssi: i8,
    #[serde(rename = "lossPct")]
    pub loss_pct: u32,
    #[serde(rename = "drift_us")]
    pub drift_us: i64,
    #[serde(rename = "uptime_s")]
    pub uptime_s: u32,
    #[serde(rename = "lastSeenAge_us")]
    pub last_seen_age_us: Micros,
    #[serde(rename = "otaPhase")]
    pub ota_phase: OtaPhase,
    #[serde(rename = "streamSent")]
    pub stream_sent: u64,
}
