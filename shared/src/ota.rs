use serde::{Deserialize, Serialize};

/// Per-node firmware update sub-state, as reported by the node.
///
/// The hub never drives a node through these phases; it records what
/// the node says and enforces only the session-level rules (one session
/// fleet-wide, a hard deadline, idempotent conclusion).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaPhase {
    Idle,
    Downloading,
    Verifying,
    Applying,
    Rebooting,
    Error,
}

impl OtaPhase {
    pub fn name(&self) -> &'static str {
        match self {
            OtaPhase::Idle => "idle",
            OtaPhase::Downloading => "downloading",
            OtaPhase::Verifying => "verifying",
            OtaPhase::Applying => "applying",
            OtaPhase::Rebooting => "rebooting",
            OtaPhase::Error => "error",
        }
    }

    /// Position in the expected forward progression. A report that
    /// moves backward is an anomaly worth a warning, though the hub
    /// still records it (the node owns its own firmware state).
    pub fn rank(&self) -> u8 {
        match self {
            OtaPhase::Idle => 0,
            OtaPhase::Downloading => 1,
            OtaPhase::Verifying => 2,
            OtaPhase::Applying => 3,
            OtaPhase::Rebooting => 4,
            OtaPhase::Error => 5,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OtaPhase::Error)
    }
}

/// What to install: handed to the target node verbatim. The node
/// fetches the image from `url` itself; the hub never serves bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaManifest {
    pub url: String,
    pub version: String,
    pub size: u32,
}
