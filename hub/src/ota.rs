use log::{error, info, warn};
use thiserror::Error;

use lumen_shared::{
    Micros, NodeId, NodeLifecycle, OtaManifest, OtaPhase, OtaStatus, OtaUpdate,
    OTA_DEADLINE_MS,
};

use crate::registry::{Registry, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtaError {
    /// Another session is running; updates roll one node at a time
    #[error("An update for node {active} is already running. Wait for it to conclude before starting another")]
    SessionActive { active: NodeId },

    /// Target is in a state that cannot take an update
    #[error("Node {node_id} is {state}; updates require READY or AUTHED")]
    BadTargetState {
        node_id: NodeId,
        state: &'static str,
    },

    /// Target did not advertise update capability in its hello
    #[error("Node {node_id} did not advertise update support")]
    UpdateUnsupported { node_id: NodeId },

    /// Registry refused the lookup or phase write
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// The single fleet-wide update session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtaSession {
    pub node_id: NodeId,
    pub manifest: OtaManifest,
    pub started_us: Micros,
    pub deadline_us: Micros,
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtaOutcome {
    Succeeded { node_id: NodeId, version: String },
    Failed { node_id: NodeId, reason: String },
}

impl OtaOutcome {
    pub fn node_id(&self) -> NodeId {
        match self {
            OtaOutcome::Succeeded { node_id, .. } => *node_id,
            OtaOutcome::Failed { node_id, .. } => *node_id,
        }
    }
}

/// What a status report amounted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtaProgress {
    /// Session still running; phase recorded.
    Progress(OtaPhase),
    /// Terminal report; session cleared.
    Concluded(OtaOutcome),
    /// Report for a node with no active session. Duplicate terminal
    /// reports land here and are no-ops.
    Stale,
}

// OtaDispatcher
//
// Holds the one allowed session and the rules around it. The node owns
// its own firmware progression; the hub records reported phases and
// enforces exclusivity, the deadline, and conclusion on rejoin.
pub struct OtaDispatcher {
    session: Option<OtaSession>,
}

impl OtaDispatcher {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn session(&self) -> Option<&OtaSession> {
        self.session.as_ref()
    }

    /// Start an update for one node. Refused while any session is
    /// active or when the target cannot take one. On success the
    /// returned command is sent to the node and the deadline clock
    /// starts.
    pub fn begin_update(
        &mut self,
        registry: &Registry,
        node_id: NodeId,
        manifest: OtaManifest,
        now_us: Micros,
    ) -> Result<OtaUpdate, OtaError> {
        if let Some(session) = &self.session {
            return Err(OtaError::SessionActive {
                active: session.node_id,
            });
        }
        let Some(record) = registry.get(node_id) else {
            return Err(OtaError::Registry(RegistryError::UnknownNode { node_id }));
        };
        if !matches!(
            record.state(),
            NodeLifecycle::Ready | NodeLifecycle::Authed
        ) {
            return Err(OtaError::BadTargetState {
                node_id,
                state: record.state().name(),
            });
        }
        if !record.caps().ota {
            return Err(OtaError::UpdateUnsupported { node_id });
        }

        let deadline_us = now_us + OTA_DEADLINE_MS * 1_000;
        info!(
            "update session for node {}: fw {} ({} bytes), deadline {}us",
            node_id, manifest.version, manifest.size, deadline_us
        );
        let command = OtaUpdate {
            url: manifest.url.clone(),
            version: manifest.version.clone(),
            size: manifest.size,
        };
        self.session = Some(OtaSession {
            node_id,
            manifest,
            started_us: now_us,
            deadline_us,
        });
        Ok(command)
    }

    /// Record a node's phase report. An error phase concludes the
    /// session; anything else is progress. Reports with no matching
    /// session are stale no-ops.
    pub fn report_status(
        &mut self,
        registry: &mut Registry,
        status: &OtaStatus,
    ) -> Result<OtaProgress, OtaError> {
        let active = self
            .session
            .as_ref()
            .is_some_and(|s| s.node_id == status.node_id);
        if !active {
            info!(
                "stale update report from node {} ({}), ignoring",
                status.node_id,
                status.phase.name()
            );
            return Ok(OtaProgress::Stale);
        }

        let prior = registry
            .get(status.node_id)
            .map(|r| r.ota_phase())
            .unwrap_or(OtaPhase::Idle);
        if status.phase.rank() < prior.rank() {
            warn!(
                "node {} reported {} after {}, recording anyway",
                status.node_id,
                status.phase.name(),
                prior.name()
            );
        }
        registry.set_ota_phase(status.node_id, status.phase)?;

        if status.phase.is_error() {
            let reason = status
                .detail
                .clone()
                .unwrap_or_else(|| "node reported error".to_string());
            warn!("update for node {} failed: {}", status.node_id, reason);
            self.session = None;
            return Ok(OtaProgress::Concluded(OtaOutcome::Failed {
                node_id: status.node_id,
                reason,
            }));
        }

        info!(
            "node {} update phase: {}",
            status.node_id,
            status.phase.name()
        );
        Ok(OtaProgress::Progress(status.phase))
    }

    /// Conclude the session when its target rejoins: the reported
    /// firmware version decides success. The registry has already reset
    /// the node's phase to idle as part of the rejoin.
    pub fn handle_rejoin(&mut self, node_id: NodeId, fw: &str) -> Option<OtaOutcome> {
        let session = self.session.as_ref()?;
        if session.node_id != node_id {
            return None;
        }
        let expected = session.manifest.version.clone();
        self.session = None;

        if fw == expected {
            info!("node {} rejoined on fw {}, update succeeded", node_id, fw);
            Some(OtaOutcome::Succeeded {
                node_id,
                version: expected,
            })
        } else {
            warn!(
                "node {} rejoined on fw {} instead of {}, update failed",
                node_id, fw, expected
            );
            Some(OtaOutcome::Failed {
                node_id,
                reason: format!("rejoined on fw {} (wanted {})", fw, expected),
            })
        }
    }

    /// Force-fail a session that blew its deadline.
    pub fn tick(&mut self, registry: &mut Registry, now_us: Micros) -> Option<OtaOutcome> {
        let session = self.session.as_ref()?;
        if now_us < session.deadline_us {
            return None;
        }
        let node_id = session.node_id;
        error!(
            "update for node {} missed its deadline ({}us past), force-failing",
            node_id,
            now_us - session.deadline_us
        );
        self.session = None;
        if registry.get(node_id).is_some() {
            // Unknown here means the record was erased mid-session;
            // nothing left to mark.
            let _ = registry.set_ota_phase(node_id, OtaPhase::Error);
        }
        Some(OtaOutcome::Failed {
            node_id,
            reason: "deadline exceeded".to_string(),
        })
    }
}

impl Default for OtaDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
