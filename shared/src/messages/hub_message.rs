use serde::{Deserialize, Serialize};

use crate::state::{GlobalDirty, GlobalField, GlobalState, ZoneDirty, ZoneState};
use crate::types::{Micros, NodeId, ZoneId};

use super::MessageParseError;

/// Control-plane messages the hub sends to nodes, tagged by the short
/// `t` field on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum HubMessage {
    #[serde(rename = "welcome")]
    Welcome(Welcome),
    #[serde(rename = "state.snapshot")]
    StateSnapshot(StateSnapshot),
    #[serde(rename = "effects.setCurrent")]
    EffectChange(EffectChange),
    #[serde(rename = "parameters.set")]
    ParameterSet(ParameterSet),
    #[serde(rename = "zones.update")]
    ZonesUpdate(ZonesUpdate),
    #[serde(rename = "ts_pong")]
    TsPong(TsPong),
    #[serde(rename = "ota_update")]
    OtaUpdate(OtaUpdate),
}

impl HubMessage {
    pub fn from_json(payload: &str) -> Result<Self, MessageParseError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> Result<String, MessageParseError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The applyAt stamp, for message kinds that schedule.
    pub fn apply_at(&self) -> Option<Micros> {
        match self {
            HubMessage::StateSnapshot(msg) => Some(msg.apply_at),
            HubMessage::EffectChange(msg) => Some(msg.apply_at),
            HubMessage::ParameterSet(msg) => Some(msg.apply_at),
            HubMessage::ZonesUpdate(msg) => Some(msg.apply_at),
            HubMessage::Welcome(_) | HubMessage::TsPong(_) | HubMessage::OtaUpdate(_) => None,
        }
    }
}

/// Reply to a hello: the node's identity, its session token, where the
/// stream frames will arrive, and the hub epoch so the node can seed
/// its time-sync filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub token: String,
    #[serde(rename = "streamPort")]
    pub stream_port: u16,
    #[serde(rename = "hubEpoch_us")]
    pub hub_epoch_us: Micros,
}

/// Full state push after a welcome so a joining node converges without
/// waiting for deltas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(rename = "applyAt")]
    pub apply_at: Micros,
    pub global: GlobalState,
    pub zones: Vec<ZoneState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectChange {
    #[serde(rename = "applyAt")]
    pub apply_at: Micros,
    pub effect: u8,
}

/// Dirty global fields only; clean fields are absent from the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(rename = "applyAt")]
    pub apply_at: Micros,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<u8>,
}

impl ParameterSet {
    /// Build from the drained dirty mask. The effect field is excluded:
    /// effect changes travel as their own message kind.
    pub fn from_dirty(apply_at: Micros, state: &GlobalState, dirty: &GlobalDirty) -> Self {
        let mut msg = ParameterSet {
            apply_at,
            ..Default::default()
        };
        for field in dirty.iter() {
            let value = Some(state.get(field));
            match field {
                GlobalField::Effect => {}
                GlobalField::Brightness => msg.brightness = value,
                GlobalField::Speed => msg.speed = value,
                GlobalField::Palette => msg.palette = value,
                GlobalField::Hue => msg.hue = value,
                GlobalField::Intensity => msg.intensity = value,
                GlobalField::Saturation => msg.saturation = value,
                GlobalField::Complexity => msg.complexity = value,
                GlobalField::Variation => msg.variation = value,
            }
        }
        msg
    }

    pub fn is_empty(&self) -> bool {
        self.brightness.is_none()
            && self.speed.is_none()
            && self.palette.is_none()
            && self.hue.is_none()
            && self.intensity.is_none()
            && self.saturation.is_none()
            && self.complexity.is_none()
            && self.variation.is_none()
    }
}

/// One dirty zone's changed fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRow {
    pub id: ZoneId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend: Option<u8>,
}

impl ZoneRow {
    pub fn from_dirty(zone: &ZoneState, dirty: &ZoneDirty) -> Self {
        let mut row = ZoneRow {
            id: zone.id,
            effect: None,
            brightness: None,
            speed: None,
            palette: None,
            blend: None,
        };
        for field in dirty.iter() {
            let value = Some(zone.get(field));
            match field {
                crate::state::ZoneField::Effect => row.effect = value,
                crate::state::ZoneField::Brightness => row.brightness = value,
                crate::state::ZoneField::Speed => row.speed = value,
                crate::state::ZoneField::Palette => row.palette = value,
                crate::state::ZoneField::Blend => row.blend = value,
            }
        }
        row
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZonesUpdate {
    #[serde(rename = "applyAt")]
    pub apply_at: Micros,
    pub zones: Vec<ZoneRow>,
}

/// Time-sync reply. t1 is the node's ping send time echoed back; t2 and
/// t3 are hub receive and hub send times, all µs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsPong {
    pub t1: u64,
    pub t2: u64,
    pub t3: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtaUpdate {
    pub url: String,
    pub version: String,
    pub size: u32,
}
