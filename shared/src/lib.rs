//! # Lumen Shared
//! Common protocol types shared between the lumen-hub & lumen-node crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod constants;
mod lifecycle;
mod messages;
mod ota;
mod state;
mod stream;
mod timesync;
mod token;
mod types;

pub use constants::{
    APPLY_AHEAD_US, APPLY_AT_CLAMP_US, BATCH_WINDOW_MS, DRIFT_DEGRADED_US,
    INVARIANT_CHECK_PERIOD_MS, KEEPALIVE_PERIOD_MS, KEEPALIVE_TIMEOUT_MS, LOSS_DEGRADED_CENTI_PCT,
    LOST_GRACE_MS, MAX_DATAGRAM_LEN, MAX_NODES, MAX_ZONES, OTA_DEADLINE_MS, PROTO_VERSION,
    STREAM_PERIOD_MS, STREAM_PORT, TIMESYNC_LOCK_SAMPLES,
};
pub use lifecycle::{LifecycleError, LifecycleOp, NodeLifecycle};
pub use messages::{
    EffectChange, Hello, HelloCaps, HelloTopo, HubMessage, Keepalive, MessageParseError,
    NodeMessage, OtaStatus, OtaUpdate, ParameterSet, StateSnapshot, TsPing, TsPong, Welcome,
    ZoneRow, ZonesUpdate,
};
pub use ota::{OtaManifest, OtaPhase};
pub use state::{GlobalDirty, GlobalField, GlobalState, ZoneDirty, ZoneField, ZoneState};
pub use stream::{
    stream_seq_newer, CodecError, StreamFrame, StreamZone, STREAM_MAGIC, STREAM_VERSION,
};
pub use timesync::TsSample;
pub use token::token_hash32;
pub use types::{
    EffectId, HwAddr, Micros, NodeId, PaletteId, ParseAddrError, StreamSeq, ZoneId,
};
