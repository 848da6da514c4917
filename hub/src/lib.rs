//! # Lumen Hub
//! The coordination side of a lighting fleet: tracks every node through
//! its lifecycle, issues session tokens, batches state deltas onto a
//! shared schedule, fans out best-effort stream frames and rolls
//! firmware updates one node at a time.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod transport;

mod batch;
mod clock;
mod error;
mod events;
mod hub;
mod ota;
mod registry;
mod stream;

pub use batch::{Batch, BatchError, DeltaBatcher};
pub use clock::HubClock;
pub use error::HubError;
pub use events::{
    AuthEvent, DegradeEvent, EraseEvent, ErrorEvent, FleetEvent, FleetEvents, JoinEvent,
    LostEvent, ReadyEvent, UpdateOutcomeEvent,
};
pub use hub::{HealthSnapshot, Hub, HubConfig, NodeRow};
pub use ota::{OtaDispatcher, OtaError, OtaOutcome, OtaProgress, OtaSession};
pub use registry::{
    ErasedNode, InvariantViolation, KeepaliveOutcome, LinkMetrics, NodeRecord, RegisterOutcome,
    Registry, RegistryError, TickReport,
};
pub use stream::{StreamFanout, StreamTick};
