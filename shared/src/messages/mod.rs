mod error;
mod node_message;
mod hub_message;

pub use error::MessageParseError;
pub use node_message::{Hello, HelloCaps, HelloTopo, Keepalive, NodeMessage, OtaStatus, TsPing};
pub use hub_message::{
    EffectChange, HubMessage, OtaUpdate, ParameterSet, StateSnapshot, TsPong, Welcome, ZoneRow,
    ZonesUpdate,
};
