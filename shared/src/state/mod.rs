mod global;
mod zone;

pub use global::{GlobalDirty, GlobalField, GlobalState};
pub use zone::{ZoneDirty, ZoneField, ZoneState};
