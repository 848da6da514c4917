use serde::{Deserialize, Serialize};

use crate::types::ZoneId;

/// One zone's slice of the output plus its own field overrides. `start`
/// and `end` are pixel indices into the node's local strip topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneState {
    pub id: ZoneId,
    pub start: u16,
    pub end: u16,
    pub enabled: bool,
    pub effect: u8,
    pub brightness: u8,
    pub speed: u8,
    pub palette: u8,
    /// Blend weight against the global output at the zone boundary.
    pub blend: u8,
}

impl ZoneState {
    pub fn new(id: ZoneId, start: u16, end: u16) -> Self {
        Self {
            id,
            start,
            end,
            enabled: true,
            effect: 0,
            brightness: 255,
            speed: 128,
            palette: 0,
            blend: 128,
        }
    }

    pub fn get(&self, field: ZoneField) -> u8 {
        match field {
            ZoneField::Effect => self.effect,
            ZoneField::Brightness => self.brightness,
            ZoneField::Speed => self.speed,
            ZoneField::Palette => self.palette,
            ZoneField::Blend => self.blend,
        }
    }

    /// Write a field, returning whether the stored value changed.
    pub fn set(&mut self, field: ZoneField, value: u8) -> bool {
        let slot = match field {
            ZoneField::Effect => &mut self.effect,
            ZoneField::Brightness => &mut self.brightness,
            ZoneField::Speed => &mut self.speed,
            ZoneField::Palette => &mut self.palette,
            ZoneField::Blend => &mut self.blend,
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }
}

/// One settable per-zone field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneField {
    Effect,
    Brightness,
    Speed,
    Palette,
    Blend,
}

impl ZoneField {
    pub const ALL: [ZoneField; 5] = [
        ZoneField::Effect,
        ZoneField::Brightness,
        ZoneField::Speed,
        ZoneField::Palette,
        ZoneField::Blend,
    ];

    fn bit(&self) -> u8 {
        match self {
            ZoneField::Effect => 1 << 0,
            ZoneField::Brightness => 1 << 1,
            ZoneField::Speed => 1 << 2,
            ZoneField::Palette => 1 << 3,
            ZoneField::Blend => 1 << 4,
        }
    }
}

/// Dirty mask over one zone's fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneDirty(u8);

impl ZoneDirty {
    pub fn mark(&mut self, field: ZoneField) {
        self.0 |= field.bit();
    }

    pub fn contains(&self, field: ZoneField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn take(&mut self) -> ZoneDirty {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = ZoneField> + '_ {
        ZoneField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }
}
