use serde::{Deserialize, Serialize};

/// Fleet-wide output fields. Every field is a u8 knob; effect and
/// palette are ids into tables the nodes hold locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub effect: u8,
    pub brightness: u8,
    pub speed: u8,
    pub palette: u8,
    pub hue: u8,
    pub intensity: u8,
    pub saturation: u8,
    pub complexity: u8,
    pub variation: u8,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            effect: 0,
            brightness: 128,
            speed: 128,
            palette: 0,
            hue: 0,
            intensity: 128,
            saturation: 255,
            complexity: 128,
            variation: 0,
        }
    }
}

impl GlobalState {
    pub fn get(&self, field: GlobalField) -> u8 {
        match field {
            GlobalField::Effect => self.effect,
            GlobalField::Brightness => self.brightness,
            GlobalField::Speed => self.speed,
            GlobalField::Palette => self.palette,
            GlobalField::Hue => self.hue,
            GlobalField::Intensity => self.intensity,
            GlobalField::Saturation => self.saturation,
            GlobalField::Complexity => self.complexity,
            GlobalField::Variation => self.variation,
        }
    }

    /// Write a field, returning whether the stored value changed.
    pub fn set(&mut self, field: GlobalField, value: u8) -> bool {
        let slot = match field {
            GlobalField::Effect => &mut self.effect,
            GlobalField::Brightness => &mut self.brightness,
            GlobalField::Speed => &mut self.speed,
            GlobalField::Palette => &mut self.palette,
            GlobalField::Hue => &mut self.hue,
            GlobalField::Intensity => &mut self.intensity,
            GlobalField::Saturation => &mut self.saturation,
            GlobalField::Complexity => &mut self.complexity,
            GlobalField::Variation => &mut self.variation,
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }
}

/// One settable fleet-wide field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalField {
    Effect,
    Brightness,
    Speed,
    Palette,
    Hue,
    Intensity,
    Saturation,
    Complexity,
    Variation,
}

impl GlobalField {
    pub const ALL: [GlobalField; 9] = [
        GlobalField::Effect,
        GlobalField::Brightness,
        GlobalField::Speed,
        GlobalField::Palette,
        GlobalField::Hue,
        GlobalField::Intensity,
        GlobalField::Saturation,
        GlobalField::Complexity,
        GlobalField::Variation,
    ];

    fn bit(&self) -> u16 {
        match self {
            GlobalField::Effect => 1 << 0,
            GlobalField::Brightness => 1 << 1,
            GlobalField::Speed => 1 << 2,
            GlobalField::Palette => 1 << 3,
            GlobalField::Hue => 1 << 4,
            GlobalField::Intensity => 1 << 5,
            GlobalField::Saturation => 1 << 6,
            GlobalField::Complexity => 1 << 7,
            GlobalField::Variation => 1 << 8,
        }
    }
}

/// Dirty mask over [`GlobalState`] fields. Producers mark bits at any
/// rate; the batch drain takes the whole mask at once so late marks
/// land in the next batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalDirty(u16);

impl GlobalDirty {
    pub fn mark(&mut self, field: GlobalField) {
        self.0 |= field.bit();
    }

    pub fn contains(&self, field: GlobalField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Drain: returns the current mask and resets to clean.
    pub fn take(&mut self) -> GlobalDirty {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = GlobalField> + '_ {
        GlobalField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }
}
