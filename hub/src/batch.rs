use log::trace;
use thiserror::Error;

use lumen_shared::{
    EffectChange, GlobalDirty, GlobalField, GlobalState, HubMessage, Micros, ParameterSet,
    StateSnapshot, ZoneDirty, ZoneField, ZoneId, ZoneRow, ZoneState, ZonesUpdate, APPLY_AHEAD_US,
    BATCH_WINDOW_MS, MAX_ZONES,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Zone table is at capacity
    #[error("Zone table is full ({limit} zones). Remove a zone before defining another")]
    ZoneTableFull { limit: usize },

    /// A zone with this id already exists
    #[error("Zone {zone_id} is already defined. Set its fields instead of redefining it")]
    DuplicateZone { zone_id: ZoneId },

    /// Operation referenced an undefined zone
    #[error("No zone {zone_id} is defined. Define the zone before setting its fields")]
    UnknownZone { zone_id: ZoneId },
}

/// One drained batch window. Every message in it shares a single
/// applyAt stamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub apply_at: Micros,
    pub effect: Option<EffectChange>,
    pub parameters: Option<ParameterSet>,
    pub zones: Option<ZonesUpdate>,
}

impl Batch {
    /// Control messages in send order. Effect changes go first so a
    /// node switching effects applies the new parameters to the new
    /// effect, not the old one.
    pub fn messages(&self) -> Vec<HubMessage> {
        let mut out = Vec::new();
        if let Some(effect) = self.effect {
            out.push(HubMessage::EffectChange(effect));
        }
        if let Some(parameters) = self.parameters {
            out.push(HubMessage::ParameterSet(parameters));
        }
        if let Some(zones) = self.zones.clone() {
            out.push(HubMessage::ZonesUpdate(zones));
        }
        out
    }
}

// DeltaBatcher
//
// Owns the desired output state (global fields plus the zone table) and
// the dirty masks over it. Producers mutate at any rate; the tick
// drains at most once per window and stamps the whole drain with one
// applyAt = now + APPLY_AHEAD_US. Masks are cleared by the drain, so a
// mark landing mid-drain simply rides the next window.
pub struct DeltaBatcher {
    global: GlobalState,
    global_dirty: GlobalDirty,
    zones: Vec<ZoneState>,
    zone_dirty: Vec<ZoneDirty>,
    last_drain_us: Micros,
    drained: u64,
}

impl DeltaBatcher {
    pub fn new() -> Self {
        Self {
            global: GlobalState::default(),
            global_dirty: GlobalDirty::default(),
            zones: Vec::new(),
            zone_dirty: Vec::new(),
            last_drain_us: 0,
            drained: 0,
        }
    }

    /// Batches drained since start, for the health snapshot.
    pub fn batches_drained(&self) -> u64 {
        self.drained
    }

    /// Set a global field, marking it dirty when the value actually
    /// changed. Returns whether it did.
    pub fn set_global(&mut self, field: GlobalField, value: u8) -> bool {
        let changed = self.global.set(field, value);
        if changed {
            self.global_dirty.mark(field);
            trace!("global {:?} -> {} (dirty)", field, value);
        }
        changed
    }

    pub fn global(&self) -> &GlobalState {
        &self.global
    }

    /// Add a zone covering the led range [start, end). New zones come
    /// up fully dirty so the next batch carries the whole row.
    pub fn define_zone(&mut self, id: ZoneId, start: u16, end: u16) -> Result<(), BatchError> {
        if self.zones.iter().any(|z| z.id == id) {
            return Err(BatchError::DuplicateZone { zone_id: id });
        }
        if self.zones.len() >= MAX_ZONES {
            return Err(BatchError::ZoneTableFull { limit: MAX_ZONES });
        }
        self.zones.push(ZoneState::new(id, start, end));
        let mut dirty = ZoneDirty::default();
        for field in ZoneField::ALL {
            dirty.mark(field);
        }
        self.zone_dirty.push(dirty);
        Ok(())
    }

    pub fn set_zone(&mut self, id: ZoneId, field: ZoneField, value: u8) -> Result<bool, BatchError> {
        let Some(index) = self.zones.iter().position(|z| z.id == id) else {
            return Err(BatchError::UnknownZone { zone_id: id });
        };
        let changed = self.zones[index].set(field, value);
        if changed {
            self.zone_dirty[index].mark(field);
            trace!("zone {} {:?} -> {} (dirty)", id, field, value);
        }
        Ok(changed)
    }

    pub fn zones(&self) -> &[ZoneState] {
        &self.zones
    }

    /// Full-state snapshot for a joining node. Does not touch the dirty
    /// masks; the joiner gets everything, everyone else still gets
    /// their pending deltas.
    pub fn snapshot(&self, apply_at: Micros) -> StateSnapshot {
        StateSnapshot {
            apply_at,
            global: self.global,
            zones: self.zones.clone(),
        }
    }

    /// Drain the window if it has elapsed and anything is dirty.
    pub fn tick(&mut self, now_us: Micros) -> Option<Batch> {
        if now_us.saturating_sub(self.last_drain_us) < BATCH_WINDOW_MS * 1_000 {
            return None;
        }
        self.last_drain_us = now_us;

        let global_dirty = self.global_dirty.take();
        let any_zone_dirty = self.zone_dirty.iter().any(|d| !d.is_empty());
        if global_dirty.is_empty() && !any_zone_dirty {
            return None;
        }

        let apply_at = now_us + APPLY_AHEAD_US;

        let effect = global_dirty
            .contains(GlobalField::Effect)
            .then(|| EffectChange {
                apply_at,
                effect: self.global.get(GlobalField::Effect),
            });

        let parameters = ParameterSet::from_dirty(apply_at, &self.global, &global_dirty);
        let parameters = (!parameters.is_empty()).then_some(parameters);

        let zones = if any_zone_dirty {
            let mut rows = Vec::new();
            for (zone, dirty) in self.zones.iter().zip(self.zone_dirty.iter_mut()) {
                let dirty = dirty.take();
                if !dirty.is_empty() {
                    rows.push(ZoneRow::from_dirty(zone, &dirty));
                }
            }
            Some(ZonesUpdate { apply_at, zones: rows })
        } else {
            None
        };

        self.drained += 1;
        trace!(
            "drained batch: applyAt {} ({} effect, {} params, {} zone rows)",
            apply_at,
            effect.is_some() as u8,
            parameters.is_some() as u8,
            zones.as_ref().map_or(0, |z| z.zones.len())
        );

        Some(Batch {
            apply_at,
            effect,
            parameters,
            zones,
        })
    }
}

impl Default for DeltaBatcher {
    fn default() -> Self {
        Self::new()
    }
}
