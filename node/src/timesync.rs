use log::{trace, warn};

use lumen_shared::{Micros, NodeId, TsPing, TsPong, TsSample, TIMESYNC_LOCK_SAMPLES};

/// Samples kept for the offset estimate. Old samples age out as new
/// exchanges complete.
const SAMPLE_WINDOW: usize = 8;

// TimeSync
//
// Estimates the hub-epoch offset from ping/pong exchanges. The sample
// with the smallest round trip in the window wins: a slow exchange says
// little about the clocks, a fast one brackets them tightly. `locked`
// flips on once enough samples are in and stays on; the estimate keeps
// refining underneath it.
pub struct TimeSync {
    samples: Vec<TsSample>,
    offset_us: i64,
    locked: bool,
    pending_t1: Option<Micros>,
    last_shift_us: i64,
}

impl TimeSync {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            offset_us: 0,
            locked: false,
            pending_t1: None,
            last_shift_us: 0,
        }
    }

    /// Hub epoch minus node-local time, in µs. Zero until the first
    /// sample lands.
    pub fn offset_us(&self) -> i64 {
        self.offset_us
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// How far the estimate moved on the last update. Reported to the
    /// hub in keepalives as drift.
    pub fn last_shift_us(&self) -> i64 {
        self.last_shift_us
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Start an exchange. Only one ping may be in flight; a new one
    /// replaces a pong that never came back.
    pub fn make_ping(&mut self, node_id: NodeId, now_us: Micros) -> TsPing {
        if self.pending_t1.is_some() {
            trace!("previous time-sync ping went unanswered");
        }
        self.pending_t1 = Some(now_us);
        TsPing { node_id, t1: now_us }
    }

    /// Complete an exchange. `now_us` is t4, the pong's arrival time.
    /// Pongs that do not match the outstanding ping are dropped.
    pub fn handle_pong(&mut self, pong: &TsPong, now_us: Micros) -> Option<TsSample> {
        let Some(t1) = self.pending_t1.take() else {
            warn!("time-sync pong with no ping in flight, dropping");
            return None;
        };
        if pong.t1 != t1 {
            warn!(
                "time-sync pong echoes t1 {} but ping sent {}, dropping",
                pong.t1, t1
            );
            return None;
        }

        let sample = TsSample::from_exchange(t1, pong.t2, pong.t3, now_us);
        if sample.rtt_us < 0 {
            warn!("time-sync sample with negative rtt, dropping");
            return None;
        }

        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.remove(0);
        }
        self.samples.push(sample);

        let best = self
            .samples
            .iter()
            .min_by_key(|s| s.rtt_us)
            .copied()
            .unwrap_or(sample);
        self.last_shift_us = best.offset_us - self.offset_us;
        self.offset_us = best.offset_us;

        if !self.locked && self.samples.len() >= TIMESYNC_LOCK_SAMPLES {
            self.locked = true;
            trace!(
                "time-sync locked at offset {}us (rtt {}us)",
                self.offset_us,
                best.rtt_us
            );
        }
        Some(sample)
    }

    /// Convert a hub-epoch instant to node-local time. Saturates at
    /// zero rather than wrapping for instants before local start.
    pub fn hub_to_local(&self, hub_us: Micros) -> Micros {
        let local = hub_us as i64 - self.offset_us;
        if local < 0 {
            0
        } else {
            local as Micros
        }
    }

    pub fn local_to_hub(&self, local_us: Micros) -> Micros {
        let hub = local_us as i64 + self.offset_us;
        if hub < 0 {
            0
        } else {
            hub as Micros
        }
    }
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new()
    }
}
