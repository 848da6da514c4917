use std::time::Instant;

use lumen_shared::Micros;

/// Monotonic microsecond clock anchored at hub start. Every applyAt,
/// deadline, and last-seen stamp in the hub is expressed in this epoch;
/// wall-clock time never enters scheduling math.
#[derive(Clone, Copy, Debug)]
pub struct HubClock {
    started: Instant,
}

impl HubClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Microseconds since hub start.
    pub fn epoch_now(&self) -> Micros {
        self.started.elapsed().as_micros() as Micros
    }

    /// Milliseconds since hub start, for coarse bookkeeping (uptime,
    /// log lines).
    pub fn millis_now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Default for HubClock {
    fn default() -> Self {
        Self::new()
    }
}
