use lumen_shared::{EffectChange, Micros, ParameterSet, StateSnapshot, ZonesUpdate};

/// A hub command waiting for its resolved local due time.
#[derive(Clone, Debug, PartialEq)]
pub enum ScheduledCommand {
    Snapshot(StateSnapshot),
    Effect(EffectChange),
    Parameters(ParameterSet),
    Zones(ZonesUpdate),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingCommand {
    pub due_local_us: Micros,
    pub command: ScheduledCommand,
}

// CommandScheduler
//
// Small ordered queue of commands between arrival and their apply-at
// instant. Kept sorted on insert; equal due times apply in arrival
// order, which preserves the hub's send order within one batch.
pub struct CommandScheduler {
    queue: Vec<PendingCommand>,
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    pub fn push(&mut self, due_local_us: Micros, command: ScheduledCommand) {
        let index = self
            .queue
            .partition_point(|pending| pending.due_local_us <= due_local_us);
        self.queue.insert(
            index,
            PendingCommand {
                due_local_us,
                command,
            },
        );
    }

    /// Remove and return every command whose due time has arrived, in
    /// order.
    pub fn take_due(&mut self, now_us: Micros) -> Vec<ScheduledCommand> {
        let split = self
            .queue
            .partition_point(|pending| pending.due_local_us <= now_us);
        self.queue
            .drain(..split)
            .map(|pending| pending.command)
            .collect()
    }

    pub fn next_due(&self) -> Option<Micros> {
        self.queue.first().map(|pending| pending.due_local_us)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for CommandScheduler {
    fn default() -> Self {
        Self::new()
    }
}
