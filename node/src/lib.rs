//! # Lumen Node
//! The node side of the fleet protocol, kept free of sockets and
//! clocks: the embedding (firmware main loop or a test harness) feeds
//! in control payloads, stream datagrams and clock readings, and ships
//! whatever messages come back out.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod control;
mod scheduler;
mod timesync;

pub use control::{NodeConfig, NodeControl};
pub use scheduler::{CommandScheduler, PendingCommand, ScheduledCommand};
pub use timesync::TimeSync;
