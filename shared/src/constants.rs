// Protocol-wide constants. Hub and node both build against these; a
// version bump is required whenever wire-visible values change.

/// Control protocol version carried in every hello.
pub const PROTO_VERSION: u8 = 1;

/// Fleet capacity. Registration beyond this count is refused.
pub const MAX_NODES: usize = 16;

/// Most zones a hub will track or put in a stream frame.
pub const MAX_ZONES: usize = 16;

// Scheduling

/// Headroom added to "now" when stamping a batch's applyAt. Large enough
/// to cover control-channel delivery jitter across the fleet, small
/// enough that an operator twist still feels immediate.
pub const APPLY_AHEAD_US: u64 = 30_000;

/// Delta batch window. Dirty fields accumulated inside one window share
/// a single applyAt.
pub const BATCH_WINDOW_MS: u64 = 30;

// Streaming

/// Best-effort stream fanout period (~100 Hz).
pub const STREAM_PERIOD_MS: u64 = 10;

/// Datagram port nodes listen on for stream frames; handed to nodes in
/// the welcome payload.
pub const STREAM_PORT: u16 = 45_454;

/// Upper bound on an encoded stream frame.
pub const MAX_DATAGRAM_LEN: usize = 512;

// Liveness

/// How often a healthy node sends keepalives.
pub const KEEPALIVE_PERIOD_MS: u64 = 1_000;

/// A node silent for longer than this is marked LOST on the next tick.
/// Tolerates two dropped keepalives plus scheduling slop.
pub const KEEPALIVE_TIMEOUT_MS: u64 = 3_500;

/// LOST records older than this are erased; a rejoin inside the window
/// keeps its nodeId.
pub const LOST_GRACE_MS: u64 = 120_000;

/// Packet loss above this (hundredths of a percent, so 200 = 2.00%)
/// demotes READY to DEGRADED.
pub const LOSS_DEGRADED_CENTI_PCT: u32 = 200;

/// Clock drift beyond this demotes READY to DEGRADED.
pub const DRIFT_DEGRADED_US: i64 = 10_000;

/// Registry invariant self-check cadence.
pub const INVARIANT_CHECK_PERIOD_MS: u64 = 10_000;

// Firmware updates

/// A firmware session that has not concluded by this deadline is
/// force-failed.
pub const OTA_DEADLINE_MS: u64 = 180_000;

// Node-side guardrails

/// A resolved applyAt further than this from local now (either
/// direction) is treated as bad sync and clamped.
pub const APPLY_AT_CLAMP_US: u64 = 500_000;

/// Time-sync samples needed before a node declares its offset locked.
pub const TIMESYNC_LOCK_SAMPLES: usize = 5;
