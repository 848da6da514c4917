//! Clock agreement end to end: a skewed node locks onto the hub epoch
//! through ping/pong exchanges, scheduled applyAt instants land on the
//! hub's intended moment despite the skew, and a clock step after lock
//! falls back to the short local deferral instead of applying in the
//! past or freezing.

use lumen_shared::{GlobalField, APPLY_AHEAD_US, TIMESYNC_LOCK_SAMPLES};
use lumen_test::FleetHarness;

#[test]
fn skewed_node_locks_on_the_hub_epoch() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 250_000);
    fleet.join(a);
    fleet.poll_nodes();

    for round in 0..TIMESYNC_LOCK_SAMPLES {
        assert!(
            !fleet.node(a).control.timesync().is_locked(),
            "not locked before round {}",
            round
        );
        fleet.advance_ms(100);
        fleet.ping_timesync(a);
    }

    let sync = fleet.node(a).control.timesync();
    assert!(sync.is_locked());
    assert_eq!(
        sync.offset_us(),
        -250_000,
        "offset is hub minus local, so a fast node reads negative"
    );
}

#[test]
fn apply_at_lands_on_the_hub_instant_despite_skew() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 250_000);
    fleet.join(a);
    fleet.poll_nodes();
    for _ in 0..TIMESYNC_LOCK_SAMPLES {
        fleet.advance_ms(100);
        fleet.ping_timesync(a);
    }
    fleet.node_mut(a).drop_stream = 1_000;

    fleet.hub.set_global(GlobalField::Palette, 4);
    fleet.tick_hub();

    // The hub stamped now + APPLY_AHEAD_US in its own epoch; on this
    // node's clock that is the same distance from its own reading of
    // the delivery instant.
    let due = fleet.node_now(a) + APPLY_AHEAD_US;
    assert_eq!(fleet.node_mut(a).control.apply_due(due - 1), 0);
    assert_eq!(fleet.node_mut(a).control.apply_due(due), 1);
    assert_eq!(fleet.node(a).control.global().palette, 4);
}

#[test]
fn clock_step_after_lock_is_clamped() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 250_000);
    fleet.join(a);
    fleet.poll_nodes();
    for _ in 0..TIMESYNC_LOCK_SAMPLES {
        fleet.advance_ms(100);
        fleet.ping_timesync(a);
    }
    fleet.node_mut(a).drop_stream = 1_000;

    // The node's clock jumps two seconds; its locked offset is now
    // badly wrong until the filter re-converges.
    fleet.node_mut(a).skew_us += 2_000_000;

    fleet.advance_ms(30);
    fleet.hub.set_global(GlobalField::Hue, 9);
    fleet.tick_hub();

    let due = fleet.node_now(a) + APPLY_AHEAD_US;
    assert_eq!(
        fleet.node_mut(a).control.apply_due(due - 1),
        0,
        "the implausible instant was not applied immediately"
    );
    assert_eq!(
        fleet.node_mut(a).control.apply_due(due),
        1,
        "clamped to a short local deferral"
    );
    assert_eq!(fleet.node(a).control.global().hue, 9);
}
