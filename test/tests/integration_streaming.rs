//! Stream fanout end to end: frames repaint READY nodes immediately,
//! the cadence gate holds between ticks, sequence numbers freeze while
//! nobody is listening, and sustained datagram loss demotes a node via
//! its own keepalive metrics until a clean interval promotes it back.

use lumen_hub::{DegradeEvent, JoinEvent, ReadyEvent};
use lumen_shared::{GlobalField, NodeLifecycle};
use lumen_test::{read_all, FleetHarness};

#[test]
fn frames_carry_current_state_immediately() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    fleet.join(a);
    fleet.poll_nodes();

    fleet.hub.set_global(GlobalField::Brightness, 77);
    fleet.tick_hub();

    assert_eq!(
        fleet.node(a).control.global().brightness,
        77,
        "stream frames apply with no scheduling delay"
    );
    assert_eq!(fleet.hub.health_at(fleet.now_us).stream_seq, 1);
    let rows = fleet.hub.node_table_at(fleet.now_us);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stream_sent, 1);
}

#[test]
fn fanout_respects_the_cadence() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    fleet.join(a);
    fleet.poll_nodes();

    fleet.tick_hub();
    fleet.tick_hub();
    assert_eq!(
        fleet.hub.health_at(fleet.now_us).stream_seq,
        1,
        "a second tick inside the period sends nothing"
    );

    fleet.advance_ms(10);
    fleet.tick_hub();
    assert_eq!(fleet.hub.health_at(fleet.now_us).stream_seq, 2);
    assert_eq!(fleet.node(a).control.loss_centi_pct(), 0);
}

#[test]
fn sequence_freezes_while_nobody_listens() {
    let mut fleet = FleetHarness::new();
    fleet.tick_hub();
    fleet.advance_ms(10);
    fleet.tick_hub();
    assert_eq!(
        fleet.hub.health_at(fleet.now_us).stream_seq,
        0,
        "no READY nodes, no frames, no sequence burn"
    );

    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    fleet.join(a);
    fleet.advance_ms(10);
    fleet.tick_hub();
    assert_eq!(fleet.hub.health_at(fleet.now_us).stream_seq, 1);
}

#[test]
fn stream_loss_demotes_and_a_clean_interval_promotes() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;
    fleet.poll_nodes();

    // seq 1 lands, seqs 2..=6 are lost on the datagram socket, seq 7
    // lands and exposes the gap.
    fleet.tick_hub();
    fleet.node_mut(a).drop_stream = 5;
    for _ in 0..6 {
        fleet.advance_ms(10);
        fleet.tick_hub();
    }
    assert_eq!(fleet.node(a).control.loss_centi_pct(), 7_142, "5 of 7 frames lost");

    // The next keepalive carries the bad interval and demotes.
    fleet.advance_ms(940);
    let mut batches = fleet.poll_nodes();
    assert_eq!(read_all::<DegradeEvent, _>(&mut batches), vec![node_id]);
    let record = fleet.hub.registry().get(node_id).unwrap();
    assert_eq!(record.state(), NodeLifecycle::Degraded);
    assert_eq!(record.metrics().loss_pct, 7_142);

    // Demoted nodes are not streamed to, so the next interval is clean
    // and the node talks itself back in.
    fleet.advance_ms(1_000);
    let mut batches = fleet.poll_nodes();
    assert_eq!(read_all::<ReadyEvent, _>(&mut batches), vec![node_id]);
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().state(),
        NodeLifecycle::Ready
    );

    // Streaming resumes with no phantom gap from the silent stretch.
    fleet.tick_hub();
    assert_eq!(fleet.node(a).control.loss_centi_pct(), 0);
}
