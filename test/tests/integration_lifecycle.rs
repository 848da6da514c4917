//! End-to-end lifecycle coverage: join handshake, promotion through
//! the keepalive kick, silence detection, erasure after the grace
//! window, rejoin identity, and the fleet capacity cap. Everything
//! runs through the hub's transport seam against scripted nodes.

use lumen_hub::{
    AuthEvent, EraseEvent, ErrorEvent, HubConfig, HubError, JoinEvent, LostEvent, ReadyEvent,
    RegistryError,
};
use lumen_shared::{
    Hello, HelloCaps, HelloTopo, NodeLifecycle, NodeMessage, KEEPALIVE_TIMEOUT_MS, LOST_GRACE_MS,
    PROTO_VERSION,
};
use lumen_test::{read_all, FleetHarness, NODE_FW};

#[test]
fn join_promotes_through_auth_to_ready() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);

    let mut batches = fleet.join(a);

    let joins = read_all::<JoinEvent, _>(&mut batches);
    assert_eq!(joins.len(), 1);
    let (node_id, mac, rejoined) = joins[0];
    assert!(!rejoined, "first contact is not a rejoin");
    assert_eq!(mac.to_string(), "AA:BB:CC:00:00:01");

    assert_eq!(read_all::<AuthEvent, _>(&mut batches), vec![node_id]);
    assert_eq!(
        read_all::<ReadyEvent, _>(&mut batches),
        vec![node_id],
        "the welcome's keepalive kick promotes without waiting a period"
    );

    let record = fleet.hub.registry().get(node_id).unwrap();
    assert_eq!(record.state(), NodeLifecycle::Ready);
    assert_ne!(record.token_hash(), 0);

    assert!(fleet.node(a).control.is_joined());
    assert_eq!(fleet.node(a).control.node_id(), Some(node_id));

    let health = fleet.hub.health_at(fleet.now_us);
    assert_eq!(health.nodes, 1);
    assert_eq!(health.ready, 1);
    assert_eq!(health.pending, 0);
}

#[test]
fn keepalives_hold_a_node_ready_across_ticks() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    // Ten keepalive periods with a maintenance tick each: never lost.
    for _ in 0..10 {
        fleet.advance_ms(1_000);
        let mut batches = fleet.poll_nodes();
        batches.extend(fleet.tick_hub());
        assert!(read_all::<LostEvent, _>(&mut batches).is_empty());
    }
    let record = fleet.hub.registry().get(node_id).unwrap();
    assert_eq!(record.state(), NodeLifecycle::Ready);
    assert!(record.keepalive_count() >= 10);
}

#[test]
fn silent_node_is_lost_then_erased() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet.go_dark(a);

    // Exactly the timeout has not yet crossed it.
    fleet.advance_ms(KEEPALIVE_TIMEOUT_MS);
    let mut batches = fleet.tick_hub();
    assert!(read_all::<LostEvent, _>(&mut batches).is_empty());
    fleet.advance_us(1);
    let mut batches = fleet.tick_hub();
    assert_eq!(read_all::<LostEvent, _>(&mut batches), vec![node_id]);
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().state(),
        NodeLifecycle::Lost
    );

    // Same shape for the grace window.
    fleet.advance_ms(LOST_GRACE_MS);
    let mut batches = fleet.tick_hub();
    assert!(read_all::<EraseEvent, _>(&mut batches).is_empty());
    fleet.advance_us(1);
    let mut batches = fleet.tick_hub();
    let erased = read_all::<EraseEvent, _>(&mut batches);
    assert_eq!(erased.len(), 1);
    assert_eq!(erased[0].0, node_id);
    assert!(fleet.hub.registry().get(node_id).is_none());
    assert_eq!(fleet.hub.health_at(fleet.now_us).nodes, 0);
}

#[test]
fn rejoin_inside_grace_keeps_the_node_id() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet.go_dark(a);
    fleet.advance_ms(KEEPALIVE_TIMEOUT_MS + 1);
    fleet.tick_hub();
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().token_hash(),
        0,
        "a lost node keeps no usable session token"
    );

    fleet.advance_ms(5_000);
    let mut batches = fleet.reboot_node(a, NODE_FW);

    let joins = read_all::<JoinEvent, _>(&mut batches);
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].0, node_id, "identity survives the outage");
    assert!(joins[0].2, "second contact from the same address rejoins");

    let record = fleet.hub.registry().get(node_id).unwrap();
    assert_eq!(record.state(), NodeLifecycle::Ready);
    assert_ne!(record.token_hash(), 0, "rejoin issues a fresh token");
}

#[test]
fn closed_control_channel_marks_the_node_lost() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    let mut batches = fleet.drop_connection(a);
    assert_eq!(read_all::<LostEvent, _>(&mut batches), vec![node_id]);
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().state(),
        NodeLifecycle::Lost
    );
}

#[test]
fn fleet_capacity_is_enforced() {
    let mut fleet = FleetHarness::with_config(HubConfig {
        capacity: 2,
        ..HubConfig::default()
    });
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let b = fleet.add_node("AA:BB:CC:00:00:02", 0);
    let c = fleet.add_node("AA:BB:CC:00:00:03", 0);
    fleet.join(a);
    fleet.join(b);

    let mut batches = fleet.join(c);

    assert!(read_all::<JoinEvent, _>(&mut batches).is_empty());
    assert!(!fleet.node(c).control.is_joined());
    assert_eq!(fleet.hub.registry().len(), 2);

    let errors = read_all::<ErrorEvent, _>(&mut batches);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        HubError::Registry(RegistryError::FleetFull { .. })
    ));
}

#[test]
fn protocol_mismatch_is_ignored() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);

    let hello = NodeMessage::Hello(Hello {
        mac: fleet.node(a).mac,
        fw: NODE_FW.to_string(),
        proto: PROTO_VERSION + 1,
        caps: HelloCaps {
            stream: true,
            ota: true,
            clock: true,
        },
        topo: HelloTopo {
            leds: 120,
            channels: 1,
        },
    });
    fleet.send_from(a, &hello);
    let mut batches = fleet.settle();

    assert!(read_all::<JoinEvent, _>(&mut batches).is_empty());
    assert!(fleet.hub.registry().is_empty());
    assert!(!fleet.node(a).control.is_joined());
}
