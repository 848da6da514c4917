//! Firmware update sessions end to end: command delivery and phase
//! reporting, conclusion on rejoin by firmware-version compare, the
//! single-session rule, the error path, and the deadline force-fail.

use lumen_hub::{JoinEvent, OtaError, OtaOutcome, UpdateOutcomeEvent};
use lumen_shared::{NodeId, OtaManifest, OtaPhase, OTA_DEADLINE_MS};
use lumen_test::{read_all, FleetHarness, NODE_FW};

fn manifest(version: &str) -> OtaManifest {
    OtaManifest {
        url: format!("http://hub.local/fw/{}.bin", version),
        version: version.to_string(),
        size: 1_048_576,
    }
}

fn report(fleet: &mut FleetHarness, index: usize, phase: OtaPhase) {
    let node_now = fleet.node_now(index);
    let message = fleet
        .node_mut(index)
        .control
        .report_ota(phase, None, node_now)
        .unwrap();
    fleet.send_from(index, &message);
    fleet.settle();
}

#[test]
fn update_concludes_when_the_node_rejoins_on_the_new_firmware() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();

    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet
        .hub
        .begin_update_at(node_id, manifest("2.5.0"), fleet.now_us)
        .unwrap();
    fleet.settle();

    assert_eq!(fleet.node(a).control.ota_phase(), OtaPhase::Downloading);
    assert_eq!(
        fleet.node(a).control.ota_manifest().unwrap().version,
        "2.5.0"
    );
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().ota_phase(),
        OtaPhase::Downloading,
        "the ack keepalive-style status lands before any polling"
    );
    assert!(fleet.hub.health_at(fleet.now_us).update_active);

    report(&mut fleet, a, OtaPhase::Verifying);
    report(&mut fleet, a, OtaPhase::Applying);
    report(&mut fleet, a, OtaPhase::Rebooting);
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().ota_phase(),
        OtaPhase::Rebooting
    );

    fleet.go_dark(a);
    fleet.advance_ms(2_000);
    let mut batches = fleet.reboot_node(a, "2.5.0");

    let outcomes = read_all::<UpdateOutcomeEvent, _>(&mut batches);
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        OtaOutcome::Succeeded {
            node_id: done,
            version,
        } => {
            assert_eq!(*done, node_id);
            assert_eq!(version, "2.5.0");
        }
        other => panic!("expected success, got {:?}", other),
    }
    let record = fleet.hub.registry().get(node_id).unwrap();
    assert_eq!(record.fw(), "2.5.0");
    assert_eq!(record.ota_phase(), OtaPhase::Idle);
    assert!(!fleet.hub.health_at(fleet.now_us).update_active);
}

#[test]
fn rejoining_on_the_old_firmware_fails_the_session() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet
        .hub
        .begin_update_at(node_id, manifest("2.5.0"), fleet.now_us)
        .unwrap();
    fleet.settle();
    report(&mut fleet, a, OtaPhase::Rebooting);

    fleet.go_dark(a);
    fleet.advance_ms(2_000);
    let mut batches = fleet.reboot_node(a, NODE_FW);

    let outcomes = read_all::<UpdateOutcomeEvent, _>(&mut batches);
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        OtaOutcome::Failed { node_id: done, reason } => {
            assert_eq!(*done, node_id);
            assert!(reason.contains("rejoined on fw"), "reason: {}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!fleet.hub.health_at(fleet.now_us).update_active);
}

#[test]
fn one_session_fleet_wide() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let b = fleet.add_node("AA:BB:CC:00:00:02", 0);
    let mut batches = fleet.join(a);
    let a_id = read_all::<JoinEvent, _>(&mut batches)[0].0;
    let mut batches = fleet.join(b);
    let b_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet
        .hub
        .begin_update_at(a_id, manifest("2.5.0"), fleet.now_us)
        .unwrap();

    let refused = fleet
        .hub
        .begin_update_at(b_id, manifest("2.5.0"), fleet.now_us);
    match refused {
        Err(OtaError::SessionActive { active }) => assert_eq!(active, a_id),
        other => panic!("expected the active session to block, got {:?}", other),
    }
}

#[test]
fn node_reported_error_concludes_the_session() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet
        .hub
        .begin_update_at(node_id, manifest("2.5.0"), fleet.now_us)
        .unwrap();
    fleet.settle();

    let node_now = fleet.node_now(a);
    let message = fleet
        .node_mut(a)
        .control
        .report_ota(OtaPhase::Error, Some("flash verify failed".to_string()), node_now)
        .unwrap();
    fleet.send_from(a, &message);
    let mut batches = fleet.settle();

    let outcomes = read_all::<UpdateOutcomeEvent, _>(&mut batches);
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        OtaOutcome::Failed { reason, .. } => assert_eq!(reason, "flash verify failed"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(
        fleet.node(a).control.ota_manifest().is_none(),
        "the node abandons the manifest it could not apply"
    );
    assert!(!fleet.hub.health_at(fleet.now_us).update_active);
}

#[test]
fn blown_deadline_force_fails() {
    let mut fleet = FleetHarness::new();
    let a = fleet.add_node("AA:BB:CC:00:00:01", 0);
    let mut batches = fleet.join(a);
    let node_id = read_all::<JoinEvent, _>(&mut batches)[0].0;

    fleet
        .hub
        .begin_update_at(node_id, manifest("2.5.0"), fleet.now_us)
        .unwrap();
    fleet.settle();

    fleet.advance_ms(OTA_DEADLINE_MS - 1);
    let mut batches = fleet.tick_hub();
    assert!(read_all::<UpdateOutcomeEvent, _>(&mut batches).is_empty());

    fleet.advance_ms(1);
    let mut batches = fleet.tick_hub();
    let outcomes = read_all::<UpdateOutcomeEvent, _>(&mut batches);
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        OtaOutcome::Failed { reason, .. } => assert_eq!(reason, "deadline exceeded"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(
        fleet.hub.registry().get(node_id).unwrap().ota_phase(),
        OtaPhase::Error
    );
}

#[test]
fn unknown_target_is_refused() {
    let mut fleet = FleetHarness::new();
    let err = fleet
        .hub
        .begin_update_at(NodeId::new(42), manifest("2.5.0"), fleet.now_us)
        .unwrap_err();
    assert!(matches!(err, OtaError::Registry(_)));
}
