//! Integration tests for Controller

mod common;
use common::*;

use sternenhimmel::{
    BRG_MAX, BRG_OFF, CHAIN_COUNT, Calibration, Controller, DARK_TABLE, Millis, PlayerState,
    RX_TIMEOUT_MS, Sequence,
};

type TestController<'t> = Controller<
    't,
    Millis,
    MockTimeSource,
    RecordingDriver,
    MemoryCalibrationStore,
    RecordingTransport,
>;

fn boot(timer: &MockTimeSource, calibrations: MemoryCalibrationStore) -> TestController<'_> {
    let mut controller = Controller::new(
        timer,
        RecordingDriver::new(),
        calibrations,
        RecordingTransport::new(),
    );
    controller.initialize();
    controller
}

/// Sends one NUL-terminated request, runs one tick and returns the response.
fn request(controller: &mut TestController<'_>, json: &str) -> String {
    let sent_before = controller.transport().sent.len();
    controller.data_received(format!("{}\0", json).as_bytes());
    controller.run();
    assert_eq!(controller.transport().sent.len(), sent_before + 1, "no response to {}", json);
    controller.transport().last_response().unwrap().to_string()
}

fn ok(rid: i32) -> String {
    format!("{{\"rid\":{},\"status\":0,\"msg\":\"OK\"}}", rid)
}

fn failed(rid: i32, msg: &str) -> String {
    format!("{{\"rid\":{},\"status\":-1,\"msg\":\"{}\"}}", rid, msg)
}

const SHOW: &str = r#"{"rid":10,"cmd":"play_show","groups":[[[1,1],[1,2]],[[60,12]]],"sequence":[[0,0,0,0,100,1,0],[1,0,0,0,100,1,0]]}"#;

// ============================================================================
// Boot
// ============================================================================

#[test]
fn initialize_without_calibration_uses_defaults() {
    let timer = MockTimeSource::new();
    let controller = boot(&timer, MemoryCalibrationStore::new());

    assert_eq!(controller.calibration_name(), "default");
    assert_eq!(controller.store().idle_table(), &DARK_TABLE);
    assert_eq!(
        controller.store().driver().committed_chains(),
        (0..CHAIN_COUNT).collect::<Vec<_>>()
    );
    assert!(controller.player().is_idle());
}

#[test]
fn initialize_applies_stored_calibration() {
    let timer = MockTimeSource::new();
    let mut table = DARK_TABLE;
    table[0][0][0] = 30;
    table[5][9][11] = 70;
    let stored = Calibration::new("evening", &table).unwrap();

    let controller = boot(&timer, MemoryCalibrationStore::with(&stored));

    assert_eq!(controller.calibration_name(), "evening");
    assert_eq!(controller.store().idle(led(0, 0, 0)), 30);
    assert_eq!(controller.store().active(led(5, 9, 11)), 70);
    let (_, frame) = controller.store().driver().commits[5];
    assert_ne!(frame[9][11], 0);
}

#[test]
fn initialize_falls_back_on_corrupt_or_failing_storage() {
    let timer = MockTimeSource::new();

    let corrupt = MemoryCalibrationStore::with_blob(&[0, 3, 0, 1, 2, 3, 0xDE, 0xAD, 0xBE, 0xEF]);
    let controller = boot(&timer, corrupt);
    assert_eq!(controller.calibration_name(), "default");
    assert_eq!(controller.store().idle_table(), &DARK_TABLE);

    let failing = MemoryCalibrationStore {
        fail: true,
        ..MemoryCalibrationStore::default()
    };
    let controller = boot(&timer, failing);
    assert_eq!(controller.calibration_name(), "default");
    assert_eq!(controller.store().driver().commits.len(), CHAIN_COUNT);
}

#[test]
fn initialize_rejects_out_of_range_calibration() {
    let timer = MockTimeSource::new();
    let mut table = DARK_TABLE;
    table[0][0][0] = 200;
    let bogus = Calibration::new("bogus", &table).unwrap();

    // Through the checked blob format.
    let controller = boot(&timer, MemoryCalibrationStore::with(&bogus));
    assert_eq!(controller.calibration_name(), "default");
    assert_eq!(controller.store().idle_table(), &DARK_TABLE);

    // Straight from a store that skips the blob checks.
    let controller = boot(&timer, MemoryCalibrationStore::unchecked(bogus));
    assert_eq!(controller.calibration_name(), "default");
    assert_eq!(controller.store().idle_table(), &DARK_TABLE);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_OFF);
    assert_eq!(controller.store().driver().commits.len(), CHAIN_COUNT);
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn get_version_reports_crate_version() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    let response = request(&mut controller, r#"{"rid":1,"cmd":"get_version"}"#);
    assert_eq!(
        response,
        format!(
            "{{\"rid\":1,\"status\":0,\"msg\":\"OK\",\"version\":\"v{}\"}}",
            env!("CARGO_PKG_VERSION")
        )
    );
}

#[test]
fn get_calibration_name_reports_default() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    let response = request(&mut controller, r#"{"rid":2,"cmd":"get_calibration_name"}"#);
    assert_eq!(response, r#"{"rid":2,"status":0,"msg":"OK","name":"default"}"#);
}

#[test]
fn save_calibration_persists_idle_table_under_name() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    request(&mut controller, r#"{"rid":1,"cmd":"set_brightness","leds":[[1,1,40]]}"#);
    let response = request(&mut controller, r#"{"rid":3,"cmd":"save_calibration","name":"evening"}"#);
    assert_eq!(response, ok(3));

    let stored = controller.calibrations().stored().unwrap();
    assert_eq!(stored.name.as_str(), "evening");
    assert_eq!(stored.idle[0][0][0], 40);
    assert_eq!(controller.calibration_name(), "evening");

    let response = request(&mut controller, r#"{"rid":4,"cmd":"get_calibration_name"}"#);
    assert_eq!(response, r#"{"rid":4,"status":0,"msg":"OK","name":"evening"}"#);
}

#[test]
fn save_calibration_rejects_missing_or_long_names() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    let response = request(&mut controller, r#"{"rid":3,"cmd":"save_calibration"}"#);
    assert_eq!(response, failed(3, "Missing key 'name'"));

    let response = request(
        &mut controller,
        r#"{"rid":4,"cmd":"save_calibration","name":"this name is much too long for the slot"}"#,
    );
    assert!(response.starts_with(r#"{"rid":4,"status":-1"#));
    assert_eq!(controller.calibrations().saves, 0);
    assert_eq!(controller.calibration_name(), "default");
}

#[test]
fn set_brightness_writes_idle_and_active_when_no_show_runs() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());
    let commits_before = controller.store().driver().commits.len();

    let response = request(
        &mut controller,
        r#"{"rid":4,"cmd":"set_brightness","leds":[[1,1,50],[60,12,100]]}"#,
    );
    assert_eq!(response, ok(4));

    let store = controller.store();
    assert_eq!(store.idle(led(0, 0, 0)), 50);
    assert_eq!(store.active(led(0, 0, 0)), 50);
    assert_eq!(store.idle(led(5, 9, 11)), BRG_MAX);
    assert_eq!(store.active(led(5, 9, 11)), BRG_MAX);

    // Only the touched chains are flushed.
    let flushed: Vec<usize> = store.driver().commits[commits_before..]
        .iter()
        .map(|(chain, _)| *chain)
        .collect();
    assert_eq!(flushed, vec![0, 5]);
}

#[test]
fn set_brightness_validates_every_entry_first() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    for (rid, leds) in [
        (1, "[[1,1,50],[61,1,10]]"),
        (2, "[[1,1,50],[1,13,10]]"),
        (3, "[[1,1,50],[1,2,101]]"),
        (4, "[[1,1,50],[1,2]]"),
        (5, "[[0,1,50]]"),
        (6, "[]"),
    ] {
        let json = format!("{{\"rid\":{},\"cmd\":\"set_brightness\",\"leds\":{}}}", rid, leds);
        let response = request(&mut controller, &json);
        assert!(
            response.starts_with(&format!("{{\"rid\":{},\"status\":-1", rid)),
            "{} accepted: {}",
            leds,
            response
        );
    }

    assert_eq!(controller.store().idle(led(0, 0, 0)), BRG_OFF);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_OFF);

    let response = request(&mut controller, r#"{"rid":7,"cmd":"set_brightness"}"#);
    assert_eq!(response, failed(7, "Missing key 'leds'"));
}

#[test]
fn get_brightness_reports_idle_values() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    request(
        &mut controller,
        r#"{"rid":1,"cmd":"set_brightness","leds":[[1,1,50],[60,12,100]]}"#,
    );
    let response = request(
        &mut controller,
        r#"{"rid":5,"cmd":"get_brightness","leds":[[1,1],[60,12],[2,3]]}"#,
    );
    assert_eq!(
        response,
        r#"{"rid":5,"status":0,"msg":"OK","leds":[[1,1,50],[60,12,100],[2,3,0]]}"#
    );

    let response = request(&mut controller, r#"{"rid":6,"cmd":"get_brightness","leds":[[61,1]]}"#);
    assert!(response.starts_with(r#"{"rid":6,"status":-1"#));
}

#[test]
fn delete_calibration_resets_to_dark_defaults() {
    let timer = MockTimeSource::new();
    let mut table = DARK_TABLE;
    table[0][0][0] = 30;
    let stored = Calibration::new("evening", &table).unwrap();
    let mut controller = boot(&timer, MemoryCalibrationStore::with(&stored));
    assert_eq!(controller.store().active(led(0, 0, 0)), 30);

    request(&mut controller, SHOW);
    assert!(!controller.player().is_idle());

    let response = request(&mut controller, r#"{"rid":8,"cmd":"delete_calibration"}"#);
    assert_eq!(response, ok(8));

    assert!(controller.calibrations().stored().is_none());
    assert_eq!(controller.calibration_name(), "default");
    assert_eq!(controller.store().idle_table(), &DARK_TABLE);
    assert!(controller.player().is_idle());
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_OFF);
}

#[test]
fn play_show_builds_groups_and_starts_playing() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    let response = request(&mut controller, SHOW);
    assert_eq!(response, ok(10));

    assert_eq!(controller.show().len(), 2);
    assert_eq!(controller.show().group(1), Some(&[led(5, 9, 11)][..]));
    // The same tick already set up the first pulse.
    assert_eq!(controller.player().state(), PlayerState::Pulse);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_MAX);
    assert_eq!(controller.store().active(led(0, 0, 1)), BRG_MAX);
    assert_eq!(controller.store().active(led(5, 9, 11)), BRG_OFF);

    for _ in 0..250 {
        timer.advance(1);
        controller.run();
    }
    assert!(controller.player().is_idle());
    assert_eq!(controller.store().active(led(5, 9, 11)), BRG_MAX);
}

#[test]
fn play_show_while_running_needs_force() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());
    request(&mut controller, SHOW);

    let response = request(&mut controller, SHOW);
    assert_eq!(response, failed(10, "Show already running"));
    assert_eq!(controller.player().current_step(), Some(0));

    let forced = r#"{"rid":11,"cmd":"play_show","force":1,"groups":[[[2,1]]],"sequence":[[0,0,0,0,100,1,0]]}"#;
    let response = request(&mut controller, forced);
    assert_eq!(response, ok(11));
    assert_eq!(controller.show().len(), 1);
    // The aborted show's LEDs are back at idle.
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_OFF);
    assert_eq!(controller.store().active(led(0, 1, 0)), BRG_MAX);
}

#[test]
fn invalid_show_leaves_running_show_alone() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());
    request(&mut controller, SHOW);

    for (rid, body) in [
        (20, r#""groups":[[[61,1]]],"sequence":[[0,0,0,0,10,1,0]]"#),
        (21, r#""groups":[[[1,1]]],"sequence":[[1,0,0,0,10,1,0]]"#),
        (22, r#""groups":[[[1,1]]],"sequence":[[0,0,0,0,10,0,0]]"#),
        (23, r#""groups":[[]],"sequence":[[0,0,0,0,10,1,0]]"#),
        (24, r#""groups":[[[1,1]]],"sequence":[]"#),
        (25, r#""sequence":[[0,0,0,0,10,1,0]]"#),
    ] {
        let json = format!("{{\"rid\":{},\"cmd\":\"play_show\",\"force\":1,{}}}", rid, body);
        let response = request(&mut controller, &json);
        assert!(
            response.starts_with(&format!("{{\"rid\":{},\"status\":-1", rid)),
            "{} accepted: {}",
            body,
            response
        );
    }

    assert_eq!(controller.show().len(), 2);
    assert_eq!(controller.player().state(), PlayerState::Pulse);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_MAX);
}

#[test]
fn stop_show_restores_idle_brightness() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());
    request(&mut controller, r#"{"rid":1,"cmd":"set_brightness","leds":[[1,1,25]]}"#);
    request(&mut controller, SHOW);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_MAX);

    let response = request(&mut controller, r#"{"rid":12,"cmd":"stop_show"}"#);
    assert_eq!(response, ok(12));
    assert!(controller.player().is_idle());
    assert_eq!(controller.store().active(led(0, 0, 0)), 25);

    // Stopping again is harmless.
    assert_eq!(request(&mut controller, r#"{"rid":13,"cmd":"stop_show"}"#), ok(13));
}

#[test]
fn set_brightness_during_show_only_updates_idle_of_show_leds() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());
    request(&mut controller, SHOW);

    let response = request(&mut controller, r#"{"rid":14,"cmd":"set_brightness","leds":[[1,1,25]]}"#);
    assert_eq!(response, ok(14));
    assert_eq!(controller.store().idle(led(0, 0, 0)), 25);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_MAX);

    request(&mut controller, r#"{"rid":15,"cmd":"stop_show"}"#);
    assert_eq!(controller.store().active(led(0, 0, 0)), 25);
}

#[test]
fn set_brightness_during_show_applies_to_leds_outside_it() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());
    let show = r#"{"rid":1,"cmd":"play_show","groups":[[[1,1]]],"sequence":[[0,0,0,0,50,1,0]]}"#;
    request(&mut controller, show);
    let commits_before = controller.store().driver().commits.len();

    let response = request(&mut controller, r#"{"rid":2,"cmd":"set_brightness","leds":[[60,12,40]]}"#);
    assert_eq!(response, ok(2));
    assert!(!controller.player().is_idle());
    assert_eq!(controller.store().idle(led(5, 9, 11)), 40);
    assert_eq!(controller.store().active(led(5, 9, 11)), 40);
    assert!(controller.store().driver().commits[commits_before..]
        .iter()
        .any(|(chain, frame)| *chain == 5 && frame[9][11] != 0));

    for _ in 0..200 {
        timer.advance(1);
        controller.run();
    }
    assert!(controller.player().is_idle());
    assert_eq!(controller.store().active(led(5, 9, 11)), 40);
    assert_eq!(controller.store().active(led(0, 0, 0)), BRG_MAX);
}

// ============================================================================
// Framing and malformed requests
// ============================================================================

#[test]
fn malformed_requests_get_error_responses() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    let response = request(&mut controller, r#"{"rid":7,"cmd":"reboot"}"#);
    assert_eq!(response, failed(7, "Unknown 'cmd': 'reboot'"));

    let response = request(&mut controller, r#"{"cmd":"get_version"}"#);
    assert_eq!(response, failed(-1, "Missing key 'rid'"));

    let response = request(&mut controller, r#"{"rid":8}"#);
    assert_eq!(response, failed(8, "Missing key 'cmd'"));

    let response = request(&mut controller, r#"{"rid":0,"cmd":"invalid_json""#);
    assert!(response.starts_with(r#"{"rid":-1,"status":-1,"msg":"Deserialize JSON string failed"#));
}

#[test]
fn chunked_request_is_reassembled() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    controller.data_received(br#"{"rid":30,"#);
    controller.run();
    timer.advance(10);
    controller.data_received(br#""cmd":"stop_"#);
    controller.run();
    assert!(controller.transport().sent.is_empty());

    controller.data_received(b"show\"}\0");
    controller.run();
    assert_eq!(controller.transport().last_response(), Some(ok(30).as_str()));
}

#[test]
fn unterminated_request_times_out() {
    let timer = MockTimeSource::new();
    let mut controller = boot(&timer, MemoryCalibrationStore::new());

    controller.data_received(br#"{"rid":0,"cmd":"invalid_frame"}"#);
    timer.advance(RX_TIMEOUT_MS - 1);
    controller.run();
    timer.advance(1);
    controller.run();
    assert!(controller.transport().sent.is_empty());

    // The stale bytes are gone; the next request parses cleanly.
    let response = request(&mut controller, r#"{"rid":31,"cmd":"stop_show"}"#);
    assert_eq!(response, ok(31));
}
