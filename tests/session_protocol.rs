//! Wire-level session tests: framed messages in, JSON events out
//!
//! Exercises the full control/audio protocol against the session handler,
//! checking the exact JSON shapes a practice UI would see.

use pulsecheck::pipeline::events::OutboundEvent;
use pulsecheck::session::protocol::{MSG_AUDIO, MSG_CONTROL};
use pulsecheck::session::SessionHandler;
use serde_json::Value;

const SAMPLE_RATE: u32 = 44100;

fn control_frame(json: &str) -> Vec<u8> {
    let mut frame = vec![MSG_CONTROL];
    frame.extend_from_slice(json.as_bytes());
    frame
}

fn audio_frame(samples: &[f32]) -> Vec<u8> {
    let mut frame = vec![MSG_AUDIO];
    for sample in samples {
        frame.extend_from_slice(&sample.to_le_bytes());
    }
    frame
}

fn to_json(events: &[OutboundEvent]) -> Vec<Value> {
    events
        .iter()
        .map(|e| serde_json::to_value(e).expect("event serializes"))
        .collect()
}

/// Click train starting at 0.5s with the given period
fn click_signal(duration_s: f64, period_s: f64, clicks: usize) -> Vec<f32> {
    let mut signal = vec![0.0f32; (duration_s * SAMPLE_RATE as f64) as usize];
    for k in 0..clicks {
        let start = ((0.5 + period_s * k as f64) * SAMPLE_RATE as f64) as usize;
        for i in 0..1024 {
            if start + i < signal.len() {
                let t = i as f32 / SAMPLE_RATE as f32;
                signal[start + i] += 0.8
                    * (-(i as f32) / 64.0).exp()
                    * (2.0 * std::f32::consts::PI * 3500.0 * t).sin();
            }
        }
    }
    signal
}

#[test]
fn metronome_session_over_the_wire() {
    let mut session = SessionHandler::new();

    let turn = session.handle_frame(&control_frame(r#"{"type": "start", "grid": "8th"}"#));
    assert_eq!(to_json(&turn.events)[0]["type"], "started");

    let signal = click_signal(6.0, 0.5, 10);
    let mut events = Vec::new();
    for chunk in signal.chunks(4096) {
        let turn = session.handle_frame(&audio_frame(chunk));
        assert!(!turn.finished);
        events.extend(turn.events);
    }

    let json = to_json(&events);
    let clicks: Vec<&Value> = json.iter().filter(|e| e["type"] == "click_detected").collect();
    assert_eq!(clicks.len(), 10);
    for click in &clicks {
        assert!(click["time"].is_f64());
        assert!(click["click_count"].is_u64());
        assert!(click["total_onsets"].is_u64());
    }

    let grid: Vec<&Value> = json.iter().filter(|e| e["type"] == "grid_established").collect();
    assert_eq!(grid.len(), 1);
    let bpm = grid[0]["bpm"].as_f64().unwrap();
    assert!((bpm - 120.0).abs() < 0.5, "grid_established bpm {bpm}");
    assert!(grid[0]["reference_time"].is_f64());

    // Stop: exactly one session_report, then the session is over
    let turn = session.handle_frame(&control_frame(r#"{"type": "stop"}"#));
    assert!(turn.finished);
    let report = &to_json(&turn.events)[0];
    assert_eq!(report["type"], "session_report");
    assert_eq!(report["error"], "No guitar notes detected");
}

#[test]
fn full_session_report_shape() {
    let mut session = SessionHandler::new();
    session.handle_frame(&control_frame(r#"{"type": "start"}"#));

    // Clicks at 100 BPM plus off-beat notes once the grid is up
    let period = 0.6;
    let mut signal = click_signal(9.0, period, 14);
    for k in 0..8 {
        let start =
            ((0.5 + period * 4.5 + period * k as f64) * SAMPLE_RATE as f64) as usize;
        for i in 0..4410 {
            if start + i < signal.len() {
                let t = i as f32 / SAMPLE_RATE as f32;
                signal[start + i] += 0.6
                    * (-(i as f32) / 2205.0).exp()
                    * (2.0 * std::f32::consts::PI * 220.0 * t).sin();
            }
        }
    }

    let mut saw_note = false;
    for chunk in signal.chunks(4096) {
        let turn = session.handle_frame(&audio_frame(chunk));
        for event in to_json(&turn.events) {
            if event["type"] == "note_event" {
                saw_note = true;
                assert!(event["time"].is_f64());
                assert!(event["deviation_ms"].is_number());
                assert!(event["bar"].is_i64());
                assert!(event["beat_position"].is_number());
                assert!(event["is_on_time"].is_boolean());
            }
        }
    }
    assert!(saw_note, "off-beat notes must stream note_event frames");

    let turn = session.handle_frame(&control_frame(r#"{"type": "stop"}"#));
    assert!(turn.finished);
    let report = &to_json(&turn.events)[0];

    assert_eq!(report["type"], "session_report");
    assert!(report.get("error").is_none(), "report: {report}");
    assert_eq!(report["grid_resolution"], "8th");
    let bpm = report["bpm"].as_f64().unwrap();
    assert!((bpm - 100.0).abs() < 0.5);
    assert!(report["total_bars"].as_i64().unwrap() >= 2);
    assert!(report["events"].as_array().unwrap().len() >= 8);
    assert!(!report["click_times"].as_array().unwrap().is_empty());

    let stats = &report["stats"];
    for field in [
        "total_notes",
        "mean_absolute_deviation_ms",
        "mean_signed_deviation_ms",
        "std_deviation_ms",
        "median_deviation_ms",
        "worst_deviation_ms",
        "worst_deviation_position",
        "accuracy_percent",
    ] {
        assert!(stats.get(field).is_some(), "stats missing {field}: {stats}");
    }
    assert_eq!(stats["accuracy_percent"], 100.0);

    let met = &report["metronome_stats"];
    assert!(met["total_clicks"].as_u64().unwrap() >= 10);
    assert!(met["expected_interval_ms"].is_number());
    assert!(met["jitter_ms"].is_number());
    assert!(met["drift_ms_per_beat"].is_number());

    // Report events carry the reserved pitch field, unset
    let first_event = &report["events"][0];
    assert_eq!(first_event["event_type"], "note");
    assert_eq!(first_event["pitch"], Value::Null);
}

#[test]
fn calibration_round_trip_over_the_wire() {
    let mut session = SessionHandler::new();

    let turn = session.handle_frame(&control_frame(r#"{"type": "calibrate", "step": "metronome"}"#));
    let started = &to_json(&turn.events)[0];
    assert_eq!(started["type"], "calibration_started");
    assert_eq!(started["step"], "metronome");

    let signal = click_signal(3.0, 0.5, 5);
    for chunk in signal.chunks(4096) {
        let turn = session.handle_frame(&audio_frame(chunk));
        assert!(
            turn.events.is_empty(),
            "calibration audio produces no events"
        );
    }

    let turn = session.handle_frame(&control_frame(r#"{"type": "stop_calibration"}"#));
    let result = &to_json(&turn.events)[0];
    assert_eq!(result["type"], "calibration_result");
    assert_eq!(result["step"], "metronome");

    let profile = &result["profile"];
    assert!(profile["onset_count"].as_u64().unwrap() >= 3);
    assert_eq!(profile["mfcc_mean"].as_array().unwrap().len(), 13);
    assert!(profile["energy_decay"].as_f64().unwrap() < 0.3);
    assert!(profile["spectral_centroid"].as_f64().unwrap() > 0.0);
}

/// A misaligned audio payload is dropped silently: no events, no state
/// change, and the session continues normally afterwards.
#[test]
fn misaligned_audio_payload_is_ignored() {
    let mut session = SessionHandler::new();
    session.handle_frame(&control_frame(r#"{"type": "start"}"#));

    let mut bad_frame = vec![MSG_AUDIO];
    bad_frame.extend_from_slice(&[1, 2, 3, 4, 5]);
    let turn = session.handle_frame(&bad_frame);
    assert!(turn.events.is_empty());
    assert!(!turn.finished);

    // The session still works: aligned audio and stop behave as usual
    let signal = click_signal(4.0, 0.5, 6);
    let mut events = Vec::new();
    for chunk in signal.chunks(4096) {
        events.extend(session.handle_frame(&audio_frame(chunk)).events);
    }
    assert!(to_json(&events).iter().any(|e| e["type"] == "grid_established"));

    let turn = session.handle_frame(&control_frame(r#"{"type": "stop"}"#));
    assert!(turn.finished);
    assert_eq!(turn.events.len(), 1);
}

#[test]
fn stop_without_start_reports_no_active_session() {
    let mut session = SessionHandler::new();
    let turn = session.handle_frame(&control_frame(r#"{"type": "stop"}"#));
    assert!(turn.finished);
    let report = &to_json(&turn.events)[0];
    assert_eq!(report["type"], "session_report");
    assert_eq!(report["error"], "No active session");
}
