//! Integration tests for the phone protocol as the companion app speaks it.
//!
//! These replay a short, realistic burst of frames through the public codec
//! and apply the resulting events to a [`GamepadState`], checking that the
//! cumulative report matches what the phone intended.

use xpalm_core::protocol::codec::{decode_client_message, encode_server_message};
use xpalm_core::protocol::discovery::{announcement, is_probe, parse_announcement};
use xpalm_core::{ButtonId, GamepadState, InputEvent, ServerMessage, Side};

fn apply(state: &mut GamepadState, event: InputEvent) {
    match event {
        InputEvent::Key { pressed: true, button } => state.press(button),
        InputEvent::Key { pressed: false, button } => state.release(button),
        InputEvent::Axis { side, x, y } => state.set_stick(side, x, y),
        InputEvent::Trigger { side, value } => state.set_trigger(side, value),
        InputEvent::Reset => state.reset(),
        InputEvent::Ping => {}
    }
}

#[test]
fn test_frame_burst_builds_expected_report() {
    // Arrange: A down, left stick full right, right trigger half, B down, A up.
    let frames = [
        r#"{"type":"K","pressed":true,"key":4096}"#,
        r#"{"type":"J","isRight":false,"x":1.0,"y":0.0}"#,
        r#"{"type":"T","isRight":true,"value":0.5}"#,
        r#"{"type":"PI"}"#,
        r#"{"type":"K","pressed":true,"key":8192}"#,
        r#"{"type":"K","pressed":false,"key":4096}"#,
    ];
    let mut state = GamepadState::neutral();

    // Act
    for frame in frames {
        let event = decode_client_message(frame).expect("frame must decode");
        apply(&mut state, event);
    }

    // Assert
    assert!(!state.is_pressed(ButtonId::A));
    assert!(state.is_pressed(ButtonId::B));
    assert_eq!(state.thumb_lx, i16::MAX);
    assert_eq!(state.thumb_ly, 0);
    assert_eq!(state.right_trigger, 128);
    assert_eq!(state.left_trigger, 0);
}

#[test]
fn test_reset_frame_neutralizes_everything() {
    let mut state = GamepadState::neutral();
    for frame in [
        r#"{"type":"K","pressed":true,"key":16}"#,
        r#"{"type":"J","isRight":true,"x":-0.5,"y":0.5}"#,
        r#"{"type":"reset"}"#,
    ] {
        apply(&mut state, decode_client_message(frame).unwrap());
    }
    assert!(state.is_neutral());
}

#[test]
fn test_stick_side_follows_is_right_flag() {
    let event = decode_client_message(r#"{"type":"J","isRight":false,"x":0.1,"y":0.2}"#).unwrap();
    assert!(matches!(event, InputEvent::Axis { side: Side::Left, .. }));
}

#[test]
fn test_every_button_code_decodes() {
    for button in ButtonId::ALL {
        let frame = format!(r#"{{"type":"K","pressed":true,"key":{}}}"#, button.bit());
        let event = decode_client_message(&frame).unwrap();
        assert_eq!(event, InputEvent::Key { pressed: true, button });
    }
}

#[test]
fn test_server_frames_are_parseable_json() {
    for msg in [
        ServerMessage::Authorized,
        ServerMessage::Vibration { value: false },
        ServerMessage::Pong,
    ] {
        let text = encode_server_message(&msg);
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}

#[test]
fn test_discovery_exchange() {
    let probe = b"xpalm::client";
    assert!(is_probe(probe));
    let reply = announcement("living-room-pc");
    assert_eq!(parse_announcement(&reply).as_deref(), Some("living-room-pc"));
}
