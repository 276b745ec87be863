//! Text-frame codec for the phone protocol.
//!
//! Decoding goes straight from a WebSocket text frame to a domain
//! [`InputEvent`]; encoding produces the JSON text for a [`ServerMessage`].

use thiserror::Error;
use tracing::trace;

use crate::domain::gamepad::{InputEvent, UnknownButton};
use crate::protocol::messages::{ClientMessage, ServerMessage};

/// Errors produced while decoding a frame from the phone.
///
/// A bad frame is dropped; it never closes the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known message.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A key event named a button that does not exist.
    #[error(transparent)]
    UnknownButton(#[from] UnknownButton),
}

/// Decodes one text frame into an input event.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for invalid JSON or an unknown
/// `type`, and [`ProtocolError::UnknownButton`] for an unmapped key code.
pub fn decode_client_message(text: &str) -> Result<InputEvent, ProtocolError> {
    let msg: ClientMessage = serde_json::from_str(text)?;
    let event = InputEvent::try_from(msg)?;
    trace!(?event, "decoded client frame");
    Ok(event)
}

/// Encodes a host message as a JSON text frame.
pub fn encode_server_message(msg: &ServerMessage) -> String {
    // Every variant is a plain tagged object with bool fields; serialization
    // cannot fail.
    match serde_json::to_string(msg) {
        Ok(s) => s,
        Err(_) => String::from("{}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gamepad::{ButtonId, Side};

    #[test]
    fn test_decode_key_press() {
        let event = decode_client_message(r#"{"type":"K","pressed":false,"key":16384}"#).unwrap();
        assert_eq!(
            event,
            InputEvent::Key { pressed: false, button: ButtonId::X }
        );
    }

    #[test]
    fn test_decode_right_stick() {
        let event = decode_client_message(r#"{"type":"J","isRight":true,"x":-1,"y":1}"#).unwrap();
        assert_eq!(event, InputEvent::Axis { side: Side::Right, x: -1.0, y: 1.0 });
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        let err = decode_client_message("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_field_is_malformed() {
        let err = decode_client_message(r#"{"type":"T","isRight":true}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_unknown_button() {
        let err = decode_client_message(r#"{"type":"K","pressed":true,"key":3}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownButton(UnknownButton(3))));
    }

    #[test]
    fn test_encode_pong() {
        assert_eq!(encode_server_message(&ServerMessage::Pong), r#"{"type":"PO"}"#);
    }
}
