//! JSON message types for the phone-facing WebSocket protocol.
//!
//! Every frame is a JSON object whose `"type"` field names the message.  The
//! short type names (`K`, `J`, `T`, `PI`, `PO`, `v`) keep the high-rate input
//! frames small; the companion app sends dozens of stick updates per second.
//!
//! ```json
//! {"type":"K","pressed":true,"key":4096}
//! {"type":"J","isRight":false,"x":0.25,"y":-1.0}
//! {"type":"T","isRight":true,"value":0.5}
//! {"type":"reset"}
//! {"type":"PI"}
//! ```
//!
//! The host replies with `authorized` once, `v` on vibration changes and `PO`
//! for every `PI`.

use serde::{Deserialize, Serialize};

use crate::domain::gamepad::{ButtonId, InputEvent, Side, UnknownButton};

// ── Phone → host ──────────────────────────────────────────────────────────────

/// All messages the phone can send once connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Button press or release.
    #[serde(rename = "K")]
    Key {
        pressed: bool,
        /// XUSB button bit, see [`ButtonId`].
        key: u16,
    },

    /// Stick position.
    #[serde(rename = "J")]
    Joystick {
        #[serde(rename = "isRight")]
        is_right: bool,
        x: f32,
        y: f32,
    },

    /// Trigger pressure.
    #[serde(rename = "T")]
    Trigger {
        #[serde(rename = "isRight")]
        is_right: bool,
        value: f32,
    },

    /// Release everything and centre the sticks.
    #[serde(rename = "reset")]
    Reset,

    /// Liveness probe.
    #[serde(rename = "PI")]
    Ping,
}

impl TryFrom<ClientMessage> for InputEvent {
    type Error = UnknownButton;

    fn try_from(msg: ClientMessage) -> Result<Self, Self::Error> {
        Ok(match msg {
            ClientMessage::Key { pressed, key } => InputEvent::Key {
                pressed,
                button: ButtonId::try_from(key)?,
            },
            ClientMessage::Joystick { is_right, x, y } => InputEvent::Axis {
                side: Side::from_is_right(is_right),
                x,
                y,
            },
            ClientMessage::Trigger { is_right, value } => InputEvent::Trigger {
                side: Side::from_is_right(is_right),
                value,
            },
            ClientMessage::Reset => InputEvent::Reset,
            ClientMessage::Ping => InputEvent::Ping,
        })
    }
}

// ── Host → phone ──────────────────────────────────────────────────────────────

/// All messages the host sends to the phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The operator accepted the PIN; input may now flow.
    #[serde(rename = "authorized")]
    Authorized,

    /// Vibration switched on or off.
    #[serde(rename = "v")]
    Vibration { value: bool },

    /// Reply to [`ClientMessage::Ping`].
    #[serde(rename = "PO")]
    Pong,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
