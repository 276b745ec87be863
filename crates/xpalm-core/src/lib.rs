//! # xpalm-core
//!
//! Shared library for the xPalm host containing the domain model and the
//! phone-facing wire protocol.
//!
//! It has zero dependencies on OS APIs, virtual-device drivers, or network
//! sockets, so everything in here can be unit-tested on any platform.
//!
//! # Architecture overview
//!
//! xPalm turns a phone into a game controller for a PC on the same network.
//! The phone finds the PC with a multicast probe, opens a WebSocket, waits
//! for the operator to accept its PIN, and then streams button, stick and
//! trigger events which the PC replays on a virtual gamepad.
//!
//! - **`domain`** – Pure rules: the per-address trust ledger (warn, then
//!   blacklist), the gamepad report model with its button bit layout, and the
//!   edge detector that turns motor levels into vibration on/off notices.
//!
//! - **`protocol`** – How messages travel: the JSON text frames exchanged with
//!   the phone and the plain-text discovery datagrams.

pub mod domain;
pub mod protocol;

pub use domain::connection::ConnectionId;
pub use domain::feedback::{FeedbackEdge, FeedbackNotification, MotorLevels};
pub use domain::gamepad::{ButtonId, GamepadState, InputEvent, Side};
pub use domain::trust::{ChallengeDecision, Escalation, TrustLedger, TrustState};
pub use protocol::codec::{decode_client_message, encode_server_message, ProtocolError};
pub use protocol::messages::{ClientMessage, ServerMessage};
