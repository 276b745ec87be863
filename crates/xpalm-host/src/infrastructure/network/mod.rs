//! Network infrastructure for the host.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Answers `xpalm::client` multicast probes with this
//!   host's name so phones on the LAN can list it.
//!
//! - **`ws_server`** – Accepts phone WebSocket connections, runs the PIN
//!   challenge and relays input frames to the session's gamepad.

pub mod discovery;
pub mod ws_server;
