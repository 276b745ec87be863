//! Infrastructure layer for the host.
//!
//! Contains the OS-facing adapters: virtual gamepad backends, the UDP
//! discovery responder and WebSocket server, the operator console, and the
//! TOML configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `xpalm_core`, but MUST NOT be imported by the `application` layer outside
//! of tests.
//!
//! # Sub-modules
//!
//! - **`gamepad`**  – Implementations of `GamepadBackend`: a simulated backend,
//!   a Linux uinput backend, and a recording mock for tests.
//! - **`network`**  – Multicast discovery responder and the WebSocket accept
//!   loop that runs one task per phone.
//! - **`operator`** – Console challenge prompt and the notifier that surfaces
//!   running/connected/disconnected notices.
//! - **`storage`**  – Configuration loading from the platform config directory.

pub mod gamepad;
pub mod network;
pub mod operator;
pub mod storage;
