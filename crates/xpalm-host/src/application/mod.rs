//! Application layer use cases for the host.
//!
//! Everything here depends on traits rather than concrete devices, sockets or
//! terminals, so the whole authorization and relay pipeline can be exercised
//! in tests with a recording gamepad and a scripted operator.
//!
//! # Sub-modules
//!
//! - **`trust`**       – Shared per-address trust registry (warn, then
//!   blacklist).
//! - **`actuator`**    – The capability interface a virtual gamepad backend
//!   implements, and the per-session wrapper that commits after every change.
//! - **`sessions`**    – Connection id → live session table with atomic
//!   check-and-create and exactly-once teardown.
//! - **`authorize`**   – The connect handshake: PIN challenge, outcome, trust
//!   promotion and session creation.
//! - **`relay_input`** – Ordered dispatch of input events to a session's
//!   gamepad, and vibration feedback back to the phone.

pub mod actuator;
pub mod authorize;
pub mod relay_input;
pub mod sessions;
pub mod trust;
