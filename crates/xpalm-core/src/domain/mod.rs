//! Domain entities for xPalm.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no sockets, no threads, no device drivers.  Code in the host
//! crate wraps these types in locks and drives them from async tasks, but the
//! rules themselves live here so they can be tested in isolation.

pub mod connection;
pub mod feedback;
pub mod gamepad;
pub mod trust;
