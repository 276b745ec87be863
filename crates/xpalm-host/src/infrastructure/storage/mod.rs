//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory and supplies defaults when the file or any
//! of its keys are missing.

pub mod config;
