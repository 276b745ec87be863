//! TOML configuration for the host.
//!
//! Read from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\xPalm\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/xpalm/config.toml` (or `~/.config/xpalm/...`)
//! - macOS:    `~/Library/Application Support/xPalm/config.toml`
//!
//! Example:
//!
//! ```toml
//! [server]
//! port = 45784
//! host_name = "living-room-pc"
//!
//! [auth]
//! challenge_timeout_secs = 20
//!
//! [gamepad]
//! backend = "uinput"
//! ```
//!
//! Every section and field is optional; anything missing takes its default,
//! and a missing file is the same as an empty one.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xpalm_core::protocol::discovery::{CONTROL_PORT, DISCOVERY_PORT, MULTICAST_GROUP};

use crate::application::authorize::DEFAULT_CHALLENGE_TIMEOUT;

/// Name announced when nothing better is known.
pub const FALLBACK_HOST_NAME: &str = "xpalm-host";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub gamepad: GamepadConfig,
}

/// WebSocket listener and process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// Name announced to phones; falls back to the OS host name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LAN discovery responder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Local interface used to join the group; `0.0.0.0` lets the OS pick.
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,
}

/// PIN challenge settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Seconds the operator has to answer before the challenge counts as
    /// declined.
    #[serde(default = "default_challenge_timeout_secs")]
    pub challenge_timeout_secs: u64,
}

impl AuthConfig {
    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }
}

impl AppConfig {
    /// Checks values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero challenge timeout, which
    /// would decline, and eventually blacklist, every phone unasked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.challenge_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "auth.challenge_timeout_secs",
                reason: "must be at least 1 second",
            });
        }
        Ok(())
    }
}

/// Virtual gamepad backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GamepadConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Echo trigger pressure back to the phone as vibration.
    #[serde(default)]
    pub feedback_loopback: bool,
}

/// Which virtual gamepad implementation to drive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Log reports only.
    #[default]
    Simulated,
    /// Linux `/dev/uinput` virtual gamepad.
    Uinput,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port() -> u16 {
    CONTROL_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_multicast_group() -> Ipv4Addr {
    MULTICAST_GROUP
}
fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}
fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}
fn default_challenge_timeout_secs() -> u64 {
    DEFAULT_CHALLENGE_TIMEOUT.as_secs()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_control_port(),
            host_name: None,
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            multicast_group: default_multicast_group(),
            port: default_discovery_port(),
            interface: default_interface(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_timeout_secs: default_challenge_timeout_secs(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config: AppConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Name to announce in discovery replies.
///
/// Order: configured name, then `HOSTNAME`, then `COMPUTERNAME`, then
/// [`FALLBACK_HOST_NAME`].
pub fn resolve_host_name(configured: Option<&str>) -> String {
    pick_host_name(
        configured,
        std::env::var("HOSTNAME").ok(),
        std::env::var("COMPUTERNAME").ok(),
    )
}

fn pick_host_name(
    configured: Option<&str>,
    hostname: Option<String>,
    computername: Option<String>,
) -> String {
    configured
        .map(str::to_string)
        .into_iter()
        .chain(hostname)
        .chain(computername)
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOST_NAME.to_string())
}

/// Resolves the platform config directory including the `xPalm` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("xPalm"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("xpalm"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("xPalm")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
