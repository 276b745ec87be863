//! xPalm host: entry point.
//!
//! Lets phones running the xPalm app find this PC on the LAN and drive one
//! virtual gamepad each after the operator accepts their PIN.
//!
//! # Usage
//!
//! ```text
//! xpalm [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Config file [default: platform config dir]
//!   --bind <ADDR>                WebSocket bind address
//!   --port <PORT>                WebSocket port [default: 45784]
//!   --discovery-port <PORT>      Multicast discovery port [default: 45783]
//!   --no-discovery               Do not answer discovery probes
//!   --backend <simulated|uinput> Virtual gamepad backend
//!   --challenge-timeout <SECS>   Seconds to answer a PIN challenge [default: 30]
//! ```
//!
//! Every option can also be given as an `XPALM_*` environment variable; CLI
//! arguments win, then the environment, then the config file.
//!
//! # Architecture overview
//!
//! ```text
//! Phone app  (JSON over WebSocket, UDP multicast discovery)
//!       ↕
//! xpalm  ← this process
//!   application/     trust registry, session table, auth protocol, event relay
//!   infrastructure/
//!     network/       discovery responder, WebSocket server
//!     gamepad/       simulated and uinput backends
//!     operator/      console prompt, notices
//!     storage/       TOML config
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xpalm_host::application::authorize::{AuthProtocol, Notice, OperatorNotifier};
use xpalm_host::application::relay_input::EventRelay;
use xpalm_host::application::sessions::SessionTable;
use xpalm_host::application::trust::TrustRegistry;
use xpalm_host::infrastructure::gamepad::create_backend;
use xpalm_host::infrastructure::network::discovery::{
    start_discovery_responder, DiscoverySettings,
};
use xpalm_host::infrastructure::network::ws_server::{
    bind_listener, run_server, ServerContext, HANDSHAKE_TIMEOUT,
};
use xpalm_host::infrastructure::operator::{ConsolePrompt, LogNotifier};
use xpalm_host::infrastructure::storage::config::{
    load_config, load_config_from, resolve_host_name, AppConfig, BackendKind,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// xPalm host: use your phone as a game controller.
#[derive(Debug, Parser)]
#[command(name = "xpalm", about = "Turns phones on the LAN into virtual gamepads", version)]
struct Cli {
    /// Config file to read instead of the platform default.
    #[arg(long, env = "XPALM_CONFIG")]
    config: Option<PathBuf>,

    /// IP address the WebSocket server binds to.
    #[arg(long, env = "XPALM_BIND")]
    bind: Option<String>,

    /// WebSocket server port.
    #[arg(long, env = "XPALM_PORT")]
    port: Option<u16>,

    /// UDP port of the multicast discovery responder.
    #[arg(long, env = "XPALM_DISCOVERY_PORT")]
    discovery_port: Option<u16>,

    /// Do not answer discovery probes; phones must be pointed at this host.
    #[arg(long, env = "XPALM_NO_DISCOVERY")]
    no_discovery: bool,

    /// Virtual gamepad backend.
    #[arg(long, value_enum, env = "XPALM_BACKEND")]
    backend: Option<BackendKind>,

    /// Seconds the operator has to answer a PIN challenge.
    #[arg(
        long,
        env = "XPALM_CHALLENGE_TIMEOUT",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    challenge_timeout: Option<u64>,
}

impl Cli {
    /// Loads the config file and applies CLI overrides on top.
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(self, config: &mut AppConfig) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(port) = self.discovery_port {
            config.discovery.port = port;
        }
        if self.no_discovery {
            config.discovery.enabled = false;
        }
        if let Some(backend) = self.backend {
            config.gamepad.backend = backend;
        }
        if let Some(secs) = self.challenge_timeout {
            config.auth.challenge_timeout_secs = secs;
        }
    }
}

fn listen_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address: '{}:{}'",
                config.server.bind_address, config.server.port
            )
        })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let addr = listen_addr(&config)?;
    let host_name = resolve_host_name(config.server.host_name.as_deref());
    info!(
        "xPalm host \"{host_name}\" starting: ws={addr}, backend={:?}, challenge timeout={}s",
        config.gamepad.backend, config.auth.challenge_timeout_secs
    );

    // ── Shared services ───────────────────────────────────────────────────────
    let backend = create_backend(config.gamepad.backend, config.gamepad.feedback_loopback)
        .context("failed to initialise gamepad backend")?;
    let sessions = Arc::new(SessionTable::new(backend));
    let notifier: Arc<dyn OperatorNotifier> = Arc::new(LogNotifier);
    let auth = Arc::new(AuthProtocol::new(
        Arc::new(TrustRegistry::new()),
        Arc::clone(&sessions),
        Arc::new(ConsolePrompt::stdio()),
        Arc::clone(&notifier),
        config.auth.challenge_timeout(),
    ));
    let ctx = Arc::new(ServerContext {
        sessions: Arc::clone(&sessions),
        auth,
        relay: Arc::new(EventRelay::new(Arc::clone(&sessions))),
        notifier: Arc::clone(&notifier),
        handshake_timeout: HANDSHAKE_TIMEOUT,
    });

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let listener = bind_listener(addr).await?;

    // Discovery failure is not fatal: phones can still connect by address.
    let discovery = if config.discovery.enabled {
        let settings = DiscoverySettings {
            group: config.discovery.multicast_group,
            port: config.discovery.port,
            interface: config.discovery.interface,
            host_name,
        };
        match start_discovery_responder(settings, Arc::clone(&running)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("discovery disabled: {e}");
                None
            }
        }
    } else {
        info!("discovery disabled by configuration");
        None
    };

    notifier.notify(Notice::Running);
    run_server(listener, Arc::clone(&ctx), Arc::clone(&running)).await?;

    running.store(false, Ordering::Relaxed);
    let disposed = ctx.disconnect_all().await;
    if disposed > 0 {
        info!("unplugged {disposed} gamepad(s)");
    }
    if let Some(handle) = discovery {
        let _ = tokio::task::spawn_blocking(move || handle.join()).await;
    }

    info!("xPalm host stopped");
    // A pending stdin read in the console prompt would block runtime shutdown.
    std::process::exit(0);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
