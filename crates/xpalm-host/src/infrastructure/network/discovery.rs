//! UDP multicast discovery responder.
//!
//! The phone app looks for hosts by sending `xpalm::client` to the multicast
//! group `224.3.29.115:45783`.  Every host joined to the group answers with
//! `xpalm::server::<host name>`, sent back to the group rather than to the
//! prober, and the phone lists each name it hears.  The phone then connects
//! to the sender's address on the WebSocket control port.
//!
//! The responder runs on a dedicated thread with a blocking socket so it never
//! occupies a Tokio worker.  The socket has a 500 ms read timeout; on each
//! timeout the `running` flag is checked so shutdown is prompt.  Any other
//! socket error ends the responder.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use xpalm_core::protocol::discovery::{announcement, is_probe, parse_announcement};

/// Error type for discovery responder startup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The multicast group could not be joined.
    #[error("failed to join multicast group {group} on {interface}: {source}")]
    JoinFailed {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },
    /// The responder thread could not be started.
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Where and as whom the responder answers.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub group: Ipv4Addr,
    pub port: u16,
    pub interface: Ipv4Addr,
    pub host_name: String,
}

/// Binds the discovery socket, joins the group and starts the responder
/// thread.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if the socket cannot be bound, the group cannot
/// be joined, or the thread cannot be spawned.
pub fn start_discovery_responder(
    settings: DiscoverySettings,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, DiscoveryError> {
    let addr = SocketAddr::V4(SocketAddrV4::new(settings.interface, settings.port));
    let socket =
        UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
    socket
        .join_multicast_v4(&settings.group, &settings.interface)
        .map_err(|source| DiscoveryError::JoinFailed {
            group: settings.group,
            interface: settings.interface,
            source,
        })?;
    // Our own announcements are not probes, but there is no reason to read them.
    socket.set_multicast_loop_v4(false).ok();
    socket.set_read_timeout(Some(Duration::from_millis(500))).ok();

    info!(
        "discovery responder listening on {addr}, group {}, announcing \"{}\"",
        settings.group, settings.host_name
    );

    std::thread::Builder::new()
        .name("xpalm-discovery".to_string())
        .spawn(move || discovery_loop(socket, settings, running))
        .map_err(DiscoveryError::Spawn)
}

fn discovery_loop(socket: UdpSocket, settings: DiscoverySettings, running: Arc<AtomicBool>) {
    let reply = announcement(&settings.host_name);
    let group = SocketAddr::V4(SocketAddrV4::new(settings.group, settings.port));
    let mut buf = [0u8; 1024];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!("discovery socket error, responder stopping: {e}");
                break;
            }
        };

        let datagram = &buf[..len];
        if let Some(name) = parse_announcement(datagram) {
            if name != settings.host_name {
                debug!("another xPalm host \"{name}\" is announcing from {src}");
            }
            continue;
        }
        if !should_answer(datagram, src.ip(), settings.interface) {
            continue;
        }
        debug!("discovery probe from {src}");
        if let Err(e) = socket.send_to(&reply, group) {
            warn!("discovery socket error, responder stopping: {e}");
            break;
        }
    }

    info!("discovery responder stopped");
}

/// A probe is answered unless it came from the interface we are bound to.
fn should_answer(datagram: &[u8], source: IpAddr, interface: Ipv4Addr) -> bool {
    is_probe(datagram) && source != IpAddr::V4(interface)
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_from_phone_is_answered() {
        let phone: IpAddr = "192.168.1.40".parse().unwrap();
        assert!(should_answer(b"xpalm::client", phone, Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_probe_from_own_interface_is_ignored() {
        let own = Ipv4Addr::new(192, 168, 1, 2);
        assert!(!should_answer(b"xpalm::client", IpAddr::V4(own), own));
    }

    #[test]
    fn test_other_datagrams_are_ignored() {
        let phone: IpAddr = "192.168.1.40".parse().unwrap();
        assert!(!should_answer(b"xpalm::server::desk", phone, Ipv4Addr::UNSPECIFIED));
        assert!(!should_answer(b"hello", phone, Ipv4Addr::UNSPECIFIED));
        assert!(!should_answer(b"", phone, Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_is_timeout_error_classification() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "t");
        let would_block = std::io::Error::new(std::io::ErrorKind::WouldBlock, "w");
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "r");

        assert!(is_timeout_error(&timed_out));
        assert!(is_timeout_error(&would_block));
        assert!(!is_timeout_error(&refused));
    }

    #[test]
    fn test_responder_stops_when_flag_cleared() {
        // Arrange: a free port.
        let probe = UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let running = Arc::new(AtomicBool::new(true));
        let settings = DiscoverySettings {
            group: xpalm_core::protocol::discovery::MULTICAST_GROUP,
            port,
            interface: Ipv4Addr::UNSPECIFIED,
            host_name: "test-host".to_string(),
        };

        // Act
        let result = start_discovery_responder(settings, Arc::clone(&running));

        // Assert: sandboxes without a multicast route refuse the join; that is
        // reported as an error rather than a panic.
        match result {
            Ok(handle) => {
                running.store(false, Ordering::Relaxed);
                handle.join().unwrap();
            }
            Err(e) => assert!(matches!(e, DiscoveryError::JoinFailed { .. })),
        }
    }
}
