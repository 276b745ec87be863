//! Discovery datagram format.
//!
//! Discovery is plain text over UDP multicast.  The phone sends a probe that
//! starts with [`PROBE_PREFIX`]; every host running xPalm answers on the same
//! group with [`ANNOUNCE_PREFIX`] followed by its host name.  The phone reads
//! the host's address from the datagram source.
//!
//! ```text
//! phone → group:  xpalm::client[...anything]
//! host  → group:  xpalm::server::DESKTOP-1234
//! ```

use std::net::Ipv4Addr;

/// Multicast group both sides join.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 3, 29, 115);

/// UDP port for discovery traffic.
pub const DISCOVERY_PORT: u16 = 45783;

/// TCP port the WebSocket server listens on.
pub const CONTROL_PORT: u16 = 45784;

/// Marker at the start of every phone probe.
pub const PROBE_PREFIX: &[u8] = b"xpalm::client";

/// Marker at the start of every host announcement.
pub const ANNOUNCE_PREFIX: &str = "xpalm::server::";

/// `true` if the datagram is a discovery probe.
pub fn is_probe(datagram: &[u8]) -> bool {
    datagram.starts_with(PROBE_PREFIX)
}

/// Builds the announcement datagram for `host_name`.
pub fn announcement(host_name: &str) -> Vec<u8> {
    format!("{ANNOUNCE_PREFIX}{host_name}").into_bytes()
}

/// Extracts the host name from an announcement, if the datagram is one.
pub fn parse_announcement(datagram: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(datagram).ok()?;
    text.strip_prefix(ANNOUNCE_PREFIX).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_matches_prefix_with_suffix() {
        assert!(is_probe(b"xpalm::client"));
        assert!(is_probe(b"xpalm::client::pixel-8"));
    }

    #[test]
    fn test_other_datagrams_are_not_probes() {
        assert!(!is_probe(b"xpalm::server::desk"));
        assert!(!is_probe(b"hello"));
        assert!(!is_probe(b""));
    }

    #[test]
    fn test_announcement_carries_host_name() {
        let bytes = announcement("DESKTOP-42");
        assert_eq!(bytes, b"xpalm::server::DESKTOP-42");
        assert_eq!(parse_announcement(&bytes).as_deref(), Some("DESKTOP-42"));
    }

    #[test]
    fn test_own_announcement_is_not_a_probe() {
        // The host receives its own multicast reply; it must not answer it.
        assert!(!is_probe(&announcement("desk")));
    }
}
