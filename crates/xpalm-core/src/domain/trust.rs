//! Per-address trust escalation.
//!
//! Every source IP that connects starts out `Unwarned`.  A declined PIN
//! challenge moves it to `Warned`; a second consecutive decline moves it to
//! `Blacklisted`, after which the address is refused without ever showing the
//! operator another prompt.  An accepted challenge clears a warning.
//!
//! ```text
//!             decline              decline
//! Unwarned ──────────────► Warned ──────────────► Blacklisted (terminal)
//!    ▲                        │
//!    └────────── accept ──────┘
//! ```
//!
//! The ledger is process-local and never persisted: a restart forgives
//! everyone.

use std::collections::HashMap;
use std::net::IpAddr;

/// Trust level of one source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustState {
    /// No failed challenge on record.
    #[default]
    Unwarned,
    /// One declined challenge; the next decline blacklists.
    Warned,
    /// Refused for the rest of the process lifetime.
    Blacklisted,
}

/// Whether a new connection from an address should be challenged at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeDecision {
    /// Show the operator a PIN prompt.
    Challenge,
    /// Close the connection immediately; the address is blacklisted.
    Refuse,
}

/// Result of recording a declined challenge.
///
/// Both variants mean the connection is closed; they differ in what happens
/// to the *next* connection from the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The address was unwarned and is now warned.
    Warned,
    /// The address was warned (or already blacklisted) and is now blacklisted.
    Blacklisted,
}

/// In-memory map of address → trust state.
///
/// Unwarned addresses are not stored; only warned and blacklisted entries
/// occupy space.
#[derive(Debug, Default)]
pub struct TrustLedger {
    entries: HashMap<IpAddr, TrustState>,
}

impl TrustLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state of `addr`.
    pub fn state(&self, addr: IpAddr) -> TrustState {
        self.entries.get(&addr).copied().unwrap_or_default()
    }

    /// Decides whether a connection from `addr` gets a PIN challenge.
    pub fn check(&self, addr: IpAddr) -> ChallengeDecision {
        match self.state(addr) {
            TrustState::Blacklisted => ChallengeDecision::Refuse,
            TrustState::Unwarned | TrustState::Warned => ChallengeDecision::Challenge,
        }
    }

    /// Records an accepted challenge: a warning is cleared.
    ///
    /// Blacklisted addresses are never challenged, so an accept can only
    /// arrive for one through a race; the blacklist still wins.
    pub fn on_accepted(&mut self, addr: IpAddr) {
        if self.state(addr) == TrustState::Warned {
            self.entries.remove(&addr);
        }
    }

    /// Records a declined challenge and escalates the address one level.
    pub fn on_rejected(&mut self, addr: IpAddr) -> Escalation {
        match self.state(addr) {
            TrustState::Unwarned => {
                self.entries.insert(addr, TrustState::Warned);
                Escalation::Warned
            }
            TrustState::Warned | TrustState::Blacklisted => {
                self.entries.insert(addr, TrustState::Blacklisted);
                Escalation::Blacklisted
            }
        }
    }

    /// Number of addresses currently blacklisted.
    pub fn blacklisted_count(&self) -> usize {
        self.entries
            .values()
            .filter(|s| **s == TrustState::Blacklisted)
            .count()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
