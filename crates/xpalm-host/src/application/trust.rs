//! Shared trust registry.
//!
//! Wraps the pure [`TrustLedger`] in a single registry-wide async mutex, so
//! every transition is an atomic read-modify-write.  Two phones from the same
//! address declining at the same moment cannot both observe `Warned` and skip
//! the blacklist.

use std::net::IpAddr;

use tokio::sync::Mutex;
use tracing::{info, warn};
use xpalm_core::{ChallengeDecision, Escalation, TrustLedger, TrustState};

/// Process-wide address → trust state store.
#[derive(Debug, Default)]
pub struct TrustRegistry {
    ledger: Mutex<TrustLedger>,
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether a connection from `addr` should be challenged.
    pub async fn check(&self, addr: IpAddr) -> ChallengeDecision {
        self.ledger.lock().await.check(addr)
    }

    /// Records an accepted challenge.
    pub async fn on_accepted(&self, addr: IpAddr) {
        let mut ledger = self.ledger.lock().await;
        if ledger.state(addr) == TrustState::Warned {
            info!("{addr}: warning cleared after accepted challenge");
        }
        ledger.on_accepted(addr);
    }

    /// Records a declined challenge and returns the resulting escalation.
    pub async fn on_rejected(&self, addr: IpAddr) -> Escalation {
        let escalation = self.ledger.lock().await.on_rejected(addr);
        match escalation {
            Escalation::Warned => warn!("{addr}: challenge declined, address warned"),
            Escalation::Blacklisted => {
                warn!("{addr}: challenge declined again, address blacklisted")
            }
        }
        escalation
    }

    /// Number of addresses refused without a challenge.
    pub async fn blacklisted_count(&self) -> usize {
        self.ledger.lock().await.blacklisted_count()
    }

    /// Current state of `addr`.
    pub async fn state(&self, addr: IpAddr) -> TrustState {
        self.ledger.lock().await.state(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_racing_rejections_from_warned_address_blacklist_exactly_once() {
        // Arrange: address already warned.
        let registry = Arc::new(TrustRegistry::new());
        let addr: IpAddr = "192.168.0.77".parse().unwrap();
        registry.on_rejected(addr).await;

        // Act: many concurrent declines.
        let mut handles = Vec::new();
        for _ in 0..16 {
            let r = Arc::clone(&registry);
            handles.push(tokio::spawn(async move { r.on_rejected(addr).await }));
        }
        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }

        // Assert: every racer sees the blacklist, none sees a second warning.
        assert!(outcomes.iter().all(|e| *e == Escalation::Blacklisted));
        assert_eq!(registry.state(addr).await, TrustState::Blacklisted);
        assert_eq!(registry.check(addr).await, ChallengeDecision::Refuse);
        assert_eq!(registry.blacklisted_count().await, 1);
    }

    #[tokio::test]
    async fn test_racing_first_rejections_warn_once_then_blacklist() {
        let registry = Arc::new(TrustRegistry::new());
        let addr: IpAddr = "192.168.0.78".parse().unwrap();

        let a = {
            let r = Arc::clone(&registry);
            tokio::spawn(async move { r.on_rejected(addr).await })
        };
        let b = {
            let r = Arc::clone(&registry);
            tokio::spawn(async move { r.on_rejected(addr).await })
        };
        let mut outcomes = vec![a.await.unwrap(), b.await.unwrap()];
        outcomes.sort_by_key(|e| matches!(e, Escalation::Blacklisted));

        // Exactly one warning and one blacklist, in whichever order they ran.
        assert_eq!(outcomes, vec![Escalation::Warned, Escalation::Blacklisted]);
    }
}
