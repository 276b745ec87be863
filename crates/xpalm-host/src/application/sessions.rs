//! Connection table and session lifecycle.
//!
//! Every WebSocket connection gets a slot as soon as it is accepted
//! ([`SessionTable::open`]).  The slot is upgraded to a live [`Session`] only
//! after the operator accepts the challenge ([`SessionTable::create`]), and is
//! removed exactly once when the connection goes away
//! ([`SessionTable::remove`]).
//!
//! Both the check-and-create and the take-and-teardown happen while the table
//! lock is held, so a challenge that resolves after its connection has closed
//! finds no slot and cannot leave an orphaned virtual gamepad behind.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use xpalm_core::{ConnectionId, ServerMessage};

use super::actuator::{
    Actuator, ActuatorError, ActuatorHandle, FeedbackReceiver, FeedbackSink, GamepadBackend,
};

/// Outbound frame queue for one connection.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Error type for session table operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already exists for connection {0}")]
    AlreadyExists(ConnectionId),
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("no session for connection {0}")]
    NotFound(ConnectionId),
    #[error("could not plug in gamepad: {0}")]
    Actuator(#[from] ActuatorError),
}

/// A live, authorized connection and the gamepad it drives.
#[derive(Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub source: IpAddr,
    pub actuator: ActuatorHandle,
    pub outbox: Outbox,
}

enum Slot {
    /// Connected, not (yet) authorized.
    Pending,
    Active(Session),
}

/// Connection id → slot map, backed by one virtual gamepad backend.
pub struct SessionTable {
    backend: Arc<dyn GamepadBackend>,
    slots: Mutex<HashMap<ConnectionId, Slot>>,
}

impl SessionTable {
    pub fn new(backend: Arc<dyn GamepadBackend>) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a freshly accepted connection.
    pub async fn open(&self, connection_id: ConnectionId) {
        self.slots
            .lock()
            .await
            .entry(connection_id)
            .or_insert(Slot::Pending);
        debug!("connection {connection_id} opened");
    }

    /// Plugs in a gamepad for an authorized connection.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectionClosed`] if the connection was never opened
    ///   or has already been removed.
    /// - [`SessionError::AlreadyExists`] if a session is already live.
    /// - [`SessionError::Actuator`] if the backend could not create a device.
    pub async fn create(
        &self,
        connection_id: ConnectionId,
        source: IpAddr,
        outbox: Outbox,
    ) -> Result<(ActuatorHandle, FeedbackReceiver), SessionError> {
        let mut slots = self.slots.lock().await;
        match slots.get(&connection_id) {
            None => return Err(SessionError::ConnectionClosed(connection_id)),
            Some(Slot::Active(_)) => return Err(SessionError::AlreadyExists(connection_id)),
            Some(Slot::Pending) => {}
        }

        let (sink, feedback) = FeedbackSink::channel();
        let device = self.backend.plug_in(sink)?;
        let actuator: ActuatorHandle = Arc::new(Mutex::new(Actuator::new(device)));

        slots.insert(
            connection_id,
            Slot::Active(Session {
                connection_id,
                source,
                actuator: Arc::clone(&actuator),
                outbox,
            }),
        );
        info!(
            "session {connection_id} created for {source} ({} backend)",
            self.backend.name()
        );
        Ok((actuator, feedback))
    }

    /// Returns the gamepad of an authorized connection.
    pub async fn get(&self, connection_id: ConnectionId) -> Result<ActuatorHandle, SessionError> {
        self.session(connection_id)
            .await
            .map(|s| s.actuator)
    }

    /// Returns a snapshot of the whole session record.
    pub async fn session(&self, connection_id: ConnectionId) -> Result<Session, SessionError> {
        match self.slots.lock().await.get(&connection_id) {
            Some(Slot::Active(session)) => Ok(session.clone()),
            _ => Err(SessionError::NotFound(connection_id)),
        }
    }

    /// Closes the connection slot and tears down its gamepad, if any.
    ///
    /// Returns `true` only for the call that actually reset and disposed a
    /// device; repeated or concurrent calls return `false`.
    pub async fn remove(&self, connection_id: ConnectionId) -> bool {
        self.teardown(connection_id).await.is_some()
    }

    /// Removes every connection, tearing down each live gamepad.
    ///
    /// Returns the source address of every session whose gamepad was
    /// disposed.
    pub async fn close_all(&self) -> Vec<IpAddr> {
        let ids: Vec<ConnectionId> = self.slots.lock().await.keys().copied().collect();
        let mut disposed = Vec::new();
        for id in ids {
            disposed.extend(self.teardown(id).await);
        }
        disposed
    }

    async fn teardown(&self, connection_id: ConnectionId) -> Option<IpAddr> {
        let slot = self.slots.lock().await.remove(&connection_id);
        let Some(Slot::Active(session)) = slot else {
            debug!("connection {connection_id} closed without a session");
            return None;
        };
        // Waits for any in-flight dispatch holding the actuator.
        if !session.actuator.lock().await.shutdown() {
            return None;
        }
        info!("session {connection_id} from {} removed", session.source);
        Some(session.source)
    }

    /// `true` while the connection is open, authorized or not.
    pub async fn is_open(&self, connection_id: ConnectionId) -> bool {
        self.slots.lock().await.contains_key(&connection_id)
    }

    /// Number of authorized sessions.
    pub async fn active_count(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|s| matches!(s, Slot::Active(_)))
            .count()
    }
}
