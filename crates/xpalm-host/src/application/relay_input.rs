//! EventRelay: applies a phone's input events to its gamepad.
//!
//! The connection task calls [`EventRelay::dispatch`] once per decoded frame
//! and awaits it before reading the next one, so events from one phone reach
//! the device in arrival order.  Different phones have different actuators and
//! never wait on each other beyond the brief session table lookup.
//!
//! Feedback flows the other way through [`EventRelay::forward_feedback`],
//! which runs as its own task per session and ends when the gamepad is
//! disposed.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};
use xpalm_core::{ConnectionId, InputEvent, ServerMessage, Side};

use super::actuator::{ActuatorError, FeedbackReceiver};
use super::sessions::SessionTable;

/// Error type for event dispatch.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No authorized session, or it was torn down while the event was queued.
    /// The event is dropped.
    #[error("no authorized session for connection {0}")]
    UnknownSession(ConnectionId),
    /// The backend refused the update.
    #[error("gamepad update failed: {0}")]
    Actuator(ActuatorError),
}

/// Routes input events to session gamepads and feedback back to phones.
pub struct EventRelay {
    sessions: Arc<SessionTable>,
}

impl EventRelay {
    pub fn new(sessions: Arc<SessionTable>) -> Self {
        Self { sessions }
    }

    /// Applies one event to the session's gamepad.
    ///
    /// # Errors
    ///
    /// - [`RelayError::UnknownSession`] if `connection_id` has no live session.
    /// - [`RelayError::Actuator`] if the backend rejected the commit.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        event: InputEvent,
    ) -> Result<(), RelayError> {
        let session = self
            .sessions
            .session(connection_id)
            .await
            .map_err(|_| RelayError::UnknownSession(connection_id))?;

        if event == InputEvent::Ping {
            trace!("{connection_id}: ping");
            // The outbox only closes once the socket is gone.
            let _ = session.outbox.send(ServerMessage::Pong);
            return Ok(());
        }

        let mut actuator = session.actuator.lock().await;
        let result = match event {
            InputEvent::Key {
                pressed: true,
                button,
            } => actuator.press(button),
            InputEvent::Key {
                pressed: false,
                button,
            } => actuator.release(button),
            InputEvent::Axis {
                side: Side::Left,
                x,
                y,
            } => actuator.left_stick(x, y),
            InputEvent::Axis {
                side: Side::Right,
                x,
                y,
            } => actuator.right_stick(x, y),
            InputEvent::Trigger {
                side: Side::Left,
                value,
            } => actuator.left_trigger(value),
            InputEvent::Trigger {
                side: Side::Right,
                value,
            } => actuator.right_trigger(value),
            InputEvent::Reset => {
                debug!("{connection_id}: reset to neutral");
                actuator.reset()
            }
            InputEvent::Ping => Ok(()),
        };

        result.map_err(|e| match e {
            ActuatorError::Disposed => RelayError::UnknownSession(connection_id),
            other => RelayError::Actuator(other),
        })
    }

    /// Forwards vibration edges to the session's phone until the gamepad is
    /// disposed.  Returns the number of notifications sent.
    pub async fn forward_feedback(
        &self,
        connection_id: ConnectionId,
        mut feedback: FeedbackReceiver,
    ) -> usize {
        let outbox = match self.sessions.session(connection_id).await {
            Ok(session) => session.outbox,
            Err(_) => return 0,
        };

        let mut forwarded = 0;
        while let Some(notification) = feedback.recv().await {
            let msg = ServerMessage::Vibration {
                value: notification.vibrating,
            };
            if outbox.send(msg).is_err() {
                break;
            }
            forwarded += 1;
        }
        debug!("{connection_id}: feedback stream closed after {forwarded} notifications");
        forwarded
    }
}
