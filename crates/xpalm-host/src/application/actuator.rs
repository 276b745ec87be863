//! Virtual gamepad capability interface.
//!
//! A backend ([`GamepadBackend`]) plugs in one device per authorized phone.
//! The device ([`GamepadDevice`]) only knows how to commit a full
//! [`GamepadState`] report and how to unplug itself; it does not flush on its
//! own.  [`Actuator`] owns the cumulative state and is the single place that
//! turns press/release/stick/trigger/reset into "mutate, then commit".
//!
//! Rumble flows the other way: the backend receives a [`FeedbackSink`] at
//! plug-in time and reports raw motor levels into it.  The sink filters them
//! down to on/off edges and sends those over a per-session channel.  When the
//! device is disposed the sink is dropped with it, which closes the channel
//! and ends whatever task was listening.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use xpalm_core::{ButtonId, FeedbackEdge, FeedbackNotification, GamepadState, MotorLevels, Side};

/// Error type for virtual gamepad operations.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// The backend failed to create or update the device.
    #[error("gamepad backend error: {0}")]
    Backend(String),
    /// The device has already been reset and disposed.
    #[error("gamepad already disposed")]
    Disposed,
}

/// Receiving end of a session's vibration notifications.
pub type FeedbackReceiver = mpsc::UnboundedReceiver<FeedbackNotification>;

/// Producer side of a session's feedback channel, handed to the device.
#[derive(Debug)]
pub struct FeedbackSink {
    edge: FeedbackEdge,
    tx: mpsc::UnboundedSender<FeedbackNotification>,
}

impl FeedbackSink {
    /// Creates a sink and the matching receiver.
    pub fn channel() -> (Self, FeedbackReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                edge: FeedbackEdge::new(),
                tx,
            },
            rx,
        )
    }

    /// Reports the device's current motor levels.
    ///
    /// Only transitions between "no force" and "some force" are forwarded.
    pub fn report(&mut self, levels: MotorLevels) {
        if let Some(notification) = self.edge.observe(levels) {
            // The receiver goes away when the session is torn down; a late
            // report from the device is simply dropped.
            let _ = self.tx.send(notification);
        }
    }
}

/// One plugged-in virtual controller.
pub trait GamepadDevice: Send {
    /// Pushes the full report to the device.
    fn commit(&mut self, state: &GamepadState) -> Result<(), ActuatorError>;

    /// Unplugs the device and releases its resources.
    fn dispose(self: Box<Self>);
}

/// Factory for virtual controllers.
pub trait GamepadBackend: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Plugs in a fresh device that reports rumble into `feedback`.
    fn plug_in(&self, feedback: FeedbackSink) -> Result<Box<dyn GamepadDevice>, ActuatorError>;
}

/// Per-session gamepad: cumulative state plus the device it is committed to.
pub struct Actuator {
    state: GamepadState,
    device: Option<Box<dyn GamepadDevice>>,
}

/// Shared handle to a session's actuator.
///
/// The async mutex serializes dispatch and teardown: a disconnect waits for an
/// in-flight event to finish, and an event that arrives after teardown finds
/// the device gone instead of touching it.
pub type ActuatorHandle = Arc<Mutex<Actuator>>;

impl Actuator {
    pub fn new(device: Box<dyn GamepadDevice>) -> Self {
        Self {
            state: GamepadState::neutral(),
            device: Some(device),
        }
    }

    /// Current cumulative report.
    pub fn state(&self) -> &GamepadState {
        &self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.device.is_none()
    }

    pub fn press(&mut self, button: ButtonId) -> Result<(), ActuatorError> {
        self.ensure_live()?;
        self.state.press(button);
        self.commit()
    }

    pub fn release(&mut self, button: ButtonId) -> Result<(), ActuatorError> {
        self.ensure_live()?;
        self.state.release(button);
        self.commit()
    }

    pub fn left_stick(&mut self, x: f32, y: f32) -> Result<(), ActuatorError> {
        self.stick(Side::Left, x, y)
    }

    pub fn right_stick(&mut self, x: f32, y: f32) -> Result<(), ActuatorError> {
        self.stick(Side::Right, x, y)
    }

    pub fn left_trigger(&mut self, value: f32) -> Result<(), ActuatorError> {
        self.trigger(Side::Left, value)
    }

    pub fn right_trigger(&mut self, value: f32) -> Result<(), ActuatorError> {
        self.trigger(Side::Right, value)
    }

    /// Neutralizes every button and axis; the device stays plugged in.
    pub fn reset(&mut self) -> Result<(), ActuatorError> {
        self.ensure_live()?;
        self.state.reset();
        self.commit()
    }

    /// Resets the device to neutral and disposes it.
    ///
    /// Returns `true` the first time and `false` on every later call, so the
    /// reset-then-dispose sequence runs exactly once.
    pub fn shutdown(&mut self) -> bool {
        let Some(mut device) = self.device.take() else {
            return false;
        };
        self.state.reset();
        if let Err(e) = device.commit(&self.state) {
            // Still dispose: a device that cannot take a report must not leak.
            warn!("failed to neutralize gamepad before dispose: {e}");
        }
        device.dispose();
        debug!("gamepad disposed");
        true
    }

    fn stick(&mut self, side: Side, x: f32, y: f32) -> Result<(), ActuatorError> {
        self.ensure_live()?;
        self.state.set_stick(side, x, y);
        self.commit()
    }

    fn trigger(&mut self, side: Side, value: f32) -> Result<(), ActuatorError> {
        self.ensure_live()?;
        self.state.set_trigger(side, value);
        self.commit()
    }

    fn ensure_live(&self) -> Result<(), ActuatorError> {
        if self.is_disposed() {
            return Err(ActuatorError::Disposed);
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ActuatorError> {
        let device = self.device.as_mut().ok_or(ActuatorError::Disposed)?;
        device.commit(&self.state)
    }
}

impl Drop for Actuator {
    fn drop(&mut self) {
        // Sessions are always shut down explicitly; this only catches an
        // actuator abandoned by a failed session insert.
        self.shutdown();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
