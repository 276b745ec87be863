//! Recording gamepad backend for tests.
//!
//! Every device plugged in through [`MockGamepadBackend`] appends its calls to
//! a shared log, indexed by plug-in order, so tests can assert exactly which
//! reports a session committed and that it was disposed once.
//!
//! # Loopback
//!
//! [`MockGamepadBackend::with_loopback`] makes each device report the
//! committed trigger levels as motor levels, the same way the simulated
//! backend does, so the feedback path can be exercised end to end.
//!
//! # Failure injection
//!
//! [`MockGamepadBackend::failing`] refuses to plug in any device.
//! [`MockGamepadBackend::fail_commits`] makes live devices reject commits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use xpalm_core::GamepadState;

use super::loopback_levels;
use crate::application::actuator::{ActuatorError, FeedbackSink, GamepadBackend, GamepadDevice};

/// One recorded device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    Commit(GamepadState),
    Dispose,
}

#[derive(Default)]
struct Shared {
    devices: Mutex<Vec<Arc<Mutex<Vec<DeviceCall>>>>>,
    fail_commits: AtomicBool,
}

/// A backend that records all device calls without touching the OS.
#[derive(Default)]
pub struct MockGamepadBackend {
    shared: Arc<Shared>,
    loopback: bool,
    fail_plug_in: bool,
}

impl MockGamepadBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices echo trigger levels back as rumble.
    pub fn with_loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Every `plug_in` fails with a backend error.
    pub fn failing() -> Self {
        Self {
            fail_plug_in: true,
            ..Self::default()
        }
    }

    /// Makes every subsequent commit on every device fail.
    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of devices plugged in so far.
    pub fn device_count(&self) -> usize {
        self.shared.devices.lock().unwrap().len()
    }

    /// Calls recorded by the `index`-th device.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `index + 1` devices were plugged in.
    pub fn calls(&self, index: usize) -> Vec<DeviceCall> {
        let devices = self.shared.devices.lock().unwrap();
        let log = devices[index].lock().unwrap();
        log.clone()
    }

    /// States committed by the `index`-th device, in order.
    pub fn commits(&self, index: usize) -> Vec<GamepadState> {
        self.calls(index)
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Commit(s) => Some(s),
                DeviceCall::Dispose => None,
            })
            .collect()
    }

    /// How many times the `index`-th device was disposed.
    pub fn dispose_count(&self, index: usize) -> usize {
        self.calls(index)
            .iter()
            .filter(|c| **c == DeviceCall::Dispose)
            .count()
    }
}

impl GamepadBackend for MockGamepadBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn plug_in(&self, feedback: FeedbackSink) -> Result<Box<dyn GamepadDevice>, ActuatorError> {
        if self.fail_plug_in {
            return Err(ActuatorError::Backend("mock failure".into()));
        }
        let log = Arc::new(Mutex::new(Vec::new()));
        self.shared.devices.lock().unwrap().push(Arc::clone(&log));
        Ok(Box::new(MockDevice {
            log,
            shared: Arc::clone(&self.shared),
            feedback,
            loopback: self.loopback,
        }))
    }
}

struct MockDevice {
    log: Arc<Mutex<Vec<DeviceCall>>>,
    shared: Arc<Shared>,
    feedback: FeedbackSink,
    loopback: bool,
}

impl GamepadDevice for MockDevice {
    fn commit(&mut self, state: &GamepadState) -> Result<(), ActuatorError> {
        if self.shared.fail_commits.load(Ordering::SeqCst) {
            return Err(ActuatorError::Backend("mock failure".into()));
        }
        self.log.lock().unwrap().push(DeviceCall::Commit(*state));
        if self.loopback {
            self.feedback.report(loopback_levels(state));
        }
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        self.log.lock().unwrap().push(DeviceCall::Dispose);
    }
}
