//! In-process gamepad that only logs what it is sent.
//!
//! Useful on machines without a virtual gamepad driver and for checking the
//! phone app against a host.  With loopback enabled, trigger pressure is
//! echoed back as rumble so the phone's vibration path can be tried without a
//! game running.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, trace};
use xpalm_core::GamepadState;

use super::loopback_levels;
use crate::application::actuator::{ActuatorError, FeedbackSink, GamepadBackend, GamepadDevice};

pub struct SimulatedBackend {
    loopback: bool,
    next_index: AtomicU32,
}

impl SimulatedBackend {
    pub fn new(loopback: bool) -> Self {
        Self {
            loopback,
            next_index: AtomicU32::new(1),
        }
    }
}

impl GamepadBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn plug_in(&self, feedback: FeedbackSink) -> Result<Box<dyn GamepadDevice>, ActuatorError> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        debug!("simulated gamepad #{index} plugged in");
        Ok(Box::new(SimulatedGamepad {
            index,
            loopback: self.loopback,
            feedback,
            last: GamepadState::neutral(),
        }))
    }
}

struct SimulatedGamepad {
    index: u32,
    loopback: bool,
    feedback: FeedbackSink,
    last: GamepadState,
}

impl GamepadDevice for SimulatedGamepad {
    fn commit(&mut self, state: &GamepadState) -> Result<(), ActuatorError> {
        trace!(
            "gamepad #{}: buttons={:#06x} lt={} rt={} l=({}, {}) r=({}, {})",
            self.index,
            state.buttons,
            state.left_trigger,
            state.right_trigger,
            state.thumb_lx,
            state.thumb_ly,
            state.thumb_rx,
            state.thumb_ry
        );
        self.last = *state;
        if self.loopback {
            self.feedback.report(loopback_levels(state));
        }
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        debug!(
            "simulated gamepad #{} unplugged (last report neutral: {})",
            self.index,
            self.last.is_neutral()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpalm_core::Side;

    #[test]
    fn test_loopback_reports_trigger_edges() {
        // Arrange
        let backend = SimulatedBackend::new(true);
        let (sink, mut rx) = FeedbackSink::channel();
        let mut device = backend.plug_in(sink).unwrap();
        let mut state = GamepadState::neutral();

        // Act: 0 -> 0.5 -> 0 on the right trigger.
        for value in [0.0, 0.5, 0.0] {
            state.set_trigger(Side::Right, value);
            device.commit(&state).unwrap();
        }
        device.dispose();

        // Assert
        let mut seen = Vec::new();
        while let Ok(n) = rx.try_recv() {
            seen.push(n.vibrating);
        }
        assert_eq!(seen, vec![true, false]);
    }

    #[test]
    fn test_without_loopback_no_feedback() {
        let backend = SimulatedBackend::new(false);
        let (sink, mut rx) = FeedbackSink::channel();
        let mut device = backend.plug_in(sink).unwrap();
        let mut state = GamepadState::neutral();
        state.set_trigger(Side::Left, 1.0);

        device.commit(&state).unwrap();

        assert!(rx.try_recv().is_err());
    }
}
