//! Virtual gamepad backends.
//!
//! The backend is chosen at runtime from configuration.  The uinput backend is
//! only compiled on Linux; asking for it elsewhere is a startup error.

pub mod mock;
pub mod simulated;

#[cfg(target_os = "linux")]
pub mod linux;

use std::sync::Arc;

use xpalm_core::{GamepadState, MotorLevels};

use crate::application::actuator::{ActuatorError, GamepadBackend};
use crate::infrastructure::storage::config::BackendKind;

/// Motor levels a loopback device reports for a committed state.
///
/// The left trigger drives the large motor and the right trigger the small
/// one, so squeezing either trigger on the phone makes it vibrate.
pub fn loopback_levels(state: &GamepadState) -> MotorLevels {
    MotorLevels::new(state.left_trigger, state.right_trigger)
}

/// Builds the configured backend.
///
/// # Errors
///
/// Returns [`ActuatorError::Backend`] if the backend is not available on this
/// platform.
pub fn create_backend(
    kind: BackendKind,
    feedback_loopback: bool,
) -> Result<Arc<dyn GamepadBackend>, ActuatorError> {
    match kind {
        BackendKind::Simulated => Ok(Arc::new(simulated::SimulatedBackend::new(
            feedback_loopback,
        ))),
        #[cfg(target_os = "linux")]
        BackendKind::Uinput => {
            if feedback_loopback {
                tracing::warn!("feedback loopback is ignored by the uinput backend");
            }
            Ok(Arc::new(linux::UinputBackend::new()))
        }
        #[cfg(not(target_os = "linux"))]
        BackendKind::Uinput => Err(ActuatorError::Backend(
            "the uinput backend is only available on Linux".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_levels_follow_triggers() {
        let mut state = GamepadState::neutral();
        assert!(!loopback_levels(&state).is_active());

        state.left_trigger = 128;
        let levels = loopback_levels(&state);
        assert_eq!(levels, MotorLevels::new(128, 0));
        assert!(levels.is_active());
    }

    #[test]
    fn test_create_simulated_backend() {
        let backend = create_backend(BackendKind::Simulated, true).unwrap();
        assert_eq!(backend.name(), "simulated");
    }
}
