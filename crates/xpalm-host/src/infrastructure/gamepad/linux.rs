//! Linux virtual gamepad via uinput.
//!
//! Each session creates its own `/dev/uinput` device that looks like a wired
//! Xbox 360 pad to games and SDL.  The device is removed by the kernel when
//! the [`VirtualDevice`] is dropped.
//!
//! # Report mapping
//!
//! | Report field        | evdev code                      | Range            |
//! |---------------------|---------------------------------|------------------|
//! | A / B / X / Y       | `BTN_SOUTH/EAST/WEST/NORTH`     | 0 / 1            |
//! | shoulders, thumbs   | `BTN_TL/TR`, `BTN_THUMBL/R`     | 0 / 1            |
//! | back, start, guide  | `BTN_SELECT/START/MODE`         | 0 / 1            |
//! | d-pad               | `ABS_HAT0X`, `ABS_HAT0Y`        | -1 ..= 1         |
//! | left / right stick  | `ABS_X/Y`, `ABS_RX/RY`          | i16, Y inverted  |
//! | triggers            | `ABS_Z`, `ABS_RZ`               | 0 ..= 255        |
//!
//! The report uses "up is positive" for stick Y while evdev uses "down is
//! positive", so Y is negated on the way out.
//!
//! # Permissions
//!
//! Opening `/dev/uinput` normally requires root or membership in a group that
//! a udev rule grants access to.  Failure surfaces as
//! [`ActuatorError::Backend`] when a session is created.
//!
//! Rumble is not forwarded: the device does not advertise force feedback, so
//! the feedback sink stays silent until the device is dropped.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    UinputAbsSetup,
};
use tracing::debug;
use xpalm_core::{ButtonId, GamepadState};

use crate::application::actuator::{ActuatorError, FeedbackSink, GamepadBackend, GamepadDevice};

const DEVICE_NAME: &str = "xPalm Virtual Gamepad";

// Microsoft Xbox 360 wired controller ids, so SDL picks the right mapping.
const VENDOR_ID: u16 = 0x045e;
const PRODUCT_ID: u16 = 0x028e;

const FACE_AND_MENU_BUTTONS: [(ButtonId, Key); 11] = [
    (ButtonId::A, Key::BTN_SOUTH),
    (ButtonId::B, Key::BTN_EAST),
    (ButtonId::X, Key::BTN_WEST),
    (ButtonId::Y, Key::BTN_NORTH),
    (ButtonId::LeftShoulder, Key::BTN_TL),
    (ButtonId::RightShoulder, Key::BTN_TR),
    (ButtonId::LeftThumb, Key::BTN_THUMBL),
    (ButtonId::RightThumb, Key::BTN_THUMBR),
    (ButtonId::Back, Key::BTN_SELECT),
    (ButtonId::Start, Key::BTN_START),
    (ButtonId::Guide, Key::BTN_MODE),
];

fn backend_error(context: &str, e: std::io::Error) -> ActuatorError {
    ActuatorError::Backend(format!("{context}: {e}"))
}

/// Creates one uinput gamepad per session.
#[derive(Default)]
pub struct UinputBackend;

impl UinputBackend {
    pub fn new() -> Self {
        Self
    }
}

impl GamepadBackend for UinputBackend {
    fn name(&self) -> &'static str {
        "uinput"
    }

    fn plug_in(&self, feedback: FeedbackSink) -> Result<Box<dyn GamepadDevice>, ActuatorError> {
        let mut keys = AttributeSet::<Key>::new();
        for (_, key) in FACE_AND_MENU_BUTTONS {
            keys.insert(key);
        }

        let stick = AbsInfo::new(0, i16::MIN.into(), i16::MAX.into(), 16, 128, 0);
        let trigger = AbsInfo::new(0, 0, 255, 0, 0, 0);
        let dpad = AbsInfo::new(0, -1, 1, 0, 0, 0);

        let axes = [
            (AbsoluteAxisType::ABS_X, stick),
            (AbsoluteAxisType::ABS_Y, stick),
            (AbsoluteAxisType::ABS_RX, stick),
            (AbsoluteAxisType::ABS_RY, stick),
            (AbsoluteAxisType::ABS_Z, trigger),
            (AbsoluteAxisType::ABS_RZ, trigger),
            (AbsoluteAxisType::ABS_HAT0X, dpad),
            (AbsoluteAxisType::ABS_HAT0Y, dpad),
        ];

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(|e| backend_error("cannot open /dev/uinput", e))?
            .name(DEVICE_NAME)
            .input_id(InputId::new(BusType::BUS_USB, VENDOR_ID, PRODUCT_ID, 0x0110))
            .with_keys(&keys)
            .map_err(|e| backend_error("cannot configure uinput buttons", e))?;
        for (axis, info) in axes {
            builder = builder
                .with_absolute_axis(&UinputAbsSetup::new(axis, info))
                .map_err(|e| backend_error("cannot configure uinput axis", e))?;
        }
        let device = builder
            .build()
            .map_err(|e| backend_error("cannot create uinput device", e))?;

        debug!("uinput gamepad created");
        Ok(Box::new(UinputGamepad {
            device,
            last: GamepadState::neutral(),
            _feedback: feedback,
        }))
    }
}

struct UinputGamepad {
    device: VirtualDevice,
    last: GamepadState,
    // Held so the session's feedback stream closes when the device goes away.
    _feedback: FeedbackSink,
}

impl GamepadDevice for UinputGamepad {
    fn commit(&mut self, state: &GamepadState) -> Result<(), ActuatorError> {
        let events = report_events(&self.last, state);
        if !events.is_empty() {
            // `emit` appends the SYN_REPORT.
            self.device
                .emit(&events)
                .map_err(|e| backend_error("uinput write failed", e))?;
        }
        self.last = *state;
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        debug!("uinput gamepad removed");
    }
}

/// Events needed to move the device from `prev` to `next`.
fn report_events(prev: &GamepadState, next: &GamepadState) -> Vec<InputEvent> {
    let mut events = Vec::new();

    for (button, key) in FACE_AND_MENU_BUTTONS {
        let (was, is) = (prev.is_pressed(button), next.is_pressed(button));
        if was != is {
            events.push(InputEvent::new(EventType::KEY, key.code(), i32::from(is)));
        }
    }

    let dpad_x = |s: &GamepadState| hat(s, ButtonId::DpadLeft, ButtonId::DpadRight);
    let dpad_y = |s: &GamepadState| hat(s, ButtonId::DpadUp, ButtonId::DpadDown);
    let axes = [
        (AbsoluteAxisType::ABS_HAT0X, dpad_x(prev), dpad_x(next)),
        (AbsoluteAxisType::ABS_HAT0Y, dpad_y(prev), dpad_y(next)),
        (AbsoluteAxisType::ABS_X, prev.thumb_lx.into(), next.thumb_lx.into()),
        (AbsoluteAxisType::ABS_Y, -i32::from(prev.thumb_ly), -i32::from(next.thumb_ly)),
        (AbsoluteAxisType::ABS_RX, prev.thumb_rx.into(), next.thumb_rx.into()),
        (AbsoluteAxisType::ABS_RY, -i32::from(prev.thumb_ry), -i32::from(next.thumb_ry)),
        (AbsoluteAxisType::ABS_Z, prev.left_trigger.into(), next.left_trigger.into()),
        (AbsoluteAxisType::ABS_RZ, prev.right_trigger.into(), next.right_trigger.into()),
    ];
    for (axis, was, is) in axes {
        if was != is {
            events.push(InputEvent::new(EventType::ABSOLUTE, axis.0, is));
        }
    }

    events
}

/// Hat value for a pair of opposing d-pad buttons.
fn hat(state: &GamepadState, negative: ButtonId, positive: ButtonId) -> i32 {
    i32::from(state.is_pressed(positive)) - i32::from(state.is_pressed(negative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpalm_core::Side;

    #[test]
    fn test_no_change_emits_nothing() {
        let s = GamepadState::neutral();
        assert!(report_events(&s, &s).is_empty());
    }

    #[test]
    fn test_button_press_maps_to_key_event() {
        // Arrange
        let prev = GamepadState::neutral();
        let mut next = prev;
        next.press(ButtonId::X);

        // Act
        let events = report_events(&prev, &next);

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), EventType::KEY);
        assert_eq!(events[0].code(), Key::BTN_WEST.code());
        assert_eq!(events[0].value(), 1);
    }

    #[test]
    fn test_dpad_maps_to_hat() {
        let prev = GamepadState::neutral();
        let mut next = prev;
        next.press(ButtonId::DpadUp);

        let events = report_events(&prev, &next);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code(), AbsoluteAxisType::ABS_HAT0Y.0);
        assert_eq!(events[0].value(), -1);
    }

    #[test]
    fn test_stick_y_is_inverted() {
        let prev = GamepadState::neutral();
        let mut next = prev;
        next.set_stick(Side::Left, 0.0, 1.0);

        let events = report_events(&prev, &next);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code(), AbsoluteAxisType::ABS_Y.0);
        assert_eq!(events[0].value(), -i32::from(i16::MAX));
    }

    #[test]
    fn test_trigger_maps_to_z_axis() {
        let prev = GamepadState::neutral();
        let mut next = prev;
        next.set_trigger(Side::Right, 1.0);

        let events = report_events(&prev, &next);

        assert_eq!(events[0].code(), AbsoluteAxisType::ABS_RZ.0);
        assert_eq!(events[0].value(), 255);
    }
}
