//! Virtual gamepad model.
//!
//! The phone speaks in terms of an Xbox 360 controller: sixteen digital
//! buttons packed into a bitmask, two analog sticks and two analog triggers.
//! [`GamepadState`] is the full report a device backend commits after every
//! change; it is cumulative, so the order in which events are applied matters.
//!
//! # Button codes
//!
//! Button identifiers on the wire are the XUSB bit values used by the Xbox 360
//! driver stack:
//!
//! | Button          | Code     |
//! |-----------------|----------|
//! | D-pad up        | `0x0001` |
//! | D-pad down      | `0x0002` |
//! | D-pad left      | `0x0004` |
//! | D-pad right     | `0x0008` |
//! | Start           | `0x0010` |
//! | Back            | `0x0020` |
//! | Left thumb      | `0x0040` |
//! | Right thumb     | `0x0080` |
//! | Left shoulder   | `0x0100` |
//! | Right shoulder  | `0x0200` |
//! | Guide           | `0x0400` |
//! | A               | `0x1000` |
//! | B               | `0x2000` |
//! | X               | `0x4000` |
//! | Y               | `0x8000` |

use thiserror::Error;

/// A digital button on the virtual controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ButtonId {
    DpadUp = 0x0001,
    DpadDown = 0x0002,
    DpadLeft = 0x0004,
    DpadRight = 0x0008,
    Start = 0x0010,
    Back = 0x0020,
    LeftThumb = 0x0040,
    RightThumb = 0x0080,
    LeftShoulder = 0x0100,
    RightShoulder = 0x0200,
    Guide = 0x0400,
    A = 0x1000,
    B = 0x2000,
    X = 0x4000,
    Y = 0x8000,
}

impl ButtonId {
    /// Every button, in bit order.
    pub const ALL: [ButtonId; 15] = [
        ButtonId::DpadUp,
        ButtonId::DpadDown,
        ButtonId::DpadLeft,
        ButtonId::DpadRight,
        ButtonId::Start,
        ButtonId::Back,
        ButtonId::LeftThumb,
        ButtonId::RightThumb,
        ButtonId::LeftShoulder,
        ButtonId::RightShoulder,
        ButtonId::Guide,
        ButtonId::A,
        ButtonId::B,
        ButtonId::X,
        ButtonId::Y,
    ];

    /// The XUSB bit for this button.
    pub fn bit(self) -> u16 {
        self as u16
    }
}

/// Returned when a wire value does not name exactly one known button.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown button code 0x{0:04x}")]
pub struct UnknownButton(pub u16);

impl TryFrom<u16> for ButtonId {
    type Error = UnknownButton;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        ButtonId::ALL
            .into_iter()
            .find(|b| b.bit() == code)
            .ok_or(UnknownButton(code))
    }
}

/// Which stick or trigger an analog event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Maps the wire's `isRight` flag to a side.
    pub fn from_is_right(is_right: bool) -> Self {
        if is_right {
            Side::Right
        } else {
            Side::Left
        }
    }
}

/// A decoded input event from the phone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A button went down (`pressed = true`) or up.
    Key { pressed: bool, button: ButtonId },
    /// A stick moved; `x` and `y` are in `[-1.0, 1.0]`.
    Axis { side: Side, x: f32, y: f32 },
    /// A trigger moved; `value` is in `[0.0, 1.0]`.
    Trigger { side: Side, value: f32 },
    /// Neutralize every button and axis.
    Reset,
    /// Liveness probe; answered without touching the device.
    Ping,
}

/// The complete report committed to a virtual device.
///
/// Field ranges follow the Xbox 360 report layout: thumbs are signed 16-bit,
/// triggers unsigned 8-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GamepadState {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

impl GamepadState {
    /// The neutral report: nothing pressed, sticks centred, triggers released.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn press(&mut self, button: ButtonId) {
        self.buttons |= button.bit();
    }

    pub fn release(&mut self, button: ButtonId) {
        self.buttons &= !button.bit();
    }

    pub fn is_pressed(&self, button: ButtonId) -> bool {
        self.buttons & button.bit() != 0
    }

    /// Sets a stick from float coordinates, clamping to `[-1.0, 1.0]`.
    pub fn set_stick(&mut self, side: Side, x: f32, y: f32) {
        let (x, y) = (axis_to_i16(x), axis_to_i16(y));
        match side {
            Side::Left => {
                self.thumb_lx = x;
                self.thumb_ly = y;
            }
            Side::Right => {
                self.thumb_rx = x;
                self.thumb_ry = y;
            }
        }
    }

    /// Sets a trigger from a float pressure, clamping to `[0.0, 1.0]`.
    pub fn set_trigger(&mut self, side: Side, value: f32) {
        let v = trigger_to_u8(value);
        match side {
            Side::Left => self.left_trigger = v,
            Side::Right => self.right_trigger = v,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::neutral();
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }
}

fn axis_to_i16(v: f32) -> i16 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

fn trigger_to_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * u8::MAX as f32).round() as u8
}

// ── Tests ─────────────────────────────────────────────────────────────────────
