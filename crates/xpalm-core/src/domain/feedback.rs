//! Force-feedback edge detection.
//!
//! A virtual device reports rumble as two motor intensities.  The phone only
//! cares whether it should be vibrating, and it should hear about it once per
//! change: a game that refreshes the same rumble value sixty times a second
//! must not flood the connection.  [`FeedbackEdge`] reduces the stream of
//! motor levels to on/off transitions.

/// Raw motor intensities reported by a device (0 = off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorLevels {
    pub large: u8,
    pub small: u8,
}

impl MotorLevels {
    pub fn new(large: u8, small: u8) -> Self {
        Self { large, small }
    }

    /// `true` when either motor has any force applied.
    pub fn is_active(&self) -> bool {
        self.large > 0 || self.small > 0
    }
}

/// Vibration state change to forward to the phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackNotification {
    pub vibrating: bool,
}

/// Edge-triggered filter over [`MotorLevels`].
///
/// Starts in the "not vibrating" state, so an initial all-zero report is
/// silent.
#[derive(Debug, Default)]
pub struct FeedbackEdge {
    vibrating: bool,
}

impl FeedbackEdge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one report; returns a notification only on a transition.
    pub fn observe(&mut self, levels: MotorLevels) -> Option<FeedbackNotification> {
        let active = levels.is_active();
        if active == self.vibrating {
            return None;
        }
        self.vibrating = active;
        Some(FeedbackNotification { vibrating: active })
    }

    #[cfg(test)]
    fn is_vibrating(&self) -> bool {
        self.vibrating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_zero_is_silent() {
        let mut edge = FeedbackEdge::new();
        assert_eq!(edge.observe(MotorLevels::new(0, 0)), None);
    }

    #[test]
    fn test_off_on_off_yields_two_notifications() {
        // Arrange
        let mut edge = FeedbackEdge::new();
        let levels = [
            MotorLevels::new(0, 0),
            MotorLevels::new(128, 0),
            MotorLevels::new(0, 0),
        ];

        // Act
        let emitted: Vec<_> = levels.iter().filter_map(|l| edge.observe(*l)).collect();

        // Assert
        assert_eq!(
            emitted,
            vec![
                FeedbackNotification { vibrating: true },
                FeedbackNotification { vibrating: false },
            ]
        );
    }

    #[test]
    fn test_repeated_and_changing_nonzero_levels_do_not_reemit() {
        let mut edge = FeedbackEdge::new();
        assert!(edge.observe(MotorLevels::new(10, 0)).is_some());
        assert_eq!(edge.observe(MotorLevels::new(10, 0)), None);
        assert_eq!(edge.observe(MotorLevels::new(0, 200)), None);
        assert!(edge.is_vibrating());
    }

    #[test]
    fn test_small_motor_alone_counts_as_active() {
        assert!(MotorLevels::new(0, 1).is_active());
        assert!(!MotorLevels::default().is_active());
    }
}
