//! Activity-window clock — maps time of day to tiers and active/inactive
//! transitions, with one-shot latching and time-jump detection.

use serde::{Deserialize, Serialize};

/// Time-of-day band, each with its own population ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// 05:00–12:00
    Morning,
    /// 12:00–17:00
    Afternoon,
    /// 17:00–22:00
    Evening,
    /// 22:00–05:00
    Night,
}

impl Tier {
    /// Band lookup from minutes since midnight.
    pub fn from_minutes(minutes: u32) -> Self {
        match minutes {
            300..=719 => Tier::Morning,
            720..=1019 => Tier::Afternoon,
            1020..=1319 => Tier::Evening,
            _ => Tier::Night,
        }
    }
}

/// Result of observing the clock for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    None,
    /// Entered the active window. Fires at most once per active period.
    Activated,
    /// Left the active window. Fires at most once per inactive period; the
    /// orchestrator performs exactly one full despawn sweep in response.
    Deactivated,
    /// Time jumped discontinuously without changing active/inactive state;
    /// tier and targets must be re-evaluated immediately.
    DayJumped,
}

/// Clock over a half-open `[start, end)` active window (wrapping past
/// midnight supported), fed minute-of-day samples once per tick.
///
/// A forward jump beyond the configured threshold, or any backward jump that
/// isn't a natural midnight wrap, is a discontinuity: active state and tier
/// are re-evaluated immediately rather than waiting for the next natural
/// boundary.
#[derive(Debug, Clone)]
pub struct ActivityWindowClock {
    start: u32,
    end: u32,
    jump_threshold: u32,
    last_minutes: Option<u32>,
    active: bool,
    // One-shot latch: the active state we last fired a transition for.
    // Resets only when the opposite state is observed.
    last_fired: Option<bool>,
}

// Backward steps from the last two hours of a day into the first two hours
// of the next are midnight wraps, not discontinuities.
const WRAP_FROM_MINUTES: u32 = 22 * 60;
const WRAP_TO_MINUTES: u32 = 2 * 60;

impl ActivityWindowClock {
    pub fn new(start_minutes: u32, end_minutes: u32, jump_threshold_minutes: u32) -> Self {
        Self {
            start: start_minutes,
            end: end_minutes,
            jump_threshold: jump_threshold_minutes,
            last_minutes: None,
            active: false,
            last_fired: None,
        }
    }

    /// Whether `minutes` falls inside the active window.
    pub fn in_window(&self, minutes: u32) -> bool {
        if self.start < self.end {
            minutes >= self.start && minutes < self.end
        } else {
            // Window wraps past midnight
            minutes >= self.start || minutes < self.end
        }
    }

    /// Active/inactive state as of the last observation.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current population-limit tier for a minute-of-day value.
    pub fn current_limit(&self, minutes: u32) -> Tier {
        Tier::from_minutes(minutes)
    }

    /// Feed one minute-of-day sample; returns the transition to act on.
    pub fn observe(&mut self, minutes: u32) -> Transition {
        let discontinuity = match self.last_minutes {
            None => false,
            Some(prev) => {
                if minutes >= prev {
                    minutes - prev > self.jump_threshold
                } else {
                    // Backward: allow the natural midnight wrap only
                    !(prev >= WRAP_FROM_MINUTES && minutes < WRAP_TO_MINUTES)
                }
            }
        };
        self.last_minutes = Some(minutes);
        self.active = self.in_window(minutes);

        if self.active && self.last_fired != Some(true) {
            self.last_fired = Some(true);
            return Transition::Activated;
        }
        if !self.active && self.last_fired != Some(false) {
            self.last_fired = Some(false);
            return Transition::Deactivated;
        }
        if discontinuity {
            return Transition::DayJumped;
        }
        Transition::None
    }

    /// Forget all observed state. The next observation re-fires the
    /// appropriate transition, which re-arms initialization after a world
    /// reload.
    pub fn reset(&mut self) {
        self.last_minutes = None;
        self.active = false;
        self.last_fired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> ActivityWindowClock {
        // Active 06:00–21:00
        ActivityWindowClock::new(6 * 60, 21 * 60, 30)
    }

    #[test]
    fn test_tier_bands() {
        assert_eq!(Tier::from_minutes(6 * 60), Tier::Morning);
        assert_eq!(Tier::from_minutes(13 * 60), Tier::Afternoon);
        assert_eq!(Tier::from_minutes(19 * 60), Tier::Evening);
        assert_eq!(Tier::from_minutes(23 * 60), Tier::Night);
        assert_eq!(Tier::from_minutes(0), Tier::Night);
    }

    #[test]
    fn test_half_open_window() {
        let c = clock();
        assert!(!c.in_window(6 * 60 - 1));
        assert!(c.in_window(6 * 60));
        assert!(c.in_window(21 * 60 - 1));
        assert!(!c.in_window(21 * 60));
    }

    #[test]
    fn test_wrapping_window() {
        // Active 21:00–06:00 (overnight)
        let c = ActivityWindowClock::new(21 * 60, 6 * 60, 30);
        assert!(c.in_window(23 * 60));
        assert!(c.in_window(2 * 60));
        assert!(!c.in_window(12 * 60));
    }

    #[test]
    fn test_activation_fires_once() {
        let mut c = clock();
        assert_eq!(c.observe(7 * 60), Transition::Activated);
        assert_eq!(c.observe(7 * 60 + 5), Transition::None);
        // Steps stay within the 30-minute jump threshold
        assert_eq!(c.observe(7 * 60 + 30), Transition::None);
    }

    #[test]
    fn test_deactivation_latch_is_one_shot() {
        let mut c = clock();
        c.observe(12 * 60);
        assert_eq!(c.observe(21 * 60), Transition::Deactivated);
        // Seen again while still inactive, in sub-threshold steps: no
        // second sweep
        assert_eq!(c.observe(21 * 60 + 25), Transition::None);
        assert_eq!(c.observe(21 * 60 + 50), Transition::None);
        // Latch resets only when the opposite state is observed
        assert_eq!(c.observe(6 * 60 + 30), Transition::Activated);
        assert_eq!(c.observe(21 * 60 + 30), Transition::Deactivated);
    }

    #[test]
    fn test_forward_jump_deactivates_immediately() {
        // 19:00 -> 22:00 in one sample: discontinuity, but the state change
        // wins — a single Deactivated fires, and only once.
        let mut c = clock();
        c.observe(19 * 60);
        assert_eq!(c.observe(22 * 60), Transition::Deactivated);
        assert_eq!(c.observe(22 * 60 + 10), Transition::None);
    }

    #[test]
    fn test_forward_jump_within_active_reports_day_jump() {
        let mut c = clock();
        c.observe(8 * 60);
        assert_eq!(c.observe(14 * 60), Transition::DayJumped);
    }

    #[test]
    fn test_midnight_wrap_is_not_discontinuity() {
        let mut c = clock();
        c.observe(23 * 60 + 50);
        assert_eq!(c.observe(5), Transition::None);
    }

    #[test]
    fn test_backward_jump_is_discontinuity() {
        let mut c = clock();
        c.observe(14 * 60);
        assert_eq!(c.observe(10 * 60), Transition::DayJumped);
    }

    #[test]
    fn test_reset_rearms_activation() {
        let mut c = clock();
        assert_eq!(c.observe(8 * 60), Transition::Activated);
        c.reset();
        assert_eq!(c.observe(8 * 60), Transition::Activated);
    }
}
