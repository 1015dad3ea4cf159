//! Distance budget arithmetic.
//!
//! The tracker turns E values from outbound moves into decrements of
//! `remaining_distance`. Sensor pulses top the budget back up. When the budget is
//! spent and no pulse has arrived for [`STALL_GRACE`], the filament is considered
//! stuck.

use std::time::{Duration, Instant};

use crate::state::DetectionState;
use crate::util::round_mm;

/// Extra budget granted at print start/resume for priming moves.
pub const START_DISTANCE_OFFSET: f64 = 7.0;

/// How long an exhausted budget is tolerated without a pulse before pausing.
pub const STALL_GRACE: Duration = Duration::from_secs(10);

/// Marks `last` as unknown; the next absolute reading only seeds the position.
pub const UNSET_POSITION: f64 = -1.0;

/// Extruder positions seen in the last two absolute-mode moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtruderPosition {
    pub last: f64,
    pub current: f64,
}

impl Default for ExtruderPosition {
    fn default() -> Self {
        Self {
            last: UNSET_POSITION,
            current: 0.0,
        }
    }
}

impl ExtruderPosition {
    pub fn is_unset(&self) -> bool {
        self.last < 0.0
    }
}

/// Result of feeding one E value to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Consumption {
    /// Budget was reduced by `delta`.
    Consumed { delta: f64, remaining: f64 },
    /// Budget is already at or below zero; nothing was deducted.
    Exhausted,
}

/// Reduce an oversized delta modulo the detection distance.
///
/// A stale position report can make one move look huge and the following ones
/// look empty; folding keeps a single bad sample from draining the budget.
pub fn fold_delta(delta: f64, detection_distance: f64) -> f64 {
    if delta > detection_distance {
        delta % detection_distance
    } else {
        delta
    }
}

/// True once `STALL_GRACE` has passed since the last pulse. No pulse at all counts
/// as expired.
pub fn grace_expired(last_pulse: Option<Instant>, now: Instant) -> bool {
    last_pulse.is_none_or(|t| now.saturating_duration_since(t) > STALL_GRACE)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrusionTracker {
    detection_distance: f64,
}

impl ExtrusionTracker {
    pub fn new(detection_distance: f64) -> Self {
        Self { detection_distance }
    }

    pub fn detection_distance(&self) -> f64 {
        self.detection_distance
    }

    /// Budget granted at print start and resume.
    pub fn start_budget(&self) -> f64 {
        self.detection_distance + START_DISTANCE_OFFSET
    }

    /// Pure step: compute the new budget and extruder position for one reading.
    pub fn consume(
        &self,
        remaining: f64,
        absolute: bool,
        position: ExtruderPosition,
        reading: f64,
    ) -> (Consumption, ExtruderPosition) {
        if remaining <= 0.0 {
            return (Consumption::Exhausted, position);
        }

        let (delta, position) = if absolute {
            let mut next = position;
            if next.is_unset() {
                tracing::debug!(reading, "first absolute E after reset; seeding position");
                next.last = reading;
            } else {
                next.last = next.current;
            }
            next.current = reading;
            (next.current - next.last, next)
        } else {
            (reading, position)
        };

        let delta = if delta.is_finite() {
            fold_delta(delta, self.detection_distance)
        } else {
            tracing::debug!(reading, "extrusion delta overflowed; ignoring");
            0.0
        };
        let left = remaining - delta;
        tracing::debug!(
            remaining = round_mm(remaining),
            delta = round_mm(delta),
            left = round_mm(left),
            absolute,
            "extrusion consumed"
        );
        (
            Consumption::Consumed {
                delta,
                remaining: left,
            },
            position,
        )
    }

    /// Apply one reading to the shared state in place.
    pub fn apply(&self, state: &mut DetectionState, reading: f64) -> Consumption {
        let (outcome, position) = self.consume(
            state.remaining_distance,
            state.absolute_extrusion,
            state.extruder,
            reading,
        );
        if let Consumption::Consumed { remaining, .. } = outcome {
            state.remaining_distance = remaining;
        }
        state.extruder = position;
        outcome
    }

    /// Budget back to distance + start offset.
    pub fn reset_remaining(&self, state: &mut DetectionState) {
        state.remaining_distance = self.start_budget();
    }

    /// Forget the extruder position and grant the start budget (print start, `G92`).
    pub fn init(&self, state: &mut DetectionState) {
        state.extruder = ExtruderPosition {
            last: UNSET_POSITION,
            current: 0.0,
        };
        self.reset_remaining(state);
    }

    /// Top the budget up to exactly the detection distance after a pulse.
    /// Returns true when the budget was raised.
    pub fn catch_up(&self, state: &mut DetectionState) -> bool {
        if state.remaining_distance < self.detection_distance {
            state.remaining_distance = self.detection_distance;
            state.filament_moving = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ExtrusionTracker {
        ExtrusionTracker::new(15.0)
    }

    #[test]
    fn start_budget_adds_offset() {
        assert_eq!(tracker().start_budget(), 22.0);
    }

    #[test]
    fn first_absolute_reading_after_init_is_discarded() {
        let t = tracker();
        let mut s = DetectionState::new(15.0);
        t.init(&mut s);
        assert_eq!(s.remaining_distance, 22.0);

        let first = t.apply(&mut s, 5.0);
        assert_eq!(first, Consumption::Consumed { delta: 0.0, remaining: 22.0 });
        assert_eq!(s.extruder, ExtruderPosition { last: 5.0, current: 5.0 });

        let second = t.apply(&mut s, 10.0);
        assert_eq!(second, Consumption::Consumed { delta: 5.0, remaining: 17.0 });
        assert_eq!(s.remaining_distance, 17.0);
    }

    #[test]
    fn oversized_delta_is_folded() {
        assert_eq!(fold_delta(40.0, 15.0), 10.0);
        assert_eq!(fold_delta(15.0, 15.0), 15.0);
        assert_eq!(fold_delta(-4.0, 15.0), -4.0);

        let t = tracker();
        let mut s = DetectionState::new(15.0);
        s.absolute_extrusion = false;
        s.remaining_distance = 22.0;
        assert_eq!(
            t.apply(&mut s, 40.0),
            Consumption::Consumed { delta: 10.0, remaining: 12.0 }
        );
    }

    #[test]
    fn relative_mode_subtracts_reading_directly() {
        let t = tracker();
        let mut s = DetectionState::new(15.0);
        s.absolute_extrusion = false;
        let before = s.extruder;
        t.apply(&mut s, 3.2);
        assert!((s.remaining_distance - 11.8).abs() < 1e-9);
        assert_eq!(s.extruder, before);
    }

    #[test]
    fn exhausted_budget_is_not_decremented_further() {
        let t = tracker();
        let mut s = DetectionState::new(0.0);
        s.extruder = ExtruderPosition { last: 1.0, current: 2.0 };
        assert_eq!(t.apply(&mut s, 50.0), Consumption::Exhausted);
        assert_eq!(s.remaining_distance, 0.0);
        assert_eq!(s.extruder, ExtruderPosition { last: 1.0, current: 2.0 });
    }

    #[test]
    fn catch_up_restores_exact_distance_not_offset() {
        let t = tracker();
        let mut s = DetectionState::new(3.0);
        assert!(t.catch_up(&mut s));
        assert_eq!(s.remaining_distance, 15.0);
        assert!(s.filament_moving);

        s.remaining_distance = 20.0;
        assert!(!t.catch_up(&mut s));
        assert_eq!(s.remaining_distance, 20.0);
    }

    #[test]
    fn overflowing_delta_is_ignored() {
        let t = tracker();
        let mut s = DetectionState::new(15.0);
        s.extruder = ExtruderPosition { last: 1.0, current: -1.0e308 };
        t.apply(&mut s, 1.0e308);
        assert_eq!(s.remaining_distance, 15.0);
    }

    #[test]
    fn grace_window_is_ten_seconds() {
        let t0 = Instant::now();
        assert!(!grace_expired(Some(t0), t0 + Duration::from_secs(10)));
        assert!(grace_expired(Some(t0), t0 + Duration::from_millis(10_001)));
        assert!(grace_expired(None, t0));
    }
}
