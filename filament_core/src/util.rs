//! Common numeric helpers for filament_core.

use std::time::Duration;

/// Round a length to 3 decimals (µm) for logging and display.
#[inline]
pub fn round_mm(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`.
#[inline]
pub fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
