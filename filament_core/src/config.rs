//! Runtime configuration for the detection engine.
//!
//! These are separate from the TOML-deserialized config in `filament_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

use filament_traits::PinNumbering;

use crate::monitor::POLL_INTERVAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMethod {
    /// Pause when no pulse arrives within the idle timeout.
    #[default]
    Timeout,
    /// Pause when the extruded length exceeds the budget replenished by pulses.
    Distance,
}

/// Where the sensor is wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorCfg {
    pub enabled: bool,
    /// `None` leaves the sensor inactive.
    pub pin: Option<u8>,
    pub numbering: PinNumbering,
}

impl SensorCfg {
    /// The pin to watch, or `None` when the sensor is disabled or unwired.
    pub fn active_pin(&self) -> Option<u8> {
        if self.enabled { self.pin } else { None }
    }
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            pin: Some(24),
            numbering: PinNumbering::Bcm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCfg {
    pub method: DetectionMethod,
    /// Budget in mm between pulses (distance method).
    pub distance_mm: f64,
    /// Maximum time without a pulse (timeout method).
    pub idle_timeout: Duration,
    /// Layer changes to wait before monitoring starts; 0 starts on the first.
    pub z_events_before_start: u32,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Timeout,
            distance_mm: 15.0,
            idle_timeout: Duration::from_secs(45),
            z_events_before_start: 0,
        }
    }
}

/// What happens when a stall is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseAction {
    /// Send this command line to the printer.
    Command(String),
    /// Sound the configured alarm instead of pausing.
    Alert,
}

impl Default for PauseAction {
    fn default() -> Self {
        Self::Command("M600".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineCfg {
    pub sensor: SensorCfg,
    pub detection: DetectionCfg,
    pub pause: PauseAction,
    /// Idle time after which a connection test reports "not moving".
    pub connection_test_timeout: Duration,
    /// Monitor loop tick.
    pub poll_interval: Duration,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            sensor: SensorCfg::default(),
            detection: DetectionCfg::default(),
            pause: PauseAction::default(),
            connection_test_timeout: Duration::from_secs(2),
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl EngineCfg {
    pub fn is_distance(&self) -> bool {
        self.detection.method == DetectionMethod::Distance
    }

    pub fn is_timeout(&self) -> bool {
        self.detection.method == DetectionMethod::Timeout
    }
}
