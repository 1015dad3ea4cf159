//! `From` implementations bridging `filament_config` types to `filament_core` types.

use std::time::Duration;

use filament_traits::PinNumbering;

use crate::config::{DetectionCfg, DetectionMethod, EngineCfg, PauseAction, SensorCfg};
use crate::monitor::POLL_INTERVAL;

/// Seconds from the config file to a `Duration`; non-finite or negative values map to zero.
fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

// ── Sensor ───────────────────────────────────────────────────────────────────

/// Header numbering scheme named in the config file.
pub fn numbering(m: filament_config::PinMode) -> PinNumbering {
    match m {
        filament_config::PinMode::Board => PinNumbering::Board,
        filament_config::PinMode::Bcm => PinNumbering::Bcm,
    }
}

impl From<&filament_config::SensorCfg> for SensorCfg {
    fn from(c: &filament_config::SensorCfg) -> Self {
        Self {
            enabled: c.enabled,
            pin: c.pin,
            numbering: numbering(c.pin_mode),
        }
    }
}

// ── Detection ────────────────────────────────────────────────────────────────

impl From<filament_config::DetectionMethod> for DetectionMethod {
    fn from(m: filament_config::DetectionMethod) -> Self {
        match m {
            filament_config::DetectionMethod::Timeout => DetectionMethod::Timeout,
            filament_config::DetectionMethod::Distance => DetectionMethod::Distance,
        }
    }
}

impl From<&filament_config::DetectionCfg> for DetectionCfg {
    fn from(c: &filament_config::DetectionCfg) -> Self {
        Self {
            method: c.method.into(),
            distance_mm: c.distance_mm,
            idle_timeout: secs(c.idle_timeout_s),
            z_events_before_start: c.z_events_before_start,
        }
    }
}

// ── Pause ────────────────────────────────────────────────────────────────────

impl From<&filament_config::PauseCfg> for PauseAction {
    fn from(c: &filament_config::PauseCfg) -> Self {
        match c.alert_keyword.as_deref() {
            Some(keyword) if keyword == c.command.trim() => PauseAction::Alert,
            _ => PauseAction::Command(c.command.trim().to_string()),
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

impl From<&filament_config::Config> for EngineCfg {
    fn from(c: &filament_config::Config) -> Self {
        Self {
            sensor: (&c.sensor).into(),
            detection: (&c.detection).into(),
            pause: (&c.pause).into(),
            connection_test_timeout: secs(c.connection_test.idle_timeout_s),
            poll_interval: POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_file_config_to_engine_config() {
        let file = filament_config::load_toml(
            "[sensor]\npin = 18\npin_mode = \"board\"\n[detection]\nmethod = \"distance\"\nidle_timeout_s = 1.5\n",
        )
        .unwrap();
        let cfg = EngineCfg::from(&file);
        assert_eq!(cfg.sensor.pin, Some(18));
        assert_eq!(cfg.sensor.numbering, PinNumbering::Board);
        assert!(cfg.is_distance());
        assert_eq!(cfg.detection.idle_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.poll_interval, POLL_INTERVAL);
    }

    #[test]
    fn pin_mode_maps_to_numbering() {
        assert_eq!(numbering(filament_config::PinMode::Bcm), PinNumbering::Bcm);
        assert_eq!(numbering(filament_config::PinMode::Board), PinNumbering::Board);
    }

    #[test]
    fn alert_keyword_selects_alarm() {
        let file = filament_config::load_toml(
            "[pause]\ncommand = \"@Mu\"\nalert_keyword = \"@Mu\"\n",
        )
        .unwrap();
        assert_eq!(PauseAction::from(&file.pause), PauseAction::Alert);
    }

    #[test]
    fn keyword_without_match_keeps_command() {
        let file = filament_config::load_toml(
            "[pause]\ncommand = \"M25\"\nalert_keyword = \"@Mu\"\n",
        )
        .unwrap();
        assert_eq!(
            PauseAction::from(&file.pause),
            PauseAction::Command("M25".into())
        );
    }

    #[test]
    fn negative_seconds_map_to_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }
}
