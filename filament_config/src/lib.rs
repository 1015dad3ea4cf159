#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the filament motion sensor.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Every section has defaults, so an empty file is a usable (timeout mode, BCM 24) setup.
//! - A negative sensor pin means "unset"; the engine then stays idle instead of failing.
use serde::Deserialize;
use serde::de::{self, Deserializer};
use std::path::Path;

/// Highest BCM channel on the 40-pin header.
const MAX_BCM_PIN: u8 = 27;
/// Number of positions on the 40-pin header.
const BOARD_PINS: u8 = 40;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    Board,
    #[default]
    Bcm,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    #[default]
    Timeout,
    Distance,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    pub enabled: bool,
    /// Sensor input pin; negative or absent disables the sensor.
    #[serde(deserialize_with = "de_optional_pin")]
    pub pin: Option<u8>,
    pub pin_mode: PinMode,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            pin: Some(24),
            pin_mode: PinMode::Bcm,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetectionCfg {
    pub method: DetectionMethod,
    /// Filament length (mm) that may be extruded without a sensor pulse.
    pub distance_mm: f64,
    /// Seconds without a pulse before the print is paused (timeout method).
    #[serde(alias = "max_idle_s")]
    pub idle_timeout_s: f64,
    /// Layer changes to skip before monitoring starts; 0 starts on the first one.
    pub z_events_before_start: u32,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Timeout,
            distance_mm: 15.0,
            idle_timeout_s: 45.0,
            z_events_before_start: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PauseCfg {
    /// Command sent to the printer on a stall.
    pub command: String,
    /// When `command` equals this keyword the alarm sounds instead of pausing.
    pub alert_keyword: Option<String>,
}

impl Default for PauseCfg {
    fn default() -> Self {
        Self {
            command: "M600".to_string(),
            alert_keyword: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConnectionTestCfg {
    /// Idle time after which the test reports "not moving".
    pub idle_timeout_s: f64,
}

impl Default for ConnectionTestCfg {
    fn default() -> Self {
        Self { idle_timeout_s: 2.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlarmCfg {
    /// Output pin driving a buzzer or lamp (same numbering as the sensor).
    pub pin: Option<u8>,
    pub cycles: u32,
    pub on_ms: u64,
    pub off_ms: u64,
}

impl Default for AlarmCfg {
    fn default() -> Self {
        Self {
            pin: None,
            cycles: 25,
            on_ms: 2000,
            off_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorCfg,
    pub detection: DetectionCfg,
    pub pause: PauseCfg,
    pub connection_test: ConnectionTestCfg,
    pub alarm: AlarmCfg,
    pub logging: Logging,
}

fn de_optional_pin<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<i64> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(n) if n < 0 => Ok(None),
        Some(n) => u8::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("pin {n} is out of range"))),
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration in {:?}: {}", path, e))
}

fn check_pin(section: &str, pin: u8, mode: PinMode) -> eyre::Result<()> {
    match mode {
        PinMode::Bcm if pin > MAX_BCM_PIN => {
            eyre::bail!("{section}.pin {pin} is not a BCM GPIO (0..={MAX_BCM_PIN})")
        }
        PinMode::Board if pin == 0 || pin > BOARD_PINS => {
            eyre::bail!("{section}.pin {pin} is not a header position (1..={BOARD_PINS})")
        }
        _ => Ok(()),
    }
}

impl Config {
    /// True when the sensor is enabled and has a pin to watch.
    pub fn sensor_active(&self) -> bool {
        self.sensor.enabled && self.sensor.pin.is_some()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if let Some(pin) = self.sensor.pin {
            check_pin("sensor", pin, self.sensor.pin_mode)?;
        }

        // Detection
        if !(self.detection.distance_mm.is_finite() && self.detection.distance_mm > 0.0) {
            eyre::bail!("detection.distance_mm must be > 0");
        }
        if !(self.detection.idle_timeout_s.is_finite() && self.detection.idle_timeout_s > 0.0) {
            eyre::bail!("detection.idle_timeout_s must be > 0");
        }
        if self.detection.idle_timeout_s > 24.0 * 60.0 * 60.0 {
            eyre::bail!("detection.idle_timeout_s is unreasonably large (>24h)");
        }
        if self.detection.z_events_before_start > 10_000 {
            eyre::bail!("detection.z_events_before_start is unreasonably large (>10000)");
        }

        // Pause
        if self.pause.command.trim().is_empty() {
            eyre::bail!("pause.command must not be empty");
        }
        if let Some(keyword) = &self.pause.alert_keyword
            && keyword.trim().is_empty()
        {
            eyre::bail!("pause.alert_keyword must not be empty when set");
        }

        // Connection test
        if !(self.connection_test.idle_timeout_s.is_finite()
            && self.connection_test.idle_timeout_s > 0.0)
        {
            eyre::bail!("connection_test.idle_timeout_s must be > 0");
        }

        // Alarm
        if let Some(pin) = self.alarm.pin {
            check_pin("alarm", pin, self.sensor.pin_mode)?;
            if Some(pin) == self.sensor.pin {
                eyre::bail!("alarm.pin must differ from sensor.pin");
            }
        }
        if self.alarm.cycles == 0 {
            eyre::bail!("alarm.cycles must be >= 1");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_plugin_defaults() {
        let cfg = load_toml("").expect("parse");
        assert!(cfg.sensor.enabled);
        assert_eq!(cfg.sensor.pin, Some(24));
        assert_eq!(cfg.sensor.pin_mode, PinMode::Bcm);
        assert_eq!(cfg.detection.method, DetectionMethod::Timeout);
        assert_eq!(cfg.detection.distance_mm, 15.0);
        assert_eq!(cfg.detection.idle_timeout_s, 45.0);
        assert_eq!(cfg.pause.command, "M600");
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn negative_pin_means_unset() {
        let cfg = load_toml("[sensor]\npin = -1\n").expect("parse");
        assert_eq!(cfg.sensor.pin, None);
        assert!(!cfg.sensor_active());
        cfg.validate().expect("unset pin is allowed");
    }

    #[test]
    fn huge_pin_is_a_parse_error() {
        assert!(load_toml("[sensor]\npin = 300\n").is_err());
    }
}
