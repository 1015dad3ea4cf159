//! Outcomes of operator commands.

use serde::Serialize;

/// Result of a connection-test start/stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Started,
    Stopped,
    /// A connection test is already running; nothing changed.
    AlreadyRunning,
    /// No connection test was running; nothing changed.
    NotRunning,
    /// A production monitor owns the pin.
    MonitorBusy,
    /// Sensor disabled or pin unset.
    SensorInactive,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestStatus::Started => "connection test started",
            TestStatus::Stopped => "connection test stopped",
            TestStatus::AlreadyRunning => "connection test already running",
            TestStatus::NotRunning => "connection test not running",
            TestStatus::MonitorBusy => "sensor is being monitored by a print",
            TestStatus::SensorInactive => "sensor disabled or not configured",
        };
        f.write_str(s)
    }
}
