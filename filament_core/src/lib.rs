#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filament motion detection engine (hardware-agnostic).
//!
//! All hardware and host interactions go through the traits in `filament_traits`:
//! a `SensorSignal` delivers pulses, a `Printer` receives the pause command and an
//! optional `Alarm` replaces the pause when the alert keyword is configured.
//!
//! ## Architecture
//!
//! - **State**: one mutex-guarded `DetectionState` with change notification (`state`)
//! - **Timeout detection**: `MotionMonitor` polling thread (`monitor`)
//! - **Distance detection**: `ExtrusionTracker` budget arithmetic (`extrusion`) fed by
//!   the outbound G-code tap (`gcode`)
//! - **Pins**: explicit ownership of sensor subscriptions (`signal`)
//! - **Control**: `SensorController` reacting to print lifecycle events (`controller`)
//!
//! ## Threads
//!
//! Pulses arrive on the signal backend's thread, the monitor loop runs on its own
//! thread and everything else on the caller's thread. Observer callbacks are made
//! after the state lock is released.

pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod events;
pub mod extrusion;
pub mod gcode;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod signal;
pub mod state;
pub mod status;
pub mod util;

pub use config::{DetectionCfg, DetectionMethod, EngineCfg, PauseAction, SensorCfg};
pub use controller::{SensorController, SensorControllerBuilder};
pub use error::{BuildError, Result, SensorError};
pub use events::PrinterEvent;
pub use extrusion::{Consumption, ExtrusionTracker};
pub use gcode::{GCode, parse_line};
pub use monitor::{MonitorKind, MotionMonitor, POLL_INTERVAL};
pub use signal::{PinBindings, PinOwner};
pub use state::{DetectionState, SharedState, StateSnapshot};
pub use status::TestStatus;
