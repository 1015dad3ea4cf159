//! Print-lifecycle driven sensor controller.
//!
//! `SensorController` owns the configuration, the shared detection state and the
//! pin bindings. Lifecycle events and outbound G-code arrive on the caller's
//! thread; pulses and monitor ticks arrive on their own threads and only ever
//! touch the parts held in [`Shared`].

use std::sync::{Arc, Mutex, PoisonError};

use eyre::WrapErr;
use filament_traits::{Alarm, MonotonicClock, Printer, SensorSignal};
use tracing::{debug, error, info, warn};

use crate::config::{EngineCfg, PauseAction};
use crate::error::{BuildError, Result, SensorError};
use crate::events::PrinterEvent;
use crate::extrusion::{Consumption, ExtrusionTracker, UNSET_POSITION, grace_expired};
use crate::gcode::{GCode, parse_line};
use crate::monitor::{
    Hook, MonitorHooks, MonitorKind, MonitorParams, MotionMonitor, SharedClock,
};
use crate::signal::{BindingId, PinBindings, PinOwner};
use crate::state::{DetectionState, SharedObserver, SharedState, StateSnapshot};
use crate::status::TestStatus;
use crate::util::round_mm;

type SharedPrinter = Arc<Mutex<Box<dyn Printer>>>;
type SharedAlarm = Arc<Mutex<Box<dyn Alarm>>>;

/// Everything the pulse and monitor threads need.
struct Shared {
    cfg: EngineCfg,
    state: SharedState,
    tracker: ExtrusionTracker,
    clock: SharedClock,
    printer: SharedPrinter,
    alarm: Option<SharedAlarm>,
}

impl Shared {
    /// Run the pause action once per stall episode.
    fn trigger_pause(&self) {
        let claimed = self.state.update(|s| {
            if s.pause_sent {
                return false;
            }
            s.pause_sent = true;
            s.filament_moving = false;
            s.extruder.last = UNSET_POSITION;
            true
        });
        if !claimed {
            return;
        }

        if let Err(e) = self.run_pause_action() {
            error!(error = %e, "pause action failed; will retry on next stall");
            self.state.update(|s| s.pause_sent = false);
        }
    }

    fn run_pause_action(&self) -> std::result::Result<(), SensorError> {
        match &self.cfg.pause {
            PauseAction::Command(command) => {
                info!(command = %command, "filament stalled; pausing print");
                self.printer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .issue_pause(command)
                    .map_err(|e| SensorError::Printer(e.to_string()))
            }
            PauseAction::Alert => {
                info!("filament stalled; sounding alarm");
                let Some(alarm) = &self.alarm else {
                    return Err(SensorError::State("no alarm configured".into()));
                };
                alarm
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .sound()
                    .map_err(|e| crate::hw_error::map_hw_error(e.as_ref()))
            }
        }
    }

    /// A genuine pulse: re-arm the pause and, in distance mode, top up the budget.
    fn on_pulse(&self) {
        let now = self.clock.now();
        let distance = self.cfg.is_distance();
        let raised = self.state.update(|s| {
            s.pause_sent = false;
            s.last_pulse_time = Some(now);
            distance && self.tracker.catch_up(s)
        });
        if raised {
            debug!(
                remaining = round_mm(self.tracker.detection_distance()),
                "pulse replenished distance budget"
            );
        }
    }

    fn consume(&self, reading: f64) {
        let outcome = self.state.update(|s| self.tracker.apply(s, reading));
        if outcome == Consumption::Exhausted {
            let last_pulse = self.state.read(|s| s.last_pulse_time);
            if grace_expired(last_pulse, self.clock.now()) {
                self.trigger_pause();
            } else {
                debug!("distance budget spent; waiting for a pulse");
            }
        }
    }
}

/// Builder for [`SensorController`]. Signal and printer are required.
#[derive(Default)]
pub struct SensorControllerBuilder {
    config: Option<EngineCfg>,
    signal: Option<Box<dyn SensorSignal>>,
    printer: Option<Box<dyn Printer>>,
    alarm: Option<Box<dyn Alarm>>,
    observer: Option<SharedObserver>,
    clock: Option<SharedClock>,
}

impl SensorControllerBuilder {
    pub fn with_config(mut self, config: EngineCfg) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_signal(mut self, signal: impl SensorSignal + 'static) -> Self {
        self.signal = Some(Box::new(signal));
        self
    }

    pub fn with_printer(mut self, printer: impl Printer + 'static) -> Self {
        self.printer = Some(Box::new(printer));
        self
    }

    pub fn with_alarm(mut self, alarm: impl Alarm + 'static) -> Self {
        self.alarm = Some(Box::new(alarm));
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<SensorController> {
        let signal = self
            .signal
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSignal))?;
        let printer = self
            .printer
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPrinter))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let cfg = self.config.unwrap_or_default();
        validate(&cfg, self.alarm.is_some())?;

        let printer: SharedPrinter = Arc::new(Mutex::new(printer));
        let alarm = self.alarm.map(|a| Arc::new(Mutex::new(a)));
        let shared = new_shared(cfg.clone(), self.observer.clone(), clock, printer, alarm);

        let mut controller = SensorController {
            shared,
            bindings: PinBindings::new(signal),
            observer: self.observer,
            print_started: false,
            z_changes: 0,
            monitor: None,
            distance_binding: None,
        };
        controller.configure(cfg)?;
        Ok(controller)
    }
}

fn validate(cfg: &EngineCfg, has_alarm: bool) -> Result<()> {
    let d = cfg.detection.distance_mm;
    if !(d.is_finite() && d > 0.0) {
        return Err(BuildError::InvalidConfig("detection distance must be > 0").into());
    }
    if cfg.detection.idle_timeout.is_zero() {
        return Err(BuildError::InvalidConfig("idle timeout must be > 0").into());
    }
    if cfg.connection_test_timeout.is_zero() {
        return Err(BuildError::InvalidConfig("connection test timeout must be > 0").into());
    }
    if cfg.poll_interval.is_zero() {
        return Err(BuildError::InvalidConfig("poll interval must be > 0").into());
    }
    match &cfg.pause {
        PauseAction::Command(c) if c.trim().is_empty() => {
            Err(BuildError::InvalidConfig("pause command must not be empty").into())
        }
        PauseAction::Alert if !has_alarm => {
            Err(BuildError::InvalidConfig("alert pause action requires an alarm").into())
        }
        _ => Ok(()),
    }
}

fn new_shared(
    cfg: EngineCfg,
    observer: Option<SharedObserver>,
    clock: SharedClock,
    printer: SharedPrinter,
    alarm: Option<SharedAlarm>,
) -> Arc<Shared> {
    let distance = cfg.detection.distance_mm;
    Arc::new(Shared {
        state: SharedState::new(DetectionState::new(distance), observer),
        tracker: ExtrusionTracker::new(distance),
        cfg,
        clock,
        printer,
        alarm,
    })
}

pub struct SensorController {
    shared: Arc<Shared>,
    bindings: PinBindings,
    observer: Option<SharedObserver>,
    print_started: bool,
    z_changes: u32,
    monitor: Option<MotionMonitor>,
    distance_binding: Option<BindingId>,
}

impl std::fmt::Debug for SensorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorController")
            .field("config", &self.shared.cfg)
            .field("state", &self.shared.state)
            .field("print_started", &self.print_started)
            .field("z_changes", &self.z_changes)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl SensorController {
    pub fn builder() -> SensorControllerBuilder {
        SensorControllerBuilder::default()
    }

    /// Apply a new configuration: stop monitoring, rebuild the state and, in
    /// distance mode, bind the sensor pin to the budget replenisher.
    pub fn configure(&mut self, cfg: EngineCfg) -> Result<()> {
        validate(&cfg, self.shared.alarm.is_some())?;
        self.stop_monitor();
        if let Some(id) = self.distance_binding.take() {
            self.bindings.release(id)?;
        }

        self.shared = new_shared(
            cfg,
            self.observer.clone(),
            self.shared.clock.clone(),
            self.shared.printer.clone(),
            self.shared.alarm.clone(),
        );
        self.z_changes = 0;
        self.shared.state.publish();

        let cfg = &self.shared.cfg;
        info!(
            method = ?cfg.detection.method,
            pin = ?cfg.sensor.active_pin(),
            distance_mm = cfg.detection.distance_mm,
            idle_timeout_ms = crate::util::millis(cfg.detection.idle_timeout),
            "sensor configured"
        );
        self.bind_distance()
    }

    fn bind_distance(&mut self) -> Result<()> {
        if !self.shared.cfg.is_distance() {
            return Ok(());
        }
        let Some(pin) = self.shared.cfg.sensor.active_pin() else {
            return Ok(());
        };
        let shared = self.shared.clone();
        let id = self
            .bindings
            .bind(pin, PinOwner::DistanceTracker, Box::new(move || shared.on_pulse()))
            .wrap_err("failed to bind sensor pin for distance detection")?;
        self.distance_binding = Some(id);
        Ok(())
    }

    pub fn handle_event(&mut self, event: PrinterEvent) -> Result<()> {
        debug!(%event, "printer event");
        match event {
            PrinterEvent::PrintStarted => {
                if self.connection_test_running() {
                    self.stop_connection_test()?;
                }
                self.print_started = true;
                self.z_changes = 0;
                if self.shared.cfg.is_distance() {
                    let tracker = self.shared.tracker;
                    self.shared.state.update(|s| tracker.init(s));
                }
            }
            PrinterEvent::PrintResumed => {
                self.print_started = true;
                if self.shared.cfg.is_distance() {
                    let tracker = self.shared.tracker;
                    self.shared.state.update(|s| tracker.reset_remaining(s));
                }
                self.sensor_start()?;
            }
            PrinterEvent::ZChange => {
                if self.print_started {
                    if self.z_changes < self.shared.cfg.detection.z_events_before_start {
                        self.z_changes += 1;
                        debug!(z_changes = self.z_changes, "waiting for more layer changes");
                    } else if self.sensor_start()? {
                        self.print_started = false;
                    } else {
                        debug!("monitoring declined; retrying on next layer change");
                    }
                }
            }
            PrinterEvent::UserSessionResumed => self.shared.state.publish(),
            e if e.ends_print() => {
                self.print_started = false;
                if self.shared.cfg.is_timeout() && self.shared.cfg.sensor.active_pin().is_some() {
                    self.stop_production_monitor();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Begin monitoring for the current print.
    ///
    /// A no-op when the sensor is disabled or unwired. In timeout mode this starts
    /// the motion monitor unless one is already running. Returns false when a
    /// connection test holds the pin and monitoring was not started.
    pub fn sensor_start(&mut self) -> Result<bool> {
        let Some(pin) = self.shared.cfg.sensor.active_pin() else {
            debug!("sensor inactive; not starting");
            return Ok(true);
        };

        if self.shared.cfg.is_distance() {
            info!(pin, "distance detection active");
        } else {
            match self.monitor.as_ref().filter(|m| m.is_running()).map(MotionMonitor::kind) {
                Some(MonitorKind::Production) => debug!(pin, "motion monitor already running"),
                Some(MonitorKind::ConnectionTest) => {
                    warn!(pin, "connection test running; not starting print monitoring");
                    return Ok(false);
                }
                None => {
                    let shared_pulse = self.shared.clone();
                    let shared_stall = self.shared.clone();
                    self.start_monitor(
                        MonitorKind::Production,
                        self.shared.cfg.detection.idle_timeout,
                        MonitorHooks {
                            on_pulse: Box::new(move || shared_pulse.on_pulse()),
                            on_stall: Box::new(move || shared_stall.trigger_pause()),
                        },
                    )?;
                }
            }
        }

        self.shared.state.update(|s| {
            s.pause_sent = false;
            s.filament_moving = true;
        });
        Ok(true)
    }

    fn start_monitor(
        &mut self,
        kind: MonitorKind,
        idle_timeout: std::time::Duration,
        hooks: MonitorHooks,
    ) -> Result<()> {
        let Some(pin) = self.shared.cfg.sensor.active_pin() else {
            return Ok(());
        };
        self.stop_monitor();
        let params = MonitorParams {
            kind,
            pin,
            idle_timeout,
            poll_interval: self.shared.cfg.poll_interval,
        };
        let monitor = MotionMonitor::start(
            params,
            &self.bindings,
            self.shared.state.clone(),
            self.shared.clock.clone(),
            hooks,
        )?;
        // The monitor's binding supersedes the distance one on the same pin.
        self.distance_binding = None;
        self.monitor = Some(monitor);
        Ok(())
    }

    fn stop_monitor(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    fn stop_production_monitor(&mut self) {
        if self.monitor_kind() == Some(MonitorKind::Production) {
            self.stop_monitor();
        }
    }

    fn connection_test_running(&self) -> bool {
        self.monitor_kind() == Some(MonitorKind::ConnectionTest)
    }

    /// Kind of the monitor currently held, if any.
    pub fn monitor_kind(&self) -> Option<MonitorKind> {
        self.monitor.as_ref().map(MotionMonitor::kind)
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(MotionMonitor::is_running)
    }

    pub fn start_connection_test(&mut self) -> Result<TestStatus> {
        if self.shared.cfg.sensor.active_pin().is_none() {
            return Ok(TestStatus::SensorInactive);
        }
        match self.monitor_kind() {
            Some(MonitorKind::ConnectionTest) => return Ok(TestStatus::AlreadyRunning),
            Some(MonitorKind::Production) if self.is_monitoring() => {
                return Ok(TestStatus::MonitorBusy);
            }
            _ => {}
        }

        self.shared.state.update(|s| s.connection_test_active = true);
        let stall_state = self.shared.state.clone();
        let on_pulse: Hook = Box::new(|| {});
        let result = self.start_monitor(
            MonitorKind::ConnectionTest,
            self.shared.cfg.connection_test_timeout,
            MonitorHooks {
                on_pulse,
                on_stall: Box::new(move || stall_state.update(|s| s.filament_moving = false)),
            },
        );
        if let Err(e) = result {
            self.shared.state.update(|s| s.connection_test_active = false);
            return Err(e.wrap_err("failed to start connection test"));
        }
        info!("connection test started");
        Ok(TestStatus::Started)
    }

    pub fn stop_connection_test(&mut self) -> Result<TestStatus> {
        if !self.connection_test_running() {
            return Ok(TestStatus::NotRunning);
        }
        self.stop_monitor();
        self.shared.state.update(|s| s.connection_test_active = false);
        self.bind_distance()?;
        info!("connection test stopped");
        Ok(TestStatus::Stopped)
    }

    /// Observe one outbound G-code line. The line is returned unchanged.
    pub fn on_gcode_sent<'a>(&self, line: &'a str) -> &'a str {
        if !self.shared.cfg.is_distance() || self.shared.cfg.sensor.active_pin().is_none() {
            return line;
        }
        let tracker = self.shared.tracker;
        match parse_line(line) {
            GCode::Move { extrusions } => {
                for reading in extrusions {
                    self.shared.consume(reading);
                }
            }
            GCode::SetPosition => self.shared.state.update(|s| tracker.init(s)),
            GCode::AbsoluteExtrusion => self.shared.state.update(|s| {
                s.absolute_extrusion = true;
                s.extruder.last = 0.0;
            }),
            GCode::RelativeExtrusion => self.shared.state.update(|s| {
                s.absolute_extrusion = false;
                s.extruder.last = 0.0;
            }),
            GCode::Other => {}
        }
        line
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.shared.state.snapshot()
    }

    pub fn config(&self) -> &EngineCfg {
        &self.shared.cfg
    }

    pub fn print_started(&self) -> bool {
        self.print_started
    }

    pub fn z_changes(&self) -> u32 {
        self.z_changes
    }

    /// True while a pause has been issued and no pulse has arrived since.
    pub fn pause_pending(&self) -> bool {
        self.shared.state.read(|s| s.pause_sent)
    }

    /// Stop monitoring and release every pin.
    pub fn shutdown(&mut self) -> Result<()> {
        self.stop_monitor();
        self.distance_binding = None;
        self.bindings.release_all()?;
        info!("sensor controller shut down");
        Ok(())
    }
}

impl Drop for SensorController {
    fn drop(&mut self) {
        self.stop_monitor();
        if let Err(e) = self.bindings.release_all() {
            warn!(error = %e, "failed to release pins on drop");
        }
    }
}
