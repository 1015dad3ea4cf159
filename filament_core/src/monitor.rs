//! Idle-timeout motion monitor.
//!
//! Binds the sensor pin, then runs a polling thread that compares the time since
//! the last pulse against the idle timeout on every tick. Past the timeout the
//! stall hook fires on every tick until the monitor is stopped or a pulse arrives.
//!
//! Each `MotionMonitor` owns exactly one thread. `stop()` (and `Drop`) set the
//! stop flag and join, so when it returns the loop has exited and released its pin.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use filament_traits::Clock;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::signal::{PinBindings, PinOwner};
use crate::state::SharedState;
use crate::util::millis;

/// Fixed polling interval of the monitor loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub type Hook = Box<dyn Fn() + Send + Sync>;
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    /// Stalls pause the print.
    Production,
    /// Stalls only report "not moving".
    ConnectionTest,
}

impl MonitorKind {
    fn thread_name(self) -> &'static str {
        match self {
            MonitorKind::Production => "filament-monitor",
            MonitorKind::ConnectionTest => "connection-test",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorParams {
    pub kind: MonitorKind,
    pub pin: u8,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
}

/// Callbacks run by the monitor.
pub struct MonitorHooks {
    /// Runs on the signal thread after the pulse has been recorded.
    pub on_pulse: Hook,
    /// Runs on the monitor thread on every tick past the idle timeout.
    pub on_stall: Hook,
}

pub struct MotionMonitor {
    params: MonitorParams,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MotionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionMonitor")
            .field("params", &self.params)
            .field("running", &self.is_running())
            .finish()
    }
}

impl MotionMonitor {
    pub fn start(
        params: MonitorParams,
        bindings: &PinBindings,
        state: SharedState,
        clock: SharedClock,
        hooks: MonitorHooks,
    ) -> Result<Self> {
        let MonitorHooks { on_pulse, on_stall } = hooks;
        let MonitorParams {
            kind,
            pin,
            idle_timeout,
            poll_interval,
        } = params;

        let started = clock.now();
        state.update(|s| s.last_pulse_time = Some(started));

        let pulse_state = state.clone();
        let pulse_clock = clock.clone();
        let binding = bindings.bind(
            pin,
            PinOwner::Monitor(kind),
            Box::new(move || {
                let now = pulse_clock.now();
                pulse_state.update(|s| {
                    s.last_pulse_time = Some(now);
                    s.filament_moving = true;
                });
                trace!(pin, "motion detected");
                on_pulse();
            }),
        )?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_loop = shutdown.clone();
        let loop_bindings = bindings.clone();
        let spawned = std::thread::Builder::new()
            .name(kind.thread_name().into())
            .spawn(move || {
                loop {
                    if shutdown_loop.load(Ordering::Acquire) {
                        debug!(pin, ?kind, "monitor received stop signal");
                        break;
                    }

                    let last = state.read(|s| s.last_pulse_time);
                    let elapsed = last.map_or(Duration::ZERO, |t| clock.elapsed_since(t));
                    if elapsed > idle_timeout {
                        debug!(pin, ?kind, elapsed_ms = millis(elapsed), "no motion");
                        on_stall();
                    }

                    // Check again before sleeping to avoid an extra tick of latency
                    if shutdown_loop.load(Ordering::Acquire) {
                        break;
                    }
                    clock.sleep(poll_interval);
                }
                if let Err(e) = loop_bindings.release(binding) {
                    warn!(pin, error = %e, "failed to release sensor pin");
                }
                trace!(pin, ?kind, "monitor thread exiting cleanly");
            });

        let join_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let _ = bindings.release(binding);
                return Err(e.into());
            }
        };

        info!(
            pin,
            ?kind,
            idle_timeout_ms = millis(idle_timeout),
            "motion monitor started"
        );
        Ok(Self {
            params,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn kind(&self) -> MonitorKind {
        self.params.kind
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait (at most about one tick) for it to release the pin.
    ///
    /// Called from the monitor's own thread this only raises the flag.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            debug!("monitor stop requested from its own thread; not joining");
            return;
        }
        match handle.join() {
            Ok(()) => info!(pin = self.params.pin, kind = ?self.params.kind, "motion monitor stopped"),
            Err(e) => warn!(?e, "monitor thread panicked during shutdown"),
        }
    }
}

impl Drop for MotionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
