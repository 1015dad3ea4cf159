//! Host bridge: stdin commands in, pause commands and state out.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use filament_core::error::SensorError;
use filament_core::{EngineCfg, POLL_INTERVAL, PrinterEvent, SensorController, TestStatus};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::output::{HostPrinter, Output};

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Event(PrinterEvent),
    Gcode(String),
    Pulse,
    TestStart,
    TestStop,
    Status,
    Quit,
}

/// Parse one input line; `Ok(None)` for blank lines and `#` comments.
pub fn parse_command(line: &str) -> Result<Option<Command>, SensorError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let cmd = match (word.to_ascii_lowercase().as_str(), rest) {
        ("event", name) if !name.is_empty() => Command::Event(name.parse()?),
        ("gcode", text) => Command::Gcode(text.to_string()),
        ("pulse", "") => Command::Pulse,
        ("test", "start") => Command::TestStart,
        ("test", "stop") => Command::TestStop,
        ("status", "") => Command::Status,
        ("quit" | "exit", "") => Command::Quit,
        _ => return Err(SensorError::State(format!("unrecognized command '{line}'"))),
    };
    Ok(Some(cmd))
}

pub fn build_controller(
    cfg: &filament_config::Config,
    backend: &mut Backend,
    out: &Output,
) -> eyre::Result<SensorController> {
    let engine = EngineCfg::from(cfg);
    let builder = SensorController::builder()
        .with_config(engine)
        .with_printer(HostPrinter(out.clone()))
        .with_observer(Arc::new(out.observer()));
    backend.install(builder).build()
}

/// Drive the controller from `input` until `quit` or end of input.
pub fn run_bridge(
    cfg: &filament_config::Config,
    mut backend: Backend,
    out: &Output,
    input: impl BufRead,
) -> eyre::Result<()> {
    let mut ctl = build_controller(cfg, &mut backend, out)?;
    let pin = ctl.config().sensor.active_pin();
    info!(backend = backend.name, ?pin, "bridge ready");

    for (n, line) in input.lines().enumerate() {
        let line = line.wrap_err("read stdin")?;
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping input line");
                continue;
            }
        };
        debug!(?cmd, "command");
        match cmd {
            Command::Event(event) => ctl.handle_event(event)?,
            Command::Gcode(text) => {
                ctl.on_gcode_sent(&text);
            }
            Command::Pulse => match (&backend.sim, pin) {
                (Some(sim), Some(pin)) => {
                    if !sim.pulse(pin) {
                        debug!(pin, "pulse ignored; pin not subscribed");
                    }
                }
                (None, _) => warn!("pulse is only available in simulation builds"),
                (_, None) => warn!("pulse ignored; sensor inactive"),
            },
            Command::TestStart => out.test_status(ctl.start_connection_test()?)?,
            Command::TestStop => out.test_status(ctl.stop_connection_test()?)?,
            Command::Status => out.snapshot(&ctl.snapshot())?,
            Command::Quit => break,
        }
    }

    ctl.shutdown()
}

/// Print MOVING/IDLE every tick until `seconds` elapse or Ctrl-C.
pub fn connection_test(
    cfg: &filament_config::Config,
    mut backend: Backend,
    out: &Output,
    seconds: Option<u64>,
) -> eyre::Result<()> {
    // State changes are not echoed here; only the MOVING/IDLE ticks are.
    let quiet = Output::new(Box::new(std::io::sink()), false);
    let mut ctl = build_controller(cfg, &mut backend, &quiet)?;
    match ctl.start_connection_test()? {
        TestStatus::Started => {}
        TestStatus::SensorInactive => {
            return Err(SensorError::Config("sensor disabled or pin not set".into()).into());
        }
        other => return Err(SensorError::State(other.to_string()).into()),
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while !shutdown.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
        out.motion(ctl.snapshot().filament_moving)?;
        std::thread::sleep(POLL_INTERVAL);
    }

    ctl.stop_connection_test()?;
    ctl.shutdown()
}

/// Validate config and backend; report what would run.
pub fn self_check(
    cfg: &filament_config::Config,
    mut backend: Backend,
    out: &Output,
    json: bool,
) -> eyre::Result<()> {
    let quiet = Output::new(Box::new(std::io::sink()), false);
    let mut ctl = build_controller(cfg, &mut backend, &quiet)?;
    let engine = ctl.config();
    let pin = engine.sensor.active_pin();
    let method = if engine.is_distance() { "distance" } else { "timeout" };
    if json {
        out.line(
            &serde_json::json!({
                "type": "self_check",
                "status": "ok",
                "backend": backend.name,
                "pin": pin,
                "method": method,
            })
            .to_string(),
        )?;
    } else {
        let pin = pin.map_or_else(|| "none".to_string(), |p| p.to_string());
        out.line(&format!("OK backend={} pin={pin} method={method}", backend.name))?;
    }
    ctl.shutdown()
}
