//! Human-readable error descriptions and structured JSON error formatting.

use filament_core::error::{BuildError, SensorError};

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_HARDWARE: i32 = 3;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSignal => {
                "What happened: No sensor signal was provided to the controller.\nLikely causes: The GPIO backend failed to initialize or was not wired into the builder.\nHow to fix: Ensure the signal backend is created successfully and passed via with_signal(...).".to_string()
            }
            BuildError::MissingPrinter => {
                "What happened: No printer channel was provided to the controller.\nLikely causes: The bridge was not wired into the builder.\nHow to fix: Pass a printer via with_printer(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `filament-sensor self-check`."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SensorError>() {
        return match se {
            SensorError::Config(msg) => format!(
                "What happened: Configuration is invalid ({msg}).\nLikely causes: A typo in the TOML, a pin outside the header, or a non-positive distance/timeout.\nHow to fix: Edit the config file, then rerun `filament-sensor self-check`."
            ),
            SensorError::HardwareFault(msg) => format!(
                "What happened: The GPIO library does not support this device ({msg}).\nLikely causes: Not running on a Raspberry Pi, or the GPIO library is too old for this board.\nHow to fix: Run on a supported board or rebuild without the `hardware` feature to simulate."
            ),
            SensorError::Hardware(msg) => format!(
                "What happened: Failed to access the sensor hardware ({msg}).\nLikely causes: Wrong pin number, pin already in use, or missing GPIO permissions.\nHow to fix: Check [sensor] pin and pin_mode; ensure the process may access /dev/gpiomem."
            ),
            SensorError::Printer(msg) => format!(
                "What happened: Could not send the pause command ({msg}).\nLikely causes: stdout was closed by the host.\nHow to fix: Restart the bridge from the printer host."
            ),
            SensorError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Check the path. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration problems, 3 for hardware init, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<SensorError>() {
        Some(SensorError::Config(_)) => EXIT_CONFIG,
        Some(SensorError::Hardware(_) | SensorError::HardwareFault(_)) => EXIT_HARDWARE,
        _ => EXIT_FAILURE,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSignal => "MissingSignal",
            BuildError::MissingPrinter => "MissingPrinter",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    match err.downcast_ref::<SensorError>() {
        Some(SensorError::Config(_)) => "Config",
        Some(SensorError::Hardware(_)) => "Hardware",
        Some(SensorError::HardwareFault(_)) => "HardwareFault",
        Some(SensorError::Printer(_)) => "Printer",
        Some(SensorError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "type": "error",
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
