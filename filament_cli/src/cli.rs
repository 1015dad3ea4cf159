//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "filament-sensor",
    version,
    about = "Filament motion sensor bridge"
)]
pub struct Cli {
    /// Path to config TOML; built-in defaults are used when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines (state, errors, logs) instead of plain text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides RUST_LOG
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read printer events and G-code from stdin, write pause commands to stdout
    #[command(
        long_about = "Read newline-delimited commands on stdin:\n  event <name>   print_started, print_resumed, print_paused, print_done,\n                 print_failed, print_cancelled, error, z_change, user_session_resumed\n  gcode <line>   one outbound G-code line\n  pulse          inject a sensor pulse (simulation builds only)\n  test start     start a connection test\n  test stop      stop the connection test\n  status         print the current state\n  quit           stop and exit\n\nPause commands are written to stdout as `send <command>`."
    )]
    Run,
    /// Watch the sensor and print MOVING/IDLE every tick
    ConnectionTest {
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long, value_name = "N")]
        seconds: Option<u64>,
    },
    /// Validate the config and open the signal backend
    SelfCheck,
}
