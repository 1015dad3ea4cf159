mod backend;
mod cli;
mod error_fmt;
mod output;
mod run;

use clap::Parser;
use eyre::Result;
use filament_core::error::SensorError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::backend::Backend;
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::output::Output;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let code = match real_main(cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;
    init_tracing(&cli, &cfg.logging);

    let backend = Backend::open(&cfg)?;
    let out = Output::stdout(cli.json);
    match cli.cmd {
        Commands::Run => {
            let stdin = std::io::stdin();
            run::run_bridge(&cfg, backend, &out, stdin.lock())
        }
        Commands::ConnectionTest { seconds } => run::connection_test(&cfg, backend, &out, seconds),
        Commands::SelfCheck => run::self_check(&cfg, backend, &out, cli.json),
    }
}

/// Read and validate the config; every failure here is a configuration error.
fn load_config(cli: &Cli) -> Result<filament_config::Config> {
    let cfg = match &cli.config {
        Some(path) => filament_config::load_file(path)
            .map_err(|e| SensorError::Config(format!("{e:#}")))?,
        None => filament_config::Config::default(),
    };
    cfg.validate()
        .map_err(|e| SensorError::Config(format!("invalid configuration: {e:#}")))?;
    Ok(cfg)
}

/// Console logs on stderr (pretty or JSON) plus an optional JSON file sink.
///
/// Level precedence: `--log-level`, then `RUST_LOG`, then `[logging] level`, then `info`.
fn init_tracing(cli: &Cli, logging: &filament_config::Logging) {
    let filter = match (&cli.log_level, EnvFilter::try_from_default_env()) {
        (Some(level), _) => EnvFilter::new(level),
        (None, Ok(env)) => env,
        (None, Err(_)) => EnvFilter::new(logging.level.as_deref().unwrap_or("info")),
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if cli.json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(path) = logging.file.as_deref() {
        let path = std::path::Path::new(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "filament-sensor.log".into(), |n| n.to_os_string());
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}
