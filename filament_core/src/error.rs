use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SensorError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("printer error: {0}")]
    Printer(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor signal")]
    MissingSignal,
    #[error("missing printer")]
    MissingPrinter,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
