use filament_traits::PinNumbering;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),
    #[error("pin {pin} is not a usable GPIO in {numbering:?} numbering")]
    InvalidPin { pin: u8, numbering: PinNumbering },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
