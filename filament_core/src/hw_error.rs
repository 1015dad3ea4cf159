//! Maps `Box<dyn Error>` from trait boundaries to typed `SensorError`.
//!
//! The traits in `filament_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path for
//! `filament_hardware::HwError` downcasting.

use crate::error::SensorError;

/// Map a trait-boundary error to a typed `SensorError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SensorError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<filament_hardware::error::HwError>() {
            return match hw {
                filament_hardware::error::HwError::InvalidPin { .. } => {
                    SensorError::Config(hw.to_string())
                }
                filament_hardware::error::HwError::UnsupportedDevice(_) => {
                    SensorError::HardwareFault(hw.to_string())
                }
                other => SensorError::Hardware(other.to_string()),
            };
        }
    }

    SensorError::Hardware(e.to_string())
}
