//! Signal and alarm backend selection: GPIO with the `hardware` feature on Linux,
//! in-memory simulation otherwise.

use filament_core::SensorControllerBuilder;
use filament_core::conversions::numbering;
#[cfg(all(feature = "hardware", target_os = "linux"))]
use filament_core::hw_error::map_hw_error;
use filament_traits::PinNumbering;

use filament_hardware::{SimulatedAlarm, SimulatedSignal};

pub struct Backend {
    pub name: &'static str,
    /// Handle for injecting pulses; `None` on real hardware.
    pub sim: Option<SimulatedSignal>,
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    gpio: Option<(
        filament_hardware::gpio::GpioSignal,
        Option<filament_hardware::gpio::GpioAlarm>,
    )>,
}

impl Backend {
    /// Open the backend for this build. Hardware failures map to `SensorError`.
    pub fn open(cfg: &filament_config::Config) -> eyre::Result<Self> {
        let numbering: PinNumbering = numbering(cfg.sensor.pin_mode);

        #[cfg(all(feature = "hardware", target_os = "linux"))]
        {
            use filament_hardware::gpio::{GpioAlarm, GpioSignal};
            use std::time::Duration;

            let signal = GpioSignal::new(numbering).map_err(|e| map_hw_error(&e))?;
            let alarm = match cfg.alarm.pin {
                Some(pin) => Some(
                    GpioAlarm::new(
                        pin,
                        numbering,
                        cfg.alarm.cycles,
                        Duration::from_millis(cfg.alarm.on_ms),
                        Duration::from_millis(cfg.alarm.off_ms),
                    )
                    .map_err(|e| map_hw_error(&e))?,
                ),
                None => None,
            };
            tracing::info!(?numbering, alarm = alarm.is_some(), "gpio backend ready");
            Ok(Self {
                name: "gpio",
                sim: None,
                gpio: Some((signal, alarm)),
            })
        }
        #[cfg(not(all(feature = "hardware", target_os = "linux")))]
        {
            tracing::info!(?numbering, "simulated backend ready");
            Ok(Self {
                name: "simulated",
                sim: Some(SimulatedSignal::new()),
            })
        }
    }

    /// Hand the signal (and alarm, when there is one) to the controller builder.
    pub fn install(&mut self, builder: SensorControllerBuilder) -> SensorControllerBuilder {
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        if let Some((signal, alarm)) = self.gpio.take() {
            let builder = builder.with_signal(signal);
            return match alarm {
                Some(alarm) => builder.with_alarm(alarm),
                None => builder,
            };
        }
        match &self.sim {
            Some(sim) => builder
                .with_signal(sim.clone())
                .with_alarm(SimulatedAlarm::new()),
            None => builder,
        }
    }
}
