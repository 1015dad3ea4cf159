//! rppal-backed GPIO signal and alarm.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use filament_traits::{Alarm, BoxError, Edge, PinNumbering, PulseCallback, SensorSignal};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use rppal::system::DeviceInfo;
use tracing::{debug, info, warn};

use crate::board::to_bcm;
use crate::error::{HwError, Result};

fn trigger_for(edge: Edge) -> Trigger {
    match edge {
        Edge::Rising => Trigger::RisingEdge,
        Edge::Falling => Trigger::FallingEdge,
        Edge::Both => Trigger::Both,
    }
}

/// Open the GPIO peripheral, failing loudly on boards the driver does not know.
fn open_gpio() -> Result<Gpio> {
    let device = DeviceInfo::new().map_err(|e| HwError::UnsupportedDevice(e.to_string()))?;
    info!(model = %device.model(), soc = %device.soc(), "gpio device detected");
    Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

/// Motion sensor input with asynchronous edge interrupts.
pub struct GpioSignal {
    gpio: Gpio,
    numbering: PinNumbering,
    // Keyed by the configured pin number, not the resolved BCM channel.
    inputs: HashMap<u8, InputPin>,
}

impl GpioSignal {
    pub fn new(numbering: PinNumbering) -> Result<Self> {
        let gpio = open_gpio()?;
        Ok(Self {
            gpio,
            numbering,
            inputs: HashMap::new(),
        })
    }

    fn open_input(&self, pin: u8) -> Result<InputPin> {
        let bcm = to_bcm(pin, self.numbering)?;
        let input = self
            .gpio
            .get(bcm)
            .map_err(|e| HwError::Gpio(format!("open sensor pin {pin} (bcm {bcm}): {e}")))?
            .into_input();
        Ok(input)
    }
}

impl SensorSignal for GpioSignal {
    fn subscribe(&mut self, pin: u8, edge: Edge, mut callback: PulseCallback) -> std::result::Result<(), BoxError> {
        if let Some(mut stale) = self.inputs.remove(&pin) {
            let _ = stale.clear_async_interrupt();
        }
        let mut input = self.open_input(pin)?;
        input
            .set_async_interrupt(trigger_for(edge), move |_level: Level| callback())
            .map_err(|e| HwError::Gpio(format!("edge detect on pin {pin}: {e}")))?;
        debug!(pin, ?edge, numbering = ?self.numbering, "gpio subscribe");
        self.inputs.insert(pin, input);
        Ok(())
    }

    fn unsubscribe(&mut self, pin: u8) -> std::result::Result<bool, BoxError> {
        match self.inputs.remove(&pin) {
            Some(mut input) => {
                input
                    .clear_async_interrupt()
                    .map_err(|e| HwError::Gpio(format!("clear edge detect on pin {pin}: {e}")))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Buzzer or lamp on an output pin, toggled on a background thread.
pub struct GpioAlarm {
    pin: Arc<Mutex<OutputPin>>,
    cycles: u32,
    on: Duration,
    off: Duration,
    sounding: Arc<AtomicBool>,
}

impl GpioAlarm {
    pub fn new(pin: u8, numbering: PinNumbering, cycles: u32, on: Duration, off: Duration) -> Result<Self> {
        let gpio = open_gpio()?;
        let bcm = to_bcm(pin, numbering)?;
        let mut out = gpio
            .get(bcm)
            .map_err(|e| HwError::Gpio(format!("open alarm pin {pin} (bcm {bcm}): {e}")))?
            .into_output();
        out.set_low();
        Ok(Self {
            pin: Arc::new(Mutex::new(out)),
            cycles,
            on,
            off,
            sounding: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Alarm for GpioAlarm {
    fn sound(&mut self) -> std::result::Result<(), BoxError> {
        if self.sounding.swap(true, Ordering::AcqRel) {
            warn!("alarm already sounding");
            return Ok(());
        }
        let pin = self.pin.clone();
        let sounding = self.sounding.clone();
        let (cycles, on, off) = (self.cycles, self.on, self.off);
        std::thread::Builder::new()
            .name("filament-alarm".into())
            .spawn(move || {
                for _ in 0..cycles {
                    if let Ok(mut p) = pin.lock() {
                        p.set_high();
                    }
                    std::thread::sleep(on);
                    if let Ok(mut p) = pin.lock() {
                        p.set_low();
                    }
                    std::thread::sleep(off);
                }
                sounding.store(false, Ordering::Release);
            })
            .map_err(|e| {
                self.sounding.store(false, Ordering::Release);
                HwError::from(e)
            })?;
        Ok(())
    }
}
