//! Seams between the detection engine and the outside world.
//!
//! Everything hardware- or host-specific sits behind one of these traits so the
//! core can run against GPIO on a Raspberry Pi, an in-memory simulation, or test spies.
pub mod clock;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "test-clock"))]
pub use clock::TestClock;

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked once per detected edge on a subscribed pin.
pub type PulseCallback = Box<dyn FnMut() + Send + 'static>;

/// Which transitions of a digital input produce a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    Rising,
    Falling,
    #[default]
    Both,
}

/// How pin numbers in the configuration are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinNumbering {
    /// Physical position on the 40-pin header.
    Board,
    /// Broadcom SoC channel number.
    #[default]
    Bcm,
}

/// Edge-triggered digital input.
///
/// Implementations deliver pulses on their own thread. Debouncing is left to the
/// physical layer.
pub trait SensorSignal: Send {
    /// Register `callback` for transitions on `pin`. Any existing subscription on
    /// the same pin is replaced.
    fn subscribe(&mut self, pin: u8, edge: Edge, callback: PulseCallback) -> Result<(), BoxError>;

    /// Remove the subscription on `pin`. Returns `Ok(false)` when nothing was subscribed.
    fn unsubscribe(&mut self, pin: u8) -> Result<bool, BoxError>;
}

/// Outbound channel to the printer.
pub trait Printer: Send {
    /// Send a literal command line (e.g. `M600`) to the printer.
    fn issue_pause(&mut self, command: &str) -> Result<(), BoxError>;
}

/// Alternate pause action (buzzer, light, ...). Must not block the caller for long.
pub trait Alarm: Send {
    fn sound(&mut self) -> Result<(), BoxError>;
}

/// Receives a fresh snapshot whenever the detection state changes.
pub trait StateObserver<S>: Send + Sync {
    fn state_changed(&self, snapshot: &S) -> Result<(), BoxError>;
}

impl<S, F> StateObserver<S> for F
where
    F: Fn(&S) -> Result<(), BoxError> + Send + Sync,
{
    fn state_changed(&self, snapshot: &S) -> Result<(), BoxError> {
        self(snapshot)
    }
}
