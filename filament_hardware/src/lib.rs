//! Signal and alarm backends for the filament sensor.
//!
//! The simulated backends are always available; the rppal-backed GPIO backends
//! are compiled with the `hardware` feature on Linux.
pub mod board;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use filament_traits::{Alarm, BoxError, Edge, PulseCallback, SensorSignal};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type SharedCallback = Arc<Mutex<PulseCallback>>;

/// In-memory edge source. Pulses are injected with [`SimulatedSignal::pulse`].
///
/// Clones share the same subscription table, so a test can keep one handle to
/// fire pulses while the engine owns another.
#[derive(Clone, Default)]
pub struct SimulatedSignal {
    subscriptions: Arc<Mutex<HashMap<u8, (Edge, SharedCallback)>>>,
}

impl SimulatedSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one transition on `pin`. Returns false when nothing is subscribed.
    pub fn pulse(&self, pin: u8) -> bool {
        // Clone the callback out so it runs without the table lock held.
        let callback = match self.subscriptions.lock() {
            Ok(table) => table.get(&pin).map(|(_, cb)| cb.clone()),
            Err(_) => None,
        };
        match callback {
            Some(cb) => {
                if let Ok(mut f) = cb.lock() {
                    f();
                }
                tracing::trace!(pin, "simulated pulse");
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, pin: u8) -> bool {
        self.subscriptions
            .lock()
            .map(|t| t.contains_key(&pin))
            .unwrap_or(false)
    }

    pub fn edge(&self, pin: u8) -> Option<Edge> {
        self.subscriptions
            .lock()
            .ok()
            .and_then(|t| t.get(&pin).map(|(edge, _)| *edge))
    }
}

impl SensorSignal for SimulatedSignal {
    fn subscribe(&mut self, pin: u8, edge: Edge, callback: PulseCallback) -> Result<(), BoxError> {
        let mut table = self
            .subscriptions
            .lock()
            .map_err(|_| error::HwError::Gpio("simulated signal poisoned".into()))?;
        table.insert(pin, (edge, Arc::new(Mutex::new(callback))));
        tracing::debug!(pin, ?edge, "simulated subscribe");
        Ok(())
    }

    fn unsubscribe(&mut self, pin: u8) -> Result<bool, BoxError> {
        let mut table = self
            .subscriptions
            .lock()
            .map_err(|_| error::HwError::Gpio("simulated signal poisoned".into()))?;
        Ok(table.remove(&pin).is_some())
    }
}

/// Alarm that only counts and logs.
#[derive(Clone, Default)]
pub struct SimulatedAlarm {
    sounded: Arc<AtomicUsize>,
}

impl SimulatedAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn times_sounded(&self) -> usize {
        self.sounded.load(Ordering::Relaxed)
    }
}

impl Alarm for SimulatedAlarm {
    fn sound(&mut self) -> Result<(), BoxError> {
        let n = self.sounded.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(count = n, "alarm sounded (simulated)");
        Ok(())
    }
}
