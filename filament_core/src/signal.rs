//! Pin ownership on top of a [`SensorSignal`].
//!
//! `PinBindings` records which component currently owns each pin. Binding a pin
//! that is still held replaces the stale subscription silently; releasing only
//! touches the driver if the caller still owns the pin, so a monitor thread that
//! exits late cannot tear down its successor's subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use filament_traits::{Edge, PulseCallback, SensorSignal};
use tracing::{debug, warn};

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::monitor::MonitorKind;

/// Who holds a pin subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOwner {
    /// Pulses replenish the distance budget outside monitoring sessions.
    DistanceTracker,
    Monitor(MonitorKind),
}

/// Token returned by [`PinBindings::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingId {
    pin: u8,
    generation: u64,
}

struct Inner {
    signal: Box<dyn SensorSignal>,
    owners: HashMap<u8, (PinOwner, u64)>,
    next_generation: u64,
}

impl Inner {
    fn unsubscribe(&mut self, pin: u8) -> Result<()> {
        let removed = self
            .signal
            .unsubscribe(pin)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        if !removed {
            warn!(pin, "pin not used before");
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PinBindings {
    inner: Arc<Mutex<Inner>>,
}

impl PinBindings {
    pub fn new(signal: Box<dyn SensorSignal>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                signal,
                owners: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe `callback` to both edges of `pin` on behalf of `owner`.
    pub fn bind(&self, pin: u8, owner: PinOwner, callback: PulseCallback) -> Result<BindingId> {
        let mut inner = self.lock();
        if let Some((previous, _)) = inner.owners.remove(&pin) {
            debug!(pin, ?previous, ?owner, "replacing stale pin binding");
            // Stale subscriptions go away silently; the driver replaces them anyway.
            let _ = inner.signal.unsubscribe(pin);
        }
        inner
            .signal
            .subscribe(pin, Edge::Both, callback)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.owners.insert(pin, (owner, generation));
        debug!(pin, ?owner, "pin bound");
        Ok(BindingId { pin, generation })
    }

    /// Release a binding if it is still the current one for its pin.
    pub fn release(&self, id: BindingId) -> Result<()> {
        let mut inner = self.lock();
        let current = inner.owners.get(&id.pin).copied();
        match current {
            Some((_, generation)) if generation == id.generation => {
                inner.owners.remove(&id.pin);
                inner.unsubscribe(id.pin)
            }
            Some((owner, _)) => {
                debug!(pin = id.pin, ?owner, "binding superseded; leaving pin alone");
                Ok(())
            }
            None => {
                warn!(pin = id.pin, "pin not used before");
                Ok(())
            }
        }
    }

    /// Unconditionally remove whatever is subscribed on `pin`.
    ///
    /// Releasing an unused pin logs a warning and succeeds.
    pub fn unbind(&self, pin: u8) -> Result<()> {
        let mut inner = self.lock();
        inner.owners.remove(&pin);
        inner.unsubscribe(pin)
    }

    pub fn owner(&self, pin: u8) -> Option<PinOwner> {
        self.lock().owners.get(&pin).map(|(owner, _)| *owner)
    }

    /// Release every binding (shutdown path).
    pub fn release_all(&self) -> Result<()> {
        let mut inner = self.lock();
        let pins: Vec<u8> = inner.owners.drain().map(|(pin, _)| pin).collect();
        let mut first_err = None;
        for pin in pins {
            if let Err(e) = inner.unsubscribe(pin) {
                warn!(pin, error = %e, "failed to release pin");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
