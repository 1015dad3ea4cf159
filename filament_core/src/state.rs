//! Shared detection state.
//!
//! One `DetectionState` sits behind a mutex and is mutated from three threads:
//! the control thread (events, G-code tap), the pulse callback thread and the
//! monitor loop. Every mutation goes through [`SharedState::update`], which runs
//! the closure under a single lock acquisition and then pushes one snapshot to the
//! observer if anything visible changed.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use filament_traits::StateObserver;
use serde::Serialize;

use crate::extrusion::ExtruderPosition;

/// What the observer sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub remaining_distance: f64,
    pub filament_moving: bool,
    pub connection_test_active: bool,
    pub absolute_extrusion: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionState {
    /// Extrusion (mm) allowed before a pause triggers.
    pub remaining_distance: f64,
    pub filament_moving: bool,
    /// Written only by pulse handling and monitor start.
    pub last_pulse_time: Option<Instant>,
    /// G-code E values are absolute positions (M82) rather than deltas (M83).
    pub absolute_extrusion: bool,
    pub connection_test_active: bool,
    pub extruder: ExtruderPosition,
    /// Latched by the pause action, cleared by the next pulse.
    pub pause_sent: bool,
}

impl DetectionState {
    pub fn new(remaining_distance: f64) -> Self {
        Self {
            remaining_distance,
            filament_moving: false,
            last_pulse_time: None,
            absolute_extrusion: true,
            connection_test_active: false,
            extruder: ExtruderPosition::default(),
            pause_sent: false,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            remaining_distance: self.remaining_distance,
            filament_moving: self.filament_moving,
            connection_test_active: self.connection_test_active,
            absolute_extrusion: self.absolute_extrusion,
        }
    }
}

pub type SharedObserver = Arc<dyn StateObserver<StateSnapshot>>;

/// Cloneable handle to the single detection state.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<DetectionState>>,
    observer: Option<SharedObserver>,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("state", &*self.lock())
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl SharedState {
    pub fn new(state: DetectionState, observer: Option<SharedObserver>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            observer,
        }
    }

    // A panic in one writer must not wedge detection; keep using the data.
    fn lock(&self) -> MutexGuard<'_, DetectionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate under the lock, then notify once if the snapshot changed.
    pub fn update<R>(&self, f: impl FnOnce(&mut DetectionState) -> R) -> R {
        let (out, before, after) = {
            let mut guard = self.lock();
            let before = guard.snapshot();
            let out = f(&mut guard);
            (out, before, guard.snapshot())
        };
        if before != after {
            self.notify(&after);
        }
        out
    }

    pub fn read<R>(&self, f: impl FnOnce(&DetectionState) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.lock().snapshot()
    }

    /// Push the current snapshot regardless of changes (e.g. a UI reattached).
    pub fn publish(&self) {
        let snap = self.snapshot();
        self.notify(&snap);
    }

    fn notify(&self, snapshot: &StateSnapshot) {
        let Some(observer) = &self.observer else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| observer.state_changed(snapshot))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "state observer failed"),
            Err(_) => tracing::error!("state observer panicked"),
        }
    }
}
