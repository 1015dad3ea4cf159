//! Test and helper mocks for filament_core

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use filament_traits::{BoxError, Printer, StateObserver};

use crate::state::StateSnapshot;

/// A printer that records every command it is asked to send.
///
/// Clones share the same log. The first `fail_next` sends return an error.
#[derive(Clone, Default)]
pub struct RecordingPrinter {
    sent: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<AtomicUsize>,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Printer for RecordingPrinter {
    fn issue_pause(&mut self, command: &str) -> Result<(), BoxError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Box::new(std::io::Error::other("printer offline")));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
        Ok(())
    }
}

/// An observer that keeps every snapshot it receives.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    seen: Arc<Mutex<Vec<StateSnapshot>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<StateSnapshot> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl StateObserver<StateSnapshot> for RecordingObserver {
    fn state_changed(&self, snapshot: &StateSnapshot) -> Result<(), BoxError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*snapshot);
        Ok(())
    }
}
