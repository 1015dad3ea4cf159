//! Line-oriented stdout shared by the control thread, the monitor thread and
//! the pulse thread.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use filament_core::{StateSnapshot, TestStatus};
use filament_traits::{BoxError, Printer};
use serde_json::json;

#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
    json: bool,
}

impl Output {
    pub fn stdout(json: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), json)
    }

    pub fn new(sink: Box<dyn Write + Send>, json: bool) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            json,
        }
    }

    pub fn line(&self, text: &str) -> std::io::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(sink, "{text}")?;
        sink.flush()
    }

    pub fn snapshot(&self, s: &StateSnapshot) -> std::io::Result<()> {
        let text = if self.json {
            json!({
                "type": "state",
                "remaining_distance": s.remaining_distance,
                "filament_moving": s.filament_moving,
                "connection_test_active": s.connection_test_active,
                "absolute_extrusion": s.absolute_extrusion,
            })
            .to_string()
        } else {
            format!(
                "state remaining={:.3} moving={} test={} absolute={}",
                s.remaining_distance, s.filament_moving, s.connection_test_active, s.absolute_extrusion
            )
        };
        self.line(&text)
    }

    pub fn test_status(&self, status: TestStatus) -> std::io::Result<()> {
        if self.json {
            self.line(&json!({ "type": "test", "status": status }).to_string())
        } else {
            self.line(&format!("test {status}"))
        }
    }

    pub fn motion(&self, moving: bool) -> std::io::Result<()> {
        let word = if moving { "MOVING" } else { "IDLE" };
        if self.json {
            self.line(&json!({ "type": "connection_test", "status": word }).to_string())
        } else {
            self.line(word)
        }
    }

    /// Observer that writes every state change.
    pub fn observer(&self) -> impl Fn(&StateSnapshot) -> Result<(), BoxError> + Send + Sync + 'static {
        let out = self.clone();
        move |s: &StateSnapshot| out.snapshot(s).map_err(Into::into)
    }
}

/// Pause commands go to the host as `send <command>` lines.
pub struct HostPrinter(pub Output);

impl Printer for HostPrinter {
    fn issue_pause(&mut self, command: &str) -> Result<(), BoxError> {
        self.0.line(&format!("send {command}"))?;
        Ok(())
    }
}
