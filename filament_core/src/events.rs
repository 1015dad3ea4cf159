//! Printer lifecycle events accepted by the controller.

use std::str::FromStr;

use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrinterEvent {
    PrintStarted,
    PrintResumed,
    PrintPaused,
    PrintDone,
    PrintFailed,
    PrintCancelled,
    Error,
    /// Layer change (Z move).
    ZChange,
    /// A UI client (re)connected and wants the current state.
    UserSessionResumed,
}

impl PrinterEvent {
    pub const ALL: [PrinterEvent; 9] = [
        PrinterEvent::PrintStarted,
        PrinterEvent::PrintResumed,
        PrinterEvent::PrintPaused,
        PrinterEvent::PrintDone,
        PrinterEvent::PrintFailed,
        PrinterEvent::PrintCancelled,
        PrinterEvent::Error,
        PrinterEvent::ZChange,
        PrinterEvent::UserSessionResumed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrinterEvent::PrintStarted => "print_started",
            PrinterEvent::PrintResumed => "print_resumed",
            PrinterEvent::PrintPaused => "print_paused",
            PrinterEvent::PrintDone => "print_done",
            PrinterEvent::PrintFailed => "print_failed",
            PrinterEvent::PrintCancelled => "print_cancelled",
            PrinterEvent::Error => "error",
            PrinterEvent::ZChange => "z_change",
            PrinterEvent::UserSessionResumed => "user_session_resumed",
        }
    }

    /// Events that end a print session.
    pub fn ends_print(self) -> bool {
        matches!(
            self,
            PrinterEvent::PrintDone
                | PrinterEvent::PrintFailed
                | PrinterEvent::PrintCancelled
                | PrinterEvent::Error
                | PrinterEvent::PrintPaused
        )
    }
}

impl std::fmt::Display for PrinterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrinterEvent {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| SensorError::State(format!("unknown printer event '{}'", s.trim())))
    }
}
