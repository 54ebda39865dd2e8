//! Per-printer status tracking. Grounded on the teacher-adjacent daemon's
//! `status.rs` (status string constants shared with persisted rows) and its
//! `routing`/`queue` modules' habit of emitting change events rather than
//! polling — here made explicit via [StatusMonitor::update].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterState {
    Online,
    Offline,
    Error,
    Busy,
}

pub fn is_valid_printer_state(s: &str) -> bool {
    matches!(s, "online" | "offline" | "error" | "busy")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub printer_id: String,
    pub state: PrinterState,
    pub error_code: Option<u32>,
    pub error_message: Option<String>,
    pub last_seen: SystemTime,
    pub queue_length: usize,
}

/// Maps a small fixed set of device error codes to human messages. Printer
/// vendors don't share a single code table the way ZVT terminals do, so this
/// is intentionally small; unknown codes fall back to a generic message.
fn error_message(code: u32) -> String {
    match code {
        1 => "out of paper".to_string(),
        2 => "cover open".to_string(),
        3 => "cutter error".to_string(),
        4 => "offline or unplugged".to_string(),
        _ => format!("unknown printer error code {code}"),
    }
}

pub enum StatusChange {
    Unchanged,
    Changed(PrinterStatus),
}

pub struct StatusMonitor {
    statuses: HashMap<String, PrinterStatus>,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self {
            statuses: HashMap::new(),
        }
    }

    /// Updates the stored status for `printer_id`, always refreshing
    /// `last_seen` and `queue_length`, but only returning `Changed` when the
    /// effective status (state or error code) actually differs from before
    /// — callers use this to decide whether to emit `statusChange`.
    pub fn update(
        &mut self,
        printer_id: &str,
        new_state: PrinterState,
        error_code: Option<u32>,
        queue_length: usize,
    ) -> StatusChange {
        let now = SystemTime::now();
        let changed = match self.statuses.get(printer_id) {
            Some(existing) => existing.state != new_state || existing.error_code != error_code,
            None => true,
        };

        let status = PrinterStatus {
            printer_id: printer_id.to_string(),
            state: new_state,
            error_code,
            error_message: error_code.map(error_message),
            last_seen: now,
            queue_length,
        };
        self.statuses.insert(printer_id.to_string(), status.clone());

        if changed {
            StatusChange::Changed(status)
        } else {
            StatusChange::Unchanged
        }
    }

    pub fn get(&self, printer_id: &str) -> Option<&PrinterStatus> {
        self.statuses.get(printer_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &PrinterStatus> {
        self.statuses.values()
    }
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_always_reports_changed() {
        let mut monitor = StatusMonitor::new();
        let change = monitor.update("p1", PrinterState::Online, None, 0);
        assert!(matches!(change, StatusChange::Changed(_)));
    }

    #[test]
    fn same_state_and_error_is_unchanged() {
        let mut monitor = StatusMonitor::new();
        monitor.update("p1", PrinterState::Online, None, 0);
        let change = monitor.update("p1", PrinterState::Online, None, 3);
        assert!(matches!(change, StatusChange::Unchanged));
        assert_eq!(monitor.get("p1").unwrap().queue_length, 3);
    }

    #[test]
    fn state_transition_reports_changed() {
        let mut monitor = StatusMonitor::new();
        monitor.update("p1", PrinterState::Online, None, 0);
        let change = monitor.update("p1", PrinterState::Error, Some(1), 0);
        match change {
            StatusChange::Changed(status) => {
                assert_eq!(status.error_message.as_deref(), Some("out of paper"));
            }
            StatusChange::Unchanged => panic!("expected a change"),
        }
    }

    #[test]
    fn validates_known_states_only() {
        assert!(is_valid_printer_state("online"));
        assert!(is_valid_printer_state("busy"));
        assert!(!is_valid_printer_state("unplugged"));
    }
}
