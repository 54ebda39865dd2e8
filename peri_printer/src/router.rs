//! Printer router with fallback, grounded on the teacher-adjacent daemon's
//! `routing::KitchenRouter` but narrowed to §4.8's two tables (job-type ->
//! primary printer, printer -> fallback printer) instead of the daemon's
//! richer menu-item/station graph — that graph is print-content routing,
//! out of scope here.

use crate::error::{PrinterError, Result};
use crate::status::{PrinterState, StatusMonitor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub printer_id: String,
    pub used_fallback: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTables {
    pub routes: HashMap<String, String>,
    pub fallbacks: HashMap<String, String>,
}

pub struct PrinterRouter {
    tables: RoutingTables,
}

impl PrinterRouter {
    pub fn new() -> Self {
        Self {
            tables: RoutingTables::default(),
        }
    }

    pub fn set_route(&mut self, job_type: impl Into<String>, printer_id: impl Into<String>) {
        self.tables.routes.insert(job_type.into(), printer_id.into());
    }

    pub fn set_fallback(&mut self, printer_id: impl Into<String>, fallback_id: impl Into<String>) {
        self.tables.fallbacks.insert(printer_id.into(), fallback_id.into());
    }

    pub fn export(&self) -> RoutingTables {
        self.tables.clone()
    }

    pub fn import(&mut self, tables: RoutingTables) {
        self.tables = tables;
    }

    /// Implements §4.8's five fallback rules. `status` is optional: when no
    /// status provider is attached, every printer is assumed available and
    /// every job routes to its primary (rule 5).
    pub fn route_job(&self, job_type: &str, status: Option<&StatusMonitor>) -> Result<RouteResult> {
        let primary = self
            .tables
            .routes
            .get(job_type)
            .ok_or_else(|| PrinterError::Routing(format!("no printer configured for job type {job_type:?}")))?;

        let Some(status) = status else {
            return Ok(RouteResult {
                printer_id: primary.clone(),
                used_fallback: false,
                reason: None,
            });
        };

        if is_available(status, primary) {
            return Ok(RouteResult {
                printer_id: primary.clone(),
                used_fallback: false,
                reason: None,
            });
        }

        if let Some(fallback) = self.tables.fallbacks.get(primary) {
            if is_available(status, fallback) {
                return Ok(RouteResult {
                    printer_id: fallback.clone(),
                    used_fallback: true,
                    reason: Some("primary offline".to_string()),
                });
            }
        }

        Ok(RouteResult {
            printer_id: primary.clone(),
            used_fallback: false,
            reason: None,
        })
    }
}

impl Default for PrinterRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_available(status: &StatusMonitor, printer_id: &str) -> bool {
    match status.get(printer_id) {
        Some(s) => matches!(s.state, PrinterState::Online | PrinterState::Busy),
        // No status recorded yet for this printer: treat as available so a
        // freshly configured printer isn't routed around before its first poll.
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with_fallback() -> PrinterRouter {
        let mut r = PrinterRouter::new();
        r.set_route("receipt", "main");
        r.set_fallback("main", "backup");
        r
    }

    #[test]
    fn no_status_provider_routes_to_primary() {
        let r = router_with_fallback();
        let result = r.route_job("receipt", None).unwrap();
        assert_eq!(result.printer_id, "main");
        assert!(!result.used_fallback);
    }

    #[test]
    fn primary_busy_still_routes_to_primary() {
        let r = router_with_fallback();
        let mut status = StatusMonitor::new();
        status.update("main", PrinterState::Busy, None, 3);
        let result = r.route_job("receipt", Some(&status)).unwrap();
        assert_eq!(result.printer_id, "main");
        assert!(!result.used_fallback);
    }

    #[test]
    fn primary_offline_with_available_fallback_uses_it() {
        let r = router_with_fallback();
        let mut status = StatusMonitor::new();
        status.update("main", PrinterState::Offline, None, 0);
        status.update("backup", PrinterState::Online, None, 0);
        let result = r.route_job("receipt", Some(&status)).unwrap();
        assert_eq!(result.printer_id, "backup");
        assert!(result.used_fallback);
        assert_eq!(result.reason.as_deref(), Some("primary offline"));
    }

    #[test]
    fn primary_and_fallback_both_down_queues_on_primary() {
        let r = router_with_fallback();
        let mut status = StatusMonitor::new();
        status.update("main", PrinterState::Offline, None, 0);
        status.update("backup", PrinterState::Error, None, 0);
        let result = r.route_job("receipt", Some(&status)).unwrap();
        assert_eq!(result.printer_id, "main");
        assert!(!result.used_fallback);
    }

    #[test]
    fn unconfigured_job_type_is_a_routing_error() {
        let r = PrinterRouter::new();
        assert!(r.route_job("receipt", None).is_err());
    }

    #[test]
    fn export_import_round_trips() {
        let r = router_with_fallback();
        let exported = r.export();
        let mut r2 = PrinterRouter::new();
        r2.import(exported);
        let result = r2.route_job("receipt", None).unwrap();
        assert_eq!(result.printer_id, "main");
    }
}
