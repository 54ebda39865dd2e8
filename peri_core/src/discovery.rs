//! Discovery aggregator: serial and Bluetooth terminal discovery here,
//! printer discovery delegated to `peri_printer::discovery`. Runs the
//! selected media in parallel and annotates each result with `is_configured`
//! by cross-referencing the configuration store.

use crate::error::Result;
use crate::storage::ConfigStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    Serial,
    Bluetooth,
    Network,
    Usb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: String,
    pub name: String,
    pub connection_kind: ConnectionKind,
    pub address: String,
    pub protocol_hint: Option<String>,
    pub is_configured: bool,
}

/// Vendor/product IDs recognized as ECR terminals: Ingenico, Verifone, PAX.
const KNOWN_TERMINAL_VID_PID: &[(u16, u16, &str)] = &[
    (0x0b00, 0x0001, "ingenico"),
    (0x11ca, 0x0215, "verifone"),
    (0x0471, 0x0055, "pax"),
];

const KNOWN_TERMINAL_MANUFACTURERS: &[&str] = &["ingenico", "verifone", "pax", "castles"];

/// Bluetooth device names matching one of these (case-insensitive) regexes
/// are treated as ECR terminals.
const TERMINAL_NAME_PATTERNS: &[&str] = &[
    r"(?i)ingenico",
    r"(?i)verifone",
    r"(?i)\bpax\b",
    r"(?i)move\s*\d+",
    r"(?i)\blane\b",
    r"(?i)\bdesk\s*/?\s*\d*\b",
];

pub async fn discover_serial_terminals() -> Result<Vec<DiscoveredDevice>> {
    let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
        .await
        .map_err(|e| crate::error::OrchestratorError::Other(anyhow::anyhow!("serial enumeration join: {e}")))?
        .map_err(|e| crate::error::OrchestratorError::Other(anyhow::anyhow!("serial enumeration: {e}")))?;

    let mut discovered = Vec::new();
    for port in ports {
        let (matched, hint) = match &port.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => {
                let by_id = KNOWN_TERMINAL_VID_PID
                    .iter()
                    .find(|(vid, pid, _)| *vid == usb.vid && *pid == usb.pid)
                    .map(|(_, _, name)| name.to_string());
                let by_manufacturer = usb.manufacturer.as_ref().and_then(|m| {
                    let lower = m.to_lowercase();
                    KNOWN_TERMINAL_MANUFACTURERS
                        .iter()
                        .find(|candidate| lower.contains(*candidate))
                        .map(|c| c.to_string())
                });
                let hint = by_id.or(by_manufacturer);
                (hint.is_some(), hint)
            }
            _ => (false, None),
        };

        if !matched {
            continue;
        }

        discovered.push(DiscoveredDevice {
            id: format!("serial_{}", port.port_name.replace(['/', '\\'], "_")),
            name: format!("Terminal on {}", port.port_name),
            connection_kind: ConnectionKind::Serial,
            address: port.port_name,
            protocol_hint: hint,
            is_configured: false,
        });
    }

    Ok(discovered)
}

/// Bluetooth inquiry is not itself implemented here (pairing and inquiry
/// are OS-level concerns out of scope per the transport's RFCOMM-only
/// design — see `peri_transport::bluetooth`); this takes a pre-gathered
/// `(address, name)` list, such as from the OS's paired-device registry,
/// and filters it by the terminal-name pattern table.
pub fn filter_bluetooth_terminals(candidates: Vec<(String, String)>) -> Vec<DiscoveredDevice> {
    let patterns: Vec<regex::Regex> = TERMINAL_NAME_PATTERNS
        .iter()
        .map(|p| regex::Regex::new(p).expect("static pattern is valid"))
        .collect();

    candidates
        .into_iter()
        .filter_map(|(address, name)| {
            patterns
                .iter()
                .any(|re| re.is_match(&name))
                .then(|| DiscoveredDevice {
                    id: format!("bt_{}", address.replace(':', "")),
                    name,
                    connection_kind: ConnectionKind::Bluetooth,
                    address,
                    protocol_hint: None,
                    is_configured: false,
                })
        })
        .collect()
}

pub async fn discover_network_printers(timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    let printers = peri_printer::discovery::discover_network_printers(timeout).await?;
    Ok(printers.into_iter().map(from_printer).collect())
}

pub fn discover_usb_printers() -> Result<Vec<DiscoveredDevice>> {
    let printers = peri_printer::discovery::discover_usb_printers()?;
    Ok(printers.into_iter().map(from_printer).collect())
}

fn from_printer(p: peri_printer::discovery::DiscoveredPrinter) -> DiscoveredDevice {
    DiscoveredDevice {
        id: p.id,
        name: p.name,
        connection_kind: if p.connection_type == "usb" {
            ConnectionKind::Usb
        } else {
            ConnectionKind::Network
        },
        address: p.address,
        protocol_hint: Some("esc-pos".to_string()),
        is_configured: p.is_configured,
    }
}

/// Runs the requested media in parallel and merges the results, annotating
/// `is_configured` against the addresses already present in the config
/// store. `kinds` defaults to all four media when empty.
pub async fn discover_devices(
    store: &ConfigStore,
    kinds: &[ConnectionKind],
    bluetooth_candidates: Vec<(String, String)>,
    timeout: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    let all = kinds.is_empty();
    let want = |k: ConnectionKind| all || kinds.contains(&k);

    let mut results = Vec::new();

    if want(ConnectionKind::Serial) {
        results.extend(discover_serial_terminals().await?);
    }
    if want(ConnectionKind::Bluetooth) {
        results.extend(filter_bluetooth_terminals(bluetooth_candidates));
    }
    if want(ConnectionKind::Network) {
        results.extend(discover_network_printers(timeout).await?);
    }
    if want(ConnectionKind::Usb) {
        results.extend(discover_usb_printers()?);
    }

    let configured_addresses: HashSet<String> = store
        .get_devices()
        .await?
        .into_iter()
        .map(|d| configured_address(&d.connection))
        .collect();

    for device in &mut results {
        device.is_configured = configured_addresses.contains(&device.address);
    }

    Ok(results)
}

fn configured_address(connection: &crate::model::Connection) -> String {
    use crate::model::Connection::*;
    match connection {
        Serial { path, .. } => path.clone(),
        Bluetooth { mac, .. } => mac.clone(),
        Network { host, port, .. } => format!("{host}:{port}"),
        Usb { .. } => String::new(),
        SystemSpool { name } => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_terminal_names_by_pattern() {
        let candidates = vec![
            ("AA:BB:CC:DD:EE:01".to_string(), "Ingenico Move 5000".to_string()),
            ("AA:BB:CC:DD:EE:02".to_string(), "Headphones".to_string()),
        ];
        let found = filter_bluetooth_terminals(candidates);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "AA:BB:CC:DD:EE:01");
    }
}
