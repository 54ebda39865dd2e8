//! Printer discovery: network (mDNS + TCP 9100 probe) and USB. Grounded on
//! the teacher-adjacent daemon's `discovery` module, narrowed to exactly
//! the media §4.6 names for printers — that module's SNMP/WS-Discovery/
//! Epson-ENPC/Star-CloudPRNT probes are vendor extras with no counterpart
//! here and are not carried over.

use crate::error::{PrinterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPrinter {
    pub id: String,
    pub name: String,
    pub connection_type: String,
    pub address: String,
    pub is_configured: bool,
}

const MDNS_SERVICE_TYPES: &[&str] = &[
    "_pdl-datastream._tcp.local.",
    "_ipp._tcp.local.",
    "_printer._tcp.local.",
];

/// USB printer device class per the USB spec.
const USB_PRINTER_CLASS: u8 = 7;

/// Vendor IDs recognized even when the reported device class isn't 7
/// (some thermal printers mis-declare their interface class).
const RECOGNIZED_VENDOR_IDS: &[u16] = &[0x04b8, 0x0519, 0x0fe6, 0x1504];

pub async fn discover_network_printers(timeout: Duration) -> Result<Vec<DiscoveredPrinter>> {
    let (mdns, tcp) = tokio::join!(discover_mdns(timeout), scan_tcp_9100());
    let mut merged: HashMap<String, DiscoveredPrinter> = HashMap::new();
    for p in mdns? {
        merged.insert(dedup_key(&p), p);
    }
    for p in tcp? {
        merged.entry(dedup_key(&p)).or_insert(p);
    }
    Ok(merged.into_values().collect())
}

fn dedup_key(p: &DiscoveredPrinter) -> String {
    p.address.split(':').next().unwrap_or(&p.address).to_string()
}

async fn discover_mdns(timeout: Duration) -> Result<Vec<DiscoveredPrinter>> {
    use mdns_sd::{ServiceDaemon, ServiceEvent};

    let mdns = ServiceDaemon::new().map_err(|e| PrinterError::Discovery(format!("mdns daemon: {e}")))?;
    let mut discovered = HashMap::new();

    for service_type in MDNS_SERVICE_TYPES {
        let receiver = mdns
            .browse(service_type)
            .map_err(|e| PrinterError::Discovery(format!("browse {service_type}: {e}")))?;

        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            let remaining = deadline - tokio::time::Instant::now();
            match tokio::time::timeout(remaining.min(Duration::from_millis(200)), receiver.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    if let Some(addr) = info.get_addresses().iter().next() {
                        let address = format!("{addr}:{}", info.get_port());
                        let id = format!("net_{}", addr.to_string().replace('.', "_"));
                        let name = info.get_hostname().trim_end_matches('.').to_string();
                        discovered.insert(
                            id.clone(),
                            DiscoveredPrinter {
                                id,
                                name,
                                connection_type: "network".to_string(),
                                address,
                                is_configured: false,
                            },
                        );
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) => break,
                Err(_) => continue,
            }
        }
        let _ = mdns.stop_browse(service_type);
    }
    let _ = mdns.shutdown();

    Ok(discovered.into_values().collect())
}

/// Probes TCP port 9100 (raw/JetDirect) across the host's local subnets,
/// restricted to the host-number windows `1-50, 100-110, 200-210` per
/// §4.6, rather than a full /24 sweep.
async fn scan_tcp_9100() -> Result<Vec<DiscoveredPrinter>> {
    let subnet = detect_local_subnet_base();
    let hosts: Vec<u8> = (1..=50u8).chain(100..=110u8).chain(200..=210u8).collect();

    let mut tasks = Vec::new();
    for host in hosts {
        let ip = Ipv4Addr::new(subnet[0], subnet[1], subnet[2], host);
        tasks.push(tokio::spawn(async move {
            let addr = format!("{ip}:9100");
            match tokio::time::timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(&addr)).await {
                Ok(Ok(_)) => Some(addr),
                _ => None,
            }
        }));
    }

    let mut discovered = Vec::new();
    for task in tasks {
        if let Ok(Some(address)) = task.await {
            let id = format!("tcp_{}", address.replace([':', '.'], "_"));
            discovered.push(DiscoveredPrinter {
                id: id.clone(),
                name: format!("Printer at {address}"),
                connection_type: "network".to_string(),
                address,
                is_configured: false,
            });
        }
    }
    Ok(discovered)
}

fn detect_local_subnet_base() -> [u8; 4] {
    if let Ok(std::net::IpAddr::V4(ip)) = local_ip_address_fallback() {
        let o = ip.octets();
        return [o[0], o[1], o[2], 0];
    }
    [192, 168, 1, 0]
}

/// Minimal local-IP lookup (connect a UDP socket to a public address and
/// read back the chosen local endpoint; no packets are actually sent).
fn local_ip_address_fallback() -> std::io::Result<std::net::IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}

pub fn discover_usb_printers() -> Result<Vec<DiscoveredPrinter>> {
    let devices = rusb::devices().map_err(|e| PrinterError::Discovery(format!("usb enumerate: {e}")))?;
    let mut discovered = Vec::new();

    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        let is_printer_class = (0..descriptor.num_configurations()).any(|cfg_idx| {
            device
                .config_descriptor(cfg_idx)
                .ok()
                .map(|cfg| {
                    cfg.interfaces()
                        .flat_map(|i| i.descriptors())
                        .any(|d| d.class_code() == USB_PRINTER_CLASS)
                })
                .unwrap_or(false)
        });
        let is_recognized_vendor = RECOGNIZED_VENDOR_IDS.contains(&descriptor.vendor_id());

        if !is_printer_class && !is_recognized_vendor {
            continue;
        }

        let id = format!("usb_{:04x}_{:04x}_{}_{}", descriptor.vendor_id(), descriptor.product_id(), device.bus_number(), device.address());

        let (manufacturer, product) = device
            .open()
            .ok()
            .and_then(|handle| {
                let timeout = Duration::from_millis(200);
                let languages = handle.read_languages(timeout).ok()?;
                let lang = *languages.first()?;
                let manufacturer = handle.read_manufacturer_string(lang, &descriptor, timeout).ok();
                let product = handle.read_product_string(lang, &descriptor, timeout).ok();
                Some((manufacturer, product))
            })
            .unwrap_or((None, None));

        let name = product
            .or(manufacturer)
            .unwrap_or_else(|| format!("USB printer {:04x}:{:04x}", descriptor.vendor_id(), descriptor.product_id()));

        discovered.push(DiscoveredPrinter {
            id,
            name,
            connection_type: "usb".to_string(),
            address: format!("usb:{}:{}", device.bus_number(), device.address()),
            is_configured: false,
        });
    }

    Ok(discovered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_strips_port() {
        let p = DiscoveredPrinter {
            id: "x".into(),
            name: "x".into(),
            connection_type: "network".into(),
            address: "192.168.1.5:9100".into(),
            is_configured: false,
        };
        assert_eq!(dedup_key(&p), "192.168.1.5");
    }
}
