//! Local device tracking
//!
//! Maintains the MAC-keyed registry of devices on the local network.
//! Only packets sourced from a private address count as local-device
//! evidence; everything else belongs to remote endpoints and never
//! touches the registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

use crate::core::packet::Packet;
use crate::core::parser::guess_os;
use crate::database::Database;
use crate::models::Device;
use super::vendor::VendorLookup;

/// True for RFC1918, loopback, link-local, IPv6 ULA and link-local.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            v6.is_loopback()
                || (seg[0] & 0xffc0) == 0xfe80 // fe80::/10
                || (seg[0] & 0xfe00) == 0xfc00 // fc00::/7
        }
    }
}

/// MAC-keyed device registry with write-through persistence.
pub struct DeviceTracker {
    db: Database,
    vendor_lookup: Arc<VendorLookup>,
    cache: RwLock<HashMap<String, Device>>,
}

impl DeviceTracker {
    pub fn new(db: Database, vendor_lookup: Arc<VendorLookup>) -> Self {
        Self {
            db,
            vendor_lookup,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Warm the cache from the devices table.
    pub fn load_cache(&self) -> anyhow::Result<()> {
        let devices = self.db.list_devices()?;
        let mut cache = self.cache.write();
        for device in devices {
            cache.insert(device.mac_address.clone(), device);
        }
        Ok(())
    }

    /// Process a packet as local-device evidence. Returns the device for
    /// the source MAC, or `None` when the packet does not qualify.
    pub fn track(&self, packet: &Packet) -> Option<Device> {
        let eth = packet.ethernet.as_ref()?;
        if eth.src_mac.is_empty() {
            return None;
        }

        let l3 = packet.layer3.as_ref();
        if let Some(l3) = l3 {
            if !is_private_ip(&l3.src_ip) {
                return None;
            }
        }

        let mac = eth.src_mac.clone();
        let mut cache = self.cache.write();

        if let Some(device) = cache.get_mut(&mac) {
            device.last_seen = packet.timestamp;

            // OS fingerprint is sticky once it resolves to something.
            if device.os_fingerprint.is_empty() || device.os_fingerprint == "Unknown" {
                if let Some(l3) = l3 {
                    let os = guess_os(l3.ttl);
                    if os != "Unknown" {
                        device.os_fingerprint = os.to_string();
                    }
                }
            }

            if let Some(l3) = l3 {
                let ip = l3.src_ip.to_string();
                if device.ip_address != ip {
                    device.ip_address = ip;
                }
            }

            self.persist(device);
            return Some(device.clone());
        }

        let vendor = self.vendor_lookup.lookup(&mac);
        let hostname = if vendor.is_empty() {
            let short: String = mac.chars().filter(|c| *c != ':').collect();
            let tail = if short.len() > 4 {
                &short[short.len() - 4..]
            } else {
                &short
            };
            format!("Device-{}", tail)
        } else {
            format!("{}-Device", vendor)
        };

        let mut device = Device {
            id: None,
            mac_address: mac.clone(),
            vendor,
            hostname,
            ip_address: l3.map(|l| l.src_ip.to_string()).unwrap_or_default(),
            os_fingerprint: l3.map(|l| guess_os(l.ttl).to_string()).unwrap_or_default(),
            device_type: "Unknown".to_string(),
            first_seen: packet.timestamp,
            last_seen: packet.timestamp,
            user_label: String::new(),
        };

        self.persist(&mut device);
        cache.insert(mac, device.clone());
        Some(device)
    }

    /// Device for a MAC, if tracked.
    pub fn get(&self, mac: &str) -> Option<Device> {
        self.cache.read().get(mac).cloned()
    }

    /// Snapshot of every tracked device.
    pub fn devices(&self) -> Vec<Device> {
        self.cache.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn persist(&self, device: &mut Device) {
        match self.db.save_device(device) {
            Ok(id) => {
                if device.id.is_none() {
                    device.id = Some(id);
                }
            }
            Err(e) => warn!("failed to persist device {}: {:#}", device.mac_address, e),
        }
    }
}
