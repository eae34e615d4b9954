//! Shared data model
//!
//! Flow, device, session, and WiFi records exchanged between the
//! correlators, analyzers, and the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical 5-tuple identifying a bidirectional flow.
///
/// `(src_ip, src_port)` always sorts lexicographically at or below
/// `(dst_ip, dst_port)` so A->B and B->A collapse to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: String,
}

impl FlowKey {
    /// Build the canonical key from the observed packet direction.
    pub fn canonical(
        src_ip: &str,
        dst_ip: &str,
        src_port: u16,
        dst_port: u16,
        protocol: &str,
    ) -> Self {
        let swap = src_ip > dst_ip || (src_ip == dst_ip && src_port > dst_port);

        if swap {
            Self {
                src_ip: dst_ip.to_string(),
                dst_ip: src_ip.to_string(),
                src_port: dst_port,
                dst_port: src_port,
                protocol: protocol.to_string(),
            }
        } else {
            Self {
                src_ip: src_ip.to_string(),
                dst_ip: dst_ip.to_string(),
                src_port,
                dst_port,
                protocol: protocol.to_string(),
            }
        }
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} [{}]",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

/// A bidirectional network conversation aggregated from packets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// In-memory flow id assigned at insert.
    pub id: u64,
    /// Persistence row id, written back after the first insert.
    pub db_id: Option<i64>,
    /// Owning local device row id, when resolvable.
    pub device_id: Option<i64>,
    pub key: FlowKey,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub packet_count: u64,
    pub byte_count: u64,
    pub protocol: String,
    /// First DNS query name observed on this flow.
    pub dns_query: String,
    /// First TLS SNI observed on this flow.
    pub tls_sni: String,
    /// Domain correlated from the DNS cache at insert time.
    pub dst_domain: String,
    pub dst_country: String,
    pub dst_city: String,
    pub dst_asn: String,
    /// First JA3 fingerprint observed on this flow.
    pub ja3: String,
    /// Application identified from the JA3 catalog.
    pub ja3_application: String,
    /// Application identified from all signals combined.
    pub application: String,
    pub traffic_class: String,
    /// Watermark for the dirty-flow persistence sweep.
    #[serde(skip)]
    pub last_persisted: Option<DateTime<Utc>>,
}

impl Flow {
    pub fn new(id: u64, key: FlowKey, first_seen: DateTime<Utc>, protocol: String) -> Self {
        Self {
            id,
            db_id: None,
            device_id: None,
            key,
            first_seen,
            last_seen: first_seen,
            packet_count: 0,
            byte_count: 0,
            protocol,
            dns_query: String::new(),
            tls_sni: String::new(),
            dst_domain: String::new(),
            dst_country: String::new(),
            dst_city: String::new(),
            dst_asn: String::new(),
            ja3: String::new(),
            ja3_application: String::new(),
            application: String::new(),
            traffic_class: String::new(),
            last_persisted: None,
        }
    }

    /// Destination label preferred for grouping: domain when correlated,
    /// canonical destination IP otherwise.
    pub fn destination_label(&self) -> &str {
        if self.dst_domain.is_empty() {
            &self.key.dst_ip
        } else {
            &self.dst_domain
        }
    }
}

/// A local network device, identified by MAC address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<i64>,
    pub mac_address: String,
    pub vendor: String,
    pub hostname: String,
    pub ip_address: String,
    pub os_fingerprint: String,
    pub device_type: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub user_label: String,
}

/// Flows grouped by (device, destination, application).
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub key: String,
    pub device: String,
    pub destination: String,
    pub application: String,
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub flow_ids: Vec<u64>,
    pub flow_count: u64,
    pub total_bytes: u64,
    pub total_packets: u64,
}

/// A discovered 802.11 access point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPoint {
    pub id: Option<i64>,
    pub bssid: String,
    pub ssid: String,
    pub channel: u8,
    pub encryption: String,
    pub vendor: String,
    pub signal: i32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A station probing for networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiClient {
    pub id: Option<i64>,
    pub mac: String,
    pub vendor: String,
    pub probed_ssids: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

/// A captured EAPOL exchange (WPA/WPA2 4-way handshake material).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub id: Option<i64>,
    pub bssid: String,
    pub client_mac: String,
    pub is_full: bool,
    pub timestamp: DateTime<Utc>,
}

/// Severity of a rogue AP alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RogueSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for RogueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RogueSeverity::Warning => write!(f, "WARNING"),
            RogueSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A threat raised by the rogue AP analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct RogueAlert {
    pub bssid: String,
    pub ssid: String,
    pub severity: RogueSeverity,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_key_canonical_swap() {
        let a = FlowKey::canonical("93.184.216.34", "10.0.0.5", 443, 1000, "TCP");
        let b = FlowKey::canonical("10.0.0.5", "93.184.216.34", 1000, 443, "TCP");
        assert_eq!(a, b);
        assert_eq!(a.src_ip, "10.0.0.5");
        assert_eq!(a.src_port, 1000);
    }

    #[test]
    fn test_flow_key_same_ip_orders_ports() {
        let key = FlowKey::canonical("10.0.0.1", "10.0.0.1", 5000, 80, "TCP");
        assert_eq!(key.src_port, 80);
        assert_eq!(key.dst_port, 5000);
    }

    #[test]
    fn test_destination_label_prefers_domain() {
        let key = FlowKey::canonical("10.0.0.5", "1.2.3.4", 1000, 443, "TCP");
        let mut flow = Flow::new(1, key, Utc::now(), "TCP".to_string());
        assert_eq!(flow.destination_label(), "1.2.3.4");
        flow.dst_domain = "example.com".to_string();
        assert_eq!(flow.destination_label(), "example.com");
    }
}
