//! Unified packet representation
//!
//! One decoded frame with every layer the dissectors managed to extract.
//! A missing layer is `None`, never an error; the packet lives only for
//! the duration of its trip through the pipeline.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// TCP flags as decoded from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
    pub ns: bool,
}

impl TcpFlags {
    /// Flag labels in wire presentation order.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.syn {
            out.push("SYN");
        }
        if self.ack {
            out.push("ACK");
        }
        if self.fin {
            out.push("FIN");
        }
        if self.rst {
            out.push("RST");
        }
        if self.psh {
            out.push("PSH");
        }
        if self.urg {
            out.push("URG");
        }
        if self.ece {
            out.push("ECE");
        }
        if self.cwr {
            out.push("CWR");
        }
        if self.ns {
            out.push("NS");
        }
        out
    }
}

/// Data link layer info.
#[derive(Debug, Clone)]
pub struct EthernetInfo {
    pub src_mac: String,
    pub dst_mac: String,
    pub ethertype: u16,
}

/// Network layer info (IPv4, IPv6, or ARP protocol addresses).
#[derive(Debug, Clone)]
pub struct Layer3Info {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    /// "IPv4", "IPv6", or "ARP".
    pub version: String,
    /// Next-protocol label ("TCP", "UDP", "ICMPv4", ...).
    pub protocol: String,
    /// TTL for IPv4, hop limit for IPv6, 0 for ARP.
    pub ttl: u8,
}

/// Transport layer info.
#[derive(Debug, Clone)]
pub struct Layer4Info {
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: String,
    pub flags: Option<TcpFlags>,
    pub seq: Option<u32>,
    pub ack: Option<u32>,
    pub payload: Vec<u8>,
}

/// Whether a DNS message is a query or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsKind {
    Query,
    Response,
}

/// A single DNS answer record, in wire order.
#[derive(Debug, Clone, Default)]
pub struct DnsAnswer {
    pub name: String,
    pub rtype: String,
    /// Address for A/AAAA answers, empty otherwise.
    pub ip: String,
    pub ttl: u32,
    /// Target name for CNAME/PTR answers, empty otherwise.
    pub cname: String,
}

/// Decoded DNS message.
#[derive(Debug, Clone)]
pub struct DnsInfo {
    pub kind: DnsKind,
    pub query: String,
    pub query_type: String,
    pub answers: Vec<DnsAnswer>,
    pub response_code: String,
}

impl DnsInfo {
    /// One-line summary for the live event feed.
    pub fn summary(&self) -> String {
        match self.kind {
            DnsKind::Query => format!("Query: {} ({})", self.query, self.query_type),
            DnsKind::Response => {
                let first = self.answers.iter().find(|a| !a.ip.is_empty());
                match first {
                    Some(a) if self.answers.len() > 1 => {
                        format!("{} -> {} +{} more", self.query, a.ip, self.answers.len() - 1)
                    }
                    Some(a) => format!("{} -> {}", self.query, a.ip),
                    None => format!("{} ({})", self.query, self.response_code),
                }
            }
        }
    }
}

/// Decoded TLS Client Hello metadata.
#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    pub handshake: bool,
    pub version: String,
    pub sni: String,
    pub cipher_suite: String,
    pub ja3: String,
}

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Packet {
    pub timestamp: DateTime<Utc>,
    /// Length on the wire, including link headers.
    pub length: u32,
    pub ethernet: Option<EthernetInfo>,
    pub layer3: Option<Layer3Info>,
    pub layer4: Option<Layer4Info>,
    pub dns: Option<DnsInfo>,
    pub tls: Option<TlsInfo>,
}

impl Packet {
    pub fn new(timestamp: DateTime<Utc>, length: u32) -> Self {
        Self {
            timestamp,
            length,
            ethernet: None,
            layer3: None,
            layer4: None,
            dns: None,
            tls: None,
        }
    }

    /// Highest-layer protocol label for display.
    pub fn protocol_label(&self) -> &str {
        if self.dns.is_some() {
            return "DNS";
        }
        if self.tls.as_ref().map(|t| t.handshake).unwrap_or(false) {
            return "TLS";
        }
        if let Some(l4) = &self.layer4 {
            return &l4.protocol;
        }
        if let Some(l3) = &self.layer3 {
            return &l3.protocol;
        }
        "Unknown"
    }

    pub fn src_ip_string(&self) -> String {
        self.layer3
            .as_ref()
            .map(|l3| l3.src_ip.to_string())
            .unwrap_or_default()
    }

    pub fn dst_ip_string(&self) -> String {
        self.layer3
            .as_ref()
            .map(|l3| l3.dst_ip.to_string())
            .unwrap_or_default()
    }

    pub fn src_mac(&self) -> &str {
        self.ethernet.as_ref().map(|e| e.src_mac.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_flag_labels_order() {
        let flags = TcpFlags {
            syn: true,
            ack: true,
            cwr: true,
            ..Default::default()
        };
        assert_eq!(flags.labels(), vec!["SYN", "ACK", "CWR"]);
    }

    #[test]
    fn test_protocol_label_precedence() {
        let mut pkt = Packet::new(Utc::now(), 64);
        assert_eq!(pkt.protocol_label(), "Unknown");

        pkt.layer4 = Some(Layer4Info {
            src_port: 1234,
            dst_port: 443,
            protocol: "TCP".to_string(),
            flags: None,
            seq: None,
            ack: None,
            payload: Vec::new(),
        });
        assert_eq!(pkt.protocol_label(), "TCP");

        pkt.tls = Some(TlsInfo {
            handshake: true,
            ..Default::default()
        });
        assert_eq!(pkt.protocol_label(), "TLS");
    }

    #[test]
    fn test_dns_summary_response() {
        let info = DnsInfo {
            kind: DnsKind::Response,
            query: "example.com".to_string(),
            query_type: "A".to_string(),
            answers: vec![DnsAnswer {
                name: "example.com".to_string(),
                rtype: "A".to_string(),
                ip: "1.2.3.4".to_string(),
                ttl: 300,
                cname: String::new(),
            }],
            response_code: "NoError".to_string(),
        };
        assert_eq!(info.summary(), "example.com -> 1.2.3.4");
    }
}
