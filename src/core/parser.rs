//! Dissector chain
//!
//! Fixed ordered composition over a raw Ethernet frame:
//! Ethernet -> IPv4/IPv6/ARP -> TCP/UDP/ICMP -> DNS / TLS Client Hello.
//! Every stage yields "no record" on truncation or malformed fields; a
//! broken frame never aborts processing, it just carries less.

use chrono::{DateTime, Utc};
use etherparse::SlicedPacket;
use std::net::{IpAddr, Ipv4Addr};

use crate::protocols::{dns, tls};
use super::packet::{EthernetInfo, Layer3Info, Layer4Info, Packet, TcpFlags};

const ETHERTYPE_ARP: u16 = 0x0806;

fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

fn ip_number_label(num: u8) -> String {
    match num {
        1 => "ICMPv4".to_string(),
        6 => "TCP".to_string(),
        17 => "UDP".to_string(),
        58 => "ICMPv6".to_string(),
        other => format!("Proto({})", other),
    }
}

/// Parse a raw Ethernet frame into a [`Packet`].
///
/// `wire_len` is the original length on the wire, which may exceed the
/// captured slice when the snapshot length truncated the frame.
pub fn parse_ethernet_frame(data: &[u8], timestamp: DateTime<Utc>, wire_len: u32) -> Option<Packet> {
    let mut packet = Packet::new(timestamp, wire_len);

    let sliced = match SlicedPacket::from_ethernet(data) {
        Ok(s) => s,
        Err(_) => return None,
    };

    if let Some(etherparse::LinkSlice::Ethernet2(eth)) = &sliced.link {
        let ethertype = if data.len() >= 14 {
            u16::from_be_bytes([data[12], data[13]])
        } else {
            0
        };
        packet.ethernet = Some(EthernetInfo {
            src_mac: format_mac(&eth.source()),
            dst_mac: format_mac(&eth.destination()),
            ethertype,
        });

        // ARP is terminal: protocol addresses come from the ARP body.
        if ethertype == ETHERTYPE_ARP {
            packet.layer3 = parse_arp(&data[14..]);
            return Some(packet);
        }
    }

    packet.layer3 = parse_ip(&sliced);
    packet.layer4 = parse_transport(&sliced);

    if let Some(l4) = &packet.layer4 {
        if l4.protocol == "UDP"
            && !l4.payload.is_empty()
            && (l4.src_port == 53 || l4.dst_port == 53 || l4.src_port == 5353 || l4.dst_port == 5353)
        {
            packet.dns = dns::parse_dns(&l4.payload);
        }

        if l4.protocol == "TCP" && !l4.payload.is_empty() {
            packet.tls = tls::parse_tls(&l4.payload);
        }
    }

    Some(packet)
}

fn parse_ip(sliced: &SlicedPacket<'_>) -> Option<Layer3Info> {
    match &sliced.net {
        Some(etherparse::NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            Some(Layer3Info {
                src_ip: IpAddr::from(header.source_addr()),
                dst_ip: IpAddr::from(header.destination_addr()),
                version: "IPv4".to_string(),
                protocol: ip_number_label(header.protocol().0),
                ttl: header.ttl(),
            })
        }
        Some(etherparse::NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            Some(Layer3Info {
                src_ip: IpAddr::from(header.source_addr()),
                dst_ip: IpAddr::from(header.destination_addr()),
                version: "IPv6".to_string(),
                protocol: ip_number_label(header.next_header().0),
                ttl: header.hop_limit(),
            })
        }
        _ => None,
    }
}

fn parse_transport(sliced: &SlicedPacket<'_>) -> Option<Layer4Info> {
    match &sliced.transport {
        Some(etherparse::TransportSlice::Tcp(tcp)) => {
            let header = tcp.to_header();
            Some(Layer4Info {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                protocol: "TCP".to_string(),
                flags: Some(TcpFlags {
                    syn: header.syn,
                    ack: header.ack,
                    fin: header.fin,
                    rst: header.rst,
                    psh: header.psh,
                    urg: header.urg,
                    ece: header.ece,
                    cwr: header.cwr,
                    ns: header.ns,
                }),
                seq: Some(tcp.sequence_number()),
                ack: Some(tcp.acknowledgment_number()),
                payload: tcp.payload().to_vec(),
            })
        }
        Some(etherparse::TransportSlice::Udp(udp)) => Some(Layer4Info {
            src_port: udp.source_port(),
            dst_port: udp.destination_port(),
            protocol: "UDP".to_string(),
            flags: None,
            seq: None,
            ack: None,
            payload: udp.payload().to_vec(),
        }),
        Some(etherparse::TransportSlice::Icmpv4(icmp)) => Some(Layer4Info {
            src_port: 0,
            dst_port: 0,
            protocol: "ICMPv4".to_string(),
            flags: None,
            seq: None,
            ack: None,
            payload: icmp.payload().to_vec(),
        }),
        Some(etherparse::TransportSlice::Icmpv6(icmp)) => Some(Layer4Info {
            src_port: 0,
            dst_port: 0,
            protocol: "ICMPv6".to_string(),
            flags: None,
            seq: None,
            ack: None,
            payload: icmp.payload().to_vec(),
        }),
        _ => None,
    }
}

/// Parse an ARP body (after the Ethernet header) into protocol addresses.
fn parse_arp(body: &[u8]) -> Option<Layer3Info> {
    // hardware type(2) proto type(2) hlen(1) plen(1) op(2), then addresses
    if body.len() < 8 {
        return None;
    }
    let hlen = body[4] as usize;
    let plen = body[5] as usize;
    if plen != 4 || body.len() < 8 + 2 * hlen + 2 * plen {
        return None;
    }

    let spa = 8 + hlen;
    let tpa = 8 + 2 * hlen + plen;
    let src = Ipv4Addr::new(body[spa], body[spa + 1], body[spa + 2], body[spa + 3]);
    let dst = Ipv4Addr::new(body[tpa], body[tpa + 1], body[tpa + 2], body[tpa + 3]);

    Some(Layer3Info {
        src_ip: IpAddr::V4(src),
        dst_ip: IpAddr::V4(dst),
        version: "ARP".to_string(),
        protocol: "ARP".to_string(),
        ttl: 0,
    })
}

/// Passive OS guess from the initial TTL / hop limit.
///
/// Values decrement per hop, so ranges are matched instead of exact
/// initial values (Windows 128, Linux/Apple 64, Solaris/Cisco 255).
pub fn guess_os(ttl: u8) -> &'static str {
    match ttl {
        t if t > 128 => "Solaris/Cisco",
        t if t > 64 => "Windows",
        t if t > 32 => "Linux/Apple/iOS",
        _ => "Unknown",
    }
}
