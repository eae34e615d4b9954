//! Flow table
//!
//! Canonical 5-tuple aggregation of packets into bidirectional flows,
//! with one-shot DNS and GeoIP enrichment at insert and first-observed
//! protocol metadata filled as packets arrive.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::packet::{DnsKind, Packet};
use crate::enricher::application::ApplicationIdentifier;
use crate::enricher::classifier::TrafficClassifier;
use crate::enricher::geoip::GeoIpService;
use crate::enricher::ja3_db::Ja3Catalog;
use crate::models::{Flow, FlowKey};
use super::dns_cache::DnsCache;

/// Shared flow store keyed by canonical 5-tuple.
pub struct FlowTable {
    flows: RwLock<HashMap<FlowKey, Flow>>,
    next_id: AtomicU64,
    dns_cache: Arc<DnsCache>,
    geoip: Option<Arc<GeoIpService>>,
    ja3_catalog: Arc<Ja3Catalog>,
    app_identifier: Arc<ApplicationIdentifier>,
    classifier: Arc<TrafficClassifier>,
}

impl FlowTable {
    pub fn new(
        dns_cache: Arc<DnsCache>,
        geoip: Option<Arc<GeoIpService>>,
        ja3_catalog: Arc<Ja3Catalog>,
        app_identifier: Arc<ApplicationIdentifier>,
        classifier: Arc<TrafficClassifier>,
    ) -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dns_cache,
            geoip,
            ja3_catalog,
            app_identifier,
            classifier,
        }
    }

    /// Process one packet: feed the DNS cache, find or create the flow,
    /// merge counters and first-observed metadata. Returns a snapshot of
    /// the flow after the update, or `None` for packets without L3/L4.
    pub fn update(&self, packet: &Packet, device_id: Option<i64>) -> Option<Flow> {
        let l3 = packet.layer3.as_ref()?;
        let l4 = packet.layer4.as_ref()?;

        // Responses populate the cache before the key is resolved, so a
        // follow-up connection to the answered IP correlates immediately.
        if let Some(dns) = &packet.dns {
            if dns.kind == DnsKind::Response {
                let ips: Vec<String> = dns
                    .answers
                    .iter()
                    .filter(|a| !a.ip.is_empty())
                    .map(|a| a.ip.clone())
                    .collect();
                if !ips.is_empty() {
                    self.dns_cache.add(&dns.query, &ips, dns.answers[0].ttl);
                }
            }
        }

        let key = FlowKey::canonical(
            &l3.src_ip.to_string(),
            &l3.dst_ip.to_string(),
            l4.src_port,
            l4.dst_port,
            &l4.protocol,
        );

        let mut flows = self.flows.write();

        if !flows.contains_key(&key) {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let mut flow = Flow::new(id, key.clone(), packet.timestamp, l4.protocol.clone());

            // The canonical key hides direction, so both ends are tried;
            // the private side typically misses the cache.
            let dst_domain = self.dns_cache.resolve(&key.dst_ip);
            let src_domain = self.dns_cache.resolve(&key.src_ip);
            if !dst_domain.is_empty() {
                flow.dst_domain = dst_domain;
            } else if !src_domain.is_empty() {
                flow.dst_domain = src_domain;
            }

            if let Some(geoip) = &self.geoip {
                let mut geo = geoip.lookup(&key.dst_ip);
                if geo.country.is_empty() {
                    geo = geoip.lookup(&key.src_ip);
                }
                if !geo.country.is_empty() {
                    flow.dst_country = geo.country;
                    flow.dst_city = geo.city;
                    flow.dst_asn = geo.asn;
                }
            }

            flows.insert(key.clone(), flow);
        }

        let flow = flows.get_mut(&key).expect("flow inserted above");

        flow.last_seen = packet.timestamp;
        flow.packet_count += 1;
        flow.byte_count += u64::from(packet.length);

        if flow.device_id.is_none() {
            flow.device_id = device_id;
        }

        if let Some(dns) = &packet.dns {
            if flow.dns_query.is_empty() {
                flow.dns_query = dns.query.clone();
            }
        }
        if let Some(tls) = &packet.tls {
            if flow.tls_sni.is_empty() && !tls.sni.is_empty() {
                flow.tls_sni = tls.sni.clone();
            }
            if flow.ja3.is_empty() && !tls.ja3.is_empty() {
                flow.ja3 = tls.ja3.clone();
                flow.ja3_application = self.ja3_catalog.lookup(&flow.ja3);
            }
        }

        if flow.application.is_empty() {
            flow.application = self.app_identifier.identify(flow);
        }
        if flow.traffic_class.is_empty() {
            let class = self.classifier.classify(flow);
            if class != "Unknown" {
                flow.traffic_class = class;
            }
        }

        Some(flow.clone())
    }

    /// Snapshot of every active flow.
    pub fn active_flows(&self) -> Vec<Flow> {
        self.flows.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }

    /// Remove flows idle longer than `timeout`; returns the count removed.
    pub fn cleanup(&self, timeout: Duration) -> usize {
        let cutoff = Utc::now() - timeout;
        let mut flows = self.flows.write();
        let before = flows.len();
        flows.retain(|_, flow| flow.last_seen >= cutoff);
        before - flows.len()
    }

    /// Flows with activity since their last persistence sweep.
    pub fn dirty_flows(&self) -> Vec<Flow> {
        self.flows
            .read()
            .values()
            .filter(|f| match f.last_persisted {
                None => true,
                Some(persisted) => f.last_seen > persisted,
            })
            .cloned()
            .collect()
    }

    /// Record a completed persistence write, keeping the assigned row id.
    pub fn mark_persisted(&self, flow_id: u64, db_id: Option<i64>) {
        let mut flows = self.flows.write();
        if let Some(flow) = flows.values_mut().find(|f| f.id == flow_id) {
            if flow.db_id.is_none() {
                flow.db_id = db_id;
            }
            flow.last_persisted = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{DnsAnswer, DnsInfo, Layer3Info, Layer4Info};
    use std::net::IpAddr;

    fn table() -> FlowTable {
        let ja3 = Arc::new(Ja3Catalog::new());
        let apps = Arc::new(ApplicationIdentifier::new(ja3.clone()));
        FlowTable::new(
            Arc::new(DnsCache::new()),
            None,
            ja3,
            apps.clone(),
            Arc::new(TrafficClassifier::new(apps)),
        )
    }

    fn tcp_packet(src: &str, dst: &str, sport: u16, dport: u16, len: u32) -> Packet {
        let mut pkt = Packet::new(Utc::now(), len);
        pkt.layer3 = Some(Layer3Info {
            src_ip: src.parse::<IpAddr>().unwrap(),
            dst_ip: dst.parse::<IpAddr>().unwrap(),
            version: "IPv4".to_string(),
            protocol: "TCP".to_string(),
            ttl: 64,
        });
        pkt.layer4 = Some(Layer4Info {
            src_port: sport,
            dst_port: dport,
            protocol: "TCP".to_string(),
            flags: None,
            seq: None,
            ack: None,
            payload: Vec::new(),
        });
        pkt
    }

    fn dns_response(src: &str, dst: &str, query: &str, ip: &str, ttl: u32) -> Packet {
        let mut pkt = Packet::new(Utc::now(), 100);
        pkt.layer3 = Some(Layer3Info {
            src_ip: src.parse::<IpAddr>().unwrap(),
            dst_ip: dst.parse::<IpAddr>().unwrap(),
            version: "IPv4".to_string(),
            protocol: "UDP".to_string(),
            ttl: 64,
        });
        pkt.layer4 = Some(Layer4Info {
            src_port: 53,
            dst_port: 12345,
            protocol: "UDP".to_string(),
            flags: None,
            seq: None,
            ack: None,
            payload: Vec::new(),
        });
        pkt.dns = Some(DnsInfo {
            kind: DnsKind::Response,
            query: query.to_string(),
            query_type: "A".to_string(),
            answers: vec![DnsAnswer {
                name: query.to_string(),
                rtype: "A".to_string(),
                ip: ip.to_string(),
                ttl,
                cname: String::new(),
            }],
            response_code: "NoError".to_string(),
        });
        pkt
    }

    #[test]
    fn test_bidirectional_packets_share_flow() {
        let table = table();

        let out = tcp_packet("10.0.0.5", "93.184.216.34", 1000, 443, 60);
        let back = tcp_packet("93.184.216.34", "10.0.0.5", 443, 1000, 1400);

        table.update(&out, None).unwrap();
        let flow = table.update(&back, None).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(flow.packet_count, 2);
        assert_eq!(flow.byte_count, 1460);
    }

    #[test]
    fn test_dns_correlation_enriches_next_flow() {
        let table = table();

        let response = dns_response("8.8.8.8", "192.168.1.100", "example.com", "1.2.3.4", 300);
        table.update(&response, None).unwrap();

        let conn = tcp_packet("192.168.1.100", "1.2.3.4", 54321, 80, 60);
        let flow = table.update(&conn, None).unwrap();

        assert_eq!(flow.dst_domain, "example.com");
    }

    #[test]
    fn test_first_seen_monotone() {
        let table = table();

        let first = tcp_packet("10.0.0.5", "1.1.1.1", 1000, 443, 60);
        let flow1 = table.update(&first, None).unwrap();

        let second = tcp_packet("10.0.0.5", "1.1.1.1", 1000, 443, 60);
        let flow2 = table.update(&second, None).unwrap();

        assert_eq!(flow1.first_seen, flow2.first_seen);
        assert!(flow2.last_seen >= flow2.first_seen);
    }

    #[test]
    fn test_cleanup_removes_idle_flows() {
        let table = table();
        table.update(&tcp_packet("10.0.0.5", "1.1.1.1", 1000, 443, 60), None);

        assert_eq!(table.cleanup(Duration::seconds(300)), 0);
        assert_eq!(table.cleanup(Duration::seconds(-1)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_dirty_flow_watermark() {
        let table = table();
        let flow = table
            .update(&tcp_packet("10.0.0.5", "1.1.1.1", 1000, 443, 60), None)
            .unwrap();

        assert_eq!(table.dirty_flows().len(), 1);
        table.mark_persisted(flow.id, Some(7));
        assert!(table.dirty_flows().is_empty());

        table.update(&tcp_packet("10.0.0.5", "1.1.1.1", 1000, 443, 60), None);
        assert_eq!(table.dirty_flows().len(), 1);
        assert_eq!(table.dirty_flows()[0].db_id, Some(7));
    }

    #[test]
    fn test_application_from_port() {
        let table = table();
        let flow = table
            .update(&tcp_packet("10.0.0.5", "1.1.1.1", 1000, 443, 60), None)
            .unwrap();
        assert_eq!(flow.application, "HTTPS");
        assert_eq!(flow.traffic_class, "Web Browsing");
    }
}
