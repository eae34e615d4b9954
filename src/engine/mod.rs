//! Capture engine
//!
//! Wires the whole pipeline together: a capture thread feeds decoded
//! frames through the dissector chain, the shared state stores are
//! updated in dependency order, and each processed packet is delivered
//! to the consumer callback with its enrichments and alerts. A periodic
//! tick expires idle state and sweeps dirty flows to storage.

pub mod capture;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analyzer::{Anomaly, AnomalyDetector, BaselineTracker, PrivacyIssue, PrivacyScanner};
use crate::config::Config;
use crate::core::packet::{DnsKind, Packet};
use crate::core::parser;
use crate::correlator::{DnsCache, FlowTable, SessionTracker};
use crate::database::Database;
use crate::enricher::{
    ApplicationIdentifier, DeviceTracker, GeoIpService, Ja3Catalog, ReverseDnsResolver,
    TrafficClassifier, VendorLookup,
};
use crate::models::Flow;
use crate::wireless::{WifiEvent, WifiScanner};
use capture::{FrameSource, LinkKind, RawFrame};

const CHANNEL_CAPACITY: usize = 4096;

/// Everything known about one processed packet, delivered to the
/// consumer callback.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub protocol: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u32,
    pub dns_info: String,
    pub tls_info: String,
    pub dst_domain: String,
    pub device_vendor: String,
    pub device_hostname: String,
    pub flow: Option<Flow>,
    pub privacy_issues: Vec<PrivacyIssue>,
    pub anomalies: Vec<Anomaly>,
    pub wifi: Option<WifiEvent>,
}

/// Counters exposed through the stats interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub packets_processed: u64,
    pub packets_dropped: u64,
    pub bytes_processed: u64,
}

/// The assembled pipeline and its shared state.
pub struct Engine {
    db: Database,
    dns_cache: Arc<DnsCache>,
    flow_table: Arc<FlowTable>,
    device_tracker: Arc<DeviceTracker>,
    session_tracker: Arc<SessionTracker>,
    baseline_tracker: Arc<BaselineTracker>,
    vendor_lookup: Arc<VendorLookup>,
    anomaly_detector: AnomalyDetector,
    privacy_scanner: PrivacyScanner,
    wifi_scanner: WifiScanner,
    rdns: ReverseDnsResolver,

    flow_timeout: ChronoDuration,
    tick_interval: Duration,

    running: Arc<AtomicBool>,
    packets_processed: Arc<AtomicU64>,
    bytes_processed: Arc<AtomicU64>,
    packets_dropped: Arc<AtomicU64>,
}

impl Engine {
    /// Assemble the pipeline. Fails on unreadable GeoIP databases;
    /// absent ones just disable enrichment.
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let geoip = GeoIpService::open(
            std::path::Path::new(&config.geoip.city_db),
            std::path::Path::new(&config.geoip.asn_db),
        )?;
        let geoip = if geoip.is_enabled() {
            info!("GeoIP enrichment enabled");
            Some(Arc::new(geoip))
        } else {
            None
        };

        let dns_cache = Arc::new(DnsCache::new());
        let ja3_catalog = Arc::new(Ja3Catalog::new());
        let app_identifier = Arc::new(ApplicationIdentifier::new(ja3_catalog.clone()));
        let classifier = Arc::new(TrafficClassifier::new(app_identifier.clone()));
        let vendor_lookup = Arc::new(VendorLookup::new());

        let flow_table = Arc::new(FlowTable::new(
            dns_cache.clone(),
            geoip,
            ja3_catalog,
            app_identifier,
            classifier,
        ));

        let device_tracker = Arc::new(DeviceTracker::new(db.clone(), vendor_lookup.clone()));
        if let Err(e) = device_tracker.load_cache() {
            warn!("failed to load device cache: {:#}", e);
        }

        Ok(Self {
            db,
            dns_cache,
            flow_table,
            device_tracker,
            session_tracker: Arc::new(SessionTracker::new(config.tracking.session_timeout_secs)),
            baseline_tracker: Arc::new(BaselineTracker::new(config.tracking.baseline_min_flows)),
            vendor_lookup,
            anomaly_detector: AnomalyDetector::new()
                .with_high_risk_countries(config.tracking.high_risk_countries.clone()),
            privacy_scanner: PrivacyScanner::new(),
            wifi_scanner: WifiScanner::new(),
            rdns: ReverseDnsResolver::new(),
            flow_timeout: ChronoDuration::seconds(config.tracking.flow_timeout_secs),
            tick_interval: Duration::from_secs(config.tracking.tick_interval_secs.max(1)),
            running: Arc::new(AtomicBool::new(false)),
            packets_processed: Arc::new(AtomicU64::new(0)),
            bytes_processed: Arc::new(AtomicU64::new(0)),
            packets_dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run the pipeline over a source until it is exhausted or
    /// [`Engine::stop`] is called. Each processed packet is handed to
    /// `on_packet`.
    pub async fn run<S, F>(&self, source: S, mut on_packet: F) -> Result<()>
    where
        S: FrameSource + 'static,
        F: FnMut(PacketEvent),
    {
        self.running.store(true, Ordering::SeqCst);
        let link = source.link_kind();

        let (tx, mut rx) = mpsc::channel::<RawFrame>(CHANNEL_CAPACITY);
        let running = self.running.clone();
        let dropped = self.packets_dropped.clone();

        let reader = std::thread::spawn(move || {
            let mut source = source;
            let mut since_stats = 0u32;
            while running.load(Ordering::SeqCst) {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        since_stats += 1;
                        if tx.blocking_send(frame).is_err() {
                            break;
                        }
                        if since_stats >= 256 {
                            dropped.store(source.stats().dropped, Ordering::Relaxed);
                            since_stats = 0;
                        }
                    }
                    Ok(None) => continue, // read timeout
                    Err(e) => {
                        debug!("capture source finished: {:#}", e);
                        break;
                    }
                }
            }
            dropped.store(source.stats().dropped, Ordering::Relaxed);
        });

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Some(event) = self.process_frame(&frame, link) {
                                on_packet(event);
                            }
                            self.packets_processed.fetch_add(1, Ordering::Relaxed);
                            self.bytes_processed
                                .fetch_add(u64::from(frame.wire_len), Ordering::Relaxed);
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.tick();
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        // Closing the channel unblocks a reader stuck in a full send.
        drop(rx);
        let _ = reader.join();
        self.tick();
        info!("capture engine stopped");
        Ok(())
    }

    /// Request cooperative shutdown.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
        }
    }

    pub fn active_flows(&self) -> Vec<Flow> {
        self.flow_table.active_flows()
    }

    pub fn session_tracker(&self) -> Arc<SessionTracker> {
        self.session_tracker.clone()
    }

    pub fn baseline_tracker(&self) -> Arc<BaselineTracker> {
        self.baseline_tracker.clone()
    }

    pub fn device_tracker(&self) -> Arc<DeviceTracker> {
        self.device_tracker.clone()
    }

    pub fn resolver(&self) -> ReverseDnsResolver {
        self.rdns.clone()
    }

    /// One frame through the whole chain.
    fn process_frame(&self, frame: &RawFrame, link: LinkKind) -> Option<PacketEvent> {
        match link {
            LinkKind::Ethernet => self.process_ethernet(frame),
            LinkKind::Dot11 => self.process_wifi(frame, false),
            LinkKind::Radiotap => self.process_wifi(frame, true),
        }
    }

    fn process_ethernet(&self, frame: &RawFrame) -> Option<PacketEvent> {
        let packet = parser::parse_ethernet_frame(&frame.data, frame.timestamp, frame.wire_len)?;

        let device = self.device_tracker.track(&packet);
        let (device_vendor, device_hostname, device_id, device_mac) = match &device {
            Some(d) => (
                d.vendor.clone(),
                if d.hostname.is_empty() {
                    "Unknown Device".to_string()
                } else {
                    d.hostname.clone()
                },
                d.id,
                d.mac_address.clone(),
            ),
            None => (String::new(), String::new(), None, String::new()),
        };

        let flow = self.flow_table.update(&packet, device_id);

        let mut event = self.base_event(&packet);
        event.device_vendor = device_vendor;
        event.device_hostname = device_hostname;

        if let Some(flow) = &flow {
            if !flow.dst_domain.is_empty() {
                event.dst_domain = flow.dst_domain.clone();
            } else if !flow.tls_sni.is_empty() {
                event.dst_domain = flow.tls_sni.clone();
            }

            self.session_tracker.track_flow(flow);

            // Alert order is fixed: privacy findings before anomalies.
            event.privacy_issues = self.privacy_scanner.scan(flow);

            let mac = if !device_mac.is_empty() {
                device_mac
            } else {
                packet.src_mac().to_string()
            };
            if !mac.is_empty() {
                self.baseline_tracker.update_baseline(&mac, flow);
                let baseline = self.baseline_tracker.get_baseline(&mac);
                event.anomalies = self.anomaly_detector.detect(flow, baseline.as_ref());
            }

            self.record_observations(&packet, flow, device_id);
        }

        event.flow = flow;
        Some(event)
    }

    fn process_wifi(&self, frame: &RawFrame, radiotap: bool) -> Option<PacketEvent> {
        let wifi = self
            .wifi_scanner
            .scan(&frame.data, radiotap, frame.timestamp)?;

        let mut event = PacketEvent {
            timestamp: frame.timestamp,
            protocol: String::new(),
            src_ip: String::new(),
            dst_ip: String::new(),
            src_port: 0,
            dst_port: 0,
            length: frame.wire_len,
            dns_info: String::new(),
            tls_info: String::new(),
            dst_domain: String::new(),
            device_vendor: String::new(),
            device_hostname: String::new(),
            flow: None,
            privacy_issues: Vec::new(),
            anomalies: Vec::new(),
            wifi: None,
        };

        match &wifi {
            WifiEvent::Beacon(ap) => {
                event.protocol = "802.11 Beacon".to_string();
                event.device_hostname = format!("AP: {}", ap.ssid);

                let mut ap = ap.clone();
                ap.vendor = self.vendor_lookup.lookup(&ap.bssid);
                if let Err(e) = self.db.save_access_point(&ap) {
                    warn!("failed to persist access point {}: {:#}", ap.bssid, e);
                }
                event.wifi = Some(WifiEvent::Beacon(ap));
            }
            WifiEvent::Probe(client) => {
                event.protocol = "802.11 Probe".to_string();

                let mut client = client.clone();
                client.vendor = self.vendor_lookup.lookup(&client.mac);
                if let Err(e) = self.db.save_wifi_client(&client) {
                    warn!("failed to persist wifi client {}: {:#}", client.mac, e);
                }
                event.wifi = Some(WifiEvent::Probe(client));
            }
            WifiEvent::Eapol(handshake) => {
                event.protocol = "EAPOL".to_string();
                if let Err(e) = self.db.insert_handshake(handshake) {
                    warn!("failed to persist handshake for {}: {:#}", handshake.bssid, e);
                }
                event.wifi = Some(wifi.clone());
            }
        }

        Some(event)
    }

    fn base_event(&self, packet: &Packet) -> PacketEvent {
        PacketEvent {
            timestamp: packet.timestamp,
            protocol: packet.protocol_label().to_string(),
            src_ip: packet.src_ip_string(),
            dst_ip: packet.dst_ip_string(),
            src_port: packet.layer4.as_ref().map(|l| l.src_port).unwrap_or(0),
            dst_port: packet.layer4.as_ref().map(|l| l.dst_port).unwrap_or(0),
            length: packet.length,
            dns_info: packet.dns.as_ref().map(|d| d.summary()).unwrap_or_default(),
            tls_info: packet
                .tls
                .as_ref()
                .filter(|t| t.handshake)
                .map(|t| {
                    if t.sni.is_empty() {
                        "Client Hello".to_string()
                    } else {
                        format!("Client Hello (SNI: {})", t.sni)
                    }
                })
                .unwrap_or_default(),
            dst_domain: String::new(),
            device_vendor: String::new(),
            device_hostname: String::new(),
            flow: None,
            privacy_issues: Vec::new(),
            anomalies: Vec::new(),
            wifi: None,
        }
    }

    /// Side-channel observation rows; failures are logged, never fatal.
    fn record_observations(&self, packet: &Packet, flow: &Flow, device_id: Option<i64>) {
        if let Some(dns) = &packet.dns {
            if dns.kind == DnsKind::Response && !dns.query.is_empty() {
                let ips: Vec<String> = dns
                    .answers
                    .iter()
                    .filter(|a| !a.ip.is_empty())
                    .map(|a| a.ip.clone())
                    .collect();
                let ttl = dns.answers.first().map(|a| a.ttl).unwrap_or(0);
                if let Err(e) = self.db.insert_dns_query(
                    device_id,
                    &dns.query,
                    &dns.query_type,
                    &ips,
                    ttl,
                    packet.timestamp,
                ) {
                    warn!("failed to persist dns observation: {:#}", e);
                }
            }
        }

        if let Some(tls) = &packet.tls {
            if tls.handshake && !tls.ja3.is_empty() {
                if let Err(e) = self.db.insert_tls_handshake(
                    flow.db_id,
                    &tls.sni,
                    &tls.ja3,
                    &tls.cipher_suite,
                    &tls.version,
                    &flow.ja3_application,
                    packet.timestamp,
                ) {
                    warn!("failed to persist tls observation: {:#}", e);
                }
            }
        }
    }

    /// Periodic maintenance: expiry sweeps and dirty-flow persistence.
    fn tick(&self) {
        let expired_flows = self.flow_table.cleanup(self.flow_timeout);
        let expired_sessions = self.session_tracker.cleanup();
        let expired_dns = self.dns_cache.cleanup();
        if expired_flows + expired_sessions + expired_dns > 0 {
            debug!(
                "tick: expired {} flows, {} sessions, {} dns entries",
                expired_flows, expired_sessions, expired_dns
            );
        }

        for flow in self.flow_table.dirty_flows() {
            match self.db.save_flow(&flow) {
                Ok(id) => self.flow_table.mark_persisted(flow.id, Some(id)),
                Err(e) => warn!("failed to persist flow {}: {:#}", flow.key, e),
            }
        }
    }
}
