//! Behavioral baseline tracking
//!
//! Learns what "normal" looks like per device: which applications it
//! uses, where it connects, which countries it talks to, and when it is
//! active. The anomaly detector scores flows against these profiles.

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::Flow;

const DEFAULT_MIN_FLOWS: u64 = 100;

/// Learned normal behavior for one device.
#[derive(Debug, Clone)]
pub struct DeviceBaseline {
    pub device_mac: String,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub flow_count: u64,
    pub typical_apps: HashMap<String, u64>,
    pub typical_destinations: HashMap<String, u64>,
    pub typical_traffic_classes: HashMap<String, u64>,
    pub typical_countries: HashMap<String, u64>,
    /// Update count per hour of day, a packet-count proxy for activity.
    pub typical_hourly_activity: [u64; 24],
    pub total_bytes: u64,
    pub total_packets: u64,
}

impl DeviceBaseline {
    fn new(device_mac: String, first_seen: DateTime<Utc>) -> Self {
        Self {
            device_mac,
            first_seen,
            last_updated: first_seen,
            flow_count: 0,
            typical_apps: HashMap::new(),
            typical_destinations: HashMap::new(),
            typical_traffic_classes: HashMap::new(),
            typical_countries: HashMap::new(),
            typical_hourly_activity: [0; 24],
            total_bytes: 0,
            total_packets: 0,
        }
    }

    pub fn has_app(&self, app: &str) -> bool {
        !app.is_empty() && self.typical_apps.contains_key(app)
    }

    pub fn has_destination(&self, dest: &str) -> bool {
        !dest.is_empty() && self.typical_destinations.contains_key(dest)
    }

    pub fn has_country(&self, country: &str) -> bool {
        !country.is_empty() && self.typical_countries.contains_key(country)
    }

    /// Mean of the hourly histogram.
    pub fn average_hourly_activity(&self) -> f64 {
        let total: u64 = self.typical_hourly_activity.iter().sum();
        total as f64 / 24.0
    }

    /// True when the hour shows above-average activity.
    pub fn is_active_hour(&self, hour: usize) -> bool {
        if hour > 23 {
            return false;
        }
        self.typical_hourly_activity[hour] as f64 > self.average_hourly_activity()
    }
}

/// Per-device baseline store.
pub struct BaselineTracker {
    baselines: RwLock<HashMap<String, DeviceBaseline>>,
    min_flows: u64,
}

impl BaselineTracker {
    /// `min_flows` is the establishment threshold; 0 selects the default.
    pub fn new(min_flows: u64) -> Self {
        Self {
            baselines: RwLock::new(HashMap::new()),
            min_flows: if min_flows == 0 {
                DEFAULT_MIN_FLOWS
            } else {
                min_flows
            },
        }
    }

    /// Fold one flow update into the device's baseline.
    pub fn update_baseline(&self, device_mac: &str, flow: &Flow) {
        if device_mac.is_empty() {
            return;
        }

        let mut baselines = self.baselines.write();
        let baseline = baselines
            .entry(device_mac.to_string())
            .or_insert_with(|| DeviceBaseline::new(device_mac.to_string(), flow.first_seen));

        baseline.last_updated = Utc::now();
        baseline.flow_count += 1;
        baseline.total_bytes += flow.byte_count;
        baseline.total_packets += flow.packet_count;

        if !flow.application.is_empty() {
            *baseline.typical_apps.entry(flow.application.clone()).or_insert(0) += 1;
        }

        // Destination falls back to the canonical dst IP so every update
        // lands somewhere.
        let dest = flow.destination_label();
        if !dest.is_empty() {
            *baseline
                .typical_destinations
                .entry(dest.to_string())
                .or_insert(0) += 1;
        }

        if !flow.traffic_class.is_empty() {
            *baseline
                .typical_traffic_classes
                .entry(flow.traffic_class.clone())
                .or_insert(0) += 1;
        }

        if !flow.dst_country.is_empty() {
            *baseline
                .typical_countries
                .entry(flow.dst_country.clone())
                .or_insert(0) += 1;
        }

        let hour = flow.last_seen.hour() as usize;
        baseline.typical_hourly_activity[hour] += 1;
    }

    /// Snapshot of a device's baseline.
    pub fn get_baseline(&self, device_mac: &str) -> Option<DeviceBaseline> {
        self.baselines.read().get(device_mac).cloned()
    }

    /// True once the device has enough history for alerting.
    pub fn is_established(&self, device_mac: &str) -> bool {
        self.baselines
            .read()
            .get(device_mac)
            .map(|b| b.flow_count >= self.min_flows)
            .unwrap_or(false)
    }

    /// Snapshot of every baseline, for reporting.
    pub fn all_baselines(&self) -> HashMap<String, DeviceBaseline> {
        self.baselines.read().clone()
    }

    pub fn len(&self) -> usize {
        self.baselines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlowKey;

    fn flow(app: &str, domain: &str, country: &str, bytes: u64) -> Flow {
        let key = FlowKey::canonical("192.168.1.50", "93.184.216.34", 40000, 443, "TCP");
        let mut f = Flow::new(1, key, Utc::now(), "TCP".to_string());
        f.application = app.to_string();
        f.dst_domain = domain.to_string();
        f.dst_country = country.to_string();
        f.byte_count = bytes;
        f.packet_count = 10;
        f.last_seen = Utc::now();
        f
    }

    #[test]
    fn test_update_accumulates() {
        let tracker = BaselineTracker::new(100);
        tracker.update_baseline("aa:bb:cc:dd:ee:ff", &flow("HTTPS", "example.com", "US", 500));
        tracker.update_baseline("aa:bb:cc:dd:ee:ff", &flow("HTTPS", "example.com", "US", 300));

        let baseline = tracker.get_baseline("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(baseline.flow_count, 2);
        assert_eq!(baseline.total_bytes, 800);
        assert_eq!(baseline.typical_apps["HTTPS"], 2);
        assert_eq!(baseline.typical_destinations["example.com"], 2);
        assert_eq!(baseline.typical_countries["US"], 2);
        assert!(baseline.has_app("HTTPS"));
        assert!(baseline.has_destination("example.com"));
        assert!(baseline.has_country("US"));
        assert!(!baseline.has_country("CN"));
    }

    #[test]
    fn test_empty_fields_not_counted() {
        let tracker = BaselineTracker::new(100);
        tracker.update_baseline("aa:bb:cc:dd:ee:ff", &flow("", "", "", 100));

        let baseline = tracker.get_baseline("aa:bb:cc:dd:ee:ff").unwrap();
        assert!(baseline.typical_apps.is_empty());
        assert!(baseline.typical_countries.is_empty());
        // Destination fell back to the canonical dst IP.
        assert_eq!(baseline.typical_destinations["93.184.216.34"], 1);
        assert!(!baseline.has_country(""));
        assert!(!baseline.has_app(""));
    }

    #[test]
    fn test_establishment_threshold() {
        let tracker = BaselineTracker::new(3);
        let mac = "aa:bb:cc:dd:ee:ff";
        assert!(!tracker.is_established(mac));

        for _ in 0..3 {
            tracker.update_baseline(mac, &flow("HTTPS", "example.com", "US", 10));
        }
        assert!(tracker.is_established(mac));
    }

    #[test]
    fn test_hourly_histogram_counts_updates() {
        let tracker = BaselineTracker::new(100);
        let f = flow("HTTPS", "example.com", "US", 10);
        tracker.update_baseline("aa:bb:cc:dd:ee:ff", &f);

        let baseline = tracker.get_baseline("aa:bb:cc:dd:ee:ff").unwrap();
        let hour = f.last_seen.hour() as usize;
        assert_eq!(baseline.typical_hourly_activity[hour], 1);
        assert_eq!(
            baseline.typical_hourly_activity.iter().sum::<u64>(),
            baseline.flow_count
        );
    }

    #[test]
    fn test_active_hour() {
        let tracker = BaselineTracker::new(100);
        let f = flow("HTTPS", "example.com", "US", 10);
        tracker.update_baseline("aa:bb:cc:dd:ee:ff", &f);

        let baseline = tracker.get_baseline("aa:bb:cc:dd:ee:ff").unwrap();
        let hour = f.last_seen.hour() as usize;
        assert!(baseline.is_active_hour(hour));
        assert!(!baseline.is_active_hour((hour + 12) % 24));
        assert!(!baseline.is_active_hour(24));
    }
}
