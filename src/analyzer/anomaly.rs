//! Anomaly detection
//!
//! Stateless scoring of a flow against a device baseline snapshot. Each
//! rule fires independently, so one flow can raise several anomalies.

use chrono::Timelike;
use serde::Serialize;

use crate::models::Flow;
use super::baseline::DeviceBaseline;
use super::Severity;

const DEFAULT_HIGH_RISK_COUNTRIES: &[&str] = &["RU", "CN", "KP", "IR"];

/// Minimum hourly average before volume spikes are comparable.
const VOLUME_HISTORY_FLOOR: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalyKind {
    VolumeSpike,
    NewDestination,
    NewApplication,
    NewGeography,
    UnusualTime,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::VolumeSpike => write!(f, "VOLUME_SPIKE"),
            AnomalyKind::NewDestination => write!(f, "NEW_DESTINATION"),
            AnomalyKind::NewApplication => write!(f, "NEW_APPLICATION"),
            AnomalyKind::NewGeography => write!(f, "NEW_GEOGRAPHY"),
            AnomalyKind::UnusualTime => write!(f, "UNUSUAL_TIME"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub flow_id: u64,
}

/// Stateless rule engine; thresholds fixed at construction.
pub struct AnomalyDetector {
    volume_multiplier: f64,
    high_risk_countries: Vec<String>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self {
            volume_multiplier: 5.0,
            high_risk_countries: DEFAULT_HIGH_RISK_COUNTRIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_high_risk_countries(mut self, countries: Vec<String>) -> Self {
        if !countries.is_empty() {
            self.high_risk_countries = countries;
        }
        self
    }

    /// Score one flow against the device's baseline. No baseline, no
    /// anomalies.
    pub fn detect(&self, flow: &Flow, baseline: Option<&DeviceBaseline>) -> Vec<Anomaly> {
        let baseline = match baseline {
            Some(b) => b,
            None => return Vec::new(),
        };

        let mut anomalies = Vec::new();

        // Volume spike: only meaningful once the hourly average itself
        // carries real history, and strictly above the multiple.
        let avg_hourly = baseline.average_hourly_activity();
        if avg_hourly > VOLUME_HISTORY_FLOOR
            && flow.byte_count as f64 > avg_hourly * self.volume_multiplier
        {
            anomalies.push(Anomaly {
                kind: AnomalyKind::VolumeSpike,
                severity: Severity::Medium,
                description: format!(
                    "Flow volume ({} bytes) exceeds 5x hourly average ({:.0} bytes)",
                    flow.byte_count, avg_hourly
                ),
                flow_id: flow.id,
            });
        }

        if !flow.dst_country.is_empty() && !baseline.has_country(&flow.dst_country) {
            let severity = if self.high_risk_countries.contains(&flow.dst_country) {
                Severity::Critical
            } else {
                Severity::Medium
            };
            anomalies.push(Anomaly {
                kind: AnomalyKind::NewGeography,
                severity,
                description: format!("Device connected to new country: {}", flow.dst_country),
                flow_id: flow.id,
            });
        }

        if !flow.application.is_empty()
            && !baseline.has_app(&flow.application)
            && baseline.typical_apps.len() > 5
        {
            anomalies.push(Anomaly {
                kind: AnomalyKind::NewApplication,
                severity: Severity::Low,
                description: format!("Device used new application: {}", flow.application),
                flow_id: flow.id,
            });
        }

        if !flow.dst_domain.is_empty()
            && !baseline.has_destination(&flow.dst_domain)
            && baseline.typical_destinations.len() > 20
        {
            anomalies.push(Anomaly {
                kind: AnomalyKind::NewDestination,
                severity: Severity::Low,
                description: format!("Device visited new domain: {}", flow.dst_domain),
                flow_id: flow.id,
            });
        }

        let hour = flow.last_seen.hour() as usize;
        if baseline.flow_count > 100 && baseline.typical_hourly_activity[hour] == 0 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::UnusualTime,
                severity: Severity::Low,
                description: format!(
                    "Activity detected during typically inactive hour: {}:00",
                    hour
                ),
                flow_id: flow.id,
            });
        }

        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlowKey;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    const MIB: u64 = 1024 * 1024;

    fn baseline() -> DeviceBaseline {
        let now = Utc::now();
        let mut apps = HashMap::new();
        apps.insert("HTTP".to_string(), 100u64);
        let mut dests = HashMap::new();
        dests.insert("google.com".to_string(), 100u64);
        let mut countries = HashMap::new();
        countries.insert("US".to_string(), 100u64);
        countries.insert("JP".to_string(), 50u64);

        let mut hourly = [0u64; 24];
        hourly[12] = 50 * MIB; // avg ~2 MiB/hour

        DeviceBaseline {
            device_mac: "00:11:22:33:44:55".to_string(),
            first_seen: now,
            last_updated: now,
            flow_count: 200,
            typical_apps: apps,
            typical_destinations: dests,
            typical_traffic_classes: HashMap::new(),
            typical_countries: countries,
            typical_hourly_activity: hourly,
            total_bytes: 50 * MIB,
            total_packets: 24_000,
        }
    }

    fn flow_at_hour(hour: u32, bytes: u64, country: &str) -> Flow {
        let key = FlowKey::canonical("192.168.1.50", "93.184.216.34", 40000, 443, "TCP");
        let mut f = Flow::new(1, key, Utc::now(), "TCP".to_string());
        f.byte_count = bytes;
        f.dst_country = country.to_string();
        f.last_seen = Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap();
        f
    }

    #[test]
    fn test_no_baseline_no_anomalies() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(12, 500_000, "US");
        assert!(detector.detect(&flow, None).is_empty());
    }

    #[test]
    fn test_normal_behavior_quiet() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(12, 500_000, "US");
        assert!(detector.detect(&flow, Some(&baseline())).is_empty());
    }

    #[test]
    fn test_volume_spike() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(12, 15 * MIB, "US");
        let anomalies = detector.detect(&flow, Some(&baseline()));
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::VolumeSpike));
        assert!(anomalies
            .iter()
            .all(|a| a.kind != AnomalyKind::VolumeSpike || a.severity == Severity::Medium));
    }

    #[test]
    fn test_volume_at_exact_multiple_quiet() {
        let detector = AnomalyDetector::new();
        let base = baseline();
        let avg = base.average_hourly_activity();
        let flow = flow_at_hour(12, (avg * 5.0) as u64, "US");
        let anomalies = detector.detect(&flow, Some(&base));
        // Strict inequality: exactly 5x is not a spike.
        assert!(anomalies.iter().all(|a| a.kind != AnomalyKind::VolumeSpike));
    }

    #[test]
    fn test_new_geography() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(12, 100, "DE");
        let anomalies = detector.detect(&flow, Some(&baseline()));
        let geo = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::NewGeography)
            .unwrap();
        assert_eq!(geo.severity, Severity::Medium);
    }

    #[test]
    fn test_new_geography_high_risk_critical() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(12, 100, "KP");
        let anomalies = detector.detect(&flow, Some(&baseline()));
        let geo = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::NewGeography)
            .unwrap();
        assert_eq!(geo.severity, Severity::Critical);
    }

    #[test]
    fn test_empty_country_never_geographic() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(12, 100, "");
        let anomalies = detector.detect(&flow, Some(&baseline()));
        assert!(anomalies.iter().all(|a| a.kind != AnomalyKind::NewGeography));
    }

    #[test]
    fn test_unusual_time() {
        let detector = AnomalyDetector::new();
        let flow = flow_at_hour(2, 100, "US");
        let anomalies = detector.detect(&flow, Some(&baseline()));
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::UnusualTime));
    }

    #[test]
    fn test_new_application_needs_variety() {
        let detector = AnomalyDetector::new();
        let mut base = baseline();

        let key = FlowKey::canonical("192.168.1.50", "93.184.216.34", 40000, 443, "TCP");
        let mut flow = Flow::new(1, key, Utc::now(), "TCP".to_string());
        flow.application = "Netflix".to_string();
        flow.last_seen = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        // Only one known app: not enough variety to call anything new.
        assert!(detector
            .detect(&flow, Some(&base))
            .iter()
            .all(|a| a.kind != AnomalyKind::NewApplication));

        for app in ["A", "B", "C", "D", "E", "F"] {
            base.typical_apps.insert(app.to_string(), 1);
        }
        assert!(detector
            .detect(&flow, Some(&base))
            .iter()
            .any(|a| a.kind == AnomalyKind::NewApplication));
    }

    #[test]
    fn test_new_destination_needs_variety() {
        let detector = AnomalyDetector::new();
        let mut base = baseline();

        let key = FlowKey::canonical("192.168.1.50", "93.184.216.34", 40000, 443, "TCP");
        let mut flow = Flow::new(1, key, Utc::now(), "TCP".to_string());
        flow.dst_domain = "brand-new.example".to_string();
        flow.last_seen = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        assert!(detector
            .detect(&flow, Some(&base))
            .iter()
            .all(|a| a.kind != AnomalyKind::NewDestination));

        for i in 0..21 {
            base.typical_destinations.insert(format!("site-{}.example", i), 1);
        }
        assert!(detector
            .detect(&flow, Some(&base))
            .iter()
            .any(|a| a.kind == AnomalyKind::NewDestination));
    }
}
