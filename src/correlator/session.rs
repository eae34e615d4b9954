//! Session grouping
//!
//! Buckets flows by (source endpoint, destination label, application) so
//! many short-lived connections to the same service read as one logical
//! session. The source side of the canonical key stands in for the local
//! device.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::{Flow, Session};

/// Groups flows into sessions keyed by `device|destination|application`.
pub struct SessionTracker {
    sessions: RwLock<HashMap<String, SessionState>>,
    timeout: Duration,
}

struct SessionState {
    session: Session,
    /// Last counters contributed per member flow, so repeated updates of
    /// a growing flow add deltas instead of double counting.
    contributions: HashMap<u64, (u64, u64)>,
}

impl SessionTracker {
    pub fn new(timeout_secs: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout: Duration::seconds(timeout_secs),
        }
    }

    fn session_key(flow: &Flow) -> (String, String, String, String) {
        let device = flow.key.src_ip.clone();
        let destination = flow.destination_label().to_string();
        let application = if flow.application.is_empty() {
            "unknown".to_string()
        } else {
            flow.application.clone()
        };
        let key = format!("{}|{}|{}", device, destination, application);
        (key, device, destination, application)
    }

    /// Absorb a flow update into its session, minting the session on
    /// first sight.
    pub fn track_flow(&self, flow: &Flow) {
        let (key, device, destination, application) = Self::session_key(flow);

        let mut sessions = self.sessions.write();
        let state = sessions.entry(key.clone()).or_insert_with(|| SessionState {
            session: Session {
                key,
                device,
                destination,
                application,
                start_time: flow.first_seen,
                last_seen: flow.last_seen,
                flow_ids: Vec::new(),
                flow_count: 0,
                total_bytes: 0,
                total_packets: 0,
            },
            contributions: HashMap::new(),
        });

        let session = &mut state.session;
        session.last_seen = session.last_seen.max(flow.last_seen);
        session.start_time = session.start_time.min(flow.first_seen);

        if !session.flow_ids.contains(&flow.id) {
            session.flow_ids.push(flow.id);
            session.flow_count += 1;
        }

        let (prev_bytes, prev_packets) = state
            .contributions
            .insert(flow.id, (flow.byte_count, flow.packet_count))
            .unwrap_or((0, 0));
        session.total_bytes += flow.byte_count - prev_bytes;
        session.total_packets += flow.packet_count - prev_packets;
    }

    /// Snapshot of every active session.
    pub fn active_sessions(&self) -> Vec<Session> {
        self.sessions
            .read()
            .values()
            .map(|s| s.session.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Expire sessions idle past the configured timeout.
    pub fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.timeout;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.session.last_seen >= cutoff);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlowKey;
    use chrono::Utc;

    fn flow(id: u64, dst_domain: &str, app: &str, bytes: u64, packets: u64) -> Flow {
        let key = FlowKey::canonical("10.0.0.5", "1.2.3.4", 1000 + id as u16, 443, "TCP");
        let mut f = Flow::new(id, key, Utc::now(), "TCP".to_string());
        f.dst_domain = dst_domain.to_string();
        f.application = app.to_string();
        f.byte_count = bytes;
        f.packet_count = packets;
        f.last_seen = Utc::now();
        f
    }

    #[test]
    fn test_flows_group_into_one_session() {
        let tracker = SessionTracker::new(300);
        tracker.track_flow(&flow(1, "example.com", "HTTPS", 100, 1));
        tracker.track_flow(&flow(2, "example.com", "HTTPS", 200, 2));

        let sessions = tracker.active_sessions();
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.flow_count, 2);
        assert_eq!(s.total_bytes, 300);
        assert_eq!(s.total_packets, 3);
        assert_eq!(s.key, "10.0.0.5|example.com|HTTPS");
    }

    #[test]
    fn test_growing_flow_adds_deltas() {
        let tracker = SessionTracker::new(300);
        let mut f = flow(1, "example.com", "HTTPS", 100, 1);
        tracker.track_flow(&f);

        f.byte_count = 250;
        f.packet_count = 3;
        tracker.track_flow(&f);

        let s = &tracker.active_sessions()[0];
        assert_eq!(s.flow_count, 1);
        assert_eq!(s.total_bytes, 250);
        assert_eq!(s.total_packets, 3);
    }

    #[test]
    fn test_unknown_application_bucket() {
        let tracker = SessionTracker::new(300);
        tracker.track_flow(&flow(1, "", "", 10, 1));

        let s = &tracker.active_sessions()[0];
        // No domain: destination falls back to the canonical dst IP.
        assert_eq!(s.key, "10.0.0.5|1.2.3.4|unknown");
    }

    #[test]
    fn test_start_time_is_min_first_seen() {
        let tracker = SessionTracker::new(300);
        let mut early = flow(1, "example.com", "HTTPS", 10, 1);
        early.first_seen = Utc::now() - Duration::seconds(60);
        let late = flow(2, "example.com", "HTTPS", 10, 1);

        tracker.track_flow(&late);
        tracker.track_flow(&early);

        let s = &tracker.active_sessions()[0];
        assert_eq!(s.start_time, early.first_seen);
    }

    #[test]
    fn test_cleanup_expires_idle() {
        let tracker = SessionTracker::new(300);
        let mut stale = flow(1, "example.com", "HTTPS", 10, 1);
        stale.last_seen = Utc::now() - Duration::seconds(600);
        stale.first_seen = stale.last_seen;
        tracker.track_flow(&stale);

        assert_eq!(tracker.cleanup(), 1);
        assert!(tracker.is_empty());
    }
}
