//! DNS correlation cache
//!
//! IP-to-domain reverse index fed by observed DNS responses, letting
//! flows established by bare IP be labelled with the hostname the client
//! actually asked for. Entries expire per answer TTL; lookups never
//! return stale data, and a periodic sweep reclaims memory.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// TTL floor applied when the answer reports 0.
const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct DnsEntry {
    domain: String,
    expires_at: DateTime<Utc>,
}

/// Thread-safe IP -> (domain, expiry) map.
///
/// When multiple domains resolve to one IP (CDNs), the latest insert
/// wins; that correlation loss is accepted.
#[derive(Debug, Default)]
pub struct DnsCache {
    entries: RwLock<HashMap<String, DnsEntry>>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite a mapping for every answered IP.
    pub fn add(&self, domain: &str, ips: &[String], ttl_secs: u32) {
        let ttl = if ttl_secs == 0 {
            DEFAULT_TTL_SECS
        } else {
            i64::from(ttl_secs)
        };
        let expires_at = Utc::now() + Duration::seconds(ttl);

        let mut entries = self.entries.write();
        for ip in ips {
            entries.insert(
                ip.clone(),
                DnsEntry {
                    domain: domain.to_string(),
                    expires_at,
                },
            );
        }
    }

    /// Look up the domain for an IP; expired entries miss.
    pub fn resolve(&self, ip: &str) -> String {
        let entries = self.entries.read();
        match entries.get(ip) {
            Some(entry) if Utc::now() <= entry.expires_at => entry.domain.clone(),
            _ => String::new(),
        }
    }

    /// Sweep expired entries; returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_resolve() {
        let cache = DnsCache::new();
        cache.add(
            "example.com",
            &["192.168.1.10".to_string(), "192.168.1.11".to_string()],
            300,
        );

        assert_eq!(cache.resolve("192.168.1.10"), "example.com");
        assert_eq!(cache.resolve("192.168.1.11"), "example.com");
        assert_eq!(cache.resolve("192.168.1.12"), "");
    }

    #[test]
    fn test_zero_ttl_promoted_to_default() {
        let cache = DnsCache::new();
        cache.add("example.com", &["1.2.3.4".to_string()], 0);
        // Still resolvable: the 0 TTL became the 300 s floor.
        assert_eq!(cache.resolve("1.2.3.4"), "example.com");
    }

    #[test]
    fn test_latest_insert_wins() {
        let cache = DnsCache::new();
        cache.add("first.com", &["9.9.9.9".to_string()], 300);
        cache.add("second.com", &["9.9.9.9".to_string()], 300);
        assert_eq!(cache.resolve("9.9.9.9"), "second.com");
    }

    #[test]
    fn test_expired_entry_misses_and_sweeps() {
        let cache = DnsCache::new();
        cache.add("stale.com", &["10.0.0.1".to_string()], 300);
        cache.add("fresh.com", &["10.0.0.2".to_string()], 300);

        // Force the first entry into the past.
        {
            let mut entries = cache.entries.write();
            entries.get_mut("10.0.0.1").unwrap().expires_at =
                Utc::now() - Duration::seconds(1);
        }

        assert_eq!(cache.resolve("10.0.0.1"), "");
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.resolve("10.0.0.2"), "fresh.com");
        assert_eq!(cache.len(), 1);
    }
}
