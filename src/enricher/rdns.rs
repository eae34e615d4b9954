//! Reverse DNS resolution
//!
//! PTR lookups with a shared cache. The hot path only ever consults the
//! cache; the actual network query runs on a spawned task with a short
//! timeout, and failures are cached as "N/A" to stop retry storms.
//! Private addresses are never queried.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use super::device::is_private_ip;

const NEGATIVE_ENTRY: &str = "N/A";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Cached PTR resolver. Clone-cheap; the cache is shared.
#[derive(Clone)]
pub struct ReverseDnsResolver {
    cache: Arc<RwLock<HashMap<String, String>>>,
    resolver: TokioAsyncResolver,
}

impl ReverseDnsResolver {
    pub fn new() -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = LOOKUP_TIMEOUT;
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }

    /// Cache-only lookup for the packet path. A miss queues an async PTR
    /// query and returns empty; the result lands in the cache for later
    /// calls. Must be called from within a tokio runtime.
    pub fn lookup_nonblocking(&self, ip: &str) -> String {
        if let Some(cached) = self.cache.read().get(ip) {
            if cached == NEGATIVE_ENTRY || cached.is_empty() {
                return String::new();
            }
            return cached.clone();
        }

        let parsed: IpAddr = match ip.parse() {
            Ok(p) => p,
            Err(_) => return String::new(),
        };
        if is_private_ip(&parsed) {
            return String::new();
        }

        // Pending marker suppresses duplicate queries for the same IP.
        self.cache.write().insert(ip.to_string(), String::new());

        let this = self.clone();
        let ip_owned = ip.to_string();
        tokio::spawn(async move {
            let _ = this.perform_lookup(&ip_owned, parsed).await;
        });

        String::new()
    }

    /// Resolve with a bounded wait; intended for idle UI paths only.
    pub async fn lookup_blocking(&self, ip: &str) -> String {
        if let Some(cached) = self.cache.read().get(ip) {
            if cached == NEGATIVE_ENTRY || cached.is_empty() {
                return String::new();
            }
            return cached.clone();
        }

        let parsed: IpAddr = match ip.parse() {
            Ok(p) => p,
            Err(_) => return String::new(),
        };
        if is_private_ip(&parsed) {
            return String::new();
        }

        self.perform_lookup(ip, parsed).await
    }

    async fn perform_lookup(&self, ip: &str, parsed: IpAddr) -> String {
        let result = tokio::time::timeout(LOOKUP_TIMEOUT, self.resolver.reverse_lookup(parsed)).await;

        let hostname = match result {
            Ok(Ok(names)) => names
                .iter()
                .next()
                .map(|name| name.to_utf8().trim_end_matches('.').to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };

        if hostname.is_empty() {
            self.cache
                .write()
                .insert(ip.to_string(), NEGATIVE_ENTRY.to_string());
            String::new()
        } else {
            self.cache.write().insert(ip.to_string(), hostname.clone());
            hostname
        }
    }

    /// Number of cached entries, including negative ones.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for ReverseDnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_private_ip_never_queried() {
        let resolver = ReverseDnsResolver::new();
        assert_eq!(resolver.lookup_nonblocking("192.168.1.1"), "");
        assert_eq!(resolver.cached_len(), 0);

        assert_eq!(resolver.lookup_blocking("10.0.0.1").await, "");
        assert_eq!(resolver.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_ip_is_empty() {
        let resolver = ReverseDnsResolver::new();
        assert_eq!(resolver.lookup_nonblocking("not-an-ip"), "");
    }

    #[tokio::test]
    async fn test_negative_entry_suppresses_result() {
        let resolver = ReverseDnsResolver::new();
        resolver
            .cache
            .write()
            .insert("203.0.113.1".to_string(), NEGATIVE_ENTRY.to_string());
        assert_eq!(resolver.lookup_nonblocking("203.0.113.1"), "");
    }

    #[tokio::test]
    async fn test_cached_value_returned() {
        let resolver = ReverseDnsResolver::new();
        resolver
            .cache
            .write()
            .insert("203.0.113.2".to_string(), "host.example.net".to_string());
        assert_eq!(resolver.lookup_nonblocking("203.0.113.2"), "host.example.net");
    }
}
