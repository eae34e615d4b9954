//! Privacy scanning
//!
//! Per-flow rules over unencrypted metadata: connections to known
//! tracking domains, and credential-shaped keywords appearing in
//! cleartext fields (DNS names, SNI).

use serde::Serialize;
use std::collections::HashSet;

use crate::models::Flow;
use super::Severity;

const DEFAULT_TRACKERS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "googlesyndication.com",
    "facebook.net",
    "graph.facebook.com",
    "adnxs.com",
    "scorecardresearch.com",
    "criteo.com",
    "quantserve.com",
    "outbrain.com",
    "taboola.com",
    "amplitude.com",
    "mixpanel.com",
    "segment.io",
    "branch.io",
    "appsflyer.com",
    "adjust.com",
    "app-measurement.com",
    "crashlytics.com",
];

const DEFAULT_PII_KEYWORDS: &[&str] = &[
    "password=",
    "passwd=",
    "pwd=",
    "access_token=",
    "auth_token=",
    "card_number=",
    "cvv=",
    "ssn=",
    "email=",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrivacyIssueKind {
    KnownTracker,
    CleartextData,
}

impl std::fmt::Display for PrivacyIssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivacyIssueKind::KnownTracker => write!(f, "KNOWN_TRACKER"),
            PrivacyIssueKind::CleartextData => write!(f, "CLEARTEXT_DATA"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacyIssue {
    pub kind: PrivacyIssueKind,
    pub severity: Severity,
    pub description: String,
    pub flow_id: u64,
}

/// Stateless per-flow privacy rules.
pub struct PrivacyScanner {
    trackers: HashSet<String>,
    pii_keywords: Vec<String>,
}

impl Default for PrivacyScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivacyScanner {
    pub fn new() -> Self {
        Self {
            trackers: DEFAULT_TRACKERS.iter().map(|s| s.to_string()).collect(),
            pii_keywords: DEFAULT_PII_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Register an additional tracker domain at runtime.
    pub fn add_tracker(&mut self, domain: &str) {
        self.trackers.insert(domain.to_lowercase());
    }

    /// Register an additional PII keyword at runtime.
    pub fn add_pii_keyword(&mut self, keyword: &str) {
        self.pii_keywords.push(keyword.to_lowercase());
    }

    /// Scan one flow; issues are independent, a flow may raise several.
    pub fn scan(&self, flow: &Flow) -> Vec<PrivacyIssue> {
        let mut issues = Vec::new();

        if !flow.dst_domain.is_empty() {
            let domain = flow.dst_domain.to_lowercase();
            if self.trackers.contains(&domain) {
                issues.push(PrivacyIssue {
                    kind: PrivacyIssueKind::KnownTracker,
                    severity: Severity::Low,
                    description: format!("Connection to known tracker: {}", domain),
                    flow_id: flow.id,
                });
            } else if let Some(tracker) = self
                .trackers
                .iter()
                .find(|t| domain.ends_with(&format!(".{}", t)))
            {
                issues.push(PrivacyIssue {
                    kind: PrivacyIssueKind::KnownTracker,
                    severity: Severity::Low,
                    description: format!(
                        "Connection to known tracker subdomain: {} ({})",
                        domain, tracker
                    ),
                    flow_id: flow.id,
                });
            }
        }

        for (field, value) in [
            ("dns_query", &flow.dns_query),
            ("tls_sni", &flow.tls_sni),
            ("dst_domain", &flow.dst_domain),
        ] {
            if value.is_empty() {
                continue;
            }
            let lowered = value.to_lowercase();
            for keyword in &self.pii_keywords {
                if lowered.contains(keyword.as_str()) {
                    issues.push(PrivacyIssue {
                        kind: PrivacyIssueKind::CleartextData,
                        severity: Severity::High,
                        description: format!(
                            "Possible cleartext credential in {}: '{}'",
                            field, keyword
                        ),
                        flow_id: flow.id,
                    });
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlowKey;
    use chrono::Utc;

    fn flow() -> Flow {
        let key = FlowKey::canonical("192.168.1.50", "93.184.216.34", 40000, 443, "TCP");
        Flow::new(1, key, Utc::now(), "TCP".to_string())
    }

    #[test]
    fn test_tracker_exact_match() {
        let scanner = PrivacyScanner::new();
        let mut f = flow();
        f.dst_domain = "doubleclick.net".to_string();

        let issues = scanner.scan(&f);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, PrivacyIssueKind::KnownTracker);
        assert_eq!(issues[0].severity, Severity::Low);
    }

    #[test]
    fn test_tracker_subdomain_match() {
        let scanner = PrivacyScanner::new();
        let mut f = flow();
        f.dst_domain = "metrics.google-analytics.com".to_string();

        let issues = scanner.scan(&f);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, PrivacyIssueKind::KnownTracker);
        assert!(issues[0].description.contains("subdomain"));
    }

    #[test]
    fn test_safe_domain_quiet() {
        let scanner = PrivacyScanner::new();
        let mut f = flow();
        f.dst_domain = "wikipedia.org".to_string();
        assert!(scanner.scan(&f).is_empty());
    }

    #[test]
    fn test_lookalike_suffix_not_matched() {
        let scanner = PrivacyScanner::new();
        let mut f = flow();
        // Ends with the tracker string but not at a label boundary.
        f.dst_domain = "not-really-doubleclick.net.example.org".to_string();
        assert!(scanner.scan(&f).is_empty());
    }

    #[test]
    fn test_cleartext_pii_in_dns_query() {
        let scanner = PrivacyScanner::new();
        let mut f = flow();
        f.dns_query = "auth_token=abcdef12345.evil.example".to_string();

        let issues = scanner.scan(&f);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, PrivacyIssueKind::CleartextData);
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn test_multiple_hits_multiple_issues() {
        let scanner = PrivacyScanner::new();
        let mut f = flow();
        f.dns_query = "password=hunter2.example".to_string();
        f.tls_sni = "cvv=123.example".to_string();

        let issues = scanner.scan(&f);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.kind == PrivacyIssueKind::CleartextData));
    }

    #[test]
    fn test_runtime_extension() {
        let mut scanner = PrivacyScanner::new();
        scanner.add_tracker("sneaky.example");
        let mut f = flow();
        f.dst_domain = "sneaky.example".to_string();
        assert_eq!(scanner.scan(&f).len(), 1);
    }
}
