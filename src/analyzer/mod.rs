//! Behavioral analysis: baselines, anomaly rules, privacy rules.

pub mod anomaly;
pub mod baseline;
pub mod privacy;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyKind};
pub use baseline::{BaselineTracker, DeviceBaseline};
pub use privacy::{PrivacyIssue, PrivacyIssueKind, PrivacyScanner};

use serde::Serialize;

/// Ordered alert severity shared by the anomaly and privacy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low = 1,
    Medium = 5,
    High = 8,
    Critical = 10,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}
