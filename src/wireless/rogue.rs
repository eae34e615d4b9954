//! Rogue AP analysis
//!
//! Rules over the set of observed access points: Evil Twins (mixed
//! encryption for one SSID), duplicate SSIDs, and open networks with
//! names that impersonate infrastructure.

use std::collections::HashMap;

use crate::models::{AccessPoint, RogueAlert, RogueSeverity};

const SUSPICIOUS_KEYWORDS: &[&str] = &["corp", "internal", "secure", "private", "staff", "admin"];

fn is_secure(encryption: &str) -> bool {
    let enc = encryption.to_lowercase();
    enc.contains("wpa") || enc.contains("rsn")
}

fn is_open(encryption: &str) -> bool {
    let enc = encryption.to_lowercase();
    enc.is_empty() || enc.contains("open")
}

/// Scan the observed APs for Evil Twins, duplicate SSIDs, and
/// suspiciously named open networks.
pub fn detect_rogue_aps(aps: &[AccessPoint]) -> Vec<RogueAlert> {
    let mut alerts: Vec<RogueAlert> = Vec::new();

    let mut by_ssid: HashMap<&str, Vec<&AccessPoint>> = HashMap::new();
    for ap in aps {
        if ap.ssid.is_empty() || ap.ssid == "Hidden" {
            continue;
        }
        by_ssid.entry(ap.ssid.as_str()).or_default().push(ap);
    }

    for (ssid, group) in &by_ssid {
        // Evil Twin: one SSID served both secured and open. Attackers
        // spoof a protected SSID with open authentication to harvest
        // clients, so every open member of a mixed group is flagged.
        let has_secure = group.iter().any(|ap| is_secure(&ap.encryption));
        let has_open = group.iter().any(|ap| is_open(&ap.encryption));

        if has_secure && has_open {
            for ap in group.iter().filter(|ap| is_open(&ap.encryption)) {
                alerts.push(RogueAlert {
                    bssid: ap.bssid.clone(),
                    ssid: ap.ssid.clone(),
                    severity: RogueSeverity::Critical,
                    message: "Evil Twin Detected: Open AP matching secure network SSID".to_string(),
                });
            }
        }

        // Duplicate SSIDs can be a legitimate mesh; only worth a warning,
        // and not on top of a critical alert for the same SSID.
        if group.len() > 1 {
            let already_critical = alerts
                .iter()
                .any(|a| a.ssid == *ssid && a.severity == RogueSeverity::Critical);
            if !already_critical {
                for ap in group.iter() {
                    alerts.push(RogueAlert {
                        bssid: ap.bssid.clone(),
                        ssid: ap.ssid.clone(),
                        severity: RogueSeverity::Warning,
                        message: "Multiple APs sharing SSID (Possible Rogue or Mesh)".to_string(),
                    });
                }
            }
        }
    }

    // Open networks named like infrastructure.
    for ap in aps {
        if !is_open(&ap.encryption) {
            continue;
        }
        let ssid = ap.ssid.to_lowercase();
        for keyword in SUSPICIOUS_KEYWORDS {
            if ssid.contains(keyword) {
                let already_flagged = alerts.iter().any(|a| a.bssid == ap.bssid);
                if !already_flagged {
                    alerts.push(RogueAlert {
                        bssid: ap.bssid.clone(),
                        ssid: ap.ssid.clone(),
                        severity: RogueSeverity::Critical,
                        message: format!("Suspicious Open Network containing '{}'", keyword),
                    });
                }
                break;
            }
        }
    }

    alerts
}
