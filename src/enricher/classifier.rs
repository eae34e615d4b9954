//! Traffic classification
//!
//! Rolls flows up into coarse traffic classes (Streaming, Gaming,
//! Email, ...) from the application name, domain, or port.

use std::sync::Arc;

use crate::models::Flow;
use super::application::ApplicationIdentifier;

pub struct TrafficClassifier {
    app_identifier: Arc<ApplicationIdentifier>,
}

impl TrafficClassifier {
    pub fn new(app_identifier: Arc<ApplicationIdentifier>) -> Self {
        Self { app_identifier }
    }

    /// Traffic class for a flow; "Unknown" when nothing matches.
    pub fn classify(&self, flow: &Flow) -> String {
        let app = if flow.application.is_empty() {
            self.app_identifier.identify(flow)
        } else {
            flow.application.clone()
        };

        if !app.is_empty() {
            let class = Self::classify_by_app(&app);
            if !class.is_empty() {
                return class.to_string();
            }
        }

        if !flow.dst_domain.is_empty() {
            let class = Self::classify_by_domain(&flow.dst_domain);
            if !class.is_empty() {
                return class.to_string();
            }
        }

        let class = Self::classify_by_port(flow.key.dst_port);
        if !class.is_empty() {
            return class.to_string();
        }

        "Unknown".to_string()
    }

    fn classify_by_app(app: &str) -> &'static str {
        let app = app.to_lowercase();

        const STREAMING: &[&str] = &["youtube", "netflix", "twitch", "hulu", "disney", "prime video", "vimeo"];
        const MUSIC: &[&str] = &["spotify", "apple music", "pandora", "soundcloud", "tidal"];
        const SOCIAL: &[&str] = &["facebook", "instagram", "twitter", "tiktok", "linkedin", "snapchat", "reddit"];
        const MESSAGING: &[&str] = &["whatsapp", "telegram", "discord", "slack", "signal", "messenger"];
        const GAMING: &[&str] = &["steam", "epic games", "riot", "battle.net", "minecraft", "xbox", "playstation"];
        const CLOUD: &[&str] = &["dropbox", "google drive", "onedrive", "icloud"];
        const EMAIL: &[&str] = &["gmail", "outlook", "yahoo mail", "smtp", "imap", "pop3"];
        const REMOTE: &[&str] = &["rdp", "vnc", "ssh", "telnet", "teamviewer", "anydesk"];
        const VOIP: &[&str] = &["sip", "zoom", "skype", "teams", "webex"];

        let matches = |set: &[&str]| set.iter().any(|s| app.contains(s));

        if matches(STREAMING) {
            "Streaming"
        } else if matches(MUSIC) {
            "Music"
        } else if matches(SOCIAL) {
            "Social Media"
        } else if matches(MESSAGING) {
            "Messaging"
        } else if matches(GAMING) {
            "Gaming"
        } else if matches(CLOUD) {
            "Cloud Storage"
        } else if matches(EMAIL) {
            "Email"
        } else if matches(REMOTE) {
            "Remote Access"
        } else if matches(VOIP) {
            "VoIP"
        } else if app.contains("http") || app.contains("dns") {
            "Web Browsing"
        } else {
            ""
        }
    }

    fn classify_by_domain(domain: &str) -> &'static str {
        let domain = domain.to_lowercase();
        const CDN: &[&str] = &["cloudflare", "akamai", "fastly", "cloudfront", "cdn"];
        if CDN.iter().any(|c| domain.contains(c)) {
            "Web Browsing"
        } else {
            ""
        }
    }

    fn classify_by_port(port: u16) -> &'static str {
        match port {
            53 => "DNS",
            80 | 443 | 8080 | 8443 => "Web Browsing",
            25 | 587 | 465 | 143 | 993 | 110 | 995 => "Email",
            21 | 22 | 989 | 990 => "File Transfer",
            3389 | 5900 | 23 => "Remote Access",
            5060 | 5061 => "VoIP",
            6881..=6889 => "File Sharing",
            27000..=27050 => "Gaming",
            3074..=3076 => "Gaming",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enricher::ja3_db::Ja3Catalog;
    use crate::models::FlowKey;
    use chrono::Utc;

    fn classifier() -> TrafficClassifier {
        let ja3 = Arc::new(Ja3Catalog::new());
        TrafficClassifier::new(Arc::new(ApplicationIdentifier::new(ja3)))
    }

    fn flow_to(dst_port: u16) -> Flow {
        let key = FlowKey::canonical("10.0.0.5", "93.184.216.34", 1000, dst_port, "TCP");
        Flow::new(1, key, Utc::now(), "TCP".to_string())
    }

    #[test]
    fn test_classify_streaming_by_app() {
        let classifier = classifier();
        let mut flow = flow_to(443);
        flow.application = "Netflix".to_string();
        assert_eq!(classifier.classify(&flow), "Streaming");
    }

    #[test]
    fn test_classify_by_port_fallback() {
        let classifier = classifier();
        let flow = flow_to(22);
        // Port 22 identifies as SSH/SFTP, which classifies as remote access.
        assert_eq!(classifier.classify(&flow), "Remote Access");
    }

    #[test]
    fn test_classify_unknown() {
        let classifier = classifier();
        let flow = flow_to(49152);
        assert_eq!(classifier.classify(&flow), "Unknown");
    }

    #[test]
    fn test_classify_cdn_domain() {
        let classifier = classifier();
        let mut flow = flow_to(49152);
        flow.dst_domain = "assets.mycdn.example".to_string();
        assert_eq!(classifier.classify(&flow), "Web Browsing");
    }
}
