//! Application identification
//!
//! Names the application behind a flow by combining signals in priority
//! order: JA3 fingerprint, correlated domain, TLS SNI, then destination
//! port. Empty string when nothing matches.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Flow;
use super::ja3_db::Ja3Catalog;

pub struct ApplicationIdentifier {
    ja3_catalog: Arc<Ja3Catalog>,
    port_map: RwLock<HashMap<u16, String>>,
    domain_patterns: RwLock<HashMap<String, String>>,
}

impl ApplicationIdentifier {
    pub fn new(ja3_catalog: Arc<Ja3Catalog>) -> Self {
        let identifier = Self {
            ja3_catalog,
            port_map: RwLock::new(HashMap::new()),
            domain_patterns: RwLock::new(HashMap::new()),
        };
        identifier.load_defaults();
        identifier
    }

    /// Most confident application name for a flow; empty when unknown.
    pub fn identify(&self, flow: &Flow) -> String {
        if !flow.ja3.is_empty() {
            let app = self.ja3_catalog.lookup(&flow.ja3);
            if !app.is_empty() {
                return app;
            }
        }

        if !flow.dst_domain.is_empty() {
            let app = self.identify_by_domain(&flow.dst_domain);
            if !app.is_empty() {
                return app;
            }
        }

        if !flow.tls_sni.is_empty() {
            let app = self.identify_by_domain(&flow.tls_sni);
            if !app.is_empty() {
                return app;
            }
        }

        self.identify_by_port(flow.key.dst_port)
    }

    fn identify_by_port(&self, port: u16) -> String {
        self.port_map.read().get(&port).cloned().unwrap_or_default()
    }

    fn identify_by_domain(&self, domain: &str) -> String {
        let domain = domain.to_lowercase();
        let patterns = self.domain_patterns.read();

        if let Some(app) = patterns.get(&domain) {
            return app.clone();
        }

        for (pattern, app) in patterns.iter() {
            if domain.ends_with(pattern.as_str()) {
                return app.clone();
            }
        }

        String::new()
    }

    /// Register an additional domain pattern at runtime.
    pub fn add_domain(&self, pattern: &str, application: &str) {
        self.domain_patterns
            .write()
            .insert(pattern.to_lowercase(), application.to_string());
    }

    /// Register an additional port mapping at runtime.
    pub fn add_port(&self, port: u16, application: &str) {
        self.port_map.write().insert(port, application.to_string());
    }

    fn load_defaults(&self) {
        let ports: &[(u16, &str)] = &[
            (80, "HTTP"),
            (443, "HTTPS"),
            (8080, "HTTP-Alt"),
            (8443, "HTTPS-Alt"),
            (25, "SMTP"),
            (587, "SMTP-Submission"),
            (465, "SMTPS"),
            (143, "IMAP"),
            (993, "IMAPS"),
            (110, "POP3"),
            (995, "POP3S"),
            (21, "FTP"),
            (22, "SSH/SFTP"),
            (989, "FTPS-Data"),
            (990, "FTPS"),
            (23, "Telnet"),
            (3389, "RDP"),
            (5900, "VNC"),
            (5060, "SIP"),
            (5061, "SIP-TLS"),
            (53, "DNS"),
            (123, "NTP"),
            (27015, "Steam"),
            (3074, "Xbox Live"),
            (3478, "PlayStation Network"),
        ];
        {
            let mut map = self.port_map.write();
            for (port, app) in ports {
                map.insert(*port, (*app).to_string());
            }
        }

        let domains: &[(&str, &str)] = &[
            ("youtube.com", "YouTube"),
            ("googlevideo.com", "YouTube"),
            ("ytimg.com", "YouTube"),
            ("netflix.com", "Netflix"),
            ("nflxvideo.net", "Netflix"),
            ("nflximg.net", "Netflix"),
            ("twitch.tv", "Twitch"),
            ("ttvnw.net", "Twitch"),
            ("hulu.com", "Hulu"),
            ("disneyplus.com", "Disney+"),
            ("primevideo.com", "Amazon Prime Video"),
            ("spotify.com", "Spotify"),
            ("scdn.co", "Spotify"),
            ("pandora.com", "Pandora"),
            ("soundcloud.com", "SoundCloud"),
            ("facebook.com", "Facebook"),
            ("fbcdn.net", "Facebook"),
            ("instagram.com", "Instagram"),
            ("cdninstagram.com", "Instagram"),
            ("twitter.com", "Twitter"),
            ("twimg.com", "Twitter"),
            ("tiktok.com", "TikTok"),
            ("tiktokcdn.com", "TikTok"),
            ("linkedin.com", "LinkedIn"),
            ("snapchat.com", "Snapchat"),
            ("reddit.com", "Reddit"),
            ("whatsapp.com", "WhatsApp"),
            ("whatsapp.net", "WhatsApp"),
            ("telegram.org", "Telegram"),
            ("discord.com", "Discord"),
            ("discordapp.com", "Discord"),
            ("slack.com", "Slack"),
            ("dropbox.com", "Dropbox"),
            ("drive.google.com", "Google Drive"),
            ("onedrive.live.com", "OneDrive"),
            ("icloud.com", "iCloud"),
            ("gmail.com", "Gmail"),
            ("outlook.com", "Outlook"),
            ("steampowered.com", "Steam"),
            ("steamcommunity.com", "Steam"),
            ("epicgames.com", "Epic Games"),
            ("riotgames.com", "Riot Games"),
            ("battle.net", "Battle.net"),
            ("minecraft.net", "Minecraft"),
            ("cloudflare.com", "Cloudflare"),
            ("akamai.net", "Akamai CDN"),
            ("fastly.net", "Fastly CDN"),
            ("amazonaws.com", "AWS"),
            ("cloudfront.net", "AWS CloudFront"),
            ("googleusercontent.com", "Google Services"),
        ];
        let mut map = self.domain_patterns.write();
        for (pattern, app) in domains {
            map.insert((*pattern).to_string(), (*app).to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlowKey;
    use chrono::Utc;

    fn flow_to(dst_port: u16) -> Flow {
        let key = FlowKey::canonical("10.0.0.5", "93.184.216.34", 1000, dst_port, "TCP");
        Flow::new(1, key, Utc::now(), "TCP".to_string())
    }

    #[test]
    fn test_identify_by_domain_suffix() {
        let identifier = ApplicationIdentifier::new(Arc::new(Ja3Catalog::new()));
        let mut flow = flow_to(443);
        flow.dst_domain = "edge-video.nflxvideo.net".to_string();
        assert_eq!(identifier.identify(&flow), "Netflix");
    }

    #[test]
    fn test_identify_by_sni_fallback() {
        let identifier = ApplicationIdentifier::new(Arc::new(Ja3Catalog::new()));
        let mut flow = flow_to(4443);
        flow.tls_sni = "www.youtube.com".to_string();
        assert_eq!(identifier.identify(&flow), "YouTube");
    }

    #[test]
    fn test_identify_by_port_last() {
        let identifier = ApplicationIdentifier::new(Arc::new(Ja3Catalog::new()));
        let flow = flow_to(443);
        assert_eq!(identifier.identify(&flow), "HTTPS");
    }

    #[test]
    fn test_ja3_takes_priority() {
        let catalog = Arc::new(Ja3Catalog::new());
        catalog.add("cafebabe", "CustomClient");
        let identifier = ApplicationIdentifier::new(catalog);

        let mut flow = flow_to(443);
        flow.ja3 = "cafebabe".to_string();
        flow.dst_domain = "netflix.com".to_string();
        assert_eq!(identifier.identify(&flow), "CustomClient");
    }

    #[test]
    fn test_unknown_is_empty() {
        let identifier = ApplicationIdentifier::new(Arc::new(Ja3Catalog::new()));
        let flow = flow_to(49152);
        assert_eq!(identifier.identify(&flow), "");
    }
}
