//! WiFi management-frame scanner
//!
//! Turns monitor-mode frames into access point, probing client, and
//! EAPOL handshake observations for the engine to track and persist.

use chrono::{DateTime, Utc};

use crate::models::{AccessPoint, Handshake, WifiClient};
use super::frame::{self, Dot11Header, FrameType, SUBTYPE_BEACON, SUBTYPE_PROBE_REQUEST};

const IE_SSID: u8 = 0;
const IE_DS_PARAMETER: u8 = 3;
const IE_RSN: u8 = 48;
const IE_VENDOR: u8 = 221;

/// One observation extracted from a monitor-mode frame.
#[derive(Debug, Clone)]
pub enum WifiEvent {
    Beacon(AccessPoint),
    Probe(WifiClient),
    Eapol(Handshake),
}

/// Stateless scanner over 802.11 frames.
#[derive(Debug, Default)]
pub struct WifiScanner;

impl WifiScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan one frame. `radiotap` selects the link-type 127 path where a
    /// radiotap header precedes the MAC header.
    pub fn scan(&self, data: &[u8], radiotap: bool, timestamp: DateTime<Utc>) -> Option<WifiEvent> {
        let frame_data = if radiotap {
            frame::strip_radiotap(data)?
        } else {
            data
        };

        let header = frame::parse_header(frame_data)?;

        match header.ftype {
            FrameType::Management if header.subtype == SUBTYPE_BEACON => {
                self.parse_beacon(frame_data, &header, timestamp).map(WifiEvent::Beacon)
            }
            FrameType::Management if header.subtype == SUBTYPE_PROBE_REQUEST => {
                Some(WifiEvent::Probe(self.parse_probe(frame_data, &header, timestamp)))
            }
            FrameType::Data if frame::is_eapol(frame_data, &header) => {
                Some(WifiEvent::Eapol(self.parse_eapol(&header, timestamp)))
            }
            _ => None,
        }
    }

    /// Beacon: BSSID from address 3, SSID from IE 0 (or "Hidden"),
    /// channel from the DS parameter set.
    fn parse_beacon(
        &self,
        data: &[u8],
        header: &Dot11Header,
        timestamp: DateTime<Utc>,
    ) -> Option<AccessPoint> {
        // Fixed beacon fields: timestamp(8) + interval(2) + capability(2)
        let body = data.get(header.body_offset..)?;
        if body.len() < 12 {
            return None;
        }
        let capability = u16::from_le_bytes([body[10], body[11]]);
        let privacy = capability & 0x0010 != 0;

        let mut ssid = "Hidden".to_string();
        let mut channel = 0u8;
        let mut has_rsn = false;
        let mut has_wpa = false;

        for (id, ie) in frame::parse_ies(&body[12..]) {
            match id {
                IE_SSID => ssid = String::from_utf8_lossy(ie).to_string(),
                IE_DS_PARAMETER if !ie.is_empty() => channel = ie[0],
                IE_RSN => has_rsn = true,
                // Microsoft OUI, type 1 marks the legacy WPA element.
                IE_VENDOR if ie.len() >= 4 && ie[..4] == [0x00, 0x50, 0xf2, 0x01] => {
                    has_wpa = true;
                }
                _ => {}
            }
        }

        let encryption = if has_rsn {
            "WPA2/RSN"
        } else if has_wpa {
            "WPA"
        } else if privacy {
            "WEP"
        } else {
            "Open"
        };

        Some(AccessPoint {
            id: None,
            bssid: header.addr3.clone(),
            ssid,
            channel,
            encryption: encryption.to_string(),
            vendor: String::new(),
            signal: 0,
            first_seen: timestamp,
            last_seen: timestamp,
        })
    }

    /// Probe request: client MAC from address 2, probed SSIDs from IE 0.
    fn parse_probe(
        &self,
        data: &[u8],
        header: &Dot11Header,
        timestamp: DateTime<Utc>,
    ) -> WifiClient {
        let mut probed = Vec::new();
        if let Some(body) = data.get(header.body_offset..) {
            for (id, ie) in frame::parse_ies(body) {
                if id == IE_SSID && !ie.is_empty() {
                    probed.push(String::from_utf8_lossy(ie).to_string());
                }
            }
        }

        WifiClient {
            id: None,
            mac: header.addr2.clone(),
            vendor: String::new(),
            probed_ssids: probed,
            last_seen: timestamp,
        }
    }

    /// EAPOL: resolve AP and client from the DS direction flags.
    fn parse_eapol(&self, header: &Dot11Header, timestamp: DateTime<Utc>) -> Handshake {
        let (bssid, client_mac) = if header.to_ds {
            (header.addr1.clone(), header.addr2.clone())
        } else if header.from_ds {
            (header.addr2.clone(), header.addr1.clone())
        } else {
            (header.addr1.clone(), header.addr2.clone())
        };

        Handshake {
            id: None,
            bssid,
            client_mac,
            is_full: false,
            timestamp,
        }
    }
}
