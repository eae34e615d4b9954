//! Capture sources
//!
//! The engine consumes frames through the [`FrameSource`] trait: a live
//! pcap handle in production, an in-memory queue in tests. The source
//! reports kernel drop counts through [`CaptureStats`]; the engine
//! surfaces them and does not attempt recovery.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};

use crate::config::CaptureConfig;

/// Link-layer framing of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    /// Bare 802.11 frames (monitor mode).
    Dot11,
    /// 802.11 with a radiotap header (monitor mode).
    Radiotap,
}

/// One frame off the wire.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: DateTime<Utc>,
    /// Original length on the wire.
    pub wire_len: u32,
    pub data: Vec<u8>,
}

/// Capture counters as reported by the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub received: u64,
    pub dropped: u64,
}

/// A producer of raw frames.
pub trait FrameSource: Send {
    fn link_kind(&self) -> LinkKind;

    /// Next frame; `Ok(None)` on a read timeout, `Err` when the source
    /// is exhausted or broken.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    fn stats(&mut self) -> CaptureStats;
}

/// Live capture over libpcap.
pub struct PcapSource {
    capture: pcap::Capture<pcap::Active>,
    link: LinkKind,
}

impl PcapSource {
    /// Open a live capture on the configured interface. Insufficient
    /// privilege and bad BPF programs surface here, before the engine
    /// starts.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        if config.interface.is_empty() {
            return Err(anyhow!("no capture interface configured"));
        }

        let capture = pcap::Capture::from_device(config.interface.as_str())
            .with_context(|| format!("interface not found: {}", config.interface))?
            .snaplen(config.snaplen)
            .promisc(config.promiscuous)
            .buffer_size(config.buffer_mb * 1024 * 1024)
            .timeout(1000);

        let mut capture = capture.open().map_err(|e| {
            let msg = e.to_string();
            if msg.contains("permitted") || msg.contains("permission") {
                anyhow!(
                    "failed to open {}: {} (packet capture requires elevated privileges; \
                     run as root or grant CAP_NET_RAW)",
                    config.interface,
                    msg
                )
            } else {
                anyhow!("failed to open {}: {}", config.interface, msg)
            }
        })?;

        if !config.bpf_filter.is_empty() {
            capture
                .filter(&config.bpf_filter, true)
                .with_context(|| format!("invalid BPF filter: {}", config.bpf_filter))?;
        }

        let link = match capture.get_datalink().0 {
            105 => LinkKind::Dot11,
            127 => LinkKind::Radiotap,
            _ => LinkKind::Ethernet,
        };

        Ok(Self { capture, link })
    }
}

impl FrameSource for PcapSource {
    fn link_kind(&self) -> LinkKind {
        self.link
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let header = packet.header;
                let timestamp = Utc
                    .timestamp_opt(header.ts.tv_sec as i64, (header.ts.tv_usec as u32) * 1000)
                    .single()
                    .unwrap_or_else(Utc::now);
                Ok(Some(RawFrame {
                    timestamp,
                    wire_len: header.len,
                    data: packet.data.to_vec(),
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(anyhow!("capture read failed: {}", e)),
        }
    }

    fn stats(&mut self) -> CaptureStats {
        match self.capture.stats() {
            Ok(stats) => CaptureStats {
                received: u64::from(stats.received),
                dropped: u64::from(stats.dropped) + u64::from(stats.if_dropped),
            },
            Err(_) => CaptureStats::default(),
        }
    }
}

/// In-memory source for tests and replay.
pub struct MemorySource {
    frames: std::collections::VecDeque<RawFrame>,
    link: LinkKind,
    received: u64,
}

impl MemorySource {
    pub fn new(link: LinkKind, frames: Vec<RawFrame>) -> Self {
        Self {
            frames: frames.into(),
            link,
            received: 0,
        }
    }

    /// Wrap raw byte buffers, stamping them now.
    pub fn from_bytes(link: LinkKind, buffers: Vec<Vec<u8>>) -> Self {
        let frames = buffers
            .into_iter()
            .map(|data| RawFrame {
                timestamp: Utc::now(),
                wire_len: data.len() as u32,
                data,
            })
            .collect();
        Self::new(link, frames)
    }
}

impl FrameSource for MemorySource {
    fn link_kind(&self) -> LinkKind {
        self.link
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match self.frames.pop_front() {
            Some(frame) => {
                self.received += 1;
                Ok(Some(frame))
            }
            None => Err(anyhow!("memory source drained")),
        }
    }

    fn stats(&mut self) -> CaptureStats {
        CaptureStats {
            received: self.received,
            dropped: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_drains() {
        let mut source = MemorySource::from_bytes(LinkKind::Ethernet, vec![vec![1, 2, 3]]);
        assert_eq!(source.link_kind(), LinkKind::Ethernet);

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.data, vec![1, 2, 3]);
        assert_eq!(frame.wire_len, 3);

        assert!(source.next_frame().is_err());
        assert_eq!(source.stats().received, 1);
    }

    #[test]
    fn test_pcap_source_requires_interface() {
        let config = CaptureConfig::default();
        assert!(PcapSource::open(&config).is_err());
    }
}
