//! TLS Client Hello parser and JA3 fingerprinting
//!
//! Extracts the unencrypted handshake metadata (SNI, offered suites,
//! extension lists) and derives the JA3 hash. Nothing is decrypted.

use crate::core::packet::TlsInfo;

const CONTENT_TYPE_HANDSHAKE: u8 = 22;
const HANDSHAKE_CLIENT_HELLO: u8 = 1;

/// Minimum TCP payload that can hold a Client Hello worth fingerprinting.
const MIN_CLIENT_HELLO: usize = 43;

/// Fields extracted from a Client Hello, GREASE already removed.
#[derive(Debug, Clone, Default)]
pub struct ClientHello {
    pub version: u16,
    pub sni: String,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<u16>,
    pub supported_groups: Vec<u16>,
    pub ec_point_formats: Vec<u8>,
}

/// GREASE values follow the pattern 0x?a?a with both wildcard nibbles equal.
fn is_grease(value: u16) -> bool {
    (value & 0x0f0f) == 0x0a0a && (value >> 8) & 0xf0 == value & 0xf0
}

fn version_label(version: u16) -> &'static str {
    match version {
        0x0300 => "SSL 3.0",
        0x0301 => "TLS 1.0",
        0x0302 => "TLS 1.1",
        0x0303 => "TLS 1.2",
        0x0304 => "TLS 1.3",
        _ => "TLS",
    }
}

/// Parse a TCP payload as a TLS handshake record carrying a Client Hello.
///
/// Returns `None` for anything that is not a complete Client Hello
/// record: wrong content type, wrong major version, truncated record,
/// other handshake types.
pub fn parse_tls(payload: &[u8]) -> Option<TlsInfo> {
    if payload.len() < 6 {
        return None;
    }
    if payload[0] != CONTENT_TYPE_HANDSHAKE || payload[1] != 3 {
        return None;
    }

    let record_len = u16::from_be_bytes([payload[3], payload[4]]) as usize;
    if record_len + 5 > payload.len() {
        return None;
    }
    if payload[5] != HANDSHAKE_CLIENT_HELLO {
        return None;
    }

    let mut info = TlsInfo {
        handshake: true,
        version: version_label(u16::from_be_bytes([payload[1], payload[2]])).to_string(),
        ..Default::default()
    };

    if let Some(hello) = parse_client_hello(payload) {
        info.version = version_label(hello.version).to_string();
        info.sni = hello.sni.clone();
        if let Some(first) = hello.cipher_suites.first() {
            info.cipher_suite = format!("0x{:04x}", first);
        }
        info.ja3 = ja3_hash(&ja3_string(&hello));
    }

    Some(info)
}

/// Walk the Client Hello structure starting at the TLS record header.
///
/// The payload must already look like `22 03 ?? ?? ?? 01`; anything
/// shorter than a minimal Client Hello yields `None`.
pub fn parse_client_hello(payload: &[u8]) -> Option<ClientHello> {
    if payload.len() < MIN_CLIENT_HELLO {
        return None;
    }

    let mut hello = ClientHello::default();

    // TLS record header (5) + handshake header (4)
    let mut offset = 9;

    hello.version = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
    offset += 2;

    // Random
    offset += 32;
    if offset >= payload.len() {
        return None;
    }

    let session_id_len = payload[offset] as usize;
    offset += 1 + session_id_len;
    if offset + 2 > payload.len() {
        return None;
    }

    let cipher_suites_len = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
    offset += 2;
    if offset + cipher_suites_len > payload.len() {
        return None;
    }
    for i in (0..cipher_suites_len).step_by(2) {
        if i + 1 >= cipher_suites_len {
            break;
        }
        let suite = u16::from_be_bytes([payload[offset + i], payload[offset + i + 1]]);
        if !is_grease(suite) {
            hello.cipher_suites.push(suite);
        }
    }
    offset += cipher_suites_len;

    if offset >= payload.len() {
        return None;
    }
    let compression_len = payload[offset] as usize;
    offset += 1 + compression_len;

    // Extensions are optional.
    if offset + 2 > payload.len() {
        return Some(hello);
    }
    let extensions_len = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
    offset += 2;

    let extensions_end = (offset + extensions_len).min(payload.len());
    while offset + 4 <= extensions_end {
        let ext_type = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        let ext_len = u16::from_be_bytes([payload[offset + 2], payload[offset + 3]]) as usize;
        offset += 4;
        if offset + ext_len > extensions_end {
            break;
        }

        let ext_data = &payload[offset..offset + ext_len];
        if !is_grease(ext_type) {
            hello.extensions.push(ext_type);
            match ext_type {
                0 => {
                    if let Some(sni) = parse_sni(ext_data) {
                        hello.sni = sni;
                    }
                }
                10 => hello.supported_groups = parse_groups(ext_data),
                11 => hello.ec_point_formats = parse_formats(ext_data),
                _ => {}
            }
        }

        offset += ext_len;
    }

    Some(hello)
}

/// server_name extension: list length, then (type, length, name) entries;
/// only host_name (type 0) entries count.
fn parse_sni(data: &[u8]) -> Option<String> {
    if data.len() < 2 {
        return None;
    }

    let mut offset = 2;
    let end = data.len();
    while offset + 3 <= end {
        let name_type = data[offset];
        let name_len = u16::from_be_bytes([data[offset + 1], data[offset + 2]]) as usize;
        offset += 3;
        if offset + name_len > end {
            break;
        }
        if name_type == 0 {
            return String::from_utf8(data[offset..offset + name_len].to_vec()).ok();
        }
        offset += name_len;
    }
    None
}

fn parse_groups(data: &[u8]) -> Vec<u16> {
    let mut groups = Vec::new();
    if data.len() < 2 {
        return groups;
    }
    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let mut offset = 2;
    while offset + 2 <= data.len() && offset < 2 + list_len {
        let group = u16::from_be_bytes([data[offset], data[offset + 1]]);
        if !is_grease(group) {
            groups.push(group);
        }
        offset += 2;
    }
    groups
}

fn parse_formats(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let list_len = data[0] as usize;
    data[1..].iter().take(list_len).copied().collect()
}

/// Assemble the canonical JA3 string:
/// `version,cipher-cipher-...,ext-ext-...,group-group-...,fmt-fmt-...`
/// with every list in wire order and GREASE already removed.
pub fn ja3_string(hello: &ClientHello) -> String {
    let join = |values: &[u16]| {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("-")
    };
    let formats = hello
        .ec_point_formats
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("-");

    format!(
        "{},{},{},{},{}",
        hello.version,
        join(&hello.cipher_suites),
        join(&hello.extensions),
        join(&hello.supported_groups),
        formats
    )
}

/// Lowercase hex MD5 of the JA3 string.
pub fn ja3_hash(ja3: &str) -> String {
    format!("{:x}", md5::compute(ja3))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a Client Hello record from parts; `extra_cipher` lets tests
    /// inject GREASE values.
    pub fn build_client_hello(sni: Option<&str>, extra_cipher: Option<u16>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x03, 0x03]); // version TLS 1.2
        body.extend_from_slice(&[0u8; 32]); // random
        body.push(0); // session id length

        let mut suites: Vec<u16> = Vec::new();
        if let Some(c) = extra_cipher {
            suites.push(c);
        }
        suites.push(0x002f);
        body.extend_from_slice(&((suites.len() * 2) as u16).to_be_bytes());
        for s in &suites {
            body.extend_from_slice(&s.to_be_bytes());
        }

        body.extend_from_slice(&[1, 0]); // compression: null

        let mut extensions = Vec::new();
        if let Some(host) = sni {
            let name = host.as_bytes();
            let mut ext = Vec::new();
            ext.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes()); // list length
            ext.push(0); // host_name
            ext.extend_from_slice(&(name.len() as u16).to_be_bytes());
            ext.extend_from_slice(name);

            extensions.extend_from_slice(&0u16.to_be_bytes()); // server_name
            extensions.extend_from_slice(&(ext.len() as u16).to_be_bytes());
            extensions.extend_from_slice(&ext);
        }
        body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        body.extend_from_slice(&extensions);

        let mut handshake = vec![0x01]; // client hello
        let len = body.len() as u32;
        handshake.extend_from_slice(&len.to_be_bytes()[1..]);
        handshake.extend_from_slice(&body);

        let mut record = vec![0x16, 0x03, 0x01]; // handshake, TLS 1.0 record
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    #[test]
    fn test_grease_pattern() {
        assert!(is_grease(0x0a0a));
        assert!(is_grease(0x1a1a));
        assert!(is_grease(0xfafa));
        assert!(!is_grease(0x1a2a));
        assert!(!is_grease(0x002f));
        assert!(!is_grease(0x0a1a));
    }

    #[test]
    fn test_ja3_known_vector() {
        let hello = ClientHello {
            version: 771,
            cipher_suites: vec![47],
            extensions: vec![0],
            supported_groups: vec![],
            ec_point_formats: vec![],
            sni: String::new(),
        };
        let raw = ja3_string(&hello);
        assert_eq!(raw, "771,47,0,,");
        assert_eq!(ja3_hash(&raw), format!("{:x}", md5::compute("771,47,0,,")));
    }

    #[test]
    fn test_parse_client_hello_sni() {
        let record = build_client_hello(Some("example.com"), None);
        let info = parse_tls(&record).unwrap();
        assert!(info.handshake);
        assert_eq!(info.sni, "example.com");
        assert!(!info.ja3.is_empty());
        assert_eq!(info.version, "TLS 1.2");
    }

    #[test]
    fn test_ja3_grease_invariance() {
        let plain = build_client_hello(Some("example.com"), None);
        let greased = build_client_hello(Some("example.com"), Some(0x0a0a));

        let a = parse_tls(&plain).unwrap();
        let b = parse_tls(&greased).unwrap();
        assert_eq!(a.ja3, b.ja3);
    }

    #[test]
    fn test_short_payload_no_ja3() {
        // Valid-looking header but too short for a Client Hello.
        let payload = [0x16, 0x03, 0x01, 0x00, 0x05, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00];
        if let Some(info) = parse_tls(&payload) {
            assert!(info.ja3.is_empty());
        }
    }

    #[test]
    fn test_not_tls() {
        assert!(parse_tls(b"GET / HTTP/1.1\r\n").is_none());
    }

    #[test]
    fn test_server_hello_ignored() {
        let mut record = build_client_hello(None, None);
        record[5] = 0x02; // server hello
        assert!(parse_tls(&record).is_none());
    }
}
