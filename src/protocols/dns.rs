//! DNS wire parser
//!
//! Decodes queries and responses from raw UDP payloads, including
//! compressed names, and extracts the answer records the correlation
//! cache feeds on.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::core::packet::{DnsAnswer, DnsInfo, DnsKind};

fn record_type_label(rtype: u16) -> String {
    match rtype {
        1 => "A".to_string(),
        2 => "NS".to_string(),
        5 => "CNAME".to_string(),
        12 => "PTR".to_string(),
        15 => "MX".to_string(),
        16 => "TXT".to_string(),
        28 => "AAAA".to_string(),
        33 => "SRV".to_string(),
        255 => "ANY".to_string(),
        other => format!("Type({})", other),
    }
}

fn rcode_label(rcode: u8) -> String {
    match rcode {
        0 => "NoError".to_string(),
        1 => "FormErr".to_string(),
        2 => "ServFail".to_string(),
        3 => "NXDomain".to_string(),
        4 => "NotImp".to_string(),
        5 => "Refused".to_string(),
        other => format!("RCode({})", other),
    }
}

/// Parse a DNS message from a UDP payload.
///
/// Returns `None` when the payload is too short for a header or the
/// question section is unreadable.
pub fn parse_dns(payload: &[u8]) -> Option<DnsInfo> {
    if payload.len() < 12 {
        return None;
    }

    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    let is_response = (flags & 0x8000) != 0;
    let rcode = (flags & 0x000f) as u8;

    let qdcount = u16::from_be_bytes([payload[4], payload[5]]) as usize;
    let ancount = u16::from_be_bytes([payload[6], payload[7]]) as usize;

    // Implausible counts are a cheap malformed-message filter.
    if qdcount > 20 || ancount > 64 {
        return None;
    }

    let mut offset = 12;
    let mut query = String::new();
    let mut query_type = String::new();

    for i in 0..qdcount {
        let (name, next) = parse_name(payload, offset)?;
        if next + 4 > payload.len() {
            return None;
        }
        let qtype = u16::from_be_bytes([payload[next], payload[next + 1]]);
        if i == 0 {
            query = name;
            query_type = record_type_label(qtype);
        }
        offset = next + 4;
    }

    let mut answers = Vec::with_capacity(ancount);
    if is_response {
        for _ in 0..ancount {
            match parse_answer(payload, offset) {
                Some((answer, next)) => {
                    answers.push(answer);
                    offset = next;
                }
                None => break,
            }
        }
    }

    Some(DnsInfo {
        kind: if is_response {
            DnsKind::Response
        } else {
            DnsKind::Query
        },
        query,
        query_type,
        answers,
        response_code: rcode_label(rcode),
    })
}

fn parse_answer(payload: &[u8], offset: usize) -> Option<(DnsAnswer, usize)> {
    let (name, offset) = parse_name(payload, offset)?;

    if offset + 10 > payload.len() {
        return None;
    }

    let rtype = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
    let ttl = u32::from_be_bytes([
        payload[offset + 4],
        payload[offset + 5],
        payload[offset + 6],
        payload[offset + 7],
    ]);
    let rdlength = u16::from_be_bytes([payload[offset + 8], payload[offset + 9]]) as usize;

    let rdata_offset = offset + 10;
    if rdata_offset + rdlength > payload.len() {
        return None;
    }
    let rdata = &payload[rdata_offset..rdata_offset + rdlength];

    let mut answer = DnsAnswer {
        name,
        rtype: record_type_label(rtype),
        ttl,
        ..Default::default()
    };

    match rtype {
        1 if rdlength == 4 => {
            answer.ip = Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string();
        }
        28 if rdlength == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            answer.ip = Ipv6Addr::from(octets).to_string();
        }
        5 | 12 => {
            if let Some((target, _)) = parse_name(payload, rdata_offset) {
                answer.cname = target;
            }
        }
        _ => {}
    }

    Some((answer, rdata_offset + rdlength))
}

/// Parse a DNS name, following compression pointers (bounded depth).
fn parse_name(payload: &[u8], mut offset: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut jumped = false;
    let mut return_offset = offset;
    let mut depth = 0;

    loop {
        if offset >= payload.len() || depth > 10 {
            break;
        }

        let len = payload[offset] as usize;

        if len == 0 {
            if !jumped {
                return_offset = offset + 1;
            }
            break;
        }

        if len & 0xc0 == 0xc0 {
            if offset + 1 >= payload.len() {
                return None;
            }
            let pointer = (((len & 0x3f) as usize) << 8) | (payload[offset + 1] as usize);
            if !jumped {
                return_offset = offset + 2;
            }
            offset = pointer;
            jumped = true;
            depth += 1;
            continue;
        }

        offset += 1;
        if offset + len > payload.len() {
            return None;
        }

        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(&payload[offset..offset + len]));
        offset += len;
    }

    Some((name, return_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_name(name: &str, out: &mut Vec<u8>) {
        for label in name.split('.') {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
    }

    /// Response for `name` with one A answer, built by hand.
    pub fn build_a_response(name: &str, ip: [u8; 4], ttl: u32) -> Vec<u8> {
        let mut msg = vec![
            0x12, 0x34, // id
            0x81, 0x80, // response, recursion
            0x00, 0x01, // questions
            0x00, 0x01, // answers
            0x00, 0x00, 0x00, 0x00, // ns, ar
        ];
        encode_name(name, &mut msg);
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // type A, class IN

        msg.extend_from_slice(&[0xc0, 0x0c]); // pointer to the question name
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // type A, class IN
        msg.extend_from_slice(&ttl.to_be_bytes());
        msg.extend_from_slice(&[0x00, 0x04]); // rdlength
        msg.extend_from_slice(&ip);
        msg
    }

    #[test]
    fn test_parse_query() {
        let mut msg = vec![
            0x12, 0x34, // id
            0x01, 0x00, // standard query
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        encode_name("example.com", &mut msg);
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);

        let info = parse_dns(&msg).unwrap();
        assert_eq!(info.kind, DnsKind::Query);
        assert_eq!(info.query, "example.com");
        assert_eq!(info.query_type, "A");
        assert!(info.answers.is_empty());
    }

    #[test]
    fn test_parse_response_with_compressed_answer() {
        let msg = build_a_response("example.com", [1, 2, 3, 4], 300);
        let info = parse_dns(&msg).unwrap();

        assert_eq!(info.kind, DnsKind::Response);
        assert_eq!(info.query, "example.com");
        assert_eq!(info.response_code, "NoError");
        assert_eq!(info.answers.len(), 1);
        assert_eq!(info.answers[0].name, "example.com");
        assert_eq!(info.answers[0].ip, "1.2.3.4");
        assert_eq!(info.answers[0].ttl, 300);
    }

    #[test]
    fn test_truncated_payload() {
        assert!(parse_dns(&[0x12, 0x34, 0x01]).is_none());
    }

    #[test]
    fn test_truncated_answer_keeps_earlier_records() {
        let mut msg = build_a_response("example.com", [1, 2, 3, 4], 60);
        // Claim a second answer that is not actually present.
        msg[7] = 2;
        let info = parse_dns(&msg).unwrap();
        assert_eq!(info.answers.len(), 1);
    }
}
