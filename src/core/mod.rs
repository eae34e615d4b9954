//! Core packet representation and the dissector chain.

pub mod packet;
pub mod parser;

pub use packet::{DnsAnswer, DnsInfo, DnsKind, EthernetInfo, Layer3Info, Layer4Info, Packet, TcpFlags, TlsInfo};
pub use parser::{guess_os, parse_ethernet_frame};
