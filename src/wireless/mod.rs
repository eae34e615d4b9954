//! 802.11 management-frame dissection and rogue AP analysis.

pub mod frame;
pub mod rogue;
pub mod scanner;

pub use frame::{parse_header, parse_ies, strip_radiotap, Dot11Header, FrameType};
pub use rogue::detect_rogue_aps;
pub use scanner::{WifiEvent, WifiScanner};
