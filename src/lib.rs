//! netlens - passive network observatory
//!
//! Captures frames off a local interface, dissects them layer by layer,
//! correlates packets into enriched stateful flows, learns per-device
//! behavioral baselines, and raises privacy and anomaly alerts. Strictly
//! passive: nothing is injected and no payload is decrypted.
//!
//! # Pipeline
//! ```text
//! capture -> dissectors (L2/L3/L4, DNS, TLS, 802.11)
//!         -> device tracker -> flow table (+DNS cache, GeoIP, JA3)
//!         -> session grouper -> privacy scanner -> baseline -> anomaly
//!         -> consumer callback
//! ```

pub mod analyzer;
pub mod config;
pub mod core;
pub mod correlator;
pub mod database;
pub mod engine;
pub mod enricher;
pub mod models;
pub mod protocols;
pub mod wireless;

pub use config::Config;
pub use database::Database;
pub use engine::{Engine, EngineStats, PacketEvent};
