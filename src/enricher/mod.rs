//! Pure-lookup enrichment adapters and the local device tracker.

pub mod application;
pub mod classifier;
pub mod device;
pub mod geoip;
pub mod ja3_db;
pub mod rdns;
pub mod vendor;

pub use application::ApplicationIdentifier;
pub use classifier::TrafficClassifier;
pub use device::{is_private_ip, DeviceTracker};
pub use geoip::{GeoData, GeoIpService};
pub use ja3_db::Ja3Catalog;
pub use rdns::ReverseDnsResolver;
pub use vendor::VendorLookup;
