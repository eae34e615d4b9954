//! JA3 fingerprint catalog
//!
//! Maps known JA3 hashes to client applications. Seeded with a small
//! embedded set; extendable at runtime from threat feeds or local
//! observations.

use parking_lot::RwLock;
use std::collections::HashMap;

pub struct Ja3Catalog {
    fingerprints: RwLock<HashMap<String, String>>,
}

impl Default for Ja3Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Ja3Catalog {
    pub fn new() -> Self {
        let catalog = Self {
            fingerprints: RwLock::new(HashMap::new()),
        };
        catalog.load_defaults();
        catalog
    }

    /// Application name for a JA3 hash; empty string on miss.
    pub fn lookup(&self, ja3: &str) -> String {
        self.fingerprints
            .read()
            .get(ja3)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add(&self, ja3: &str, application: &str) {
        self.fingerprints
            .write()
            .insert(ja3.to_string(), application.to_string());
    }

    pub fn len(&self) -> usize {
        self.fingerprints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.read().is_empty()
    }

    fn load_defaults(&self) {
        let defaults: &[(&str, &str)] = &[
            ("e7d705a3286e19ea42f587b344ee6865", "Chrome"),
            ("b32309a26951912be7dba376398abc3b", "Chrome"),
            ("a0e9f5d64349fb13191bc781f81f42e1", "Chrome"),
            ("e35df3e00ca4ef31d42b34bebaa2f86e", "Firefox"),
            ("3b5074b1b5d032e5620f69f9f700ff0e", "Firefox"),
            ("4d7a28d6f2263ed61de88ca66eb011e3", "Firefox"),
            ("f4febc55ea12b31ae17cfb7e614afda8", "Safari"),
            ("51c64c77e60f3980eea90869b68c58a8", "Edge"),
            ("6734f37431670b3ab4292b8f60f29984", "curl"),
            ("bc6c386f480ee97b9d9e52d472b772d8", "Python Requests"),
            ("3faa4ad39f690c4ef1c3160caa375465", "Go HTTP Client"),
            ("10ee8d30a5d01c042afd7b2b205facc4", "OpenSSL s_client"),
        ];

        let mut map = self.fingerprints.write();
        for (ja3, app) in defaults {
            map.insert((*ja3).to_string(), (*app).to_string());
        }
    }
}
