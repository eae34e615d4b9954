//! MAC vendor lookup
//!
//! Resolves the OUI prefix (first three octets) of a MAC address to a
//! manufacturer name. Seeded with common vendors; extendable at runtime.

use parking_lot::RwLock;
use std::collections::HashMap;

/// OUI prefix to vendor name map.
pub struct VendorLookup {
    oui_map: RwLock<HashMap<String, String>>,
}

impl Default for VendorLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorLookup {
    pub fn new() -> Self {
        let lookup = Self {
            oui_map: RwLock::new(HashMap::new()),
        };
        lookup.load_defaults();
        lookup
    }

    /// Resolve the vendor for a MAC address; empty string on miss.
    pub fn lookup(&self, mac: &str) -> String {
        let clean: String = mac
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect();
        if clean.len() < 6 {
            return String::new();
        }

        self.oui_map
            .read()
            .get(&clean[..6])
            .cloned()
            .unwrap_or_default()
    }

    /// Register an additional OUI at runtime.
    pub fn add(&self, prefix: &str, vendor: &str) {
        let clean: String = prefix
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect();
        if clean.len() == 6 {
            self.oui_map.write().insert(clean, vendor.to_string());
        }
    }

    fn load_defaults(&self) {
        let defaults: &[(&str, &str)] = &[
            ("000393", "Apple"),
            ("0017F2", "Apple"),
            ("001C42", "Apple"),
            ("001E52", "Apple"),
            ("001FA3", "Apple"),
            ("0021E9", "Apple"),
            ("002312", "Apple"),
            ("0023DF", "Apple"),
            ("002500", "Apple"),
            ("0026BB", "Apple"),
            ("040CCE", "Apple"),
            ("041E64", "Apple"),
            ("0002B3", "Intel"),
            ("000C1F", "Intel"),
            ("001302", "Intel"),
            ("001372", "Intel"),
            ("001B21", "Intel"),
            ("0022FB", "Intel"),
            ("00000C", "Cisco"),
            ("000142", "Cisco"),
            ("000143", "Cisco"),
            ("3C5AB4", "Google"),
            ("546009", "Google"),
            ("D4F547", "Google"),
            ("F88FCA", "Google"),
            ("18FE34", "Espressif"),
            ("240AC4", "Espressif"),
            ("246F28", "Espressif"),
            ("2C3AE8", "Espressif"),
            ("30AEA4", "Espressif"),
            ("B827EB", "Raspberry Pi"),
            ("DCA632", "Raspberry Pi"),
            ("E45F01", "Raspberry Pi"),
            ("00156D", "Ubiquiti"),
            ("002722", "Ubiquiti"),
            ("0418D6", "Ubiquiti"),
            ("000569", "VMware"),
            ("000C29", "VMware"),
            ("001C14", "VMware"),
            ("005056", "VMware"),
            ("001132", "Synology"),
            ("001B63", "Apple"),
            ("D83ADD", "Raspberry Pi"),
        ];

        let mut map = self.oui_map.write();
        for (prefix, vendor) in defaults {
            map.insert((*prefix).to_string(), (*vendor).to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_vendor() {
        let lookup = VendorLookup::new();
        assert_eq!(lookup.lookup("b8:27:eb:12:34:56"), "Raspberry Pi");
        assert_eq!(lookup.lookup("B827EB123456"), "Raspberry Pi");
        assert_eq!(lookup.lookup("00-0c-29-aa-bb-cc"), "VMware");
    }

    #[test]
    fn test_lookup_unknown_is_empty() {
        let lookup = VendorLookup::new();
        assert_eq!(lookup.lookup("ff:ee:dd:00:11:22"), "");
    }

    #[test]
    fn test_short_input() {
        let lookup = VendorLookup::new();
        assert_eq!(lookup.lookup("b8:27"), "");
    }

    #[test]
    fn test_runtime_add() {
        let lookup = VendorLookup::new();
        lookup.add("aa:bb:cc", "TestVendor");
        assert_eq!(lookup.lookup("aa:bb:cc:00:00:01"), "TestVendor");
    }
}
