//! GeoIP enrichment
//!
//! MaxMind GeoLite2 lookups for country, city, and ASN. Both databases
//! are optional: an absent file downgrades to empty lookups, while a
//! file that exists but cannot be read is a configuration error.

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum GeoIpError {
    #[error("failed to open GeoIP database {path}: {source}")]
    DatabaseOpen {
        path: String,
        source: maxminddb::MaxMindDBError,
    },
}

/// Geographical data for one IP; empty fields mean "not known".
#[derive(Debug, Clone, Default)]
pub struct GeoData {
    pub country: String,
    pub city: String,
    pub asn: String,
    pub org: String,
}

/// IP-to-location lookups over memory-mapped GeoLite2 readers.
pub struct GeoIpService {
    city_db: Option<Reader<Vec<u8>>>,
    asn_db: Option<Reader<Vec<u8>>>,
}

impl GeoIpService {
    /// Open the City and ASN databases. Missing files are skipped with a
    /// warning so the pipeline can run without enrichment data.
    pub fn open(city_path: &Path, asn_path: &Path) -> Result<Self, GeoIpError> {
        let city_db = Self::open_reader(city_path)?;
        let asn_db = Self::open_reader(asn_path)?;
        Ok(Self { city_db, asn_db })
    }

    fn open_reader(path: &Path) -> Result<Option<Reader<Vec<u8>>>, GeoIpError> {
        if !path.exists() {
            warn!("GeoIP database not found, lookups disabled: {}", path.display());
            return Ok(None);
        }
        Reader::open_readfile(path)
            .map(Some)
            .map_err(|source| GeoIpError::DatabaseOpen {
                path: path.display().to_string(),
                source,
            })
    }

    /// True when at least one database is loaded.
    pub fn is_enabled(&self) -> bool {
        self.city_db.is_some() || self.asn_db.is_some()
    }

    /// Look up an IP. Every miss, parse failure, or unloadable database
    /// yields empty fields, never an error.
    pub fn lookup(&self, ip_str: &str) -> GeoData {
        let ip: IpAddr = match ip_str.parse() {
            Ok(ip) => ip,
            Err(_) => return GeoData::default(),
        };

        let mut data = GeoData::default();

        if let Some(reader) = &self.city_db {
            if let Ok(city) = reader.lookup::<geoip2::City>(ip) {
                if let Some(country) = city.country.and_then(|c| c.iso_code) {
                    data.country = country.to_string();
                }
                if let Some(name) = city
                    .city
                    .and_then(|c| c.names)
                    .and_then(|names| names.get("en").copied())
                {
                    data.city = name.to_string();
                }
            }
        }

        if let Some(reader) = &self.asn_db {
            if let Ok(asn) = reader.lookup::<geoip2::Asn>(ip) {
                if let Some(number) = asn.autonomous_system_number {
                    data.asn = format!("AS{}", number);
                }
                if let Some(org) = asn.autonomous_system_organization {
                    data.org = org.to_string();
                }
            }
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_databases_disable_lookups() {
        let service = GeoIpService::open(
            &PathBuf::from("/nonexistent/GeoLite2-City.mmdb"),
            &PathBuf::from("/nonexistent/GeoLite2-ASN.mmdb"),
        )
        .unwrap();

        assert!(!service.is_enabled());
        let data = service.lookup("93.184.216.34");
        assert!(data.country.is_empty());
        assert!(data.asn.is_empty());
    }

    #[test]
    fn test_invalid_ip_is_empty() {
        let service = GeoIpService::open(
            &PathBuf::from("/nonexistent/city.mmdb"),
            &PathBuf::from("/nonexistent/asn.mmdb"),
        )
        .unwrap();
        let data = service.lookup("not-an-ip");
        assert!(data.country.is_empty());
    }
}
