use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub geoip: GeoIpConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/netlens/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("netlens/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.general.db_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface to capture on
    #[serde(default)]
    pub interface: String,

    /// Snapshot length in bytes
    #[serde(default = "default_snaplen")]
    pub snaplen: i32,

    /// Promiscuous mode
    #[serde(default = "default_true")]
    pub promiscuous: bool,

    /// Kernel buffer size in MiB
    #[serde(default = "default_buffer_mb")]
    pub buffer_mb: i32,

    /// Optional BPF filter expression
    #[serde(default)]
    pub bpf_filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            snaplen: default_snaplen(),
            promiscuous: true,
            buffer_mb: default_buffer_mb(),
            bpf_filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to the GeoLite2 City database
    #[serde(default = "default_city_db")]
    pub city_db: String,

    /// Path to the GeoLite2 ASN database
    #[serde(default = "default_asn_db")]
    pub asn_db: String,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            city_db: default_city_db(),
            asn_db: default_asn_db(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Idle timeout for flows (seconds)
    #[serde(default = "default_flow_timeout")]
    pub flow_timeout_secs: i64,

    /// Idle timeout for sessions (seconds)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: i64,

    /// Flows required before a device baseline is established
    #[serde(default = "default_baseline_min_flows")]
    pub baseline_min_flows: u64,

    /// Periodic tick for cleanup and persistence (seconds)
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,

    /// Countries escalating a new-geography anomaly to critical
    #[serde(default = "default_high_risk_countries")]
    pub high_risk_countries: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            flow_timeout_secs: default_flow_timeout(),
            session_timeout_secs: default_session_timeout(),
            baseline_min_flows: default_baseline_min_flows(),
            tick_interval_secs: default_tick_secs(),
            high_risk_countries: default_high_risk_countries(),
        }
    }
}

// Default value functions
fn default_db_path() -> String {
    "netlens.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_snaplen() -> i32 {
    65536
}

fn default_buffer_mb() -> i32 {
    32
}

fn default_city_db() -> String {
    "data/geoip/GeoLite2-City.mmdb".to_string()
}

fn default_asn_db() -> String {
    "data/geoip/GeoLite2-ASN.mmdb".to_string()
}

fn default_flow_timeout() -> i64 {
    300
}

fn default_session_timeout() -> i64 {
    300
}

fn default_baseline_min_flows() -> u64 {
    100
}

fn default_tick_secs() -> u64 {
    5
}

fn default_high_risk_countries() -> Vec<String> {
    vec![
        "RU".to_string(),
        "CN".to_string(),
        "KP".to_string(),
        "IR".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture.snaplen, 65536);
        assert!(config.capture.promiscuous);
        assert_eq!(config.capture.buffer_mb, 32);
        assert_eq!(config.tracking.flow_timeout_secs, 300);
        assert_eq!(config.tracking.baseline_min_flows, 100);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.capture.snaplen, config.capture.snaplen);
        assert_eq!(parsed.tracking.high_risk_countries, config.tracking.high_risk_countries);
    }

    #[test]
    fn test_partial_config() {
        let parsed: Config = toml::from_str("[capture]\ninterface = \"eth0\"\n").unwrap();
        assert_eq!(parsed.capture.interface, "eth0");
        assert_eq!(parsed.capture.snaplen, 65536);
        assert_eq!(parsed.general.log_level, "info");
    }
}
