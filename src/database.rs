//! SQLite persistence
//!
//! Thread-safe wrapper over a single connection. In-memory state stays
//! authoritative: callers log persistence failures and keep going, and
//! dirty records are retried on the next sweep.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::{AccessPoint, Device, Flow, Handshake, WifiClient};

/// Thread-safe database handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open database: {}", path.as_ref().display()))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac_address TEXT NOT NULL UNIQUE,
                vendor TEXT,
                hostname TEXT,
                ip_address TEXT,
                os_fingerprint TEXT,
                device_type TEXT,
                first_seen TEXT,
                last_seen TEXT,
                user_label TEXT
            );

            CREATE TABLE IF NOT EXISTS flows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id INTEGER,
                src_ip TEXT,
                dst_ip TEXT,
                src_port INTEGER,
                dst_port INTEGER,
                protocol TEXT,
                dns_query TEXT,
                tls_sni TEXT,
                dst_domain TEXT,
                dst_country TEXT,
                dst_city TEXT,
                dst_asn TEXT,
                ja3_hash TEXT,
                application TEXT,
                traffic_class TEXT,
                first_seen TEXT,
                last_seen TEXT,
                packet_count INTEGER,
                byte_count INTEGER,
                FOREIGN KEY (device_id) REFERENCES devices(id)
            );
            CREATE INDEX IF NOT EXISTS idx_flows_device ON flows(device_id);
            CREATE INDEX IF NOT EXISTS idx_flows_time ON flows(first_seen);
            CREATE INDEX IF NOT EXISTS idx_flows_domain ON flows(dst_domain);

            CREATE TABLE IF NOT EXISTS dns_queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id INTEGER,
                query_domain TEXT,
                query_type TEXT,
                resolved_ips TEXT,
                ttl INTEGER,
                timestamp TEXT,
                FOREIGN KEY (device_id) REFERENCES devices(id)
            );
            CREATE INDEX IF NOT EXISTS idx_dns_domain ON dns_queries(query_domain);

            CREATE TABLE IF NOT EXISTS tls_handshakes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                flow_id INTEGER,
                sni TEXT,
                ja3_hash TEXT,
                cipher_suite TEXT,
                tls_version TEXT,
                identified_app TEXT,
                timestamp TEXT,
                FOREIGN KEY (flow_id) REFERENCES flows(id)
            );

            CREATE TABLE IF NOT EXISTS access_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bssid TEXT NOT NULL UNIQUE,
                ssid TEXT,
                channel INTEGER,
                encryption TEXT,
                vendor TEXT,
                signal INTEGER,
                first_seen TEXT,
                last_seen TEXT
            );

            CREATE TABLE IF NOT EXISTS wifi_clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac_address TEXT NOT NULL UNIQUE,
                vendor TEXT,
                probed_ssids TEXT,
                last_seen TEXT
            );

            CREATE TABLE IF NOT EXISTS handshakes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bssid TEXT,
                client_mac TEXT,
                is_full INTEGER,
                timestamp TEXT
            );
            "#,
        )?;
        Ok(())
    }

    // ==================== Devices ====================

    /// Upsert a device by MAC; returns the row id.
    pub fn save_device(&self, device: &Device) -> Result<i64> {
        let conn = self.conn.lock().unwrap();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM devices WHERE mac_address = ?",
                [&device.mac_address],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE devices SET vendor = ?, hostname = ?, ip_address = ?,
                 os_fingerprint = ?, device_type = ?, last_seen = ?, user_label = ? WHERE id = ?",
                params![
                    device.vendor,
                    device.hostname,
                    device.ip_address,
                    device.os_fingerprint,
                    device.device_type,
                    device.last_seen.to_rfc3339(),
                    device.user_label,
                    id
                ],
            )?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO devices (mac_address, vendor, hostname, ip_address,
                 os_fingerprint, device_type, first_seen, last_seen, user_label)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    device.mac_address,
                    device.vendor,
                    device.hostname,
                    device.ip_address,
                    device.os_fingerprint,
                    device.device_type,
                    device.first_seen.to_rfc3339(),
                    device.last_seen.to_rfc3339(),
                    device.user_label
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }

    /// All devices, most recently seen first.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, mac_address, vendor, hostname, ip_address, os_fingerprint,
             device_type, first_seen, last_seen, user_label
             FROM devices ORDER BY last_seen DESC",
        )?;

        let devices = stmt
            .query_map([], |row| {
                Ok(Device {
                    id: Some(row.get(0)?),
                    mac_address: row.get(1)?,
                    vendor: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    hostname: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    ip_address: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    os_fingerprint: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    device_type: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    first_seen: parse_ts(&row.get::<_, String>(7)?),
                    last_seen: parse_ts(&row.get::<_, String>(8)?),
                    user_label: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(devices)
    }

    // ==================== Flows ====================

    /// Insert a flow, or update the existing row when it already has a
    /// persistence id. Returns the row id.
    pub fn save_flow(&self, flow: &Flow) -> Result<i64> {
        let conn = self.conn.lock().unwrap();

        if let Some(id) = flow.db_id {
            conn.execute(
                "UPDATE flows SET dns_query = ?, tls_sni = ?, dst_domain = ?, dst_country = ?,
                 dst_city = ?, dst_asn = ?, ja3_hash = ?, application = ?, traffic_class = ?,
                 last_seen = ?, packet_count = ?, byte_count = ?, device_id = ? WHERE id = ?",
                params![
                    flow.dns_query,
                    flow.tls_sni,
                    flow.dst_domain,
                    flow.dst_country,
                    flow.dst_city,
                    flow.dst_asn,
                    flow.ja3,
                    flow.application,
                    flow.traffic_class,
                    flow.last_seen.to_rfc3339(),
                    flow.packet_count as i64,
                    flow.byte_count as i64,
                    flow.device_id,
                    id
                ],
            )?;
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO flows (device_id, src_ip, dst_ip, src_port, dst_port, protocol,
             dns_query, tls_sni, dst_domain, dst_country, dst_city, dst_asn, ja3_hash,
             application, traffic_class, first_seen, last_seen, packet_count, byte_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                flow.device_id,
                flow.key.src_ip,
                flow.key.dst_ip,
                flow.key.src_port,
                flow.key.dst_port,
                flow.key.protocol,
                flow.dns_query,
                flow.tls_sni,
                flow.dst_domain,
                flow.dst_country,
                flow.dst_city,
                flow.dst_asn,
                flow.ja3,
                flow.application,
                flow.traffic_class,
                flow.first_seen.to_rfc3339(),
                flow.last_seen.to_rfc3339(),
                flow.packet_count as i64,
                flow.byte_count as i64
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent flows by first_seen.
    pub fn recent_flows(&self, limit: u32) -> Result<Vec<Flow>> {
        use crate::models::FlowKey;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, device_id, src_ip, dst_ip, src_port, dst_port, protocol,
             dns_query, tls_sni, dst_domain, dst_country, dst_city, dst_asn, ja3_hash,
             application, traffic_class, first_seen, last_seen, packet_count, byte_count
             FROM flows ORDER BY first_seen DESC LIMIT ?",
        )?;

        let flows = stmt
            .query_map([limit], |row| {
                let key = FlowKey {
                    src_ip: row.get(2)?,
                    dst_ip: row.get(3)?,
                    src_port: row.get(4)?,
                    dst_port: row.get(5)?,
                    protocol: row.get(6)?,
                };
                let mut flow = Flow::new(0, key, parse_ts(&row.get::<_, String>(16)?), row.get(6)?);
                flow.db_id = Some(row.get(0)?);
                flow.device_id = row.get(1)?;
                flow.dns_query = row.get::<_, Option<String>>(7)?.unwrap_or_default();
                flow.tls_sni = row.get::<_, Option<String>>(8)?.unwrap_or_default();
                flow.dst_domain = row.get::<_, Option<String>>(9)?.unwrap_or_default();
                flow.dst_country = row.get::<_, Option<String>>(10)?.unwrap_or_default();
                flow.dst_city = row.get::<_, Option<String>>(11)?.unwrap_or_default();
                flow.dst_asn = row.get::<_, Option<String>>(12)?.unwrap_or_default();
                flow.ja3 = row.get::<_, Option<String>>(13)?.unwrap_or_default();
                flow.application = row.get::<_, Option<String>>(14)?.unwrap_or_default();
                flow.traffic_class = row.get::<_, Option<String>>(15)?.unwrap_or_default();
                flow.last_seen = parse_ts(&row.get::<_, String>(17)?);
                flow.packet_count = row.get::<_, i64>(18)? as u64;
                flow.byte_count = row.get::<_, i64>(19)? as u64;
                Ok(flow)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(flows)
    }

    // ==================== DNS / TLS observations ====================

    pub fn insert_dns_query(
        &self,
        device_id: Option<i64>,
        domain: &str,
        query_type: &str,
        resolved_ips: &[String],
        ttl: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dns_queries (device_id, query_domain, query_type, resolved_ips, ttl, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                device_id,
                domain,
                query_type,
                serde_json::to_string(resolved_ips)?,
                ttl,
                timestamp.to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_tls_handshake(
        &self,
        flow_id: Option<i64>,
        sni: &str,
        ja3: &str,
        cipher_suite: &str,
        version: &str,
        identified_app: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tls_handshakes (flow_id, sni, ja3_hash, cipher_suite, tls_version, identified_app, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                flow_id,
                sni,
                ja3,
                cipher_suite,
                version,
                identified_app,
                timestamp.to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ==================== WiFi ====================

    /// Upsert an access point by BSSID; returns the row id.
    pub fn save_access_point(&self, ap: &AccessPoint) -> Result<i64> {
        let conn = self.conn.lock().unwrap();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM access_points WHERE bssid = ?",
                [&ap.bssid],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE access_points SET ssid = ?, channel = ?, encryption = ?, vendor = ?,
                 signal = ?, last_seen = ? WHERE id = ?",
                params![
                    ap.ssid,
                    ap.channel,
                    ap.encryption,
                    ap.vendor,
                    ap.signal,
                    ap.last_seen.to_rfc3339(),
                    id
                ],
            )?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO access_points (bssid, ssid, channel, encryption, vendor, signal, first_seen, last_seen)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    ap.bssid,
                    ap.ssid,
                    ap.channel,
                    ap.encryption,
                    ap.vendor,
                    ap.signal,
                    ap.first_seen.to_rfc3339(),
                    ap.last_seen.to_rfc3339()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }

    pub fn list_access_points(&self) -> Result<Vec<AccessPoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, bssid, ssid, channel, encryption, vendor, signal, first_seen, last_seen
             FROM access_points ORDER BY last_seen DESC",
        )?;

        let aps = stmt
            .query_map([], |row| {
                Ok(AccessPoint {
                    id: Some(row.get(0)?),
                    bssid: row.get(1)?,
                    ssid: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    channel: row.get::<_, i64>(3)? as u8,
                    encryption: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    vendor: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    signal: row.get::<_, i64>(6)? as i32,
                    first_seen: parse_ts(&row.get::<_, String>(7)?),
                    last_seen: parse_ts(&row.get::<_, String>(8)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(aps)
    }

    /// Upsert a probing client by MAC; the probed-SSID list is stored as
    /// a JSON array. Returns the row id.
    pub fn save_wifi_client(&self, client: &WifiClient) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let ssids = serde_json::to_string(&client.probed_ssids)?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM wifi_clients WHERE mac_address = ?",
                [&client.mac],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE wifi_clients SET vendor = ?, probed_ssids = ?, last_seen = ? WHERE id = ?",
                params![client.vendor, ssids, client.last_seen.to_rfc3339(), id],
            )?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO wifi_clients (mac_address, vendor, probed_ssids, last_seen)
                 VALUES (?, ?, ?, ?)",
                params![client.mac, client.vendor, ssids, client.last_seen.to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }

    pub fn list_wifi_clients(&self) -> Result<Vec<WifiClient>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, mac_address, vendor, probed_ssids, last_seen
             FROM wifi_clients ORDER BY last_seen DESC",
        )?;

        let clients = stmt
            .query_map([], |row| {
                let ssids: Option<String> = row.get(3)?;
                Ok(WifiClient {
                    id: Some(row.get(0)?),
                    mac: row.get(1)?,
                    vendor: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    probed_ssids: ssids
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                    last_seen: parse_ts(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(clients)
    }

    pub fn insert_handshake(&self, handshake: &Handshake) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO handshakes (bssid, client_mac, is_full, timestamp) VALUES (?, ?, ?, ?)",
            params![
                handshake.bssid,
                handshake.client_mac,
                handshake.is_full as i32,
                handshake.timestamp.to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_handshakes(&self) -> Result<Vec<Handshake>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, bssid, client_mac, is_full, timestamp FROM handshakes ORDER BY timestamp DESC",
        )?;

        let handshakes = stmt
            .query_map([], |row| {
                Ok(Handshake {
                    id: Some(row.get(0)?),
                    bssid: row.get(1)?,
                    client_mac: row.get(2)?,
                    is_full: row.get::<_, i64>(3)? != 0,
                    timestamp: parse_ts(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(handshakes)
    }
}
