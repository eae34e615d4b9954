//! Command-line interface over the engine and the database.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use netlens::engine::capture::PcapSource;
use netlens::enricher::ReverseDnsResolver;
use netlens::wireless::{detect_rogue_aps, WifiEvent};
use netlens::{Config, Database, Engine, PacketEvent};

#[derive(Parser)]
#[command(name = "netlens", version, about = "Passive network observatory")]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to a config file (defaults to the usual locations)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Capture live traffic and print the enriched event feed
    Capture {
        /// Interface to capture on
        #[arg(short, long)]
        interface: Option<String>,

        /// BPF filter expression
        #[arg(short, long)]
        filter: Option<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// List known local devices
    Devices,

    /// List recently persisted flows
    Flows {
        /// Maximum number of flows to show
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },

    /// List observed WiFi networks, clients, and rogue AP alerts
    Wifi,
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Command::Capture {
            interface,
            filter,
            duration,
        } => {
            if let Some(interface) = interface {
                config.capture.interface = interface;
            }
            if let Some(filter) = filter {
                config.capture.bpf_filter = filter;
            }
            run_capture(&config, duration).await
        }
        Command::Devices => list_devices(&config),
        Command::Flows { limit } => list_flows(&config, limit).await,
        Command::Wifi => list_wifi(&config),
    }
}

async fn run_capture(config: &Config, duration: Option<u64>) -> Result<()> {
    let source = PcapSource::open(&config.capture)?;
    let db = Database::open(config.db_path())?;
    let engine = Arc::new(Engine::new(config, db)?);

    info!("starting capture on {}", config.capture.interface);

    {
        let engine = engine.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, stopping");
            engine.stop();
        });
    }

    if let Some(secs) = duration {
        let engine = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
            engine.stop();
        });
    }

    engine.run(source, print_event).await?;

    let stats = engine.stats();
    println!(
        "\n{} packets processed, {} dropped, {} bytes",
        stats.packets_processed, stats.packets_dropped, stats.bytes_processed
    );
    Ok(())
}

fn print_event(event: PacketEvent) {
    let mut line = format!(
        "{} {:>10} {}:{} -> {}:{} ({} bytes)",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.protocol,
        event.src_ip,
        event.src_port,
        event.dst_ip,
        event.dst_port,
        event.length
    );

    if !event.dst_domain.is_empty() {
        line.push_str(&format!(" [{}]", event.dst_domain));
    }
    if !event.dns_info.is_empty() {
        line.push_str(&format!(" DNS {}", event.dns_info));
    }
    if !event.tls_info.is_empty() {
        line.push_str(&format!(" TLS {}", event.tls_info));
    }
    if !event.device_hostname.is_empty() {
        line.push_str(&format!(" <{}>", event.device_hostname));
    }
    println!("{}", line);

    for issue in &event.privacy_issues {
        println!("  [PRIVACY {}] {}", issue.severity, issue.description);
    }
    for anomaly in &event.anomalies {
        println!("  [ANOMALY {}] {}", anomaly.severity, anomaly.description);
    }
    if let Some(WifiEvent::Beacon(ap)) = &event.wifi {
        println!(
            "  [WIFI] AP {} ssid={} channel={} enc={}",
            ap.bssid, ap.ssid, ap.channel, ap.encryption
        );
    }
}

fn list_devices(config: &Config) -> Result<()> {
    let db = Database::open(config.db_path())?;
    let devices = db.list_devices()?;

    if devices.is_empty() {
        println!("no devices recorded");
        return Ok(());
    }

    println!(
        "{:<18} {:<14} {:<22} {:<16} {:<16} last seen",
        "MAC", "Vendor", "Hostname", "IP", "OS"
    );
    for d in devices {
        println!(
            "{:<18} {:<14} {:<22} {:<16} {:<16} {}",
            d.mac_address,
            d.vendor,
            d.hostname,
            d.ip_address,
            d.os_fingerprint,
            d.last_seen.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn list_flows(config: &Config, limit: u32) -> Result<()> {
    let db = Database::open(config.db_path())?;
    let flows = db.recent_flows(limit)?;

    if flows.is_empty() {
        println!("no flows recorded");
        return Ok(());
    }

    let resolver = ReverseDnsResolver::new();
    for f in flows {
        let mut line = format!(
            "{} {:>5} pkts {:>9} bytes  {}",
            f.first_seen.format("%Y-%m-%d %H:%M:%S"),
            f.packet_count,
            f.byte_count,
            f.key
        );
        if !f.dst_domain.is_empty() {
            line.push_str(&format!(" [{}]", f.dst_domain));
        } else {
            // Idle path: a bounded PTR lookup is acceptable here.
            let ptr = resolver.lookup_blocking(&f.key.dst_ip).await;
            if !ptr.is_empty() {
                line.push_str(&format!(" [{}]", ptr));
            }
        }
        if !f.application.is_empty() {
            line.push_str(&format!(" app={}", f.application));
        }
        if !f.dst_country.is_empty() {
            line.push_str(&format!(" geo={}", f.dst_country));
        }
        println!("{}", line);
    }
    Ok(())
}

fn list_wifi(config: &Config) -> Result<()> {
    let db = Database::open(config.db_path())?;

    let aps = db.list_access_points()?;
    println!("Access points ({}):", aps.len());
    for ap in &aps {
        println!(
            "  {} ssid={:<24} channel={:<3} enc={:<10} vendor={}",
            ap.bssid, ap.ssid, ap.channel, ap.encryption, ap.vendor
        );
    }

    let alerts = detect_rogue_aps(&aps);
    if !alerts.is_empty() {
        println!("\nRogue AP alerts ({}):", alerts.len());
        for alert in &alerts {
            println!("  [{}] {} ({}): {}", alert.severity, alert.ssid, alert.bssid, alert.message);
        }
    }

    let clients = db.list_wifi_clients()?;
    println!("\nProbing clients ({}):", clients.len());
    for client in &clients {
        println!(
            "  {} vendor={:<14} probed: {}",
            client.mac,
            client.vendor,
            client.probed_ssids.join(", ")
        );
    }

    let handshakes = db.list_handshakes()?;
    println!("\nCaptured handshakes ({}):", handshakes.len());
    for hs in &handshakes {
        println!(
            "  {} client={} at {}",
            hs.bssid,
            hs.client_mac,
            hs.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
