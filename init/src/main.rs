// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::pedantic)]

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use dataplane::{BoardType, BspConfig, SwitchCore};
use net::eth::mac::Mac;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Boot a simulated switch dataplane from a BSP configuration assembled from process
/// arguments, then tick it forever on a fixed interval.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Number of front-panel ports to create (excludes the always-present CPU port).
    #[arg(long, default_value_t = 32)]
    port_count: u16,

    /// Default MTU assigned to each port at boot.
    #[arg(long, default_value_t = 1500)]
    mtu: u16,

    /// Base MAC address (`aa:bb:cc:dd:ee:ff`) ports derive their own MAC from.
    #[arg(long, default_value = "02:00:00:00:00:00", value_parser = parse_mac)]
    base_mac: Mac,

    /// Seconds of MAC-table inactivity before a dynamic entry ages out.
    #[arg(long, default_value_t = 300)]
    mac_aging_secs: u64,

    /// Seconds before a reachable ARP entry transitions to stale.
    #[arg(long, default_value_t = 300)]
    arp_timeout_secs: u64,

    /// STP bridge priority assigned to this switch.
    #[arg(long, default_value_t = 32768)]
    bridge_priority: u16,

    /// The switch's own routed-interface IPv4 address.
    #[arg(long, default_value = "10.0.0.1")]
    router_ip: Ipv4Addr,

    /// Run with loopback-backed ports instead of the free-running simulator driver.
    #[arg(long)]
    loopback: bool,

    /// Milliseconds between `SwitchCore::tick` calls.
    #[arg(long, default_value_t = 100)]
    tick_interval_ms: u64,
}

#[derive(Debug, thiserror::Error)]
enum MacParseError {
    #[error("mac address must have 6 colon-separated octets, got {0}")]
    WrongOctetCount(usize),
    #[error("invalid hex octet {0:?}")]
    InvalidOctet(String),
}

fn parse_mac(raw: &str) -> Result<Mac, MacParseError> {
    let octets: Vec<&str> = raw.split(':').collect();
    if octets.len() != 6 {
        return Err(MacParseError::WrongOctetCount(octets.len()));
    }
    let mut bytes = [0u8; 6];
    for (byte, octet) in bytes.iter_mut().zip(octets) {
        *byte = u8::from_str_radix(octet, 16).map_err(|_| MacParseError::InvalidOctet(octet.to_string()))?;
    }
    Ok(Mac(bytes))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_line_number(true)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = BspConfig {
        board_type: if args.loopback { BoardType::Loopback } else { BoardType::Simulated },
        port_count: args.port_count,
        default_mtu: args.mtu,
        base_mac: args.base_mac,
        mac_aging_time: args.mac_aging_secs,
        arp_timeout: args.arp_timeout_secs,
        bridge_priority: args.bridge_priority,
        router_ipv4: args.router_ip,
        ..BspConfig::default()
    };

    info!(port_count = config.port_count, router_ip = %config.router_ipv4, "booting switch");
    let switch = SwitchCore::boot(config);
    info!("switch booted, entering tick loop");

    run_tick_loop(&switch, Duration::from_millis(args.tick_interval_ms))
}

fn run_tick_loop(switch: &SwitchCore, interval: Duration) -> ! {
    let start = Instant::now();
    loop {
        std::thread::sleep(interval);
        let now = u64::try_from(start.elapsed().as_secs()).unwrap_or(u64::MAX);
        switch.tick(now);
    }
}
