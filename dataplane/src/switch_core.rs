// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `SwitchCore`: the one value that owns every subsystem (§9 Design Note) — the port table, the
//! packet pipeline, and the L2/L3 engines the two registered stages drive.

use concurrency::Arc;
use driver::{PortConfig, PortId as DriverPortId, PortTable, SimulatorDriver};
use l2::{MacTable, MacTableConfig, StpEngine, VlanEngine};
use net::eth::mac::Mac;
use net::vlan::Vid;
use pipeline::PacketPipeline;
use routing::{ArpCache, RoutingTable};
use std::sync::atomic::{AtomicU64, Ordering};
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::{debug, warn};

use crate::config::BspConfig;
use crate::ip_processor::IpProcessor;
use crate::l2_stage::L2Stage;
use crate::l3_stage::L3Stage;

trace_target!(LevelFilter::INFO, &["dataplane", "switch-core"]);

/// Priority `L2Stage` registers at; must run before `L3Stage`.
const L2_STAGE_PRIORITY: i32 = 10;
/// Priority `L3Stage` registers at.
const L3_STAGE_PRIORITY: i32 = 20;
/// VLAN every front-panel port is admitted to at boot, untagged.
const DEFAULT_VID: u16 = 1;
/// The 802.1D bridge-group destination address BPDUs are sent to.
pub(crate) const BPDU_DESTINATION: Mac = Mac([0x01, 0x80, 0xC2, 0x00, 0x00, 0x00]);

/// Owns the port table, the pipeline, and every L2/L3 engine; the single handle a BSP layer or
/// test harness drives.
pub struct SwitchCore {
    port_table: Arc<PortTable>,
    pipeline: Arc<PacketPipeline>,
    mac_table: Arc<MacTable>,
    vlan_engine: Arc<VlanEngine>,
    stp_engine: Arc<StpEngine>,
    arp_cache: Arc<ArpCache>,
    routing_table: Arc<RoutingTable>,
    ip_processor: Arc<IpProcessor>,
    clock: Arc<AtomicU64>,
    config: BspConfig,
}

impl SwitchCore {
    /// Boot a switch from `config`: open the CPU port plus `config.port_count` front-panel
    /// ports, construct every L2/L3 engine, and register `L2Stage`/`L3Stage` into the pipeline.
    #[must_use]
    pub fn boot(config: BspConfig) -> Self {
        let port_table = Arc::new(PortTable::new(config.base_mac));
        let clock = Arc::new(AtomicU64::new(0));

        let mac_table = Arc::new(MacTable::new(MacTableConfig {
            aging_time: config.mac_aging_time,
            ..MacTableConfig::default()
        }));
        let vlan_engine = Arc::new(VlanEngine::new());
        let stp_engine = Arc::new(StpEngine::new(config.base_mac, config.bridge_priority));
        let arp_cache = Arc::new(ArpCache::new(config.router_ipv4, config.base_mac));
        let routing_table = Arc::new(RoutingTable::new());
        let ip_processor = Arc::new(IpProcessor::new(
            Arc::clone(&arp_cache),
            Arc::clone(&routing_table),
            Arc::clone(&port_table),
        ));

        let default_vid = Vid::new(DEFAULT_VID).unwrap_or_else(|_| unreachable!());
        if let Err(e) = vlan_engine.create_vlan(default_vid, "default".to_string()) {
            warn!("switch-core: failed to create default vlan: {e}");
        }

        port_table
            .open(DriverPortId::INTERNAL_CPU, PortConfig { mtu: config.default_mtu, ..PortConfig::default() }, Box::new(SimulatorDriver::new()))
            .unwrap_or_else(|e| warn!("switch-core: failed to open cpu port: {e}"));

        for i in 0..config.port_count {
            let port_id = DriverPortId(i);
            let port_config = PortConfig {
                mtu: config.default_mtu,
                learning_enabled: config.learning_enabled_default,
                ..PortConfig::default()
            };
            if let Err(e) = port_table.open(port_id, port_config, Box::new(SimulatorDriver::new())) {
                warn!("switch-core: failed to open port {port_id}: {e}");
                continue;
            }
            stp_engine.add_port(i, 1);
            if let Err(e) = vlan_engine.add_port(i, default_vid, l2::TagAction::Untag) {
                warn!("switch-core: failed to admit port {i} to default vlan: {e}");
            }
        }

        let pipeline = Arc::new(PacketPipeline::new());
        let l2_stage = L2Stage::new(
            Arc::clone(&mac_table),
            Arc::clone(&vlan_engine),
            Arc::clone(&stp_engine),
            Arc::clone(&port_table),
            Arc::clone(&clock),
        );
        if let Err(e) = pipeline.register(L2_STAGE_PRIORITY, l2_stage) {
            warn!("switch-core: failed to register l2 stage: {e}");
        }
        let l3_stage = L3Stage::new(
            Arc::clone(&arp_cache),
            Arc::clone(&ip_processor),
            Arc::clone(&port_table),
            config.router_ipv4,
            config.base_mac,
            Arc::clone(&clock),
        );
        if let Err(e) = pipeline.register(L3_STAGE_PRIORITY, l3_stage) {
            warn!("switch-core: failed to register l3 stage: {e}");
        }

        for i in 0..config.port_count {
            let port_id = DriverPortId(i);
            let pipeline = Arc::clone(&pipeline);
            if let Err(e) = port_table.register_rx_callback(port_id, move |mut frame| {
                pipeline.receive(&mut frame, i);
            }) {
                warn!("switch-core: failed to register rx callback on port {port_id}: {e}");
            }
        }

        debug!("switch-core: booted with {} front-panel ports", config.port_count);

        Self {
            port_table,
            pipeline,
            mac_table,
            vlan_engine,
            stp_engine,
            arp_cache,
            routing_table,
            ip_processor,
            clock,
            config,
        }
    }

    /// The port registry.
    #[must_use]
    pub fn port_table(&self) -> &Arc<PortTable> {
        &self.port_table
    }

    /// The packet pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<PacketPipeline> {
        &self.pipeline
    }

    /// The MAC learning table.
    #[must_use]
    pub fn mac_table(&self) -> &Arc<MacTable> {
        &self.mac_table
    }

    /// The VLAN admission/tagging engine.
    #[must_use]
    pub fn vlan_engine(&self) -> &Arc<VlanEngine> {
        &self.vlan_engine
    }

    /// The spanning-tree engine.
    #[must_use]
    pub fn stp_engine(&self) -> &Arc<StpEngine> {
        &self.stp_engine
    }

    /// The ARP cache.
    #[must_use]
    pub fn arp_cache(&self) -> &Arc<ArpCache> {
        &self.arp_cache
    }

    /// The routing table.
    #[must_use]
    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    /// The L3 forwarding pipeline.
    #[must_use]
    pub fn ip_processor(&self) -> &Arc<IpProcessor> {
        &self.ip_processor
    }

    /// The boot-time configuration this core was built from.
    #[must_use]
    pub fn config(&self) -> &BspConfig {
        &self.config
    }

    /// Advance the shared clock to `now` and drive every time-based subsystem: STP
    /// reconfiguration (transmitting any BPDUs it emits), ARP aging, MAC-table aging, and
    /// reassembly-table expiry.
    pub fn tick(&self, now: u64) {
        self.clock.store(now, Ordering::Relaxed);

        for (port, bpdu) in self.stp_engine.tick(now) {
            let Ok(mac) = self.port_table.get_mac(DriverPortId(port)) else {
                continue;
            };
            // BPDUs carry no Ethernet-II ethertype; per 802.3 a length field under 1536 marks
            // the frame as length-encoded rather than protocol-encoded. `L2Stage` only checks
            // the destination address to route the payload to `StpEngine::receive_bpdu`,
            // skipping LLC/DSAP-SSAP framing as a simplification over real 802.3.
            let Ok(length) = u16::try_from(bpdu.len()) else {
                continue;
            };
            let Ok(eth) = net::eth::Eth::new(mac, BPDU_DESTINATION, etherparse::EtherType(length)) else {
                continue;
            };
            let mut frame = net::packet::PacketBuffer::allocate(14 + bpdu.len());
            let mut eth_buf = [0u8; 14];
            if eth.write(&mut eth_buf).is_err() {
                continue;
            }
            if frame.append(&eth_buf).is_err() || frame.append(&bpdu).is_err() {
                continue;
            }
            frame.meta_mut().direction = net::packet::Direction::Internal;
            if let Err(e) = self.port_table.tx(DriverPortId(port), frame) {
                warn!("switch-core: failed to transmit bpdu on port {port}: {e}");
            }
        }

        self.arp_cache.age(now);
        self.mac_table.aging(now);
        self.ip_processor.expire_reassembly(now);
    }
}
