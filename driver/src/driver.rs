// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The port driver contract (§6) and the two concrete drivers the simulator ships with.

use net::packet::PacketBuffer;
use std::collections::VecDeque;

/// Kind of backing driver a port is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// A real Ethernet PHY.
    EthernetPhy,
    /// A hardware switch ASIC port.
    SwitchAsic,
    /// An in-memory simulated port, used by most tests.
    Simulator,
    /// A port that echoes its own transmissions back to its ingress.
    Loopback,
    /// A virtual (e.g. tap/veth-like) port.
    Virtual,
}

/// Capability flags a driver declares; the core invokes only matching operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Driver supports `transmit`.
    pub tx: bool,
    /// Driver can deliver received frames.
    pub rx: bool,
    /// Driver offloads checksum/segmentation work.
    pub offload: bool,
    /// Driver supports DMA descriptor rings.
    pub dma: bool,
    /// Driver can raise interrupts on rx-ready.
    pub irq: bool,
    /// Driver supports loopback mode.
    pub loopback: bool,
    /// Driver honors flow control (PAUSE).
    pub flow_control: bool,
}

/// Errors a driver may surface. Surfaced verbatim to the caller; the port's tx-error counter is
/// incremented by the table regardless of which variant is returned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// The driver does not support the requested operation.
    #[error("operation not supported by this driver")]
    Unsupported,
    /// A simulated hardware fault.
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    /// The driver has not been initialized (or was already shut down).
    #[error("driver not initialized")]
    NotInitialized,
}

/// Driver-reported statistics, independent of the port-level counters `PortTable` maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverStats {
    /// Frames enqueued for transmission by the driver.
    pub tx_enqueued: u64,
    /// Frames the driver has made available for reception.
    pub rx_available: u64,
}

/// The port driver contract: `init`, `transmit`, `shutdown`, plus optional `reset`, `get_stats`,
/// `set_config`. Generalizes the teacher's `Configure`/`Start`/`Stop`/`Initialize`/`Receive`/
/// `Transmit` trait family into one object-safe trait.
pub trait Driver: Send {
    /// Bring the driver up. Called once by `PortTable::open`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] if the underlying hardware/simulation fails to initialize.
    fn init(&mut self) -> Result<(), DriverError>;

    /// Hand a frame to the driver for transmission. Consumes the frame.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] on failure; the frame is dropped either way.
    fn transmit(&mut self, frame: PacketBuffer) -> Result<(), DriverError>;

    /// Tear the driver down. Called once by `PortTable::close`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] if teardown fails.
    fn shutdown(&mut self) -> Result<(), DriverError>;

    /// Reset the driver to its post-init state, if supported.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unsupported`] by default.
    fn reset(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Driver-level statistics, independent of port counters.
    fn get_stats(&self) -> DriverStats {
        DriverStats::default()
    }

    /// Apply a capability-relevant configuration change (e.g. loopback toggle).
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unsupported`] if the driver cannot honor the change.
    fn set_config(&mut self, loopback: bool) -> Result<(), DriverError> {
        let _ = loopback;
        Ok(())
    }

    /// Declared capability flags.
    fn capabilities(&self) -> Capabilities;

    /// The kind of driver this is.
    fn kind(&self) -> DriverKind;
}

/// An in-memory simulated port: `transmit` enqueues the frame, and `try_recv` drains it. Stands
/// in for a PHY in tests; nothing is actually sent anywhere.
#[derive(Debug, Default)]
pub struct SimulatorDriver {
    initialized: bool,
    tx_queue: VecDeque<PacketBuffer>,
    stats: DriverStats,
}

impl SimulatorDriver {
    /// Create a new, uninitialized simulator driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the next frame the driver was asked to transmit, if any.
    pub fn try_recv(&mut self) -> Option<PacketBuffer> {
        self.tx_queue.pop_front()
    }

    /// Number of frames currently queued for "transmission".
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.tx_queue.len()
    }
}

impl Driver for SimulatorDriver {
    fn init(&mut self) -> Result<(), DriverError> {
        self.initialized = true;
        Ok(())
    }

    fn transmit(&mut self, frame: PacketBuffer) -> Result<(), DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        self.stats.tx_enqueued += 1;
        self.tx_queue.push_back(frame);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.initialized = false;
        self.tx_queue.clear();
        Ok(())
    }

    fn get_stats(&self) -> DriverStats {
        self.stats
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tx: true,
            rx: true,
            loopback: true,
            ..Capabilities::default()
        }
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Simulator
    }
}

/// A driver that immediately echoes every transmitted frame back as a pending receive, backing
/// `Port::loopback`.
#[derive(Debug, Default)]
pub struct LoopbackDriver {
    initialized: bool,
    rx_queue: VecDeque<PacketBuffer>,
    stats: DriverStats,
}

impl LoopbackDriver {
    /// Create a new, uninitialized loopback driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the next frame that was echoed back by a prior `transmit`.
    pub fn try_recv(&mut self) -> Option<PacketBuffer> {
        self.rx_queue.pop_front()
    }
}

impl Driver for LoopbackDriver {
    fn init(&mut self) -> Result<(), DriverError> {
        self.initialized = true;
        Ok(())
    }

    fn transmit(&mut self, frame: PacketBuffer) -> Result<(), DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        self.stats.tx_enqueued += 1;
        self.stats.rx_available += 1;
        self.rx_queue.push_back(frame);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.initialized = false;
        self.rx_queue.clear();
        Ok(())
    }

    fn get_stats(&self) -> DriverStats {
        self.stats
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tx: true,
            rx: true,
            loopback: true,
            ..Capabilities::default()
        }
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Loopback
    }
}
