//! Driver configuration and the device table
//!
//! The hardware description is fixed when the bitstream is built, so the
//! defaults come straight from `life-chip`. Every field can be overridden
//! through the builder methods (the CLI maps its flags onto them).

use crate::engine::Direction;
use crate::error::{LifeError, Result};
use life_chip::map;
use std::time::Duration;

/// Build-time parameters of one transfer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Register block base address
    pub base_address: u64,
    /// Scatter-gather engine included in the build
    pub has_scatter_gather: bool,
    /// Host-to-device (MM2S) channel included in the build
    pub has_mm2s: bool,
    /// Device-to-host (S2MM) channel included in the build
    pub has_s2mm: bool,
    /// Address width of the memory-mapped master, in bits
    pub addr_width_bits: u32,
    /// Width of the buffer-length register, in bits
    pub length_width_bits: u32,
}

impl EngineConfig {
    /// Simple-mode engine as exported by the default design
    pub const fn simple(base_address: u64) -> Self {
        Self {
            base_address,
            has_scatter_gather: false,
            has_mm2s: true,
            has_s2mm: true,
            addr_width_bits: map::DMA_ADDR_WIDTH_BITS,
            length_width_bits: map::DMA_LENGTH_WIDTH_BITS,
        }
    }

    /// Simple-mode engine built with the S2MM channel only
    pub const fn receive_only(base_address: u64) -> Self {
        Self {
            has_mm2s: false,
            ..Self::simple(base_address)
        }
    }

    /// Whether the channel for `direction` exists
    pub const fn has_channel(&self, direction: Direction) -> bool {
        match direction {
            Direction::HostToDevice => self.has_mm2s,
            Direction::DeviceToHost => self.has_s2mm,
        }
    }

    /// Channel that carries the soft reset (MM2S when present, as in the
    /// vendor driver)
    pub const fn reset_channel(&self) -> Direction {
        if self.has_mm2s {
            Direction::HostToDevice
        } else {
            Direction::DeviceToHost
        }
    }

    /// Largest transfer the length register can describe
    pub const fn max_transfer_len(&self) -> usize {
        (1usize << self.length_width_bits) - 1
    }
}

/// Build-time parameters of one register port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Register block base address
    pub base_address: u64,
    /// Channel 1 width, in bits
    pub width_bits: u32,
    /// Second channel present
    pub is_dual: bool,
}

impl PortConfig {
    /// Single-channel port of the given width
    pub const fn single(base_address: u64, width_bits: u32) -> Self {
        Self {
            base_address,
            width_bits,
            is_dual: false,
        }
    }

    /// Mask of the bits that reach the fabric
    pub const fn value_mask(&self) -> u32 {
        if self.width_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width_bits) - 1
        }
    }
}

/// Known peripherals, keyed by base address
#[derive(Debug, Clone, Default)]
pub struct DeviceTable {
    engines: Vec<EngineConfig>,
    ports: Vec<PortConfig>,
}

impl DeviceTable {
    /// Empty table (every lookup fails)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table matching the shipped Zynq design
    pub fn zynq_default() -> Self {
        Self::empty()
            .with_engine(EngineConfig::simple(map::DMA_BASE))
            .with_port(PortConfig::single(map::GPIO_LOAD_BASE, 1))
            .with_port(PortConfig::single(map::GPIO_DATA_LO_BASE, 32))
            .with_port(PortConfig::single(map::GPIO_DATA_HI_BASE, 32))
    }

    /// Add or replace an engine entry
    #[must_use]
    pub fn with_engine(mut self, config: EngineConfig) -> Self {
        self.engines.retain(|e| e.base_address != config.base_address);
        self.engines.push(config);
        self
    }

    /// Add or replace a port entry
    #[must_use]
    pub fn with_port(mut self, config: PortConfig) -> Self {
        self.ports.retain(|p| p.base_address != config.base_address);
        self.ports.push(config);
        self
    }

    /// Find the engine at `base_address`
    ///
    /// # Errors
    ///
    /// Returns `ConfigLookupFailed` if no engine is registered there.
    pub fn lookup_engine(&self, base_address: u64) -> Result<EngineConfig> {
        self.engines
            .iter()
            .find(|e| e.base_address == base_address)
            .copied()
            .ok_or_else(|| LifeError::config_lookup_failed("transfer engine", base_address))
    }

    /// Find the port at `base_address`
    ///
    /// # Errors
    ///
    /// Returns `ConfigLookupFailed` if no port is registered there.
    pub fn lookup_port(&self, base_address: u64) -> Result<PortConfig> {
        self.ports
            .iter()
            .find(|p| p.base_address == base_address)
            .copied()
            .ok_or_else(|| LifeError::config_lookup_failed("register port", base_address))
    }
}

/// Runtime parameters of the generation pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Transfer engine base address
    pub dma_base: u64,
    /// Load-strobe port base address
    pub load_base: u64,
    /// Low-half data port base address
    pub data_lo_base: u64,
    /// High-half data port base address
    pub data_hi_base: u64,
    /// Physical address of the receive buffer
    pub rx_buffer_base: u64,
    /// Busy checks allowed per transfer
    pub poll_budget: u32,
    /// Sleep between generations
    pub idle_interval: Duration,
    /// State injected before generation 0
    pub initial_state: u64,
    /// Stop after this many generations (`None` runs forever)
    pub generation_limit: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            dma_base: map::DMA_BASE,
            load_base: map::GPIO_LOAD_BASE,
            data_lo_base: map::GPIO_DATA_LO_BASE,
            data_hi_base: map::GPIO_DATA_HI_BASE,
            rx_buffer_base: map::RX_BUFFER_BASE,
            poll_budget: map::POLL_TIMEOUT_COUNTER,
            idle_interval: Duration::from_millis(map::IDLE_INTERVAL_MS),
            initial_state: map::INITIAL_STATE,
            generation_limit: None,
        }
    }
}

impl DriverConfig {
    /// Set the poll budget
    #[must_use]
    pub fn with_poll_budget(mut self, budget: u32) -> Self {
        self.poll_budget = budget;
        self
    }

    /// Set the idle interval between generations
    #[must_use]
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Set the initial state
    #[must_use]
    pub fn with_initial_state(mut self, state: u64) -> Self {
        self.initial_state = state;
        self
    }

    /// Stop after `limit` generations
    #[must_use]
    pub fn with_generation_limit(mut self, limit: Option<u64>) -> Self {
        self.generation_limit = limit;
        self
    }

    /// Set the transfer engine base address
    #[must_use]
    pub fn with_dma_base(mut self, base: u64) -> Self {
        self.dma_base = base;
        self
    }

    /// Set the receive buffer physical address
    #[must_use]
    pub fn with_rx_buffer_base(mut self, base: u64) -> Self {
        self.rx_buffer_base = base;
        self
    }

    /// Set the three port base addresses (load, low data, high data)
    #[must_use]
    pub fn with_port_bases(mut self, load: u64, data_lo: u64, data_hi: u64) -> Self {
        self.load_base = load;
        self.data_lo_base = data_lo;
        self.data_hi_base = data_hi;
        self
    }
}
