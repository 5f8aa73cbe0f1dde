// SPDX-License-Identifier: AGPL-3.0-only

//! Software (simulated accelerator) backend
//!
//! Models the programmable-logic design behind the three ports and the
//! transfer engine, so the full pipeline runs without an FPGA:
//!
//! 1. **Ports**: output-enable and data registers per port. A port left in
//!    input mode drives zeros into the design.
//! 2. **Accelerator**: on the load strobe's rising edge it latches the two
//!    data halves and starts streaming generations. Each generation waits on
//!    the stream until a receive is armed; generation 0 is dropped if no
//!    receive is pending at the strobe.
//! 3. **Engine**: S2MM status and control bits as the host sees them, with a
//!    configurable completion latency (busy checks before idle).
//! 4. **DDR**: every receive region has a backing store written by the
//!    engine, and a host-side cached copy that only `invalidate` refreshes.
//!
//! Fault knobs (error bits on completion, an engine that never finishes, a
//! scatter-gather build) let tests drive every failure path.
//!
//! ## Grid model
//!
//! ```text
//! strobe ─▶ latch(lo, hi) ─▶ gen 0 ─▶ step ─▶ gen 1 ─▶ step ─▶ ...
//!                             │                │
//!                          S2MM #0          S2MM #1
//! ```

use crate::board::{BackendType, Board};
use crate::buffer::DmaRegion;
use crate::config::{DeviceTable, DriverConfig, EngineConfig, PortConfig};
use crate::engine::{check_receive, ChannelSnapshot, Direction, TransferEngine, TransferStatus};
use crate::error::{LifeError, Result};
use crate::port::RegisterPort;
use life_chip::grid;
use life_chip::map::GENERATION_BYTES;
use life_chip::regs::dma::{cr, sr};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info};

/// Counters observed by tests and the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Soft resets requested
    pub resets: u32,
    /// Receives accepted by the engine
    pub starts: u32,
    /// Interrupt masks acknowledged, in order
    pub acks: Vec<u32>,
    /// Data-register writes as `(base, value)`, in order
    pub port_writes: Vec<(u64, u32)>,
    /// Rising edges seen on the load strobe
    pub strobes: u32,
    /// Transfers that reached DDR
    pub transfers: u32,
    /// Generations produced with no receive pending
    pub dropped: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct SimPortRegs {
    data: u32,
    tri: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Channel {
    control: u32,
    status: u32,
    address: u64,
    length: u32,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    dest: u64,
    len: usize,
    state: u64,
    remaining: u32,
}

#[derive(Debug)]
struct DdrWindow {
    base: u64,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct Accelerator {
    load_base: u64,
    data_lo_base: u64,
    data_hi_base: u64,

    ports: BTreeMap<u64, SimPortRegs>,
    mm2s: Channel,
    s2mm: Channel,
    reset_countdown: u32,
    receive_pending: bool,
    in_flight: Option<InFlight>,
    /// Next generation waiting on the stream
    head: Option<u64>,
    latched: Option<u64>,
    ddr: Vec<DdrWindow>,

    latency: u32,
    reset_delay: u32,
    fault: u32,
    stuck: bool,
    scatter_gather: bool,

    stats: SimStats,
}

impl Accelerator {
    fn new(config: &DriverConfig) -> Self {
        let halted = Channel {
            status: sr::HALTED,
            ..Channel::default()
        };
        Self {
            load_base: config.load_base,
            data_lo_base: config.data_lo_base,
            data_hi_base: config.data_hi_base,
            ports: BTreeMap::new(),
            mm2s: halted,
            s2mm: halted,
            reset_countdown: 0,
            receive_pending: false,
            in_flight: None,
            head: None,
            latched: None,
            ddr: Vec::new(),
            latency: 0,
            reset_delay: 2,
            fault: 0,
            stuck: false,
            scatter_gather: false,
            stats: SimStats::default(),
        }
    }

    fn channel(&self, direction: Direction) -> &Channel {
        match direction {
            Direction::HostToDevice => &self.mm2s,
            Direction::DeviceToHost => &self.s2mm,
        }
    }

    fn channel_mut(&mut self, direction: Direction) -> &mut Channel {
        match direction {
            Direction::HostToDevice => &mut self.mm2s,
            Direction::DeviceToHost => &mut self.s2mm,
        }
    }

    /// Value the design sees on a port: data when driven, zero in input mode
    fn driven(&self, base: u64) -> u32 {
        self.ports
            .get(&base)
            .map_or(0, |p| if p.tri == 0 { p.data } else { 0 })
    }

    fn port_write(&mut self, base: u64, value: u32) {
        let before = self.driven(base);
        self.ports.entry(base).or_default().data = value;
        self.stats.port_writes.push((base, value));

        if base == self.load_base && before & 1 == 0 && self.driven(base) & 1 == 1 {
            self.strobe();
        }
    }

    fn strobe(&mut self) {
        let state = grid::join(self.driven(self.data_lo_base), self.driven(self.data_hi_base));
        self.stats.strobes += 1;
        self.latched = Some(state);
        self.head = Some(state);
        info!("Simulated accelerator latched {state:#018x}");
        if self.receive_pending {
            self.begin_transfer();
        } else {
            self.drop_head();
        }
    }

    /// Nobody is listening: the design moves on to the next generation
    fn drop_head(&mut self) {
        if let Some(state) = self.head.take() {
            debug!("Generation {state:#018x} dropped, no receive pending");
            self.stats.dropped += 1;
            self.head = Some(grid::step(state));
        }
    }

    fn begin_transfer(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        if let Some(state) = self.head.take() {
            self.receive_pending = false;
            self.in_flight = Some(InFlight {
                dest: self.s2mm.address,
                len: self.s2mm.length as usize,
                state,
                remaining: self.latency,
            });
        }
    }

    fn tick(&mut self) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        if self.stuck {
            return;
        }
        if flight.remaining > 0 {
            flight.remaining -= 1;
            return;
        }
        let flight = *flight;
        self.in_flight = None;
        self.complete(flight);
    }

    fn complete(&mut self, flight: InFlight) {
        let bytes = flight.state.to_be_bytes();
        let count = flight.len.min(GENERATION_BYTES);
        let landed = self.ddr.iter_mut().find(|w| {
            flight.dest >= w.base && flight.dest + count as u64 <= w.base + w.bytes.len() as u64
        });

        let mut status = sr::IDLE;
        match landed {
            Some(window) => {
                #[allow(clippy::cast_possible_truncation)]
                let offset = (flight.dest - window.base) as usize;
                window.bytes[offset..offset + count].copy_from_slice(&bytes[..count]);
                self.stats.transfers += 1;
            }
            None => status |= sr::DMA_DEC_ERR,
        }
        status |= self.fault;

        if status & TransferStatus::ERROR_MASK == 0 {
            status |= sr::IOC_IRQ;
        } else {
            status |= sr::HALTED | sr::ERR_IRQ;
            self.s2mm.control &= !cr::RUNSTOP;
        }
        self.s2mm.status = status;
        self.head = Some(grid::step(flight.state));
        debug!("Simulated S2MM done: {:#018x} to {:#x}, status {status:#010x}", flight.state, flight.dest);
    }

    fn reset(&mut self) {
        self.stats.resets += 1;
        // Interrupt enables come back set; bring-up has to mask them
        for direction in Direction::BOTH {
            *self.channel_mut(direction) = Channel {
                control: cr::RESET | cr::IRQ_ALL_EN,
                status: sr::HALTED,
                ..Channel::default()
            };
        }
        self.receive_pending = false;
        self.in_flight = None;
        self.reset_countdown = self.reset_delay;
    }

    fn reset_is_done(&mut self) -> bool {
        if self.reset_countdown > 0 {
            self.reset_countdown -= 1;
            return false;
        }
        self.mm2s.control &= !cr::RESET;
        self.s2mm.control &= !cr::RESET;
        true
    }

    fn start_receive(&mut self, dest: u64, len: usize) -> Result<()> {
        let status = self.s2mm.status;
        if status & sr::HALTED == 0 && status & sr::IDLE == 0 {
            return Err(LifeError::engine_start_failed(format!(
                "S2MM channel busy (status {status:#010x})"
            )));
        }

        self.s2mm.address = dest;
        self.s2mm.control |= cr::RUNSTOP;
        #[allow(clippy::cast_possible_truncation)]
        {
            self.s2mm.length = len as u32;
        }
        self.s2mm.status &= !(sr::HALTED | sr::IDLE);
        self.stats.starts += 1;

        self.receive_pending = true;
        self.begin_transfer();
        Ok(())
    }

    fn window(&mut self, base: u64, size: usize) -> &DdrWindow {
        let index = match self.ddr.iter().position(|w| w.base == base) {
            Some(i) => {
                if self.ddr[i].bytes.len() < size {
                    self.ddr[i].bytes.resize(size, 0);
                }
                i
            }
            None => {
                self.ddr.push(DdrWindow {
                    base,
                    bytes: vec![0; size],
                });
                self.ddr.len() - 1
            }
        };
        &self.ddr[index]
    }

    fn ddr_bytes(&self, base: u64, out: &mut [u8]) {
        if let Some(window) = self.ddr.iter().find(|w| w.base == base) {
            let n = out.len().min(window.bytes.len());
            out[..n].copy_from_slice(&window.bytes[..n]);
        }
    }
}

/// Board backed by the simulated accelerator
#[derive(Debug)]
pub struct SimulatedBoard {
    accel: Rc<RefCell<Accelerator>>,
    table: DeviceTable,
}

impl SimulatedBoard {
    /// Simulated board wired the way `config` expects, with the stock
    /// Zynq device table
    pub fn new(config: &DriverConfig) -> Self {
        Self::with_table(config, DeviceTable::zynq_default())
    }

    /// Simulated board with a custom device table
    pub fn with_table(config: &DriverConfig, table: DeviceTable) -> Self {
        info!("Simulated board created (load={:#x})", config.load_base);
        Self {
            accel: Rc::new(RefCell::new(Accelerator::new(config))),
            table,
        }
    }

    /// Busy checks each transfer takes before the channel goes idle
    #[must_use]
    pub fn with_latency(self, checks: u32) -> Self {
        self.accel.borrow_mut().latency = checks;
        self
    }

    /// `reset_is_done` checks that report "still resetting"
    #[must_use]
    pub fn with_reset_delay(self, checks: u32) -> Self {
        self.accel.borrow_mut().reset_delay = checks;
        self
    }

    /// Status bits raised on every completion (e.g. `sr::DMA_SLV_ERR`)
    #[must_use]
    pub fn with_fault(self, error_bits: u32) -> Self {
        self.accel.borrow_mut().fault = error_bits;
        self
    }

    /// Transfers start but never finish
    #[must_use]
    pub fn with_stuck_engine(self) -> Self {
        self.accel.borrow_mut().stuck = true;
        self
    }

    /// Report the engine as a scatter-gather build
    #[must_use]
    pub fn with_scatter_gather(self) -> Self {
        self.accel.borrow_mut().scatter_gather = true;
        self
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SimStats {
        self.accel.borrow().stats.clone()
    }

    /// State latched by the last load strobe
    pub fn latched_state(&self) -> Option<u64> {
        self.accel.borrow().latched
    }

    /// Device-side contents of the DDR window at `base` (what the engine
    /// wrote, bypassing any host cache)
    pub fn ddr_contents(&self, base: u64) -> [u8; GENERATION_BYTES] {
        let mut out = [0u8; GENERATION_BYTES];
        self.accel.borrow().ddr_bytes(base, &mut out);
        out
    }
}

impl Board for SimulatedBoard {
    type Port = SimPort;
    type Engine = SimEngine;
    type Region = SimRegion;

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }

    fn register_port(&mut self, base_address: u64) -> Result<SimPort> {
        let config = self.table.lookup_port(base_address)?;
        self.accel
            .borrow_mut()
            .ports
            .entry(base_address)
            .or_insert(SimPortRegs {
                data: 0,
                tri: u32::MAX,
            });
        Ok(SimPort {
            accel: Rc::clone(&self.accel),
            config,
        })
    }

    fn transfer_engine(&mut self, base_address: u64) -> Result<SimEngine> {
        let mut config = self.table.lookup_engine(base_address)?;
        if self.accel.borrow().scatter_gather {
            config.has_scatter_gather = true;
        }
        Ok(SimEngine {
            accel: Rc::clone(&self.accel),
            config,
        })
    }

    fn receive_region(&mut self, bus_address: u64, size: usize) -> Result<SimRegion> {
        if size == 0 {
            return Err(LifeError::init_failed(
                "receive region",
                bus_address,
                "zero-length region",
            ));
        }
        let cache = self.accel.borrow_mut().window(bus_address, size).bytes[..size].to_vec();
        Ok(SimRegion {
            accel: Rc::clone(&self.accel),
            bus_address,
            cache,
        })
    }
}

/// Simulated GPIO port
#[derive(Debug)]
pub struct SimPort {
    accel: Rc<RefCell<Accelerator>>,
    config: PortConfig,
}

impl RegisterPort for SimPort {
    fn config(&self) -> &PortConfig {
        &self.config
    }

    fn set_output_mode(&mut self) {
        self.accel
            .borrow_mut()
            .ports
            .entry(self.config.base_address)
            .or_default()
            .tri = 0;
    }

    fn write(&mut self, value: u32) {
        let value = value & self.config.value_mask();
        self.accel
            .borrow_mut()
            .port_write(self.config.base_address, value);
    }

    fn read(&self) -> u32 {
        self.accel
            .borrow()
            .ports
            .get(&self.config.base_address)
            .map_or(0, |p| p.data)
    }
}

/// Simulated transfer engine
#[derive(Debug)]
pub struct SimEngine {
    accel: Rc<RefCell<Accelerator>>,
    config: EngineConfig,
}

impl TransferEngine for SimEngine {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn reset(&mut self) {
        self.accel.borrow_mut().reset();
    }

    fn reset_is_done(&self) -> bool {
        self.accel.borrow_mut().reset_is_done()
    }

    fn disable_interrupts(&mut self, direction: Direction, mask: u32) {
        self.accel.borrow_mut().channel_mut(direction).control &= !(mask & cr::IRQ_ALL_EN);
    }

    fn start_receive(&mut self, dest: u64, len: usize) -> Result<()> {
        check_receive(&self.config, dest, len)?;
        self.accel.borrow_mut().start_receive(dest, len)
    }

    fn is_busy(&self, direction: Direction) -> bool {
        let mut accel = self.accel.borrow_mut();
        if direction.is_device_to_host() {
            accel.tick();
        }
        accel.channel(direction).status & sr::IDLE == 0
    }

    fn irq_status(&self, direction: Direction) -> TransferStatus {
        TransferStatus::from_raw(self.accel.borrow().channel(direction).status)
    }

    fn ack_irq(&mut self, direction: Direction, mask: u32) {
        let mut accel = self.accel.borrow_mut();
        accel.channel_mut(direction).status &= !(mask & sr::IRQ_ALL);
        accel.stats.acks.push(mask);
    }

    fn snapshot(&self, direction: Direction) -> ChannelSnapshot {
        let accel = self.accel.borrow();
        let channel = accel.channel(direction);
        ChannelSnapshot {
            control: channel.control,
            status: TransferStatus::from_raw(channel.status),
            address: channel.address,
            length: channel.length,
        }
    }
}

/// Simulated receive region with a host-side cached copy
#[derive(Debug)]
pub struct SimRegion {
    accel: Rc<RefCell<Accelerator>>,
    bus_address: u64,
    cache: Vec<u8>,
}

impl DmaRegion for SimRegion {
    fn bus_address(&self) -> u64 {
        self.bus_address
    }

    fn size(&self) -> usize {
        self.cache.len()
    }

    fn invalidate(&mut self) {
        self.accel
            .borrow()
            .ddr_bytes(self.bus_address, &mut self.cache);
    }

    fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.cache[offset..offset + out.len()]);
    }
}
