//! Transfer engine abstraction
//!
//! The engine moves one fixed-size block from the accelerator into host
//! memory per armed receive. Only simple (register) mode is supported:
//! a build with scatter-gather is rejected before the engine is reset.
//!
//! Hardware and simulated engines implement [`TransferEngine`]; the
//! bring-up sequence lives in [`crate::configure_engine`].

use crate::config::EngineConfig;
use crate::error::{LifeError, Result};
use life_chip::regs::dma::sr;
use std::fmt;

/// Transfer direction of an engine channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host memory → accelerator (MM2S)
    HostToDevice,
    /// Accelerator → host memory (S2MM)
    DeviceToHost,
}

impl Direction {
    /// Both directions, in the order interrupts are disabled
    pub const BOTH: [Self; 2] = [Self::DeviceToHost, Self::HostToDevice];

    /// Whether this is the receive (S2MM) channel
    pub const fn is_device_to_host(self) -> bool {
        matches!(self, Self::DeviceToHost)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostToDevice => write!(f, "MM2S"),
            Self::DeviceToHost => write!(f, "S2MM"),
        }
    }
}

/// Raw channel status register value
///
/// Carried by poll and transfer failures so the diagnostic shows exactly
/// what the engine reported.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransferStatus(u32);

impl TransferStatus {
    /// Bits that mark a failed transfer
    pub const ERROR_MASK: u32 = sr::ERR_ALL | sr::ERR_IRQ;

    /// Wrap a raw status register value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw register value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Error-cause and error-interrupt bits
    pub const fn error_bits(self) -> u32 {
        self.0 & Self::ERROR_MASK
    }

    /// Any error bit set
    pub const fn has_errors(self) -> bool {
        self.error_bits() != 0
    }

    /// Pending interrupt bits
    pub const fn irq_bits(self) -> u32 {
        self.0 & sr::IRQ_ALL
    }

    /// Channel halted
    pub const fn is_halted(self) -> bool {
        self.0 & sr::HALTED != 0
    }

    /// Channel idle
    pub const fn is_idle(self) -> bool {
        self.0 & sr::IDLE != 0
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::Debug for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferStatus")
            .field("raw", &format_args!("{:#010x}", self.0))
            .field("halted", &self.is_halted())
            .field("idle", &self.is_idle())
            .field("errors", &format_args!("{:#x}", self.error_bits()))
            .field("irq", &format_args!("{:#x}", self.irq_bits()))
            .finish()
    }
}

/// Snapshot of the receive channel, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Control register
    pub control: u32,
    /// Status register
    pub status: TransferStatus,
    /// Destination address programmed for the last transfer
    pub address: u64,
    /// Length register (bytes actually written once idle)
    pub length: u32,
}

/// Block-transfer engine - unified interface for hardware and simulation
///
/// Every method maps to one register-level operation. Sequencing (reset,
/// arm, poll) is the caller's job.
pub trait TransferEngine: fmt::Debug {
    /// Build-time configuration this engine was created from
    fn config(&self) -> &EngineConfig;

    /// Issue a soft reset (both channels)
    fn reset(&mut self);

    /// Whether the last soft reset has completed
    fn reset_is_done(&self) -> bool;

    /// Clear the interrupt-enable bits in `mask` for `direction`
    fn disable_interrupts(&mut self, direction: Direction, mask: u32);

    /// Program a device → host transfer of `len` bytes into `dest`
    ///
    /// # Errors
    ///
    /// Returns `EngineStartFailed` if the length is out of range, the
    /// address does not fit the engine, or a transfer is already running.
    fn start_receive(&mut self, dest: u64, len: usize) -> Result<()>;

    /// Whether `direction` is still moving data
    fn is_busy(&self, direction: Direction) -> bool;

    /// Status register of `direction`
    fn irq_status(&self, direction: Direction) -> TransferStatus;

    /// Acknowledge (clear) the interrupt bits in `mask` for `direction`
    fn ack_irq(&mut self, direction: Direction, mask: u32);

    /// Register snapshot of `direction`
    fn snapshot(&self, direction: Direction) -> ChannelSnapshot;
}

/// Reject receive requests the engine cannot express
///
/// # Errors
///
/// `EngineStartFailed` for an engine built without the S2MM channel, a zero
/// or over-width length, or a destination beyond the engine's address width.
pub fn check_receive(config: &EngineConfig, dest: u64, len: usize) -> Result<()> {
    if !config.has_s2mm {
        return Err(LifeError::engine_start_failed(format!(
            "engine at {:#x} has no S2MM channel",
            config.base_address
        )));
    }
    let max = config.max_transfer_len();
    if len == 0 || len > max {
        return Err(LifeError::engine_start_failed(format!(
            "length {len} outside 1..={max}"
        )));
    }
    if config.addr_width_bits < 64 && dest >> config.addr_width_bits != 0 {
        return Err(LifeError::engine_start_failed(format!(
            "destination {dest:#x} beyond {}-bit address width",
            config.addr_width_bits
        )));
    }
    Ok(())
}

/// Spin until the engine reports its soft reset finished
///
/// There is no timeout: a functioning engine always leaves reset, and a
/// hung one leaves the driver spinning here. Returns the number of checks.
pub fn await_reset<E: TransferEngine + ?Sized>(engine: &E) -> u64 {
    let mut spins = 0u64;
    while !engine.reset_is_done() {
        spins += 1;
        std::hint::spin_loop();
    }
    spins
}
