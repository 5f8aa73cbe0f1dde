//! Board abstraction - resolves base addresses to ports, engines and memory
//!
//! A board owns whatever the backend needs to reach the hardware (the
//! `/dev/mem` handle, or the simulated accelerator) and hands out typed
//! adapters. The bring-up sequences built on top of it are shared by every
//! backend.

use crate::buffer::DmaRegion;
use crate::engine::{await_reset, Direction, TransferEngine};
use crate::error::{LifeError, Result};
use crate::port::RegisterPort;
use life_chip::regs::dma::cr;
use std::fmt::Debug;
use tracing::{debug, info};

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Physical registers through `/dev/mem`
    Hardware,

    /// In-process accelerator model, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "Hardware (/dev/mem)"),
            Self::Software => write!(f, "Software (simulated accelerator)"),
        }
    }
}

/// Provider of ports, engines and DMA memory
pub trait Board: Debug {
    /// Register port adapter
    type Port: RegisterPort;
    /// Transfer engine adapter
    type Engine: TransferEngine;
    /// Receive memory
    type Region: DmaRegion;

    /// Backend type for logging
    fn backend_type(&self) -> BackendType;

    /// Look up and map the port at `base_address`
    ///
    /// # Errors
    ///
    /// `ConfigLookupFailed` for an unknown address, `InitFailed` if the
    /// register block cannot be reached.
    fn register_port(&mut self, base_address: u64) -> Result<Self::Port>;

    /// Look up and map the engine at `base_address`
    ///
    /// # Errors
    ///
    /// `ConfigLookupFailed` for an unknown address, `InitFailed` if the
    /// register block cannot be reached.
    fn transfer_engine(&mut self, base_address: u64) -> Result<Self::Engine>;

    /// Map `size` bytes of DMA-reachable memory at `bus_address`
    ///
    /// # Errors
    ///
    /// `InitFailed` if the memory cannot be mapped.
    fn receive_region(&mut self, bus_address: u64, size: usize) -> Result<Self::Region>;
}

/// Bring up one register port
///
/// # Errors
///
/// Propagates lookup and mapping failures from the board.
pub fn configure_port<B: Board + ?Sized>(
    board: &mut B,
    base_address: u64,
    name: &str,
) -> Result<B::Port> {
    let port = board.register_port(base_address)?;
    info!("Register port {name} at {base_address:#x} initialized successfully");
    Ok(port)
}

/// Bring up the transfer engine from scratch
///
/// Lookup and map, reject scatter-gather builds, soft reset, wait for the
/// reset to finish, then mask every interrupt in both directions. The
/// scatter-gather check runs before the reset, so a rejected engine is
/// never touched.
///
/// # Errors
///
/// `ConfigLookupFailed` / `InitFailed` from the board, `UnsupportedMode`
/// for a scatter-gather build.
pub fn configure_engine<B: Board + ?Sized>(board: &mut B, base_address: u64) -> Result<B::Engine> {
    let mut engine = board.transfer_engine(base_address)?;

    if engine.config().has_scatter_gather {
        tracing::warn!("Transfer engine at {base_address:#x} is configured as SG mode");
        return Err(LifeError::UnsupportedMode { base_address });
    }

    engine.reset();
    let spins = await_reset(&engine);
    debug!("Engine reset done after {spins} checks");

    for direction in Direction::BOTH {
        engine.disable_interrupts(direction, cr::IRQ_ALL_EN);
    }

    debug!("Transfer engine at {base_address:#x} ready");
    Ok(engine)
}
