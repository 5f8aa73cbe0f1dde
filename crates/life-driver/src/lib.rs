//! Host driver for the Game of Life accelerator.
//!
//! The accelerator lives in programmable logic behind three AXI GPIO ports
//! and an AXI DMA engine. The host loads a 64-bit initial state through the
//! ports, pulses the load strobe, and then receives one 8-byte generation
//! per DMA transfer, forever.
//!
//! # Backends
//!
//! ```text
//! Hardware:
//!   HardwareBoard  - registers and DDR mapped through /dev/mem
//!
//! Development / CI:
//!   SimulatedBoard - accelerator, engine and DDR modelled in-process
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use life_driver::{drive, DriverConfig, HardwareBoard};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let board = HardwareBoard::open_default()?;
//! let config = DriverConfig::default().with_generation_limit(Some(10));
//! drive(board, config, &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
mod board;
pub mod buffer;
mod config;
mod engine;
mod error;
mod generation;
pub mod mmio;
mod pipeline;
mod poll;
mod port;

pub use backends::{HardwareBoard, SimulatedBoard};
pub use board::{configure_engine, configure_port, BackendType, Board};
pub use buffer::{DmaRegion, ReceiveBuffer};
pub use config::{DeviceTable, DriverConfig, EngineConfig, PortConfig};
pub use engine::{
    await_reset, check_receive, ChannelSnapshot, Direction, TransferEngine, TransferStatus,
};
pub use error::{LifeError, Result};
pub use generation::Generation;
pub use pipeline::{drive, GenerationPipeline, Phase};
pub use poll::poll_completion;
pub use port::{InjectionPorts, RegisterPort};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        drive, Board, DriverConfig, Generation, GenerationPipeline, HardwareBoard, LifeError,
        Phase, RegisterPort, Result, SimulatedBoard, TransferEngine,
    };
}
