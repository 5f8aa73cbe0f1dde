//! Board backends
//!
//! Two backends available:
//! - **Hardware**: AXI GPIO / AXI DMA registers mapped through `/dev/mem`
//! - **Software**: in-process model of the accelerator, engine and DDR

pub mod hardware;
pub mod software;

pub use hardware::{AxiDma, AxiGpio, DdrRegion, HardwareBoard, DEFAULT_MEM_DEVICE};
pub use software::{SimEngine, SimPort, SimRegion, SimStats, SimulatedBoard};
