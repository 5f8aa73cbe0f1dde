//! Hardware backend - AXI GPIO and AXI DMA registers through `/dev/mem`
//!
//! Every peripheral is a [`PhysMapping`] over its register block. The
//! physical-memory device is opened with `O_SYNC` so the kernel maps the
//! windows uncached.

use crate::board::{BackendType, Board};
use crate::buffer::DmaRegion;
use crate::config::{DeviceTable, EngineConfig, PortConfig};
use crate::engine::{check_receive, ChannelSnapshot, Direction, TransferEngine, TransferStatus};
use crate::error::{LifeError, Result};
use crate::mmio::PhysMapping;
use crate::port::RegisterPort;
use life_chip::map::PERIPHERAL_SPAN;
use life_chip::regs::{dma, gpio};
use rustix::fs::OFlags;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default physical-memory device
pub const DEFAULT_MEM_DEVICE: &str = "/dev/mem";

/// Board backed by real registers
#[derive(Debug)]
pub struct HardwareBoard {
    mem: File,
    path: PathBuf,
    table: DeviceTable,
}

impl HardwareBoard {
    /// Open the physical-memory device at `path`
    ///
    /// # Errors
    ///
    /// `InitFailed` if the device node is missing, `Io` if it cannot be
    /// opened (usually a permissions problem).
    pub fn open(path: impl AsRef<Path>, table: DeviceTable) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LifeError::init_failed(
                "physical memory",
                0,
                format!("{} not found", path.display()),
            ));
        }

        // OFlags::SYNC.bits() is a small positive flag value
        #[allow(clippy::cast_possible_wrap)]
        let sync_flag = OFlags::SYNC.bits() as i32;

        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(sync_flag)
            .open(path)?;

        info!("Opened {} for register access", path.display());

        Ok(Self {
            mem,
            path: path.to_path_buf(),
            table,
        })
    }

    /// Open `/dev/mem` with the stock Zynq address map
    ///
    /// # Errors
    ///
    /// See [`HardwareBoard::open`].
    pub fn open_default() -> Result<Self> {
        Self::open(DEFAULT_MEM_DEVICE, DeviceTable::zynq_default())
    }

    /// Device node in use
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Board for HardwareBoard {
    type Port = AxiGpio;
    type Engine = AxiDma;
    type Region = DdrRegion;

    fn backend_type(&self) -> BackendType {
        BackendType::Hardware
    }

    fn register_port(&mut self, base_address: u64) -> Result<AxiGpio> {
        let config = self.table.lookup_port(base_address)?;
        let regs = PhysMapping::map(&self.mem, base_address, PERIPHERAL_SPAN)?;
        Ok(AxiGpio { regs, config })
    }

    fn transfer_engine(&mut self, base_address: u64) -> Result<AxiDma> {
        let config = self.table.lookup_engine(base_address)?;
        let regs = PhysMapping::map(&self.mem, base_address, PERIPHERAL_SPAN)?;
        Ok(AxiDma::new(regs, config))
    }

    fn receive_region(&mut self, bus_address: u64, size: usize) -> Result<DdrRegion> {
        let mem = PhysMapping::map(&self.mem, bus_address, size)?;
        Ok(DdrRegion { mem })
    }
}

/// AXI GPIO, channel 1 only
#[derive(Debug)]
pub struct AxiGpio {
    regs: PhysMapping,
    config: PortConfig,
}

impl RegisterPort for AxiGpio {
    fn config(&self) -> &PortConfig {
        &self.config
    }

    fn set_output_mode(&mut self) {
        self.regs.write32(gpio::TRI, gpio::ALL_OUTPUTS);
    }

    fn write(&mut self, value: u32) {
        self.regs.write32(gpio::DATA, value & self.config.value_mask());
    }

    fn read(&self) -> u32 {
        self.regs.read32(gpio::DATA)
    }
}

/// AXI DMA in direct-register (simple) mode
#[derive(Debug)]
pub struct AxiDma {
    regs: PhysMapping,
    config: EngineConfig,
}

impl AxiDma {
    fn new(regs: PhysMapping, mut config: EngineConfig) -> Self {
        // Either channel's status reports the SG build option
        let sg = Direction::BOTH
            .iter()
            .filter(|&&d| config.has_channel(d))
            .any(|&d| regs.read32(Self::reg(d, dma::SR)) & dma::sr::SG_INCLD != 0);
        if sg {
            config.has_scatter_gather = true;
        }
        debug!(
            "AXI DMA at {:#x}: mm2s={}, s2mm={}, sg={}, addr width {}, length width {}",
            config.base_address,
            config.has_mm2s,
            config.has_s2mm,
            config.has_scatter_gather,
            config.addr_width_bits,
            config.length_width_bits
        );
        Self { regs, config }
    }

    const fn reg(direction: Direction, offset: usize) -> usize {
        dma::channel_base(direction.is_device_to_host()) + offset
    }

    fn read(&self, direction: Direction, offset: usize) -> u32 {
        self.regs.read32(Self::reg(direction, offset))
    }

    fn write(&self, direction: Direction, offset: usize, value: u32) {
        self.regs.write32(Self::reg(direction, offset), value);
    }
}

impl TransferEngine for AxiDma {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn reset(&mut self) {
        // One reset bit resets both channels
        self.write(self.config.reset_channel(), dma::CR, dma::cr::RESET);
    }

    fn reset_is_done(&self) -> bool {
        Direction::BOTH
            .iter()
            .filter(|&&d| self.config.has_channel(d))
            .all(|&d| self.read(d, dma::CR) & dma::cr::RESET == 0)
    }

    fn disable_interrupts(&mut self, direction: Direction, mask: u32) {
        if !self.config.has_channel(direction) {
            return;
        }
        let cr = self.read(direction, dma::CR);
        self.write(direction, dma::CR, cr & !(mask & dma::cr::IRQ_ALL_EN));
    }

    fn start_receive(&mut self, dest: u64, len: usize) -> Result<()> {
        let direction = Direction::DeviceToHost;
        check_receive(&self.config, dest, len)?;

        let sr = self.read(direction, dma::SR);
        if sr & dma::sr::HALTED == 0 && sr & dma::sr::IDLE == 0 {
            return Err(LifeError::engine_start_failed(format!(
                "{direction} channel busy (status {sr:#010x})"
            )));
        }

        #[allow(clippy::cast_possible_truncation)]
        {
            self.write(direction, dma::ADDR, dest as u32);
            if self.config.addr_width_bits > 32 {
                self.write(direction, dma::ADDR_MSB, (dest >> 32) as u32);
            }
        }

        let cr = self.read(direction, dma::CR);
        self.write(direction, dma::CR, cr | dma::cr::RUNSTOP);

        // Writing the length starts the transfer
        #[allow(clippy::cast_possible_truncation)]
        self.write(direction, dma::LENGTH, len as u32);
        Ok(())
    }

    fn is_busy(&self, direction: Direction) -> bool {
        self.read(direction, dma::SR) & dma::sr::IDLE == 0
    }

    fn irq_status(&self, direction: Direction) -> TransferStatus {
        TransferStatus::from_raw(self.read(direction, dma::SR))
    }

    fn ack_irq(&mut self, direction: Direction, mask: u32) {
        self.write(direction, dma::SR, mask & dma::sr::IRQ_ALL);
    }

    fn snapshot(&self, direction: Direction) -> ChannelSnapshot {
        let mut address = u64::from(self.read(direction, dma::ADDR));
        if self.config.addr_width_bits > 32 {
            address |= u64::from(self.read(direction, dma::ADDR_MSB)) << 32;
        }
        ChannelSnapshot {
            control: self.read(direction, dma::CR),
            status: self.irq_status(direction),
            address,
            length: self.read(direction, dma::LENGTH),
        }
    }
}

/// Receive buffer in DDR
///
/// On aarch64 [`DmaRegion::invalidate`] cleans and invalidates every data
/// cache line of the window from user space. 32-bit ARM (the Zynq-7000
/// Cortex-A9) has no user-mode maintenance by address, so there the fresh
/// read relies on the `O_SYNC` open in [`HardwareBoard::open`], which makes
/// the kernel map `/dev/mem` non-cacheable. The fence only orders the reads
/// after the completion poll.
#[derive(Debug)]
pub struct DdrRegion {
    mem: PhysMapping,
}

/// Data cache line used for maintenance by address
#[cfg(target_arch = "aarch64")]
const CACHE_LINE: usize = 64;

impl DmaRegion for DdrRegion {
    fn bus_address(&self) -> u64 {
        self.mem.phys_address()
    }

    fn size(&self) -> usize {
        self.mem.size()
    }

    fn invalidate(&mut self) {
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);

        #[cfg(target_arch = "aarch64")]
        {
            let start = self.mem.as_ptr() as usize & !(CACHE_LINE - 1);
            let end = self.mem.as_ptr() as usize + self.mem.size();
            let mut line = start;
            while line < end {
                // SAFETY: clean+invalidate by VA on lines inside our own mapping.
                // DC CIVAC is permitted at EL0 when SCTLR_EL1.UCI is set (Linux default).
                unsafe {
                    core::arch::asm!("dc civac, {0}", in(reg) line, options(nostack, preserves_flags));
                }
                line += CACHE_LINE;
            }
            // SAFETY: barrier instruction, no memory operands.
            unsafe {
                core::arch::asm!("dsb sy", options(nostack, preserves_flags));
            }
        }
    }

    fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        self.mem.read_bytes(offset, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::configure_engine;
    use life_chip::regs::dma::{cr, sr};
    use std::os::unix::fs::FileExt;

    /// Engine window inside the backing file (page aligned for any page size)
    const ENGINE: u64 = 0x1_0000;
    const RX: u64 = 0x2_0000;

    /// Sparse file standing in for `/dev/mem`, offsets are physical addresses
    struct FakeMem {
        path: PathBuf,
        file: File,
    }

    impl FakeMem {
        fn new(name: &str) -> Self {
            let path =
                std::env::temp_dir().join(format!("life-devmem-{name}-{}", std::process::id()));
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .unwrap();
            file.set_len(RX + PERIPHERAL_SPAN as u64).unwrap();
            Self { path, file }
        }

        fn poke(&self, addr: u64, value: u32) {
            self.file.write_all_at(&value.to_ne_bytes(), addr).unwrap();
        }

        fn peek(&self, addr: u64) -> u32 {
            let mut raw = [0u8; 4];
            self.file.read_exact_at(&mut raw, addr).unwrap();
            u32::from_ne_bytes(raw)
        }

        fn reg(direction: Direction, offset: usize) -> u64 {
            ENGINE + (dma::channel_base(direction.is_device_to_host()) + offset) as u64
        }

        fn board(&self, engine: EngineConfig) -> HardwareBoard {
            HardwareBoard::open(&self.path, DeviceTable::empty().with_engine(engine)).unwrap()
        }
    }

    impl Drop for FakeMem {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[test]
    fn receive_only_engine_reports_sg_from_s2mm_status() {
        let mem = FakeMem::new("sg-s2mm");
        mem.poke(FakeMem::reg(Direction::DeviceToHost, dma::SR), sr::SG_INCLD | sr::HALTED);

        let mut board = mem.board(EngineConfig::receive_only(ENGINE));
        let engine = board.transfer_engine(ENGINE).unwrap();
        assert!(engine.config().has_scatter_gather);
        drop(engine);

        let err = configure_engine(&mut board, ENGINE).unwrap_err();
        assert!(matches!(err, LifeError::UnsupportedMode { base_address: ENGINE }));
        assert_eq!(mem.peek(FakeMem::reg(Direction::DeviceToHost, dma::CR)), 0, "no reset");
    }

    #[test]
    fn sg_bit_on_either_channel_counts() {
        let mem = FakeMem::new("sg-either");
        mem.poke(FakeMem::reg(Direction::DeviceToHost, dma::SR), sr::SG_INCLD);

        let mut board = mem.board(EngineConfig::simple(ENGINE));
        assert!(board.transfer_engine(ENGINE).unwrap().config().has_scatter_gather);
    }

    #[test]
    fn simple_engine_without_sg_bit_stays_simple() {
        let mem = FakeMem::new("no-sg");
        mem.poke(FakeMem::reg(Direction::HostToDevice, dma::SR), sr::HALTED);
        mem.poke(FakeMem::reg(Direction::DeviceToHost, dma::SR), sr::HALTED);

        let mut board = mem.board(EngineConfig::simple(ENGINE));
        assert!(!board.transfer_engine(ENGINE).unwrap().config().has_scatter_gather);
    }

    #[test]
    fn receive_only_engine_resets_through_s2mm_control() {
        let mem = FakeMem::new("reset-s2mm");
        let mut board = mem.board(EngineConfig::receive_only(ENGINE));
        let mut engine = board.transfer_engine(ENGINE).unwrap();

        engine.reset();
        assert_eq!(engine.snapshot(Direction::DeviceToHost).control, cr::RESET);
        // Nothing clears the bit in a plain file
        assert!(!engine.reset_is_done());
        drop(engine);

        assert_eq!(mem.peek(FakeMem::reg(Direction::DeviceToHost, dma::CR)), cr::RESET);
        assert_eq!(mem.peek(FakeMem::reg(Direction::HostToDevice, dma::CR)), 0);
    }

    #[test]
    fn dual_channel_engine_resets_through_mm2s_control() {
        let mem = FakeMem::new("reset-mm2s");
        let mut board = mem.board(EngineConfig::simple(ENGINE));
        board.transfer_engine(ENGINE).unwrap().reset();

        assert_eq!(mem.peek(FakeMem::reg(Direction::HostToDevice, dma::CR)), cr::RESET);
        assert_eq!(mem.peek(FakeMem::reg(Direction::DeviceToHost, dma::CR)), 0);
    }

    #[test]
    fn absent_mm2s_channel_is_left_alone() {
        let mem = FakeMem::new("no-mm2s");
        // Stale bits where MM2S would sit in a dual-channel build
        let mm2s_cr = FakeMem::reg(Direction::HostToDevice, dma::CR);
        mem.poke(mm2s_cr, cr::RESET | cr::IRQ_ALL_EN);

        let mut board = mem.board(EngineConfig::receive_only(ENGINE));
        let mut engine = board.transfer_engine(ENGINE).unwrap();
        assert!(engine.reset_is_done());
        engine.disable_interrupts(Direction::HostToDevice, cr::IRQ_ALL_EN);
        drop(engine);

        assert_eq!(mem.peek(mm2s_cr), cr::RESET | cr::IRQ_ALL_EN);
    }

    #[test]
    fn interrupts_are_masked_per_channel() {
        let mem = FakeMem::new("irq-mask");
        for direction in Direction::BOTH {
            mem.poke(FakeMem::reg(direction, dma::CR), cr::RUNSTOP | cr::IRQ_ALL_EN);
        }

        let mut board = mem.board(EngineConfig::simple(ENGINE));
        let mut engine = board.transfer_engine(ENGINE).unwrap();
        for direction in Direction::BOTH {
            engine.disable_interrupts(direction, cr::IRQ_ALL_EN);
            assert_eq!(engine.snapshot(direction).control, cr::RUNSTOP, "{direction}");
        }
    }

    #[test]
    fn region_reads_see_device_writes_after_invalidate() {
        let mem = FakeMem::new("ddr");
        let mut board = mem.board(EngineConfig::simple(ENGINE));
        let mut region = board.receive_region(RX, 8).unwrap();
        assert_eq!(region.bus_address(), RX);

        mem.file
            .write_all_at(&0x0000_0000_00C0_6080u64.to_be_bytes(), RX)
            .unwrap();
        region.invalidate();

        let mut out = [0u8; 8];
        region.read_bytes(0, &mut out);
        assert_eq!(out, [0, 0, 0, 0, 0, 0xC0, 0x60, 0x80]);
    }
}
