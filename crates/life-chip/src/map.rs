//! Address map of the Zynq design hosting the Life accelerator.
//!
//! Taken from the exported hardware description (`xparameters.h`).
//!
//! ```text
//! Peripheral         Base          Span    Purpose
//! ────────────────── ───────────── ─────── ─────────────────────────────────
//! axi_dma_0          0x4040_0000   64 KB   S2MM channel, accelerator → DDR
//! axi_gpio_0         0x4120_0000   64 KB   initial state, low 32 bits
//! axi_gpio_1         0x4121_0000   64 KB   load strobe (1 bit)
//! axi_gpio_2         0x4122_0000   64 KB   initial state, high 32 bits
//! ps7_ddr_0          0x0010_0000   511 MB  host memory
//! ```

/// AXI DMA engine base address.
pub const DMA_BASE: u64 = 0x4040_0000;

/// GPIO carrying the low 32 bits of the initial state.
pub const GPIO_DATA_LO_BASE: u64 = 0x4120_0000;

/// GPIO driving the 1-bit load strobe.
pub const GPIO_LOAD_BASE: u64 = 0x4121_0000;

/// GPIO carrying the high 32 bits of the initial state.
pub const GPIO_DATA_HI_BASE: u64 = 0x4122_0000;

/// Register span reserved for every AXI-Lite peripheral.
pub const PERIPHERAL_SPAN: usize = 0x1_0000;

/// PS7 DDR base address.
pub const DDR_BASE: u64 = 0x0010_0000;

/// Receive buffer placement, 4 MB into DDR.
pub const RX_BUFFER_BASE: u64 = DDR_BASE + 0x40_0000;

/// One generation: 64 cells, 8 bytes.
pub const GENERATION_BYTES: usize = 8;

/// Busy-checks allowed before a transfer is declared timed out.
pub const POLL_TIMEOUT_COUNTER: u32 = 10_000_000;

/// Idle interval between generations, in milliseconds.
pub const IDLE_INTERVAL_MS: u64 = 1_000;

/// Seed pattern loaded into the accelerator (a glider in the bottom rows).
pub const INITIAL_STATE: u64 = 0x0000_0000_00C0_6080;

/// Width of the S2MM buffer-length register in this build of the core.
pub const DMA_LENGTH_WIDTH_BITS: u32 = 14;

/// Address width configured on the DMA master interface.
pub const DMA_ADDR_WIDTH_BITS: u32 = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_buffer_sits_in_ddr() {
        assert_eq!(RX_BUFFER_BASE, 0x0050_0000);
        assert!(RX_BUFFER_BASE >= DDR_BASE);
    }

    #[test]
    fn peripherals_do_not_overlap() {
        let mut bases = [DMA_BASE, GPIO_DATA_LO_BASE, GPIO_LOAD_BASE, GPIO_DATA_HI_BASE];
        bases.sort_unstable();
        for pair in bases.windows(2) {
            assert!(pair[1] - pair[0] >= PERIPHERAL_SPAN as u64);
        }
    }

    #[test]
    fn generation_fits_length_register() {
        assert!(GENERATION_BYTES < (1 << DMA_LENGTH_WIDTH_BITS));
    }
}
