//! Register maps for the AXI DMA (simple mode) and AXI GPIO cores.
//!
//! Offsets follow the Xilinx product guides (PG021 for AXI DMA, PG144 for
//! AXI GPIO). Only the registers the generation handshake touches are listed.
//!
//! ## AXI DMA layout
//!
//! ```text
//! 0x00  MM2S_DMACR    0x30  S2MM_DMACR
//! 0x04  MM2S_DMASR    0x34  S2MM_DMASR
//! 0x18  MM2S_SA       0x48  S2MM_DA
//! 0x1C  MM2S_SA_MSB   0x4C  S2MM_DA_MSB
//! 0x28  MM2S_LENGTH   0x58  S2MM_LENGTH
//! ```
//!
//! Both channels share one relative layout, so offsets below are relative to
//! the channel base returned by [`dma::channel_base`].

/// AXI DMA register offsets and bit definitions.
pub mod dma {
    /// MM2S (host → device) channel base.
    pub const MM2S_BASE: usize = 0x00;
    /// S2MM (device → host) channel base.
    pub const S2MM_BASE: usize = 0x30;

    /// Channel control register.
    pub const CR: usize = 0x00;
    /// Channel status register.
    pub const SR: usize = 0x04;
    /// Buffer address, low 32 bits.
    pub const ADDR: usize = 0x18;
    /// Buffer address, high 32 bits (only with 64-bit addressing).
    pub const ADDR_MSB: usize = 0x1C;
    /// Buffer length. Writing it starts the transfer.
    pub const LENGTH: usize = 0x28;

    /// Channel base for a transfer direction (`true` = device → host).
    #[must_use]
    pub const fn channel_base(device_to_host: bool) -> usize {
        if device_to_host {
            S2MM_BASE
        } else {
            MM2S_BASE
        }
    }

    /// Control register bits.
    pub mod cr {
        /// Run / stop.
        pub const RUNSTOP: u32 = 1 << 0;
        /// Soft reset. Self-clearing; resets both channels.
        pub const RESET: u32 = 1 << 2;
        /// Interrupt on complete enable.
        pub const IOC_IRQ_EN: u32 = 1 << 12;
        /// Delay interrupt enable.
        pub const DLY_IRQ_EN: u32 = 1 << 13;
        /// Error interrupt enable.
        pub const ERR_IRQ_EN: u32 = 1 << 14;
        /// Every interrupt enable bit.
        pub const IRQ_ALL_EN: u32 = IOC_IRQ_EN | DLY_IRQ_EN | ERR_IRQ_EN;
    }

    /// Status register bits.
    pub mod sr {
        /// Channel halted.
        pub const HALTED: u32 = 1 << 0;
        /// Channel idle (transfer finished).
        pub const IDLE: u32 = 1 << 1;
        /// Scatter-gather engine included in the build.
        pub const SG_INCLD: u32 = 1 << 3;
        /// DMA internal error.
        pub const DMA_INT_ERR: u32 = 1 << 4;
        /// DMA slave error.
        pub const DMA_SLV_ERR: u32 = 1 << 5;
        /// DMA decode error.
        pub const DMA_DEC_ERR: u32 = 1 << 6;
        /// Scatter-gather internal error.
        pub const SG_INT_ERR: u32 = 1 << 8;
        /// Scatter-gather slave error.
        pub const SG_SLV_ERR: u32 = 1 << 9;
        /// Scatter-gather decode error.
        pub const SG_DEC_ERR: u32 = 1 << 10;
        /// Interrupt on complete.
        pub const IOC_IRQ: u32 = 1 << 12;
        /// Delay interrupt.
        pub const DLY_IRQ: u32 = 1 << 13;
        /// Error interrupt.
        pub const ERR_IRQ: u32 = 1 << 14;

        /// Every error-cause bit.
        pub const ERR_ALL: u32 =
            DMA_INT_ERR | DMA_SLV_ERR | DMA_DEC_ERR | SG_INT_ERR | SG_SLV_ERR | SG_DEC_ERR;
        /// Every interrupt bit (write-1-to-clear).
        pub const IRQ_ALL: u32 = IOC_IRQ | DLY_IRQ | ERR_IRQ;
    }
}

/// AXI GPIO register offsets.
pub mod gpio {
    /// Channel 1 data.
    pub const DATA: usize = 0x00;
    /// Channel 1 tri-state control (1 = input, 0 = output).
    pub const TRI: usize = 0x04;
    /// Channel 2 data.
    pub const DATA2: usize = 0x08;
    /// Channel 2 tri-state control.
    pub const TRI2: usize = 0x0C;

    /// Tri-state value that drives every bit as an output.
    pub const ALL_OUTPUTS: u32 = 0x0000_0000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2mm_absolute_offsets() {
        let base = dma::channel_base(true);
        assert_eq!(base + dma::CR, 0x30);
        assert_eq!(base + dma::SR, 0x34);
        assert_eq!(base + dma::ADDR, 0x48);
        assert_eq!(base + dma::ADDR_MSB, 0x4C);
        assert_eq!(base + dma::LENGTH, 0x58);
    }

    #[test]
    fn error_and_irq_masks_disjoint() {
        assert_eq!(dma::sr::ERR_ALL, 0x770);
        assert_eq!(dma::sr::IRQ_ALL, 0x7000);
        assert_eq!(dma::sr::ERR_ALL & dma::sr::IRQ_ALL, 0);
        assert_eq!(dma::cr::IRQ_ALL_EN, dma::sr::IRQ_ALL);
    }
}
