//! Receive buffer ownership token
//!
//! The 8-byte receive buffer belongs to the transfer engine from the moment
//! a receive is armed until the transfer completes, and to the host after
//! that. The typestate makes the hand-off explicit:
//!
//! ```text
//!            start_receive          poll ok            invalidate
//! Unarmed ───────────────▶ Armed ───────────▶ Landed ───────────▶ Ready
//!    ▲                                                              │
//!    └──────────────────────────── release ─────────────────────────┘
//! ```
//!
//! - a trigger pulse needs `&ReceiveBuffer<_, Armed>`
//! - bytes can only be read from `ReceiveBuffer<_, Ready>`
//! - the only way to `Ready` is through `invalidate`

use crate::engine::TransferEngine;
use crate::error::{LifeError, Result};
use crate::poll::poll_completion;
use life_chip::map::GENERATION_BYTES;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// Host memory the transfer engine writes into
pub trait DmaRegion: Debug {
    /// Address the engine is programmed with
    fn bus_address(&self) -> u64;

    /// Region size in bytes
    fn size(&self) -> usize;

    /// Discard any cached view so the next read observes device writes
    fn invalidate(&mut self);

    /// Copy bytes out through the host's view, starting at `offset`
    fn read_bytes(&self, offset: usize, out: &mut [u8]);
}

/// No receive pending
#[derive(Debug)]
pub struct Unarmed;

/// Engine owns the buffer, a receive is pending
#[derive(Debug)]
pub struct Armed;

/// Transfer finished cleanly, host view not yet refreshed
#[derive(Debug)]
pub struct Landed;

/// Host view refreshed, contents valid
#[derive(Debug)]
pub struct Ready;

/// Receive buffer tagged with its ownership state
#[derive(Debug)]
pub struct ReceiveBuffer<R, S = Unarmed> {
    region: R,
    _state: PhantomData<S>,
}

impl<R: DmaRegion, S> ReceiveBuffer<R, S> {
    fn retag<T>(self) -> ReceiveBuffer<R, T> {
        ReceiveBuffer {
            region: self.region,
            _state: PhantomData,
        }
    }

    /// Address the engine writes to
    pub fn bus_address(&self) -> u64 {
        self.region.bus_address()
    }

    /// Underlying memory region
    pub const fn region(&self) -> &R {
        &self.region
    }
}

impl<R: DmaRegion> ReceiveBuffer<R, Unarmed> {
    /// Wrap a region large enough for one generation
    ///
    /// # Errors
    ///
    /// Returns `InitFailed` if the region is smaller than one generation.
    pub fn new(region: R) -> Result<Self> {
        if region.size() < GENERATION_BYTES {
            return Err(LifeError::init_failed(
                "receive buffer",
                region.bus_address(),
                format!(
                    "region holds {} bytes, need {GENERATION_BYTES}",
                    region.size()
                ),
            ));
        }
        Ok(Self {
            region,
            _state: PhantomData,
        })
    }

    /// Hand the buffer to the engine for one generation
    ///
    /// # Errors
    ///
    /// Returns `EngineStartFailed` if the engine refuses the transfer.
    pub fn arm<E: TransferEngine + ?Sized>(
        self,
        engine: &mut E,
    ) -> Result<ReceiveBuffer<R, Armed>> {
        engine.start_receive(self.bus_address(), GENERATION_BYTES)?;
        debug!(
            "Receive armed: {GENERATION_BYTES} bytes at {:#x}",
            self.bus_address()
        );
        Ok(self.retag())
    }
}

impl<R: DmaRegion> ReceiveBuffer<R, Armed> {
    /// Poll the engine until the block has landed, returning the polls used
    ///
    /// # Errors
    ///
    /// Returns `PollTimeout` or `TransferError` from the completion poller.
    pub fn await_landing<E: TransferEngine + ?Sized>(
        self,
        engine: &mut E,
        budget: u32,
    ) -> Result<(ReceiveBuffer<R, Landed>, u32)> {
        let polls = poll_completion(engine, budget)?;
        Ok((self.retag(), polls))
    }
}

impl<R: DmaRegion> ReceiveBuffer<R, Landed> {
    /// Refresh the host view of the buffer
    pub fn invalidate(mut self) -> ReceiveBuffer<R, Ready> {
        self.region.invalidate();
        self.retag()
    }
}

impl<R: DmaRegion> ReceiveBuffer<R, Ready> {
    /// The received generation, in arrival order
    pub fn block(&self) -> [u8; GENERATION_BYTES] {
        let mut out = [0u8; GENERATION_BYTES];
        self.region.read_bytes(0, &mut out);
        out
    }

    /// Give the buffer back for the next receive
    pub fn release(self) -> ReceiveBuffer<R, Unarmed> {
        self.retag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain memory with a separate host view refreshed on invalidate
    #[derive(Debug)]
    struct HeapRegion {
        base: u64,
        device: Vec<u8>,
        host: Vec<u8>,
    }

    impl HeapRegion {
        fn new(base: u64, size: usize) -> Self {
            Self {
                base,
                device: vec![0; size],
                host: vec![0; size],
            }
        }
    }

    impl DmaRegion for HeapRegion {
        fn bus_address(&self) -> u64 {
            self.base
        }

        fn size(&self) -> usize {
            self.device.len()
        }

        fn invalidate(&mut self) {
            self.host.clone_from(&self.device);
        }

        fn read_bytes(&self, offset: usize, out: &mut [u8]) {
            out.copy_from_slice(&self.host[offset..offset + out.len()]);
        }
    }

    #[test]
    fn region_shorter_than_a_generation_is_rejected() {
        let err = ReceiveBuffer::new(HeapRegion::new(0x0050_0000, 4)).unwrap_err();
        let LifeError::InitFailed {
            device,
            base_address,
            reason,
        } = err
        else {
            panic!("expected init failure, got {err}");
        };
        assert_eq!(device, "receive buffer");
        assert_eq!(base_address, 0x0050_0000);
        assert!(reason.contains("holds 4 bytes"), "{reason}");

        assert!(ReceiveBuffer::new(HeapRegion::new(0, GENERATION_BYTES - 1)).is_err());
        assert!(ReceiveBuffer::new(HeapRegion::new(0, 0)).is_err());
    }

    #[test]
    fn one_generation_region_is_accepted() {
        let buffer = ReceiveBuffer::new(HeapRegion::new(0x0050_0000, GENERATION_BYTES)).unwrap();
        assert_eq!(buffer.bus_address(), 0x0050_0000);
        assert_eq!(buffer.region().size(), GENERATION_BYTES);
    }

    #[test]
    fn block_reads_the_refreshed_view() {
        let mut region = HeapRegion::new(0, 16);
        region.device[..GENERATION_BYTES].copy_from_slice(&[0, 0, 0, 0, 0, 0xC0, 0x60, 0x80]);
        let landed: ReceiveBuffer<_, Landed> = ReceiveBuffer::new(region).unwrap().retag();

        let ready = landed.invalidate();
        assert_eq!(ready.block(), [0, 0, 0, 0, 0, 0xC0, 0x60, 0x80]);
        assert_eq!(ready.release().region().size(), 16);
    }
}
