//! Physical memory mapping for register blocks and DDR
//!
//! Maps a window of physical address space through `/dev/mem`. Physical
//! addresses need not be page aligned: the mapping is widened down to the
//! page boundary and the returned view starts at the requested address.

// Register access requires exact casts between mmap offsets and pointers.
// AXI registers are naturally aligned by the interconnect.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_ptr_alignment)]

use crate::error::{LifeError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::File;
use std::os::unix::io::AsFd;

/// Mapped window of physical memory
pub struct PhysMapping {
    /// Start of the whole (page aligned) mapping
    map_ptr: *mut u8,
    /// Length of the whole mapping
    map_len: usize,
    /// Offset of the requested address inside the mapping
    delta: usize,
    /// Requested length
    size: usize,
    /// Requested physical address
    phys_address: u64,
}

impl std::fmt::Debug for PhysMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysMapping")
            .field("phys_address", &format_args!("{:#x}", self.phys_address))
            .field("ptr", &format_args!("{:p}", self.map_ptr))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

// SAFETY: Send - PhysMapping owns its mapping exclusively. Moving it between
// threads doesn't invalidate the mapping (mmap'd memory is process-wide).
unsafe impl Send for PhysMapping {}

impl PhysMapping {
    /// Map `size` bytes starting at physical address `phys_address`
    ///
    /// `mem` must be an open handle to a physical-memory device (or any
    /// file whose offsets stand for physical addresses).
    ///
    /// # Errors
    ///
    /// Returns `InitFailed` if `size` is zero or mmap fails.
    pub fn map(mem: &File, phys_address: u64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(LifeError::init_failed(
                "physical mapping",
                phys_address,
                "zero-length mapping",
            ));
        }

        let page = rustix::param::page_size() as u64;
        let aligned = phys_address & !(page - 1);
        let delta = (phys_address - aligned) as usize;
        let map_len = delta + size;

        // SAFETY: mmap necessary for MMIO - maps the physical window into our address space.
        // Invariants: (1) mem is an open fd; (2) aligned is page aligned; (3) map_len > 0;
        // (4) ptr valid for map_len bytes or Err. Nothing else aliases the returned pointer.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                mem.as_fd(),
                aligned,
            )
            .map_err(|e| {
                LifeError::init_failed("physical mapping", phys_address, format!("mmap failed: {e}"))
            })?
        };

        tracing::debug!("Mapped {size:#x} bytes of physical memory at {phys_address:#x} ({ptr:p})");

        Ok(Self {
            map_ptr: ptr.cast(),
            map_len,
            delta,
            size,
            phys_address,
        })
    }

    fn base(&self) -> *mut u8 {
        // SAFETY: delta < map_len, so the result stays inside the mapping.
        unsafe { self.map_ptr.add(self.delta) }
    }

    /// Read a 32-bit register
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the mapped size.
    pub fn read32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size, "Register offset out of bounds");
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) base valid for self.size; (2) offset+4 <= size; (3) u32 aligned.
        unsafe { std::ptr::read_volatile(self.base().add(offset).cast::<u32>()) }
    }

    /// Write a 32-bit register
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the mapped size.
    pub fn write32(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.size, "Register offset out of bounds");
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants: (1) base valid for self.size; (2) offset+4 <= size; (3) u32 aligned.
        unsafe {
            std::ptr::write_volatile(self.base().add(offset).cast::<u32>(), value);
        }
    }

    /// Copy bytes out of the window
    ///
    /// # Panics
    ///
    /// Panics if `offset + out.len()` exceeds the mapped size.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.size, "Read out of bounds");
        for (i, byte) in out.iter_mut().enumerate() {
            // SAFETY: byte-wise volatile read inside the bounds checked above.
            *byte = unsafe { std::ptr::read_volatile(self.base().add(offset + i)) };
        }
    }

    /// Address of the first mapped byte, as a host pointer
    pub fn as_ptr(&self) -> *const u8 {
        self.base().cast_const()
    }

    /// Requested physical address
    pub const fn phys_address(&self) -> u64 {
        self.phys_address
    }

    /// Requested size
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl Drop for PhysMapping {
    fn drop(&mut self) {
        // SAFETY: munmap necessary - releases the window mapped in map().
        // Invariants: (1) map_ptr/map_len from a successful mmap; (2) Drop runs once.
        unsafe {
            let _ = munmap(self.map_ptr.cast(), self.map_len);
        }
        tracing::debug!("Unmapped physical window at {:#x}", self.phys_address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::{Read, Seek, SeekFrom};

    fn backing_file(name: &str, len: u64) -> (std::path::PathBuf, File) {
        let path = std::env::temp_dir().join(format!("life-mmio-{name}-{}", std::process::id()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.set_len(len).unwrap();
        (path, file)
    }

    #[test]
    fn unaligned_window_lands_at_requested_offset() {
        let page = rustix::param::page_size() as u64;
        let (path, mut file) = backing_file("unaligned", 2 * page);
        let phys = page + 0x40;

        let window = PhysMapping::map(&file, phys, 0x10).unwrap();
        window.write32(4, 0xC0FF_EE11);
        assert_eq!(window.read32(4), 0xC0FF_EE11);
        drop(window);

        let mut raw = [0u8; 4];
        file.seek(SeekFrom::Start(phys + 4)).unwrap();
        file.read_exact(&mut raw).unwrap();
        assert_eq!(u32::from_ne_bytes(raw), 0xC0FF_EE11);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn byte_reads_follow_memory_order() {
        let page = rustix::param::page_size() as u64;
        let (path, file) = backing_file("bytes", page);
        let window = PhysMapping::map(&file, 0, 8).unwrap();
        window.write32(0, u32::from_ne_bytes([1, 2, 3, 4]));
        let mut out = [0u8; 4];
        window.read_bytes(0, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn zero_length_is_rejected() {
        let (path, file) = backing_file("zero", 16);
        assert!(PhysMapping::map(&file, 0, 0).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    #[should_panic(expected = "Register offset out of bounds")]
    fn out_of_bounds_register_panics() {
        let page = rustix::param::page_size() as u64;
        let (_path, file) = backing_file("oob", page);
        let window = PhysMapping::map(&file, 0, 8).unwrap();
        let _ = window.read32(8);
    }
}
