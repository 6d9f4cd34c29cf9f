//! Memory-mapped register window
//!
//! Maps the controller registers through `/dev/mem`. Requires root and a
//! kernel that allows access to the range.
//!
//! # Safety
//!
//! Accessing physical memory is inherently unsafe. The mapping is page
//! aligned internally and every access is bounds checked in debug builds.

use vtspi_core::hal::RegisterBlock;
use vtspi_core::regs::SPI_REGS_SIZE;

use crate::error::ControllerError;

/// Controller registers mapped from physical memory
#[cfg(target_os = "linux")]
pub struct MmioRegisters {
    /// Start of the register window inside the mapping
    ptr: *mut u8,
    /// Size of the whole page-aligned mapping
    map_size: usize,
    /// Offset of the window from the start of the mapping
    page_offset: usize,
    /// Physical base address
    phys_addr: u64,
}

#[cfg(target_os = "linux")]
impl MmioRegisters {
    /// Map the register window at `phys_addr`
    pub fn map(phys_addr: u64) -> Result<Self, ControllerError> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let size = SPI_REGS_SIZE;
        let map_err = || ControllerError::MemoryMap {
            address: phys_addr,
            size,
        };

        // O_SYNC for uncached access
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(|e| {
                log::debug!("open /dev/mem: {}", e);
                map_err()
            })?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let page_mask = page_size - 1;
        let page_offset = (phys_addr as usize) & page_mask;
        let aligned_addr = phys_addr & !(page_mask as u64);
        let map_size = (size + page_offset + page_mask) & !page_mask;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned_addr as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(map_err());
        }

        log::debug!(
            "SPI registers at {:#x} mapped ({} bytes)",
            phys_addr,
            map_size
        );

        Ok(Self {
            ptr: unsafe { (ptr as *mut u8).add(page_offset) },
            map_size,
            page_offset,
            phys_addr,
        })
    }

    /// Physical base address of the window
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }
}

#[cfg(target_os = "linux")]
impl RegisterBlock for MmioRegisters {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= SPI_REGS_SIZE);
        debug_assert!(offset & 3 == 0, "unaligned 32-bit read");
        unsafe { core::ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= SPI_REGS_SIZE);
        debug_assert!(offset & 3 == 0, "unaligned 32-bit write");
        unsafe { core::ptr::write_volatile(self.ptr.add(offset) as *mut u32, value) }
    }

    #[inline]
    fn read8(&self, offset: usize) -> u8 {
        debug_assert!(offset < SPI_REGS_SIZE);
        unsafe { core::ptr::read_volatile(self.ptr.add(offset)) }
    }

    #[inline]
    fn write8(&self, offset: usize, value: u8) {
        debug_assert!(offset < SPI_REGS_SIZE);
        unsafe { core::ptr::write_volatile(self.ptr.add(offset), value) }
    }
}

#[cfg(target_os = "linux")]
impl Drop for MmioRegisters {
    fn drop(&mut self) {
        unsafe {
            let base = self.ptr.sub(self.page_offset);
            libc::munmap(base as *mut libc::c_void, self.map_size);
        }
    }
}

// MMIO registers have no Rust-visible aliasing
#[cfg(target_os = "linux")]
unsafe impl Send for MmioRegisters {}

// Stub for non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub struct MmioRegisters {
    _private: (),
}

#[cfg(not(target_os = "linux"))]
impl MmioRegisters {
    /// Always fails: physical mapping is Linux only
    pub fn map(_phys_addr: u64) -> Result<Self, ControllerError> {
        Err(ControllerError::NotSupported(
            "physical memory mapping only supported on Linux",
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl RegisterBlock for MmioRegisters {
    fn read32(&self, _offset: usize) -> u32 {
        0
    }
    fn write32(&self, _offset: usize, _value: u32) {}
    fn read8(&self, _offset: usize) -> u8 {
        0
    }
    fn write8(&self, _offset: usize, _value: u8) {}
}
