use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::page::{page_roundup, PAGE_SIZE};

/// Physical memory device.
pub const DEFAULT_MEM_DEVICE: &str = "/dev/mem";

/// Configuration for the memory-mapping device.
#[derive(Debug, Clone)]
pub struct MemConfig {
    /// Device path. Default: `/dev/mem`.
    pub device_path: PathBuf,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_MEM_DEVICE),
        }
    }
}

/// Handle on the physical memory device, used only to create mappings.
#[derive(Debug)]
pub struct PhysMem {
    file: File,
    path: PathBuf,
}

impl PhysMem {
    /// Open the default memory device.
    pub fn open() -> Result<Self> {
        Self::open_with_config(&MemConfig::default())
    }

    /// Open with explicit configuration (read-write, synchronous, close-on-exec).
    pub fn open_with_config(config: &MemConfig) -> Result<Self> {
        let path = config.device_path.clone();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC | libc::O_CLOEXEC)
            .open(&path)
            .map_err(|source| TransportError::DeviceUnavailable {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map `size` bytes starting at physical address `addr`.
    ///
    /// The mapping covers whole pages; an unaligned `addr` is mapped from the
    /// start of its page and the returned view starts at `addr`.
    pub fn map(&self, addr: u64, size: usize) -> Result<MappedSegment> {
        let page_mask = PAGE_SIZE as u64 - 1;
        let page_base = addr & !page_mask;
        let offset = (addr & page_mask) as usize;
        let map_len = offset
            .checked_add(size)
            .and_then(page_roundup)
            .filter(|_| size > 0)
            .ok_or_else(|| TransportError::MappingFailed {
                addr,
                size,
                source: io::Error::new(io::ErrorKind::InvalidInput, "invalid mapping size"),
            })?;
        let file_offset =
            libc::off_t::try_from(page_base).map_err(|_| TransportError::MappingFailed {
                addr,
                size,
                source: io::Error::new(io::ErrorKind::InvalidInput, "address out of range"),
            })?;

        // SAFETY: a fresh shared mapping of an open descriptor; no existing
        // memory is aliased and the result is checked before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                file_offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TransportError::MappingFailed {
                addr,
                size,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| TransportError::MappingFailed {
            addr,
            size,
            source: io::Error::other("mmap returned null"),
        })?;

        debug!(
            path = ?self.path,
            addr,
            size,
            virt = ?base,
            "mapped physical segment"
        );
        Ok(MappedSegment {
            base,
            map_len,
            offset,
            len: size,
            phys_addr: addr,
        })
    }
}

/// Open the memory device, map one segment and close the device again.
pub fn map_segment(config: &MemConfig, addr: u64, size: usize) -> Result<MappedSegment> {
    PhysMem::open_with_config(config)?.map(addr, size)
}

/// A process-local view of a physical range. Unmapped on drop.
pub struct MappedSegment {
    base: NonNull<u8>,
    map_len: usize,
    offset: usize,
    len: usize,
    phys_addr: u64,
}

// SAFETY: the segment exclusively owns its mapping; the pointer is never
// shared outside borrows of `self`.
unsafe impl Send for MappedSegment {}

impl MappedSegment {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: `offset` is within the mapping by construction.
        unsafe { self.base.as_ptr().add(self.offset) }
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: `offset` is within the mapping by construction.
        unsafe { self.base.as_ptr().add(self.offset) }
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `len` bytes from `as_ptr` are mapped and readable for the
        // lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) }
    }

    /// Copy `data` to the start of the segment.
    pub fn copy_from(&mut self, data: &[u8]) -> Result<()> {
        self.check(0, data.len())?;
        self.as_mut_slice()[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Volatile 32-bit read, for register or shared-memory access.
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check_word(offset)?;
        // SAFETY: bounds and alignment checked above.
        Ok(unsafe { std::ptr::read_volatile(self.as_ptr().add(offset).cast::<u32>()) })
    }

    /// Volatile 32-bit write.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.check_word(offset)?;
        // SAFETY: bounds and alignment checked above.
        unsafe { std::ptr::write_volatile(self.as_mut_ptr().add(offset).cast::<u32>(), value) };
        Ok(())
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(TransportError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    fn check_word(&self, offset: usize) -> Result<()> {
        self.check(offset, 4)?;
        if (self.as_ptr() as usize + offset) % 4 != 0 {
            return Err(TransportError::OutOfBounds {
                offset,
                len: 4,
                size: self.len,
            });
        }
        Ok(())
    }
}

impl Drop for MappedSegment {
    fn drop(&mut self) {
        // SAFETY: `base`/`map_len` describe a mapping created by `mmap` and
        // not unmapped elsewhere.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.map_len) };
        if rc != 0 {
            debug!(error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}

impl std::fmt::Debug for MappedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedSegment")
            .field("phys_addr", &format_args!("{:#x}", self.phys_addr))
            .field("len", &self.len)
            .finish()
    }
}
