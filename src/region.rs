//! The raw memory the heap grows into.
//!
//! ```text
//!   MmapRegion:
//!   ┌──────────┬──────────┬──────────┬─────────────────────────────────┐
//!   │  page 0  │  page 1  │  page 2  │        reserved, not grown      │
//!   └──────────┴──────────┴──────────┴─────────────────────────────────┘
//!   ▲                                ▲                                 ▲
//!   start                            end                         start + cap
//! ```

use std::io;
use std::ptr::{self, NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};

use crate::error::HeapError;

/// A contiguous, append-only memory region.
///
/// `grow` extends the region in place by one increment, so memory handed
/// out earlier never moves. Each increment must be a multiple of 8 bytes
/// and at least one minimum block (32 bytes); the heap aborts on anything
/// smaller.
pub trait Region {
  /// First byte of the region.
  fn start(&self) -> *mut u8;

  /// One past the last grown byte. Equal to `start` before the first growth.
  fn end(&self) -> *mut u8;

  /// Extends the region by one increment and returns the start of the new
  /// memory, or `None` once the region is exhausted.
  fn grow(&mut self) -> Option<NonNull<u8>>;
}

/// A region backed by one anonymous mapping reserved up front.
pub struct MmapRegion {
  base: NonNull<u8>,
  page_size: usize,
  max_pages: usize,
  pages: usize,
}

impl MmapRegion {
  pub fn new(
    page_size: usize,
    max_pages: usize,
  ) -> Result<Self, HeapError> {
    if page_size == 0 || max_pages == 0 {
      return Err(HeapError::Config("region must hold at least one non-empty page"));
    }
    let bytes = page_size
      .checked_mul(max_pages)
      .ok_or(HeapError::Config("heap cap overflows the address space"))?;

    let addr = unsafe {
      mmap(
        ptr::null_mut(),
        bytes,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == MAP_FAILED {
      return Err(HeapError::Reserve {
        bytes,
        source: io::Error::last_os_error(),
      });
    }

    log::debug!("reserved {bytes} bytes of heap at {addr:?}");

    Ok(Self {
      base: NonNull::new(addr.cast::<u8>()).ok_or(HeapError::Config("mmap returned null"))?,
      page_size,
      max_pages,
      pages: 0,
    })
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  /// Bytes the region may grow to.
  pub fn capacity(&self) -> usize {
    self.page_size * self.max_pages
  }

  /// Bytes grown so far.
  pub fn len(&self) -> usize {
    self.page_size * self.pages
  }

  pub fn is_empty(&self) -> bool {
    self.pages == 0
  }
}

impl Region for MmapRegion {
  fn start(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  fn end(&self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.len())
  }

  fn grow(&mut self) -> Option<NonNull<u8>> {
    if self.pages == self.max_pages {
      return None;
    }
    let new_memory = self.end();
    self.pages += 1;
    NonNull::new(new_memory)
  }
}

impl Drop for MmapRegion {
  fn drop(&mut self) {
    let result = unsafe { munmap(self.base.as_ptr().cast::<c_void>(), self.capacity()) };
    if result != 0 {
      log::warn!("munmap of heap at {:?} failed: {}", self.base, io::Error::last_os_error());
    }
  }
}
