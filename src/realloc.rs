use std::ptr::{self, NonNull};

use crate::HEADER_SIZE;
use crate::block::compute_block_size;
use crate::error::AllocError;
use crate::heap::Heap;
use crate::region::Region;
use crate::split::split;

impl<R: Region> Heap<R> {
  /// Resizes the allocation at `ptr` to hold `size` bytes.
  ///
  /// Growing moves the data to a fresh block and releases the old one.
  /// Shrinking splits the block in place when the tail is large enough to
  /// stand alone, and otherwise keeps the block as is. A `size` of zero
  /// releases the block and returns `Ok(None)`.
  ///
  /// A bad pointer is reported as an error rather than aborting.
  ///
  /// # Safety
  ///
  /// When a different pointer is returned, or `None`, the memory behind
  /// `ptr` must not be used anymore.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let block = self.validate(ptr)?;

    if size == 0 {
      self.free_block(block);
      return Ok(None);
    }

    let Some(target) = compute_block_size(size) else {
      log::warn!("resize({ptr:p}, {size}): size overflows");
      return Err(AllocError::OutOfMemory);
    };
    let current = block.size();

    if target == current {
      return Ok(Some(block.payload()));
    }

    if target > current {
      let moved = self.allocate(size)?;
      unsafe {
        ptr::copy_nonoverlapping(ptr, moved.as_ptr(), current - HEADER_SIZE);
      }
      self.free_block(block);
      log::trace!("resize({ptr:p}, {size}) moved to {moved:p}");
      return Ok(Some(moved));
    }

    if let Some(rest) = split(block, target) {
      self.insert_free(rest);
      log::trace!("resize({ptr:p}, {size}) shrank in place to {target} bytes");
    }
    Ok(Some(block.payload()))
  }
}
