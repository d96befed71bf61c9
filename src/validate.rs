use crate::block::{Block, unpack_size};
use crate::error::AllocError;
use crate::heap::Heap;
use crate::region::Region;
use crate::{HEADER_SIZE, MIN_BLOCK_SIZE, WORD_SIZE};

impl<R: Region> Heap<R> {
  /// Checks that `ptr` is the payload of a live allocated block.
  ///
  /// Bounds are checked before any header is read, so arbitrary pointer
  /// values are safe to pass in.
  pub(crate) fn validate(
    &self,
    ptr: *mut u8,
  ) -> Result<Block, AllocError> {
    if ptr.is_null() {
      return Err(AllocError::NullPointer);
    }
    let addr = ptr as usize;
    let invalid = |reason: &str| {
      log::warn!("rejecting pointer {addr:#x}: {reason}");
      Err(AllocError::InvalidPointer(addr))
    };

    if !self.is_initialized() {
      return invalid("heap is empty");
    }
    if addr % WORD_SIZE != 0 {
      return invalid("not word aligned");
    }

    let start = self.region.start() as usize;
    let epilogue = self.epilogue().addr();
    let header = addr.wrapping_sub(HEADER_SIZE);
    if addr < HEADER_SIZE || header < self.first_block_addr() || header >= epilogue {
      return invalid("outside the heap");
    }

    let block = unsafe { Block::at(ptr.wrapping_sub(HEADER_SIZE)) };
    let size = block.size();
    if size < MIN_BLOCK_SIZE || size % WORD_SIZE != 0 {
      return invalid("bad block size");
    }
    if size > epilogue - header {
      return invalid("block runs past the heap end");
    }
    if !block.is_alloc() {
      return invalid("block is not allocated");
    }
    if block.in_quick_list() {
      return invalid("block is cached in a quick list");
    }

    if !block.prev_alloc() {
      let prev_size = unpack_size(block.prev_footer());
      let Some(prev) = header.checked_sub(prev_size) else {
        return invalid("predecessor footer points before the heap");
      };
      if prev_size < MIN_BLOCK_SIZE || prev < start {
        return invalid("predecessor footer points before the heap");
      }
      let prev = unsafe { Block::at(block.as_ptr().wrapping_sub(prev_size)) };
      if prev.is_alloc() {
        return invalid("prev_alloc is clear but the predecessor is allocated");
      }
    }

    Ok(block)
  }
}
