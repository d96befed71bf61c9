//! Aligned allocation by carving an over-sized block.
//!
//! ```text
//!   allocate(size + align + 2 * MIN_BLOCK_SIZE):
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ hdr │                     payload                            │
//!   └──────────────────────────────────────────────────────────────┘
//!
//!   carve:
//!   ┌─────────────────┬───────────────────────┬────────────────────┐
//!   │ front (freed)   │ hdr │ aligned payload │  tail (freed)      │
//!   └─────────────────┴───────────────────────┴────────────────────┘
//!                           ▲ addr % align == 0
//! ```

use std::ptr::NonNull;

use crate::align::{is_aligned, is_valid_alignment};
use crate::block::{Block, compute_block_size};
use crate::error::{AllocError, heap_fault};
use crate::free_list::FreeLists;
use crate::heap::Heap;
use crate::region::Region;
use crate::split::split;
use crate::{MIN_BLOCK_SIZE, WORD_SIZE};

impl<R: Region> Heap<R> {
  /// Allocates at least `size` bytes whose address is a multiple of `align`.
  ///
  /// `align` must be a power of two no smaller than 8.
  pub fn aligned_allocate(
    &mut self,
    size: usize,
    align: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }
    if !is_valid_alignment(align) {
      log::warn!("aligned_allocate({size}, {align}): bad alignment");
      return Err(AllocError::BadAlignment(align));
    }

    let padded = size
      .checked_add(align)
      .and_then(|padded| padded.checked_add(2 * MIN_BLOCK_SIZE));
    let (Some(padded), Some(target)) = (padded, compute_block_size(size)) else {
      log::warn!("aligned_allocate({size}, {align}): size overflows");
      return Err(AllocError::OutOfMemory);
    };

    let payload = self.allocate(padded)?;
    let block = unsafe { Block::from_payload(payload.as_ptr()) };

    if is_aligned(payload.as_ptr() as usize, align) {
      self.shed_tail(block, target);
      return Ok(payload);
    }

    // the front piece must be able to stand alone as a free block
    let mut offset = MIN_BLOCK_SIZE;
    while !is_aligned(payload.as_ptr() as usize + offset, align) {
      offset += WORD_SIZE;
    }

    let Some(back) = split(block, offset) else {
      heap_fault("aligned block too small to carve", block.addr());
    };

    back.set_alloc(true);
    back.next().set_prev_alloc(true);

    block.write_header(offset, false, block.prev_alloc(), false);
    block.clear_links();
    back.set_prev_alloc(false);
    self.insert_free(block);

    self.shed_tail(back, target);

    log::trace!(
      "aligned_allocate({}, {}) -> {:p} ({} bytes)",
      size,
      align,
      back.payload(),
      back.size()
    );
    Ok(back.payload())
  }

  /// Returns everything past the first `target` bytes of an allocated block
  /// to the free lists.
  ///
  /// A tail too small to stand alone is handed to the following block if
  /// that one is free, and otherwise stays with `block`.
  fn shed_tail(
    &mut self,
    block: Block,
    target: usize,
  ) {
    if let Some(rest) = split(block, target) {
      self.insert_free(rest);
      return;
    }

    let tail = block.size() - target;
    let next = block.next();
    if tail == 0 || !next.is_free() {
      return;
    }

    FreeLists::unlink(next);
    let size = tail + next.size();
    next.erase();
    block.write_header(target, false, block.prev_alloc(), true);
    let rest = unsafe { Block::at(block.as_ptr().add(target)) };
    rest.write_header(size, false, true, false);
    rest.clear_links();
    self.free_lists.insert_sorted(rest);
    log::trace!("tail of {} bytes joined free block {:#x}", tail, rest.addr());
  }
}
