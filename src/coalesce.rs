//! Boundary-tag coalescing.
//!
//! ```text
//!   before:  ┌────────┬──────────┬────────┬──────────┐
//!            │ free A │  free B  │ free C │  alloc   │
//!            └────────┴──────────┴────────┴──────────┘
//!                          ▲ coalesce(B)
//!
//!   after:   ┌────────────────────────────┬──────────┐
//!            │           free A'          │  alloc   │
//!            └────────────────────────────┴──────────┘
//! ```
//!
//! The predecessor is found through the footer just before the block, the
//! successor through the block's own size.

use crate::block::{Block, unpack_size};
use crate::error::heap_fault;
use crate::free_list::FreeLists;
use crate::heap::Heap;
use crate::region::Region;
use crate::MIN_BLOCK_SIZE;

impl<R: Region> Heap<R> {
  /// Merges a free block with every free neighbour on either side and
  /// returns the merged block. Cached quick-list blocks are never absorbed.
  pub(crate) fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let mut block = block;

    while let Some(prev) = self.free_predecessor(block) {
      FreeLists::unlink(prev);
      let size = prev.size() + block.size();
      block.erase();
      block = prev.write_header(size, false, prev.prev_alloc(), false);
      log::trace!("coalesced backwards into {:#x} ({} bytes)", block.addr(), size);
    }

    loop {
      let next = block.next();
      if !next.is_free() || next.size() < MIN_BLOCK_SIZE {
        break;
      }
      FreeLists::unlink(next);
      let size = block.size() + next.size();
      next.erase();
      block.write_header(size, false, block.prev_alloc(), false);
      log::trace!("coalesced forwards into {:#x} ({} bytes)", block.addr(), size);
    }

    block
  }

  /// The free block just before `block`, located through its footer.
  fn free_predecessor(
    &self,
    block: Block,
  ) -> Option<Block> {
    if block.prev_alloc() {
      return None;
    }

    let first = self.first_block_addr();
    let footer = block.prev_footer();
    let size = unpack_size(footer);
    let addr = block.addr().wrapping_sub(size);
    if size < MIN_BLOCK_SIZE || addr < first || addr >= block.addr() {
      heap_fault("free predecessor has no usable footer", block.addr());
    }

    let prev = unsafe { Block::at(block.as_ptr().wrapping_sub(size)) };
    if prev.header() != footer || !prev.is_free() {
      heap_fault("predecessor footer does not match its header", prev.addr());
    }
    Some(prev)
  }
}

#[cfg(test)]
mod tests {
  use crate::heap::Heap;
  use crate::{HeapConfig, MIN_BLOCK_SIZE};

  fn heap() -> Heap {
    Heap::with_config(HeapConfig::default().with_max_pages(4).with_quick_lists(0)).unwrap()
  }

  #[test]
  fn test_merges_both_sides() {
    let mut heap = heap();
    let a = heap.allocate(40).unwrap();
    let b = heap.allocate(40).unwrap();
    let c = heap.allocate(40).unwrap();
    let _guard = heap.allocate(40).unwrap();

    unsafe {
      heap.release(a.as_ptr());
      heap.release(c.as_ptr());
      assert_eq!(heap.free_block_count(48), 2);

      heap.release(b.as_ptr());
    }

    assert_eq!(heap.free_block_count(48), 0);
    assert_eq!(heap.free_block_count(3 * 48), 1);
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_merges_into_wilderness() {
    let mut heap = heap();
    let a = heap.allocate(100).unwrap();
    let before = heap.free_bytes();

    unsafe { heap.release(a.as_ptr()) };

    assert_eq!(heap.free_block_count(0), 1);
    assert_eq!(heap.free_bytes(), before + 112);
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_leaves_allocated_neighbours_alone() {
    let mut heap = heap();
    let a = heap.allocate(8).unwrap();
    let b = heap.allocate(8).unwrap();
    let _c = heap.allocate(8).unwrap();

    unsafe { heap.release(b.as_ptr()) };

    assert_eq!(heap.free_block_count(MIN_BLOCK_SIZE), 1);
    assert_eq!(heap.block_size_of(a.as_ptr()), Ok(MIN_BLOCK_SIZE));
    assert!(heap.check().is_ok());
  }
}
