//! Segregated free lists.
//!
//! ```text
//!   class:     0        1        2        3              N-1
//!   bound:   ≤32      ≤64     ≤128     ≤256     ...    anything
//!          ┌─────┐  ┌─────┐  ┌─────┐  ┌─────┐        ┌─────┐
//!          │head │  │head │  │head │  │head │        │head │
//!          └──┬──┘  └─────┘  └──┬──┘  └─────┘        └──┬──┘
//!             ▼                 ▼                       ▼
//!            32  ◄─► ...       72 ◄─► 96 ◄─► 128      4056
//! ```
//!
//! Every class is a circular doubly linked list threaded through the
//! blocks' payloads, anchored by a sentinel that is laid out like a block
//! header followed by its two links. Entries are kept in ascending size.

use std::ptr::{self, NonNull};

use crate::MIN_BLOCK_SIZE;
use crate::block::Block;
use crate::error::heap_fault;
use crate::heap::Heap;
use crate::region::Region;
use crate::split::split;

/// Sentinel: a header word followed by the next and prev links.
type ListHead = [u64; 3];

pub(crate) struct FreeLists {
  heads: NonNull<ListHead>,
  count: usize,
}

impl FreeLists {
  pub(crate) fn new(count: usize) -> Self {
    let heads: Box<[ListHead]> = vec![[0; 3]; count].into_boxed_slice();
    let heads = NonNull::from(Box::leak(heads)).cast::<ListHead>();
    let lists = Self { heads, count };
    lists.reset();
    lists
  }

  /// Points every sentinel back at itself.
  pub(crate) fn reset(&self) {
    for class in 0..self.count {
      let head = self.head(class);
      head.set_link_next(head.as_ptr());
      head.set_link_prev(head.as_ptr());
    }
  }

  pub(crate) fn count(&self) -> usize {
    self.count
  }

  pub(crate) fn head(
    &self,
    class: usize,
  ) -> Block {
    debug_assert!(class < self.count);
    unsafe { Block::at(self.heads.as_ptr().add(class).cast::<u8>()) }
  }

  /// Class holding blocks of `size` bytes.
  pub(crate) fn class_of(
    &self,
    size: usize,
  ) -> usize {
    (0..self.count)
      .find(|&class| size <= MIN_BLOCK_SIZE << class)
      .unwrap_or(self.count - 1)
  }

  pub(crate) fn iter(
    &self,
    class: usize,
  ) -> ClassIter {
    let head = self.head(class);
    ClassIter {
      head,
      cursor: head.link_next(),
    }
  }

  /// Links `block` in front of the first entry at least as large.
  pub(crate) fn insert_sorted(
    &mut self,
    block: Block,
  ) {
    let size = block.size();
    let class = self.class_of(size);
    let head = self.head(class);

    let next = self
      .iter(class)
      .find(|entry| entry.size() >= size)
      .unwrap_or(head);

    let prev = unsafe { Block::at(next.link_prev()) };
    block.set_link_next(next.as_ptr());
    block.set_link_prev(prev.as_ptr());
    prev.set_link_next(block.as_ptr());
    next.set_link_prev(block.as_ptr());
  }

  /// Detaches `block` from whichever class it is linked into.
  ///
  /// Aborts if the block carries no links: every free block outside a
  /// quick list must be on a free list.
  pub(crate) fn unlink(block: Block) {
    let next = block.link_next();
    let prev = block.link_prev();
    if next.is_null() || prev.is_null() {
      heap_fault("free block is not on a free list", block.addr());
    }
    unsafe {
      Block::at(prev).set_link_next(next);
      Block::at(next).set_link_prev(prev);
    }
    block.clear_links();
  }
}

impl Drop for FreeLists {
  fn drop(&mut self) {
    let slice = ptr::slice_from_raw_parts_mut(self.heads.as_ptr(), self.count);
    drop(unsafe { Box::from_raw(slice) });
  }
}

/// Walks one class from its first entry back to the sentinel.
pub(crate) struct ClassIter {
  head: Block,
  cursor: *mut u8,
}

impl Iterator for ClassIter {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    if self.cursor == self.head.as_ptr() || self.cursor.is_null() {
      return None;
    }
    let block = unsafe { Block::at(self.cursor) };
    self.cursor = block.link_next();
    Some(block)
  }
}

impl<R: Region> Heap<R> {
  /// Coalesces a free block with its free neighbours and files the result.
  pub(crate) fn insert_free(
    &mut self,
    block: Block,
  ) -> Block {
    let block = self.coalesce(block);
    self.free_lists.insert_sorted(block);
    block
  }

  /// Takes a free block able to hold `size` bytes off the free lists.
  ///
  /// Searches for an exact fit in the natural class, then for a block that
  /// can be split without leaving a splinter, then settles for any block
  /// large enough, accepting the extra internal fragmentation.
  pub(crate) fn take_free(
    &mut self,
    size: usize,
  ) -> Option<Block> {
    let natural = self.free_lists.class_of(size);

    if let Some(block) = self.free_lists.iter(natural).find(|b| b.size() == size) {
      FreeLists::unlink(block);
      log::trace!("free list exact fit {:#x} for {}", block.addr(), size);
      return Some(block);
    }

    let wanted = size + MIN_BLOCK_SIZE;
    let splittable = (self.free_lists.class_of(wanted)..self.free_lists.count())
      .find_map(|class| self.free_lists.iter(class).find(|b| b.size() >= wanted));

    if let Some(block) = splittable {
      FreeLists::unlink(block);
      // claim the front first so the remainder does not merge back into it
      block.set_alloc(true);
      if let Some(rest) = split(block, size) {
        self.insert_free(rest);
      }
      log::trace!("free list split fit {:#x} for {}", block.addr(), size);
      return Some(block);
    }

    let fallback = (natural..self.free_lists.count())
      .find_map(|class| self.free_lists.iter(class).find(|b| b.size() >= size));

    if let Some(block) = fallback {
      FreeLists::unlink(block);
      log::trace!(
        "free list fallback {:#x} ({} bytes) for {}",
        block.addr(),
        block.size(),
        size
      );
      return Some(block);
    }

    None
  }
}
