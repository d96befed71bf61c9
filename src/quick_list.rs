//! Exact-size LIFO caches in front of the free lists.
//!
//! ```text
//!   class 0 (32 bytes):  first ─► [32] ─► [32] ─► [32] ─► ∅
//!   class 1 (40 bytes):  first ─► ∅
//!   class 4 (64 bytes):  first ─► [64] ─► ∅
//! ```
//!
//! A cached block keeps its allocated bit set and gains the quick-list bit,
//! so it takes no part in coalescing until its class is flushed.

use std::ptr;

use crate::block::Block;
use crate::heap::Heap;
use crate::region::Region;
use crate::{MIN_BLOCK_SIZE, WORD_SIZE};

#[derive(Clone, Copy, Debug, Default)]
struct QuickList {
  first: Option<Block>,
  length: usize,
}

pub(crate) struct QuickLists {
  lists: Vec<QuickList>,
  capacity: usize,
}

impl QuickLists {
  pub(crate) fn new(
    count: usize,
    capacity: usize,
  ) -> Self {
    Self {
      lists: vec![QuickList::default(); count],
      capacity,
    }
  }

  pub(crate) fn reset(&mut self) {
    self.lists.fill(QuickList::default());
  }

  pub(crate) fn count(&self) -> usize {
    self.lists.len()
  }

  /// Class caching blocks of exactly `size` bytes, if there is one.
  pub(crate) fn class_of(
    &self,
    size: usize,
  ) -> Option<usize> {
    if size < MIN_BLOCK_SIZE || size % WORD_SIZE != 0 {
      return None;
    }
    let class = (size - MIN_BLOCK_SIZE) / WORD_SIZE;
    (class < self.lists.len()).then_some(class)
  }

  pub(crate) fn class_size(class: usize) -> usize {
    MIN_BLOCK_SIZE + class * WORD_SIZE
  }

  pub(crate) fn len(
    &self,
    class: usize,
  ) -> usize {
    self.lists.get(class).map_or(0, |list| list.length)
  }

  /// Entries of one class, most recently cached first.
  pub(crate) fn iter(
    &self,
    class: usize,
  ) -> impl Iterator<Item = Block> + use<> {
    let mut cursor = self.lists.get(class).and_then(|list| list.first);
    std::iter::from_fn(move || {
      let block = cursor?;
      let next = block.link_next();
      cursor = (!next.is_null()).then(|| unsafe { Block::at(next) });
      Some(block)
    })
  }

  fn push(
    &mut self,
    class: usize,
    block: Block,
  ) {
    let list = &mut self.lists[class];
    block.set_link_next(list.first.map_or(ptr::null_mut(), Block::as_ptr));
    list.first = Some(block);
    list.length += 1;
  }

  fn pop(
    &mut self,
    class: usize,
  ) -> Option<Block> {
    let list = &mut self.lists[class];
    let block = list.first?;
    let next = block.link_next();
    list.first = (!next.is_null()).then(|| unsafe { Block::at(next) });
    list.length -= 1;
    Some(block)
  }
}

impl<R: Region> Heap<R> {
  /// Caches an allocated block that is being released.
  ///
  /// The block keeps its allocated bit throughout, so a flush of its class
  /// can never coalesce into it. Returns `false` when no class caches
  /// blocks of this size; the caller then files the block on the free
  /// lists instead.
  pub(crate) fn push_quick(
    &mut self,
    block: Block,
  ) -> bool {
    let Some(class) = self.quick_lists.class_of(block.size()) else {
      return false;
    };
    if self.quick_lists.len(class) >= self.quick_lists.capacity {
      self.flush_quick(class);
    }

    block.set_quick_list(true);
    block.clear_links();
    block.next().set_prev_alloc(true);
    self.quick_lists.push(class, block);

    log::trace!(
      "quick list {} cached {:#x} ({} entries)",
      class,
      block.addr(),
      self.quick_lists.len(class)
    );
    true
  }

  /// Pops a cached block of exactly `size` bytes, ready for use.
  pub(crate) fn pop_quick(
    &mut self,
    size: usize,
  ) -> Option<Block> {
    let class = self.quick_lists.class_of(size)?;
    let block = self.quick_lists.pop(class)?;

    block.set_alloc(true);
    block.set_quick_list(false);
    block.next().set_prev_alloc(true);

    log::trace!("quick list {} hit {:#x}", class, block.addr());
    Some(block)
  }

  /// Moves every entry of a class onto the free lists, coalescing as it goes.
  pub(crate) fn flush_quick(
    &mut self,
    class: usize,
  ) {
    log::debug!(
      "flushing quick list {} ({} entries)",
      class,
      self.quick_lists.len(class)
    );

    while let Some(block) = self.quick_lists.pop(class) {
      block.write_header(block.size(), false, block.prev_alloc(), false);
      block.clear_links();
      block.next().set_prev_alloc(false);
      self.insert_free(block);
    }
  }
}
