//! Read-only views of a heap: block walks, list statistics and a full
//! invariant audit.

use std::collections::HashSet;
use std::fmt;

use crate::block::Block;
use crate::error::{AllocError, Corruption};
use crate::heap::Heap;
use crate::quick_list::QuickLists;
use crate::region::Region;
use crate::{MIN_BLOCK_SIZE, WORD_SIZE};

/// Snapshot of one block's header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header word.
  pub addr: usize,
  pub size: usize,
  pub alloc: bool,
  pub prev_alloc: bool,
  pub in_quick_list: bool,
}

impl BlockInfo {
  fn of(block: Block) -> Self {
    Self {
      addr: block.addr(),
      size: block.size(),
      alloc: block.is_alloc(),
      prev_alloc: block.prev_alloc(),
      in_quick_list: block.in_quick_list(),
    }
  }

  /// Address handed to callers for this block.
  pub fn payload(&self) -> usize {
    self.addr + WORD_SIZE
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let state = match (self.alloc, self.in_quick_list) {
      (_, true) => "quick",
      (true, false) => "alloc",
      (false, false) => "free",
    };
    write!(
      f,
      "{:#014x} {:>6} {:<5} prev_alloc={}",
      self.addr, self.size, state, self.prev_alloc as u8
    )
  }
}

/// Walks the heap from the prologue up to, not including, the epilogue.
pub struct Blocks {
  cursor: usize,
  epilogue: usize,
}

impl Iterator for Blocks {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.cursor >= self.epilogue {
      return None;
    }
    let block = unsafe { Block::at(self.cursor as *mut u8) };
    let info = BlockInfo::of(block);
    // a corrupted size would never reach the epilogue
    self.cursor = if info.size < MIN_BLOCK_SIZE {
      self.epilogue
    } else {
      self.cursor + info.size
    };
    Some(info)
  }
}

impl<R: Region> Heap<R> {
  pub fn blocks(&self) -> Blocks {
    if !self.is_initialized() {
      return Blocks {
        cursor: 0,
        epilogue: 0,
      };
    }
    Blocks {
      cursor: self.region.start() as usize,
      epilogue: self.epilogue().addr(),
    }
  }

  /// Size of the block behind a live allocation.
  pub fn block_size_of(
    &self,
    ptr: *const u8,
  ) -> Result<usize, AllocError> {
    self.validate(ptr.cast_mut()).map(|block| block.size())
  }

  pub fn free_list_count(&self) -> usize {
    self.free_lists.count()
  }

  pub fn free_list_len(
    &self,
    class: usize,
  ) -> usize {
    self.free_list_sizes(class).len()
  }

  /// Block sizes on one free-list class, in list order.
  pub fn free_list_sizes(
    &self,
    class: usize,
  ) -> Vec<usize> {
    if class >= self.free_lists.count() {
      return Vec::new();
    }
    self.free_lists.iter(class).map(|block| block.size()).collect()
  }

  pub fn quick_list_count(&self) -> usize {
    self.quick_lists.count()
  }

  pub fn quick_list_len(
    &self,
    class: usize,
  ) -> usize {
    self.quick_lists.len(class)
  }

  /// Free-list blocks of exactly `size` bytes; `0` counts every block.
  pub fn free_block_count(
    &self,
    size: usize,
  ) -> usize {
    (0..self.free_lists.count())
      .flat_map(|class| self.free_lists.iter(class))
      .filter(|block| size == 0 || block.size() == size)
      .count()
  }

  /// Quick-list blocks of exactly `size` bytes; `0` counts every block.
  pub fn quick_list_block_count(
    &self,
    size: usize,
  ) -> usize {
    if size == 0 {
      return (0..self.quick_lists.count())
        .map(|class| self.quick_lists.len(class))
        .sum();
    }
    self
      .quick_lists
      .class_of(size)
      .map_or(0, |class| self.quick_lists.len(class))
  }

  /// Bytes held by free and cached blocks.
  pub fn free_bytes(&self) -> usize {
    let listed: usize = (0..self.free_lists.count())
      .flat_map(|class| self.free_lists.iter(class))
      .map(|block| block.size())
      .sum();
    let cached: usize = (0..self.quick_lists.count())
      .map(|class| self.quick_lists.len(class) * QuickLists::class_size(class))
      .sum();
    listed + cached
  }

  /// Audits every structural invariant of the heap.
  pub fn check(&self) -> Result<(), Corruption> {
    if !self.is_initialized() {
      return Ok(());
    }

    let mut listed = HashSet::new();
    for class in 0..self.free_lists.count() {
      let mut last = 0;
      for block in self.free_lists.iter(class) {
        let addr = block.addr();
        if !self.in_heap(addr) || !block.is_free() {
          return Err(Corruption::StrayFreeEntry { addr });
        }
        let size = block.size();
        if size < last || self.free_lists.class_of(size) != class {
          return Err(Corruption::Misplaced { addr, class });
        }
        last = size;
        listed.insert(addr);
      }
    }

    let mut cached = HashSet::new();
    for class in 0..self.quick_lists.count() {
      for block in self.quick_lists.iter(class) {
        let addr = block.addr();
        if !self.in_heap(addr)
          || !block.in_quick_list()
          || !block.is_alloc()
          || block.size() != QuickLists::class_size(class)
        {
          return Err(Corruption::StrayQuickEntry { addr, class });
        }
        cached.insert(addr);
      }
    }

    let epilogue = self.epilogue();
    let mut prev_alloc = true;
    let mut prev_listed = false;
    let mut free_seen = 0;

    for info in self.blocks() {
      let addr = info.addr;
      if info.size < MIN_BLOCK_SIZE || info.size % WORD_SIZE != 0 {
        return Err(Corruption::BadSize {
          addr,
          size: info.size,
        });
      }
      if addr + info.size > epilogue.addr() {
        return Err(Corruption::WalkOverrun { addr });
      }
      if info.prev_alloc != prev_alloc {
        return Err(Corruption::PrevAllocMismatch { addr });
      }

      let block = unsafe { Block::at(addr as *mut u8) };
      let is_listed = !info.alloc && !info.in_quick_list;
      if is_listed {
        if block.footer() != block.header() {
          return Err(Corruption::FooterMismatch { addr });
        }
        if !listed.contains(&addr) {
          return Err(Corruption::Unlisted { addr });
        }
        if prev_listed {
          return Err(Corruption::AdjacentFree { addr });
        }
        free_seen += 1;
      }
      if info.in_quick_list && !cached.contains(&addr) {
        return Err(Corruption::Unlisted { addr });
      }

      prev_alloc = info.alloc;
      prev_listed = is_listed;
    }

    if epilogue.prev_alloc() != prev_alloc {
      return Err(Corruption::PrevAllocMismatch {
        addr: epilogue.addr(),
      });
    }
    if free_seen != listed.len() {
      // some list entry was not found on the walk
      let addr = listed.iter().copied().min().unwrap_or_default();
      return Err(Corruption::StrayFreeEntry { addr });
    }
    Ok(())
  }

  fn in_heap(
    &self,
    addr: usize,
  ) -> bool {
    addr >= self.first_block_addr() && addr < self.epilogue().addr() && addr % WORD_SIZE == 0
  }
}
