use std::process;
use std::ptr::NonNull;

use crate::block::{Block, compute_block_size};
use crate::config::HeapConfig;
use crate::error::{AllocError, HeapError, heap_fault};
use crate::free_list::FreeLists;
use crate::quick_list::QuickLists;
use crate::region::{MmapRegion, Region};
use crate::{HEADER_SIZE, MIN_BLOCK_SIZE, WORD_SIZE};

/// Prologue, one minimum block and the epilogue.
const MIN_HEAP_SIZE: usize = 2 * MIN_BLOCK_SIZE + HEADER_SIZE;

/// A segregated-fit heap over one growable region.
///
/// The heap is single threaded: every operation takes `&mut self`. Nothing
/// is laid out until the first allocation.
pub struct Heap<R: Region = MmapRegion> {
  pub(crate) region: R,
  pub(crate) config: HeapConfig,
  pub(crate) free_lists: FreeLists,
  pub(crate) quick_lists: QuickLists,
  initialized: bool,
}

impl Heap<MmapRegion> {
  /// A heap with the default configuration.
  pub fn new() -> Result<Self, HeapError> {
    Self::with_config(HeapConfig::default())
  }

  pub fn with_config(config: HeapConfig) -> Result<Self, HeapError> {
    config.validate()?;
    let region = MmapRegion::new(config.page_size, config.max_pages)?;
    Self::with_region(region, config)
  }
}

impl<R: Region> Heap<R> {
  /// A heap growing into `region`.
  ///
  /// The region decides its own increment; `config.page_size` is not
  /// consulted.
  pub fn with_region(
    region: R,
    config: HeapConfig,
  ) -> Result<Self, HeapError> {
    config.validate()?;
    Ok(Self {
      region,
      config,
      free_lists: FreeLists::new(config.free_lists),
      quick_lists: QuickLists::new(config.quick_lists, config.quick_list_max),
      initialized: false,
    })
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// First byte of the heap (the prologue).
  pub fn heap_start(&self) -> *mut u8 {
    self.region.start()
  }

  /// One past the last byte of the heap (just past the epilogue).
  pub fn heap_end(&self) -> *mut u8 {
    self.region.end()
  }

  /// Address of the first block after the prologue.
  pub(crate) fn first_block_addr(&self) -> usize {
    self.region.start() as usize + MIN_BLOCK_SIZE
  }

  pub(crate) fn epilogue(&self) -> Block {
    unsafe { Block::at(self.region.end().wrapping_sub(HEADER_SIZE)) }
  }

  /// Lays out the prologue, one free block and the epilogue in the first
  /// growth of the region.
  ///
  /// A first increment too small to hold them is kept, and the region grows
  /// past it before anything is written.
  fn initialize(&mut self) -> Result<(), AllocError> {
    while (self.region.end() as usize - self.region.start() as usize) < MIN_HEAP_SIZE {
      self.grow_region()?;
    }
    self.free_lists.reset();
    self.quick_lists.reset();

    let prologue = unsafe { Block::at(self.region.start()) };
    prologue.write_header(MIN_BLOCK_SIZE, false, true, true);

    let epilogue = self.epilogue();
    let first = prologue.next();
    let size = epilogue.addr() - first.addr();

    epilogue.write_header(0, false, false, true);
    first.write_header(size, false, true, false);
    first.clear_links();

    self.initialized = true;
    self.insert_free(first);

    log::debug!(
      "heap initialized at {:p}: {} free bytes",
      self.region.start(),
      size
    );
    Ok(())
  }

  /// Grows the region once and returns the number of bytes added.
  fn grow_region(&mut self) -> Result<usize, AllocError> {
    let old_end = self.region.end() as usize;
    if self.region.grow().is_none() {
      log::warn!(
        "heap exhausted at {} bytes",
        old_end - self.region.start() as usize
      );
      return Err(AllocError::OutOfMemory);
    }

    let grown = self.region.end() as usize - old_end;
    if grown < MIN_BLOCK_SIZE || grown % WORD_SIZE != 0 {
      heap_fault("region increment cannot hold a block", old_end);
    }
    Ok(grown)
  }

  /// Grows the region by one increment and files the new memory, merged
  /// with any free block that ended at the old epilogue.
  fn extend(&mut self) -> Result<(), AllocError> {
    let old_epilogue = self.epilogue();
    let prev_alloc = old_epilogue.prev_alloc();

    let grown = self.grow_region()?;
    self.epilogue().write_header(0, false, false, true);

    let block = old_epilogue.write_header(grown, false, prev_alloc, false);
    block.clear_links();
    let block = self.insert_free(block);

    log::debug!(
      "heap grew by {} bytes, trailing free block {:#x} ({} bytes)",
      grown,
      block.addr(),
      block.size()
    );
    Ok(())
  }

  /// Marks a block taken off a cache or free list as allocated.
  fn claim(
    &mut self,
    block: Block,
  ) -> NonNull<u8> {
    block.write_header(block.size(), false, block.prev_alloc(), true);
    block.clear_footer();
    block.next().set_prev_alloc(true);
    block.payload()
  }

  fn find_block(
    &mut self,
    size: usize,
  ) -> Option<Block> {
    self.pop_quick(size).or_else(|| self.take_free(size))
  }

  /// Allocates at least `size` bytes, aligned to 8.
  ///
  /// Grows the heap one increment at a time until the request fits or the
  /// region is exhausted.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }
    let Some(block_size) = compute_block_size(size) else {
      log::warn!("allocate({size}): size overflows");
      return Err(AllocError::OutOfMemory);
    };

    if !self.initialized {
      self.initialize()?;
    }

    loop {
      if let Some(block) = self.find_block(block_size) {
        let payload = self.claim(block);
        log::trace!("allocate({}) -> {:p} ({} bytes)", size, payload, block.size());
        return Ok(payload);
      }
      if let Err(err) = self.extend() {
        log::warn!("allocate({size}): no fit for a {block_size}-byte block");
        return Err(err);
      }
    }
  }

  /// Returns a block to the heap, aborting the process if `ptr` is not a
  /// live allocation of this heap.
  ///
  /// # Safety
  ///
  /// The memory behind `ptr` must not be used after this call.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if let Err(err) = unsafe { self.try_release(ptr) } {
      log::error!("release({ptr:p}): {err}");
      process::abort();
    }
  }

  /// Like [`Heap::release`], but reports a bad pointer instead of aborting.
  ///
  /// # Safety
  ///
  /// The memory behind `ptr` must not be used after this call.
  pub unsafe fn try_release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    let block = self.validate(ptr)?;
    self.free_block(block);
    Ok(())
  }

  /// Caches a validated allocated block, or converts it to its free form
  /// and files it.
  pub(crate) fn free_block(
    &mut self,
    block: Block,
  ) {
    if self.push_quick(block) {
      return;
    }

    block.write_header(block.size(), false, block.prev_alloc(), false);
    block.clear_links();
    block.next().set_prev_alloc(false);
    self.insert_free(block);
  }
}
