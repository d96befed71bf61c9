use std::env;
use std::str::FromStr;

use crate::error::HeapError;
use crate::{HEADER_SIZE, MIN_BLOCK_SIZE, WORD_SIZE};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_MAX_PAGES: usize = 100;
pub const DEFAULT_FREE_LISTS: usize = 10;
pub const DEFAULT_QUICK_LISTS: usize = 20;
pub const DEFAULT_QUICK_LIST_MAX: usize = 5;

/// Free-list classes double from 32 bytes, so past this count the class
/// bound no longer fits in a `usize`.
const MAX_FREE_LISTS: usize = 48;

/// Tunables of a heap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Bytes the default `MmapRegion` adds by each growth.
  pub page_size: usize,
  /// Growths the default `MmapRegion` allows before it is exhausted.
  pub max_pages: usize,
  /// Number of free-list size classes. Class `i` holds blocks of up to
  /// `32 << i` bytes; the last class holds everything larger.
  pub free_lists: usize,
  /// Number of quick-list classes. Class `i` holds blocks of exactly
  /// `32 + 8 * i` bytes.
  pub quick_lists: usize,
  /// Entries a quick-list class holds before it is flushed.
  pub quick_list_max: usize,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      max_pages: DEFAULT_MAX_PAGES,
      free_lists: DEFAULT_FREE_LISTS,
      quick_lists: DEFAULT_QUICK_LISTS,
      quick_list_max: DEFAULT_QUICK_LIST_MAX,
    }
  }
}

impl HeapConfig {
  /// Defaults overridden by the `SEGHEAP_*` environment variables.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    override_from_env("SEGHEAP_PAGE_SIZE", &mut config.page_size);
    override_from_env("SEGHEAP_MAX_PAGES", &mut config.max_pages);
    override_from_env("SEGHEAP_FREE_LISTS", &mut config.free_lists);
    override_from_env("SEGHEAP_QUICK_LISTS", &mut config.quick_lists);
    override_from_env("SEGHEAP_QUICK_LIST_MAX", &mut config.quick_list_max);
    config
  }

  pub fn with_page_size(
    mut self,
    page_size: usize,
  ) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn with_max_pages(
    mut self,
    max_pages: usize,
  ) -> Self {
    self.max_pages = max_pages;
    self
  }

  pub fn with_free_lists(
    mut self,
    free_lists: usize,
  ) -> Self {
    self.free_lists = free_lists;
    self
  }

  pub fn with_quick_lists(
    mut self,
    quick_lists: usize,
  ) -> Self {
    self.quick_lists = quick_lists;
    self
  }

  pub fn with_quick_list_max(
    mut self,
    quick_list_max: usize,
  ) -> Self {
    self.quick_list_max = quick_list_max;
    self
  }

  pub fn validate(&self) -> Result<(), HeapError> {
    if self.page_size % WORD_SIZE != 0 {
      return Err(HeapError::Config("page size must be a multiple of 8"));
    }
    // prologue, one minimum block and the epilogue must fit in the first page
    if self.page_size < 2 * MIN_BLOCK_SIZE + HEADER_SIZE {
      return Err(HeapError::Config("page size is too small"));
    }
    if self.max_pages == 0 {
      return Err(HeapError::Config("heap must be allowed at least one page"));
    }
    if self.free_lists == 0 || self.free_lists > MAX_FREE_LISTS {
      return Err(HeapError::Config("free-list count must be between 1 and 48"));
    }
    if self.quick_list_max == 0 {
      return Err(HeapError::Config("quick-list capacity must be at least 1"));
    }
    Ok(())
  }
}

fn override_from_env<T: FromStr>(
  key: &str,
  value: &mut T,
) {
  let Ok(raw) = env::var(key) else {
    return;
  };
  match raw.trim().parse() {
    Ok(parsed) => *value = parsed,
    Err(_) => log::warn!("ignoring {key}={raw:?}: not a number"),
  }
}
