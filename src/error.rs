use std::io;

use thiserror::Error;

/// Failure of an allocator entry point.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The heap could not grow far enough to serve the request.
  #[error("out of memory")]
  OutOfMemory,
  #[error("zero-sized request")]
  ZeroSize,
  #[error("alignment {0} is not a power of two of at least 8")]
  BadAlignment(usize),
  #[error("null pointer")]
  NullPointer,
  /// The pointer does not name a live allocated block of this heap.
  #[error("invalid pointer {0:#x}")]
  InvalidPointer(usize),
}

/// Failure to build a heap.
#[derive(Debug, Error)]
pub enum HeapError {
  #[error("invalid heap configuration: {0}")]
  Config(&'static str),
  #[error("failed to reserve {bytes} bytes of heap: {source}")]
  Reserve {
    bytes: usize,
    #[source]
    source: io::Error,
  },
}

/// A broken heap invariant found by [`Heap::check`](crate::Heap::check).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
  #[error("block {addr:#x} has bad size {size}")]
  BadSize { addr: usize, size: usize },
  #[error("free block {addr:#x} footer does not match its header")]
  FooterMismatch { addr: usize },
  #[error("block {addr:#x} prev_alloc bit disagrees with its predecessor")]
  PrevAllocMismatch { addr: usize },
  #[error("free blocks at {addr:#x} and its predecessor were not coalesced")]
  AdjacentFree { addr: usize },
  #[error("free block {addr:#x} is on neither a free list nor a quick list")]
  Unlisted { addr: usize },
  #[error("free-list entry {addr:#x} is not a free block of the heap")]
  StrayFreeEntry { addr: usize },
  #[error("free-list entry {addr:#x} sits in class {class} out of order")]
  Misplaced { addr: usize, class: usize },
  #[error("quick-list entry {addr:#x} does not belong to class {class}")]
  StrayQuickEntry { addr: usize, class: usize },
  #[error("block walk overran the epilogue at {addr:#x}")]
  WalkOverrun { addr: usize },
}

/// Aborts the process on a broken internal invariant.
#[cold]
pub(crate) fn heap_fault(
  reason: &str,
  addr: usize,
) -> ! {
  log::error!("heap corrupted at {addr:#x}: {reason}");
  std::process::abort()
}
