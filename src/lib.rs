//! # segheap - A Segregated-Fit Memory Allocator
//!
//! This crate implements a general purpose heap allocator over a single,
//! contiguous region of memory that grows one page at a time. Free memory
//! is tracked in size-segregated lists, and recently released small blocks
//! are cached in exact-size quick lists.
//!
//! ## Heap Layout
//!
//! ```text
//!   heap_start                                                   heap_end
//!   ▼                                                                   ▼
//!   ┌──────────┬─────────┬────────────┬─────────┬──────────────┬────────┐
//!   │ prologue │ block A │   free     │ block B │     free     │  epi-  │
//!   │ 32 bytes │ (alloc) │ hdr .. ftr │ (alloc) │  hdr .. ftr  │ logue  │
//!   └──────────┴─────────┴────────────┴─────────┴──────────────┴────────┘
//!                                                              8 bytes
//! ```
//!
//! The prologue and the epilogue are permanently allocated sentinels, so
//! coalescing never has to test for the ends of the heap.
//!
//! ## Block Format
//!
//! Every block starts with one 64-bit header word. Block sizes are
//! multiples of 8, which leaves the three low bits free for flags:
//!
//! ```text
//!   63                                              3   2   1   0
//!   ┌────────────────────────────────────────────────┬───┬───┬───┐
//!   │                   block size                   │ Q │ P │ A │
//!   └────────────────────────────────────────────────┴───┴───┴───┘
//!     A = allocated   P = previous block allocated   Q = in a quick list
//!
//!   allocated:  ┌─────┬──────────────────────────────────────┐
//!               │ hdr │            payload                   │
//!               └─────┴──────────────────────────────────────┘
//!
//!   free:       ┌─────┬──────┬──────┬─────────────────┬─────┐
//!               │ hdr │ next │ prev │     unused      │ ftr │
//!               └─────┴──────┴──────┴─────────────────┴─────┘
//! ```
//!
//! Only free blocks carry a footer. An allocated block reuses that word as
//! payload, and its successor's `P` bit tells coalescing not to read it.
//!
//! ## Crate Structure
//!
//! ```text
//!   segheap
//!   ├── align       - Alignment macros (align!, align_to!)
//!   ├── block       - Header codec and block views (internal)
//!   ├── config      - HeapConfig and its environment overrides
//!   ├── error       - AllocError, HeapError, Corruption
//!   ├── region      - Region trait and the mmap-backed MmapRegion
//!   ├── split       - Carving one block into two (internal)
//!   ├── coalesce    - Merging with free neighbours (internal)
//!   ├── free_list   - Size-class lists, best-fit search (internal)
//!   ├── quick_list  - Exact-size LIFO caches (internal)
//!   ├── heap        - Heap, allocate and release
//!   ├── validate    - Pointer validation (internal)
//!   ├── realloc     - Heap::resize
//!   ├── memalign    - Heap::aligned_allocate
//!   └── inspect     - Heap walks, statistics and Heap::check
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segheap::Heap;
//!
//! let mut heap = Heap::new().unwrap();
//!
//! let ptr = heap.allocate(64).unwrap().cast::<u64>();
//! unsafe {
//!   ptr.as_ptr().write(42);
//!   assert_eq!(ptr.as_ptr().read(), 42);
//!   heap.release(ptr.as_ptr().cast());
//! }
//! assert!(heap.check().is_ok());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: every operation takes `&mut Heap`
//! - **No shrinking**: pages are never returned before the heap is dropped
//! - **64-bit Unix only**: relies on `mmap` and 8-byte words

#[cfg(not(target_pointer_width = "64"))]
compile_error!("segheap requires a 64-bit target");

pub mod align;
mod block;
mod coalesce;
pub mod config;
pub mod error;
mod free_list;
mod heap;
pub mod inspect;
mod memalign;
mod quick_list;
mod realloc;
pub mod region;
mod split;
mod validate;

pub use block::{
  ALLOC_BIT, HEADER_SIZE, MIN_ALIGNMENT, MIN_BLOCK_SIZE, MIN_PAYLOAD_SIZE, PREV_ALLOC_BIT,
  QUICK_LIST_BIT, WORD_SIZE, compute_block_size, pack, unpack_size,
};
pub use config::HeapConfig;
pub use error::{AllocError, Corruption, HeapError};
pub use heap::Heap;
pub use inspect::{BlockInfo, Blocks};
pub use region::{MmapRegion, Region};
