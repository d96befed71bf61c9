//! In-place block view and header codec.
//!
//! ```text
//!   Header word (64 bits):
//!   ┌──────────────────────────────────────────────┬───┬───┬───┐
//!   │                 block size                   │ Q │ P │ A │
//!   └──────────────────────────────────────────────┴───┴───┴───┘
//!    63                                           3  2   1   0
//!
//!   A = allocated, P = previous block allocated, Q = in quick list
//! ```
//!
//! The size is always a multiple of 8, so the low three bits are free to
//! carry the flags. A free block that sits on a free list keeps a footer, a
//! bit-identical copy of its header in its last word, so that the block
//! after it can find it by walking backwards.

use std::ptr::{self, NonNull};

use crate::align;

/// Size of a header or footer word.
pub const WORD_SIZE: usize = 8;
/// Header overhead charged to every block.
pub const HEADER_SIZE: usize = WORD_SIZE;
/// Payload needed to hold the two free-list links plus the footer.
pub const MIN_PAYLOAD_SIZE: usize = 3 * WORD_SIZE;
/// Smallest block the heap ever creates.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + MIN_PAYLOAD_SIZE;
/// Smallest alignment accepted by `aligned_allocate`.
pub const MIN_ALIGNMENT: usize = WORD_SIZE;

pub const ALLOC_BIT: u64 = 0x1;
pub const PREV_ALLOC_BIT: u64 = 0x2;
pub const QUICK_LIST_BIT: u64 = 0x4;
const FLAG_MASK: u64 = 0x7;

const NEXT_LINK: usize = WORD_SIZE;
const PREV_LINK: usize = 2 * WORD_SIZE;

/// Packs a size and the three status flags into a header word.
pub const fn pack(
  size: usize,
  in_quick_list: bool,
  prev_alloc: bool,
  alloc: bool,
) -> u64 {
  let mut word = size as u64 & !FLAG_MASK;
  if in_quick_list {
    word |= QUICK_LIST_BIT;
  }
  if prev_alloc {
    word |= PREV_ALLOC_BIT;
  }
  if alloc {
    word |= ALLOC_BIT;
  }
  word
}

/// Size stored in a header or footer word.
pub const fn unpack_size(word: u64) -> usize {
  (word & !FLAG_MASK) as usize
}

/// Block size needed to serve a payload of `payload` bytes.
///
/// Small payloads are padded so the block can later hold its free-list
/// links and footer. Returns `None` if the size overflows.
pub fn compute_block_size(payload: usize) -> Option<usize> {
  let payload = payload.max(MIN_PAYLOAD_SIZE);
  payload.checked_add(HEADER_SIZE + WORD_SIZE)?;

  Some(align!(payload + HEADER_SIZE).max(MIN_BLOCK_SIZE))
}

/// A view of one block, addressed by its header word.
///
/// Every accessor reads or writes heap memory directly, so a `Block` may
/// only be built over a header that lives inside memory the heap owns.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Block(NonNull<u8>);

impl Block {
  /// # Safety
  ///
  /// `ptr` must be non-null, word aligned and point at a header word inside
  /// memory owned by the heap (or a free-list sentinel).
  pub(crate) unsafe fn at(ptr: *mut u8) -> Self {
    Self(unsafe { NonNull::new_unchecked(ptr) })
  }

  /// # Safety
  ///
  /// `payload` must be the payload address of a block, see [`Block::at`].
  pub(crate) unsafe fn from_payload(payload: *mut u8) -> Self {
    unsafe { Self::at(payload.wrapping_sub(HEADER_SIZE)) }
  }

  pub(crate) fn as_ptr(self) -> *mut u8 {
    self.0.as_ptr()
  }

  pub(crate) fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  pub(crate) fn payload(self) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(self.as_ptr().wrapping_add(HEADER_SIZE)) }
  }

  fn word(
    self,
    offset: usize,
  ) -> *mut u64 {
    self.as_ptr().wrapping_add(offset).cast()
  }

  pub(crate) fn header(self) -> u64 {
    unsafe { self.word(0).read() }
  }

  pub(crate) fn size(self) -> usize {
    unpack_size(self.header())
  }

  pub(crate) fn is_alloc(self) -> bool {
    self.header() & ALLOC_BIT != 0
  }

  pub(crate) fn prev_alloc(self) -> bool {
    self.header() & PREV_ALLOC_BIT != 0
  }

  pub(crate) fn in_quick_list(self) -> bool {
    self.header() & QUICK_LIST_BIT != 0
  }

  /// Free and not cached: the only state that carries a footer.
  pub(crate) fn is_free(self) -> bool {
    self.header() & (ALLOC_BIT | QUICK_LIST_BIT) == 0
  }

  pub(crate) fn footer(self) -> u64 {
    unsafe { self.word(self.size() - WORD_SIZE).read() }
  }

  /// The block that starts where this one ends.
  pub(crate) fn next(self) -> Block {
    unsafe { Block::at(self.as_ptr().wrapping_add(self.size())) }
  }

  /// The word just before this header: the predecessor's footer when the
  /// predecessor is free.
  pub(crate) fn prev_footer(self) -> u64 {
    unsafe { self.as_ptr().wrapping_sub(WORD_SIZE).cast::<u64>().read() }
  }

  /// Writes a full header and keeps the footer in sync with it.
  pub(crate) fn write_header(
    self,
    size: usize,
    in_quick_list: bool,
    prev_alloc: bool,
    alloc: bool,
  ) -> Self {
    unsafe { self.word(0).write(pack(size, in_quick_list, prev_alloc, alloc)) };
    self.sync_footer();
    self
  }

  /// Mirrors the header into the footer if the block is free.
  ///
  /// Allocated and cached blocks lend their footer slot to the payload, so
  /// it is left alone.
  fn sync_footer(self) {
    let size = self.size();
    if self.is_free() && size >= MIN_BLOCK_SIZE {
      unsafe { self.word(size - WORD_SIZE).write(self.header()) };
    }
  }

  /// Wipes a stale footer when the block leaves the free state.
  pub(crate) fn clear_footer(self) {
    let size = self.size();
    if size >= MIN_BLOCK_SIZE {
      unsafe { self.word(size - WORD_SIZE).write(0) };
    }
  }

  fn set_flag(
    self,
    bit: u64,
    on: bool,
  ) {
    let header = if on {
      self.header() | bit
    } else {
      self.header() & !bit
    };
    unsafe { self.word(0).write(header) };
  }

  pub(crate) fn set_alloc(
    self,
    alloc: bool,
  ) {
    self.set_flag(ALLOC_BIT, alloc);
    if alloc {
      self.clear_footer();
    } else {
      self.sync_footer();
    }
  }

  pub(crate) fn set_prev_alloc(
    self,
    prev_alloc: bool,
  ) {
    self.set_flag(PREV_ALLOC_BIT, prev_alloc);
    self.sync_footer();
  }

  pub(crate) fn set_quick_list(
    self,
    in_quick_list: bool,
  ) {
    self.set_flag(QUICK_LIST_BIT, in_quick_list);
    if in_quick_list {
      self.clear_footer();
    } else {
      self.sync_footer();
    }
  }

  /// Zeroes the header of a block that was absorbed by a neighbour.
  pub(crate) fn erase(self) {
    unsafe { self.word(0).write(0) };
  }

  pub(crate) fn link_next(self) -> *mut u8 {
    unsafe { self.word(NEXT_LINK).cast::<*mut u8>().read() }
  }

  pub(crate) fn set_link_next(
    self,
    next: *mut u8,
  ) {
    unsafe { self.word(NEXT_LINK).cast::<*mut u8>().write(next) };
  }

  pub(crate) fn link_prev(self) -> *mut u8 {
    unsafe { self.word(PREV_LINK).cast::<*mut u8>().read() }
  }

  pub(crate) fn set_link_prev(
    self,
    prev: *mut u8,
  ) {
    unsafe { self.word(PREV_LINK).cast::<*mut u8>().write(prev) };
  }

  pub(crate) fn clear_links(self) {
    self.set_link_next(ptr::null_mut());
    self.set_link_prev(ptr::null_mut());
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// Word-aligned scratch memory for building blocks by hand.
  pub(crate) fn scratch(words: usize) -> Vec<u64> {
    vec![0u64; words]
  }

  pub(crate) fn block_at(
    buf: &mut [u64],
    byte_offset: usize,
  ) -> Block {
    unsafe { Block::at(buf.as_mut_ptr().cast::<u8>().add(byte_offset)) }
  }

  #[test]
  fn test_compute_block_size() {
    assert_eq!(compute_block_size(1), Some(32));
    assert_eq!(compute_block_size(5), Some(32));
    assert_eq!(compute_block_size(8), Some(32));
    assert_eq!(compute_block_size(24), Some(32));
    assert_eq!(compute_block_size(25), Some(40));
    assert_eq!(compute_block_size(33), Some(48));
    assert_eq!(compute_block_size(56), Some(64));
    assert_eq!(compute_block_size(4096), Some(4104));
    assert_eq!(compute_block_size(usize::MAX), None);

    for size in 0..2048 {
      let block = compute_block_size(size).unwrap();
      assert_eq!(block % 8, 0);
      assert!(block >= MIN_BLOCK_SIZE);
      assert!(block >= size + HEADER_SIZE);
    }
  }

  #[test]
  fn test_pack_bit_order() {
    assert_eq!(pack(32, false, false, true), 0x21);
    assert_eq!(pack(32, false, true, false), 0x22);
    assert_eq!(pack(32, true, false, false), 0x24);
    assert_eq!(pack(4056, true, true, true), 4056 | 0x7);
    assert_eq!(unpack_size(pack(4056, true, true, true)), 4056);
  }

  #[test]
  fn test_free_header_mirrors_into_footer() {
    let mut buf = scratch(16);
    let block = block_at(&mut buf, 0).write_header(64, false, true, false);

    assert_eq!(block.size(), 64);
    assert!(block.is_free());
    assert!(block.prev_alloc());
    assert_eq!(block.footer(), block.header());
    assert_eq!(buf[7], pack(64, false, true, false));
  }

  #[test]
  fn test_allocated_block_keeps_payload_word() {
    let mut buf = scratch(8);
    buf[3] = 0xDEAD_BEEF;
    let block = block_at(&mut buf, 0).write_header(32, false, false, true);
    block.set_prev_alloc(true);

    assert_eq!(buf[3], 0xDEAD_BEEF);
    assert!(block.is_alloc());
    assert!(block.prev_alloc());
  }

  #[test]
  fn test_flag_mutators_sync_footer() {
    let mut buf = scratch(8);
    let block = block_at(&mut buf, 0).write_header(32, false, false, false);

    block.set_prev_alloc(true);
    assert_eq!(block.footer(), block.header());

    block.set_quick_list(true);
    assert!(block.in_quick_list());
    assert_eq!(buf[3], 0);

    block.set_quick_list(false);
    assert_eq!(block.footer(), block.header());

    block.set_alloc(true);
    assert_eq!(buf[3], 0);

    block.set_alloc(false);
    assert_eq!(block.footer(), block.header());
  }

  #[test]
  fn test_neighbours() {
    let mut buf = scratch(16);
    let first = block_at(&mut buf, 0).write_header(48, false, true, false);
    let second = first.next().write_header(80, false, false, true);

    assert_eq!(second.addr(), first.addr() + 48);
    assert_eq!(unpack_size(second.prev_footer()), 48);
    assert_eq!(second.payload().as_ptr() as usize, second.addr() + HEADER_SIZE);
  }

  #[test]
  fn test_links() {
    let mut buf = scratch(8);
    let block = block_at(&mut buf, 0).write_header(32, false, true, false);
    let target = 0x1000 as *mut u8;

    block.set_link_next(target);
    block.set_link_prev(target.wrapping_add(8));
    assert_eq!(block.link_next(), target);
    assert_eq!(block.link_prev(), target.wrapping_add(8));

    block.clear_links();
    assert!(block.link_next().is_null());
    assert!(block.link_prev().is_null());
    assert_eq!(block.footer(), block.header());
  }
}
