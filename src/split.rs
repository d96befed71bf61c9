use crate::MIN_BLOCK_SIZE;
use crate::block::Block;

/// Carves `block` into a leading block of `size` bytes and a free remainder.
///
/// The leading block keeps the original allocated, quick-list and
/// prev_alloc state. Returns the remainder, or `None` when either piece
/// would be smaller than [`MIN_BLOCK_SIZE`]; the block is then left as is
/// and the caller over-allocates instead of creating a splinter.
pub(crate) fn split(
  block: Block,
  size: usize,
) -> Option<Block> {
  let total = block.size();
  if size < MIN_BLOCK_SIZE || total < size + MIN_BLOCK_SIZE {
    return None;
  }
  let remainder = total - size;
  let alloc = block.is_alloc();

  block.write_header(size, block.in_quick_list(), block.prev_alloc(), alloc);

  let rest = block.next().write_header(remainder, false, alloc, false);
  rest.clear_links();
  rest.next().set_prev_alloc(false);

  log::trace!(
    "split {:#x}: {} -> {} + {}",
    block.addr(),
    total,
    size,
    remainder
  );

  Some(rest)
}
