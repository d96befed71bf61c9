use std::io::Read;

use segheap::{Heap, HeapConfig};

/// Waits until the user presses ENTER.
/// Handy for inspecting the process with `pmap` or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints every block between the prologue and the epilogue.
fn print_heap(
  label: &str,
  heap: &Heap,
) {
  println!("\n[{label}] heap {:p}..{:p}", heap.heap_start(), heap.heap_end());
  for block in heap.blocks() {
    println!("  {block}");
  }
  println!(
    "  free bytes = {}, free blocks = {}, cached blocks = {}",
    heap.free_bytes(),
    heap.free_block_count(0),
    heap.quick_list_block_count(0)
  );
  if let Err(err) = heap.check() {
    println!("  !! {err}");
  }
}

fn main() {
  let mut heap = Heap::with_config(HeapConfig::from_env()).unwrap();
  let config = heap.config();
  println!(
    "page size {} bytes, at most {} pages, {} free lists, {} quick lists of {}",
    config.page_size,
    config.max_pages,
    config.free_lists,
    config.quick_lists,
    config.quick_list_max
  );

  unsafe {
    // --------------------------------------------------------------------
    // 1) First allocation lays out the prologue, the block and the
    //    remaining free space.
    // --------------------------------------------------------------------
    let first = heap.allocate(8).unwrap();
    first.cast::<u64>().as_ptr().write(0xDEADBEEF);
    print_heap("1: allocate(8)", &heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) A few more blocks of mixed sizes.
    // --------------------------------------------------------------------
    let second = heap.allocate(100).unwrap();
    let third = heap.allocate(24).unwrap();
    let fourth = heap.allocate(300).unwrap();
    print_heap("2: allocate(100, 24, 300)", &heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Small blocks are cached in quick lists on release; larger ones
    //    are coalesced into the free lists.
    // --------------------------------------------------------------------
    heap.release(third.as_ptr());
    heap.release(second.as_ptr());
    print_heap("3: release(24), release(100)", &heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) An allocation of the cached size comes straight back from the
    //    quick list.
    // --------------------------------------------------------------------
    let reused = heap.allocate(20).unwrap();
    println!(
      "\n[4] allocate(20) == released 24-byte block? {}",
      if reused == third { "Yes, served from the quick list" } else { "No" }
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Resize in place and by moving.
    // --------------------------------------------------------------------
    let shrunk = heap.resize(fourth.as_ptr(), 40).unwrap().unwrap();
    println!("\n[5] resize(300 -> 40) kept the block? {}", shrunk == fourth);
    let grown = heap.resize(first.as_ptr(), 2000).unwrap().unwrap();
    println!(
      "[5] resize(8 -> 2000) moved to {:p}, value = {:#X}",
      grown,
      grown.cast::<u64>().as_ptr().read()
    );
    print_heap("5: resize", &heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Aligned allocation carves an aligned block out of a padded one.
    // --------------------------------------------------------------------
    let aligned = heap.aligned_allocate(64, 256).unwrap();
    println!(
      "\n[6] aligned_allocate(64, 256) = {:p}, addr % 256 = {}",
      aligned,
      aligned.as_ptr() as usize % 256
    );
    print_heap("6: aligned_allocate", &heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) A large request grows the heap by whole pages.
    // --------------------------------------------------------------------
    let big = heap.allocate(16 * 1024).unwrap();
    print_heap("7: allocate(16 KiB)", &heap);

    for ptr in [reused, shrunk, grown, aligned, big] {
      heap.release(ptr.as_ptr());
    }
    print_heap("8: everything released", &heap);
  }

  println!("\n[9] End of walkthrough. The heap is unmapped when it is dropped.");
}
