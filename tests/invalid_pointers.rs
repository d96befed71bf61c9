use std::ptr;

use segheap::{ALLOC_BIT, AllocError, Heap, PREV_ALLOC_BIT, QUICK_LIST_BIT};

fn header(ptr: *mut u8) -> *mut u64 {
  ptr.wrapping_sub(8).cast()
}

fn is_invalid<T>(result: Result<T, AllocError>) -> bool {
  matches!(result, Err(AllocError::InvalidPointer(_)))
}

/// Runs `corrupt` on a fresh allocation and expects both release and
/// resize to reject it.
fn rejects(corrupt: impl Fn(&mut Heap, *mut u8) -> *mut u8) {
  let mut heap = Heap::new().unwrap();
  let ptr = heap.allocate(20).unwrap().as_ptr();
  let bad = corrupt(&mut heap, ptr);

  unsafe {
    assert!(is_invalid(heap.try_release(bad)));
    assert!(is_invalid(heap.resize(bad, 64)));
  }
}

#[test]
fn null() {
  let mut heap = Heap::new().unwrap();
  unsafe {
    assert_eq!(heap.try_release(ptr::null_mut()), Err(AllocError::NullPointer));
    assert_eq!(heap.resize(ptr::null_mut(), 8), Err(AllocError::NullPointer));
  }
}

#[test]
fn random_number() {
  rejects(|_, _| 1 as *mut u8);
}

#[test]
fn not_word_aligned() {
  rejects(|_, ptr| ptr.wrapping_add(1));
}

#[test]
fn before_heap_start() {
  rejects(|heap, _| heap.heap_start().wrapping_sub(16));
}

#[test]
fn after_heap_end() {
  rejects(|heap, _| heap.heap_end().wrapping_add(16));
}

#[test]
fn free_block_payload() {
  rejects(|heap, _| {
    let free = heap.blocks().find(|info| !info.alloc).unwrap();
    free.payload() as *mut u8
  });
}

#[test]
fn bad_block_size() {
  rejects(|_, ptr| {
    unsafe { header(ptr).write(0x1b) };
    ptr
  });
}

#[test]
fn quick_list_bit_set() {
  rejects(|_, ptr| {
    unsafe { header(ptr).write(header(ptr).read() | QUICK_LIST_BIT) };
    ptr
  });
}

#[test]
fn alloc_bit_clear() {
  rejects(|_, ptr| {
    unsafe { header(ptr).write(header(ptr).read() & !ALLOC_BIT) };
    ptr
  });
}

#[test]
fn prev_alloc_clear_with_allocated_predecessor() {
  rejects(|heap, ptr| {
    let target = heap.allocate(20).unwrap().as_ptr();
    unsafe {
      header(target).write(header(target).read() & !PREV_ALLOC_BIT);
      // a footer that points back at the allocated block before it
      ptr.wrapping_add(16).cast::<u64>().write(header(ptr).read());
    }
    target
  });
}

#[test]
fn cached_block() {
  let mut heap = Heap::new().unwrap();
  let ptr = heap.allocate(8).unwrap().as_ptr();

  unsafe {
    heap.release(ptr);
    assert_eq!(heap.quick_list_block_count(32), 1);
    assert!(is_invalid(heap.try_release(ptr)));
    assert!(is_invalid(heap.resize(ptr, 16)));
  }
  assert_eq!(heap.quick_list_block_count(32), 1);
  assert!(heap.check().is_ok());
}

#[test]
fn heap_survives_rejections() {
  let mut heap = Heap::new().unwrap();
  let ptr = heap.allocate(100).unwrap().as_ptr();

  unsafe {
    assert!(is_invalid(heap.try_release(ptr.wrapping_add(8))));
    assert!(is_invalid(heap.try_release(heap.heap_start())));
    assert!(heap.try_release(ptr).is_ok());
  }
  assert!(heap.check().is_ok());
}
