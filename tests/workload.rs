use std::ptr::NonNull;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segheap::{AllocError, Heap, HeapConfig, Region};

struct Live {
  ptr: NonNull<u8>,
  len: usize,
  fill: u8,
}

impl Live {
  fn write(&self) {
    unsafe { self.ptr.as_ptr().write_bytes(self.fill, self.len) };
  }

  fn intact(
    &self,
    len: usize,
  ) -> bool {
    let bytes = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), len) };
    bytes.iter().all(|&byte| byte == self.fill)
  }
}

/// Random mix of every entry point, auditing the heap after each step.
fn run(
  heap: &mut Heap<impl Region>,
  seed: u64,
  steps: usize,
) {
  let mut rng = StdRng::seed_from_u64(seed);
  let mut live: Vec<Live> = Vec::new();

  for step in 0..steps {
    let action = rng.gen_range(0..10);
    match action {
      0..=3 if live.len() < 96 => {
        let len = if rng.gen_bool(0.7) {
          rng.gen_range(1..=160)
        } else {
          rng.gen_range(161..=3000)
        };
        match heap.allocate(len) {
          Ok(ptr) => {
            let entry = Live { ptr, len, fill: rng.r#gen() };
            entry.write();
            live.push(entry);
          }
          Err(AllocError::OutOfMemory) => {}
          Err(err) => panic!("step {step}: allocate({len}) failed: {err}"),
        }
      }
      4 if live.len() < 96 => {
        let len = rng.gen_range(1..=512);
        let align: usize = 1 << rng.gen_range(3..=9usize);
        match heap.aligned_allocate(len, align) {
          Ok(ptr) => {
            assert_eq!(ptr.as_ptr() as usize % align, 0, "step {step}");
            let entry = Live { ptr, len, fill: rng.r#gen() };
            entry.write();
            live.push(entry);
          }
          Err(AllocError::OutOfMemory) => {}
          Err(err) => panic!("step {step}: aligned_allocate({len}, {align}) failed: {err}"),
        }
      }
      5 | 6 if !live.is_empty() => {
        let index = rng.gen_range(0..live.len());
        let len = rng.gen_range(1..=2000);
        let entry = &mut live[index];
        let kept = entry.len.min(len);

        match unsafe { heap.resize(entry.ptr.as_ptr(), len) } {
          Ok(Some(ptr)) => {
            entry.ptr = ptr;
            assert!(entry.intact(kept), "step {step}: resize lost data");
            entry.len = len;
            entry.write();
          }
          Ok(None) => unreachable!("resize to a non-zero size"),
          Err(AllocError::OutOfMemory) => {}
          Err(err) => panic!("step {step}: resize failed: {err}"),
        }
      }
      _ if !live.is_empty() => {
        let entry = live.swap_remove(rng.gen_range(0..live.len()));
        assert!(entry.intact(entry.len), "step {step}: payload clobbered");
        unsafe { heap.release(entry.ptr.as_ptr()) };
      }
      _ => {}
    }

    if let Err(corruption) = heap.check() {
      panic!("step {step}: {corruption}");
    }
  }

  for entry in live.drain(..) {
    assert!(entry.intact(entry.len));
    unsafe { heap.release(entry.ptr.as_ptr()) };
  }
  assert!(heap.check().is_ok());
}

#[test]
fn random_workload() {
  for seed in 0..4 {
    let mut heap = Heap::with_config(HeapConfig::default().with_max_pages(256)).unwrap();
    run(&mut heap, seed, 3000);
  }
}

#[test]
fn random_workload_without_quick_lists() {
  let config = HeapConfig::default()
    .with_max_pages(256)
    .with_quick_lists(0);
  let mut heap = Heap::with_config(config).unwrap();
  run(&mut heap, 42, 3000);
}

#[test]
fn random_workload_with_tight_cap() {
  let config = HeapConfig::default()
    .with_max_pages(8)
    .with_free_lists(4)
    .with_quick_list_max(2);
  let mut heap = Heap::with_config(config).unwrap();
  run(&mut heap, 7, 3000);
}

/// A fixed buffer grown in steps of `step` bytes.
struct BufferRegion {
  base: NonNull<u8>,
  len: usize,
  step: usize,
  cap: usize,
  _buf: Box<[u64]>,
}

impl BufferRegion {
  fn new(
    step: usize,
    cap: usize,
  ) -> Self {
    let mut buf = vec![0u64; cap / 8].into_boxed_slice();
    let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
    Self { base, len: 0, step, cap, _buf: buf }
  }
}

impl Region for BufferRegion {
  fn start(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  fn end(&self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.len)
  }

  fn grow(&mut self) -> Option<NonNull<u8>> {
    if self.len + self.step > self.cap {
      return None;
    }
    let grown = self.end();
    self.len += self.step;
    NonNull::new(grown)
  }
}

#[test]
fn custom_region() {
  let config = HeapConfig::default().with_page_size(1024);
  let mut heap = Heap::with_region(BufferRegion::new(1024, 64 * 1024), config).unwrap();

  let ptr = heap.allocate(8).unwrap();
  assert_eq!(heap.heap_end() as usize - heap.heap_start() as usize, 1024);
  assert_eq!(heap.free_block_count(1024 - 32 - 8 - 32), 1);

  let big = heap.allocate(5000).unwrap();
  assert_eq!(heap.block_size_of(big.as_ptr()), Ok(5008));
  assert!(heap.check().is_ok());

  unsafe {
    heap.release(ptr.as_ptr());
    heap.release(big.as_ptr());
  }
  assert_eq!(heap.allocate(64 * 1024), Err(AllocError::OutOfMemory));
  assert!(heap.check().is_ok());

  run(&mut heap, 99, 1000);
}

#[test]
fn region_steps_smaller_than_page_size() {
  let mut heap = Heap::with_region(BufferRegion::new(1024, 64 * 1024), HeapConfig::default()).unwrap();

  heap.allocate(8).unwrap();
  let big = heap.allocate(5000).unwrap();

  assert_eq!(heap.block_size_of(big.as_ptr()), Ok(5008));
  // 952 bytes left in the first step, plus four more steps
  assert_eq!(heap.heap_end() as usize - heap.heap_start() as usize, 5 * 1024);
  assert_eq!(heap.free_block_count(952 + 4 * 1024 - 5008), 1);
  assert!(heap.check().is_ok());

  run(&mut heap, 3, 1000);
}

#[test]
fn first_step_too_small_for_a_heap() {
  let mut heap = Heap::with_region(BufferRegion::new(48, 4096), HeapConfig::default()).unwrap();

  let ptr = heap.allocate(8).unwrap();

  assert_eq!(heap.heap_end() as usize - heap.heap_start() as usize, 96);
  assert_eq!(ptr.as_ptr() as usize, heap.heap_start() as usize + 32 + 8);
  // the 56-byte block cannot be split without a splinter
  assert_eq!(heap.block_size_of(ptr.as_ptr()), Ok(56));
  assert_eq!(heap.free_block_count(0), 0);
  assert!(heap.check().is_ok());

  run(&mut heap, 5, 500);
}
