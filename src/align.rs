/// Rounds `value` up to the heap word size (8 bytes).
///
/// # Examples
///
/// ```rust
/// use segheap::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(32), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::WORD_SIZE)
  };
}

/// Rounds `value` up to a multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use segheap::align_to;
///
/// assert_eq!(align_to!(17, 16), 32);
/// assert_eq!(align_to!(64, 64), 64);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Whether `addr` is a multiple of `align`.
pub fn is_aligned(
  addr: usize,
  align: usize,
) -> bool {
  addr & (align - 1) == 0
}

/// Alignments accepted by `aligned_allocate`: powers of two no smaller than
/// the heap word.
pub fn is_valid_alignment(align: usize) -> bool {
  align >= crate::MIN_ALIGNMENT && align.is_power_of_two()
}
