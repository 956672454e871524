/// All allocations are forced to be at least this many bytes.
pub const MINIMUM_ALLOCATION: usize = 16;

/// All allocations are rounded up to a multiple of this number.
pub const SIZE_MULTIPLE: usize = 8;

/// Rounds `value` up to the next multiple of `multiple`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use rmalloc::align;
///
/// assert_eq!(align!(13, 8), 16);
/// assert_eq!(align!(16, 8), 16);
/// assert_eq!(align!(17, 16), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr, $multiple:expr) => {
    ($value + $multiple - 1) & !($multiple - 1)
  };
}

/// Rounds a requested payload size to the size of the block that will hold it.
///
/// Zero stays zero (no block at all), anything else is at least
/// [`MINIMUM_ALLOCATION`] and a multiple of [`SIZE_MULTIPLE`].
///
/// The caller must keep `size` below `usize::MAX - SIZE_MULTIPLE`.
pub const fn round_up_size(size: usize) -> usize {
  if size == 0 {
    0
  } else if size < MINIMUM_ALLOCATION {
    MINIMUM_ALLOCATION
  } else {
    align!(size, SIZE_MULTIPLE)
  }
}
