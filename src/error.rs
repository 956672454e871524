use std::{error, fmt};

/// Failures surfaced by the heap and its backing stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// The backing store could not provide `requested` more bytes.
  Exhausted {
    requested: usize,
    available: Option<usize>,
  },
  /// The region boundary was moved by someone other than its store.
  Discontiguous,
  /// The request cannot be rounded and prefixed with a header without overflowing.
  RequestTooLarge { size: usize },
  /// A shrink asked for more bytes than the store currently owns.
  ShrinkBeyondRegion { requested: usize, owned: usize },
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Exhausted {
        requested,
        available: Some(available),
      } => write!(
        f,
        "out of memory: cannot grow the heap by {requested} bytes ({available} bytes left)"
      ),
      Self::Exhausted {
        requested,
        available: None,
      } => write!(f, "out of memory: cannot grow the heap by {requested} bytes"),
      Self::Discontiguous => f.write_str("the heap boundary was moved behind the allocator's back"),
      Self::RequestTooLarge { size } => write!(f, "allocation of {size} bytes is too large"),
      Self::ShrinkBeyondRegion { requested, owned } => write!(
        f,
        "cannot shrink the heap by {requested} bytes, only {owned} bytes are owned"
      ),
    }
  }
}

impl error::Error for HeapError {}
