//! Growable memory regions a [`Heap`](crate::Heap) can manage.

use std::{
  alloc::{self, Layout},
  mem,
  ptr::NonNull,
};

use crate::{block::Block, error::HeapError};

/// Alignment every store hands out; keeps headers and payloads aligned.
pub const STORE_ALIGN: usize = mem::align_of::<Block>();

/// A contiguous region that only ever grows or shrinks at its high end.
///
/// # Safety
///
/// Implementors must guarantee that:
///
/// - every successful `grow` returns memory starting exactly where the previous
///   successful growth ended (after accounting for shrinks), aligned to
///   [`STORE_ALIGN`], and exclusively owned by the caller until shrunk;
/// - `shrink` only ever gives back bytes at the high end of the region, and
///   leaves the region untouched when it fails.
pub unsafe trait BackingStore {
  /// Extends the region by `bytes` and returns the start of the new bytes.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError>;

  /// Gives the last `bytes` of the region back.
  fn shrink(
    &mut self,
    bytes: usize,
  ) -> Result<(), HeapError>;
}

/// A fixed-capacity buffer that behaves like a program break.
///
/// Useful for tests and for carving a private heap out of memory obtained
/// from the global allocator.
pub struct Arena {
  base: NonNull<u8>,
  layout: Option<Layout>,
  capacity: usize,
  len: usize,
}

impl Arena {
  /// Reserves `capacity` bytes, rounded down to [`STORE_ALIGN`].
  ///
  /// # Panics
  ///
  /// Panics if the rounded capacity exceeds `isize::MAX` bytes.
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = capacity & !(STORE_ALIGN - 1);

    if capacity == 0 {
      return Self {
        base: NonNull::<Block>::dangling().cast(),
        layout: None,
        capacity,
        len: 0,
      };
    }

    let layout = match Layout::from_size_align(capacity, STORE_ALIGN) {
      Ok(layout) => layout,
      Err(_) => panic!("capacity overflow: cannot reserve {capacity} bytes for an arena"),
    };
    let raw = unsafe { alloc::alloc(layout) };
    let base = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));

    Self {
      base,
      layout: Some(layout),
      capacity,
      len: 0,
    }
  }

  /// Lowest address of the region.
  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes currently handed out.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

unsafe impl BackingStore for Arena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let available = self.capacity - self.len;

    if bytes > available {
      return Err(HeapError::Exhausted {
        requested: bytes,
        available: Some(available),
      });
    }

    let start = unsafe { self.base.add(self.len) };
    self.len += bytes;

    Ok(start)
  }

  fn shrink(
    &mut self,
    bytes: usize,
  ) -> Result<(), HeapError> {
    if bytes > self.len {
      return Err(HeapError::ShrinkBeyondRegion {
        requested: bytes,
        owned: self.len,
      });
    }

    self.len -= bytes;
    Ok(())
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    if let Some(layout) = self.layout {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
  }
}

#[cfg(unix)]
pub use brk::Brk;

#[cfg(unix)]
mod brk {
  use std::ptr::{self, NonNull};

  use libc::{c_void, intptr_t, sbrk};

  use super::{BackingStore, STORE_ALIGN};
  use crate::error::HeapError;

  fn failed(address: *mut c_void) -> bool {
    address == usize::MAX as *mut c_void
  }

  /// The process data segment, grown and shrunk through `sbrk(2)`.
  ///
  /// Only one `Brk` should be in use per process, and nothing else may move
  /// the program break while it owns memory. If something does, growth and
  /// shrinkage fail with [`HeapError::Discontiguous`] instead of corrupting
  /// the heap.
  pub struct Brk {
    end: *mut u8,
    owned: usize,
  }

  impl Brk {
    pub const fn new() -> Self {
      Self {
        end: ptr::null_mut(),
        owned: 0,
      }
    }

    /// Current program break, as reported by `sbrk(0)`.
    pub fn program_break() -> *mut u8 {
      unsafe { sbrk(0) as *mut u8 }
    }

    /// Bytes currently owned above the anchor point.
    pub fn owned(&self) -> usize {
      self.owned
    }

    // Moves the break up to the next aligned address and remembers it as the
    // start of the region.
    unsafe fn anchor(&mut self) -> Result<(), HeapError> {
      unsafe {
        let current = sbrk(0) as *mut u8;
        let padding = current.align_offset(STORE_ALIGN);

        if padding > 0 && failed(sbrk(padding as intptr_t)) {
          return Err(HeapError::Exhausted {
            requested: padding,
            available: None,
          });
        }

        self.end = current.add(padding);
        log::debug!("program break anchored at {:p}", self.end);
        Ok(())
      }
    }
  }

  impl Default for Brk {
    fn default() -> Self {
      Self::new()
    }
  }

  unsafe impl BackingStore for Brk {
    fn grow(
      &mut self,
      bytes: usize,
    ) -> Result<NonNull<u8>, HeapError> {
      let increment =
        intptr_t::try_from(bytes).map_err(|_| HeapError::RequestTooLarge { size: bytes })?;

      unsafe {
        if self.owned == 0 {
          self.anchor()?;
        }

        let start = sbrk(increment);

        if failed(start) {
          return Err(HeapError::Exhausted {
            requested: bytes,
            available: None,
          });
        }

        let start = start as *mut u8;

        if start != self.end {
          if failed(sbrk(-increment)) {
            log::warn!(
              "could not roll back {} bytes of program break growth at {:p}",
              bytes,
              start
            );
          }
          return Err(HeapError::Discontiguous);
        }

        self.end = start.add(bytes);
        self.owned += bytes;

        Ok(NonNull::new_unchecked(start))
      }
    }

    fn shrink(
      &mut self,
      bytes: usize,
    ) -> Result<(), HeapError> {
      if bytes > self.owned {
        return Err(HeapError::ShrinkBeyondRegion {
          requested: bytes,
          owned: self.owned,
        });
      }

      if Self::program_break() != self.end {
        return Err(HeapError::Discontiguous);
      }

      // `bytes <= owned`, and owned bytes were all accepted as `intptr_t` by `grow`.
      let decrement = -(bytes as intptr_t);

      unsafe {
        if failed(sbrk(decrement)) {
          return Err(HeapError::Discontiguous);
        }

        self.end = self.end.sub(bytes);
      }
      self.owned -= bytes;

      Ok(())
    }
  }
}
