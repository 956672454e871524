use std::ptr;

use crate::block::Block;

/// Address-ordered doubly linked list of every block in the region.
///
/// All splicing of `prev`/`next` links happens here. Every function that takes
/// a block pointer requires it to be null or a live header linked into (or, for
/// [`BlockList::link`], about to be linked into) this list.
pub(crate) struct BlockList {
  pub(crate) head: *mut Block,
  pub(crate) tail: *mut Block,
}

impl BlockList {
  pub(crate) const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
    }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Inserts `block` right after `after`, or as the sole element when `after` is null.
  pub(crate) unsafe fn link(
    &mut self,
    block: *mut Block,
    after: *mut Block,
  ) {
    if block.is_null() {
      return;
    }

    unsafe {
      if after.is_null() {
        debug_assert!(self.is_empty(), "linking a block as sole element of a non-empty list");

        (*block).prev = ptr::null_mut();
        (*block).next = ptr::null_mut();
        self.head = block;
        self.tail = block;
        return;
      }

      let next = (*after).next;

      (*block).prev = after;
      (*block).next = next;
      (*after).next = block;

      if next.is_null() {
        self.tail = block;
      } else {
        (*next).prev = block;
      }
    }
  }

  pub(crate) unsafe fn unlink(
    &mut self,
    block: *mut Block,
  ) {
    if block.is_null() {
      return;
    }

    unsafe {
      let prev = (*block).prev;
      let next = (*block).next;

      if prev.is_null() {
        self.head = next;
      } else {
        (*prev).next = next;
      }

      if next.is_null() {
        self.tail = prev;
      } else {
        (*next).prev = prev;
      }

      (*block).prev = ptr::null_mut();
      (*block).next = ptr::null_mut();
    }
  }

  /// Absorbs `block.next` into `block`. The absorbed header is dead afterwards.
  ///
  /// # Safety
  ///
  /// `block.next` must exist and be free.
  pub(crate) unsafe fn coalesce_with_next(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next;
      debug_assert!(!next.is_null(), "coalescing the tail with nothing");
      debug_assert!(!(*next).used, "coalescing with a used block");

      (*block).size += (*next).footprint();

      let after = (*next).next;
      (*block).next = after;

      if after.is_null() {
        self.tail = block;
      } else {
        (*after).prev = block;
      }

      log::trace!(
        "coalesced {:p} into {:p}, size is now {}",
        next,
        block,
        (*block).size
      );
    }
  }

  /// Merges a freshly freed `block` with whichever neighbors are free.
  ///
  /// Returns the surviving block, which is `block.prev` when `block` got
  /// absorbed into its predecessor.
  pub(crate) unsafe fn coalesce_with_neighbors(
    &mut self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      let prev = (*block).prev;
      let next = (*block).next;

      let prev_free = !prev.is_null() && !(*prev).used;
      let next_free = !next.is_null() && !(*next).used;

      match (prev_free, next_free) {
        (true, true) => {
          self.coalesce_with_next(prev);
          self.coalesce_with_next(prev);
          prev
        }
        (true, false) => {
          self.coalesce_with_next(prev);
          prev
        }
        (false, true) => {
          self.coalesce_with_next(block);
          block
        }
        (false, false) => block,
      }
    }
  }
}
