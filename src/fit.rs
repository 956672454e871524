use std::ptr;

use crate::{
  align::MINIMUM_ALLOCATION,
  block::{Block, HEADER_SIZE},
  list::BlockList,
};

impl BlockList {
  /// First-fit search: claims the lowest-address free block holding at least
  /// `size` bytes, splitting off the remainder when it can stand as a block.
  ///
  /// Returns null when no free block is large enough.
  ///
  /// # Safety
  ///
  /// `size` must be a rounded size, and the list must describe live memory.
  pub(crate) unsafe fn find_free(
    &mut self,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let mut current = self.head;

      while !current.is_null() {
        if !(*current).used && (*current).size >= size {
          (*current).used = true;
          self.split(current, size);

          log::trace!("first fit for {} bytes at {:p}", size, current);
          return current;
        }
        current = (*current).next;
      }

      ptr::null_mut()
    }
  }

  /// Shrinks `block` to `size` and links the leftover as a free block right
  /// after it, unless the leftover would be smaller than a minimal block.
  unsafe fn split(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      let available = (*block).size;

      if available < size + HEADER_SIZE + MINIMUM_ALLOCATION {
        return;
      }

      let remainder_at = (block as *mut u8).add(HEADER_SIZE + size);
      let remainder = Block::format(remainder_at, available - size - HEADER_SIZE, false);

      self.link(remainder, block);
      (*block).size = size;

      log::trace!(
        "split {:p}: kept {} bytes, {} bytes left free at {:p}",
        block,
        size,
        (*remainder).size,
        remainder
      );
    }
  }
}
