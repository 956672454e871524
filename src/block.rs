use std::{mem, ptr};

use crate::align::MINIMUM_ALLOCATION;

/// Size of the header placed in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest footprint a block can have, header included.
pub const MIN_BLOCK_SIZE: usize = MINIMUM_ALLOCATION + HEADER_SIZE;

/// In-band metadata preceding every payload.
///
/// `prev` and `next` link every block of the region, used or free, in
/// ascending address order. They never own what they point to.
#[repr(C)]
pub struct Block {
  pub used: bool,
  pub size: usize,
  pub prev: *mut Block,
  pub next: *mut Block,
}

impl Block {
  pub fn new(
    size: usize,
    used: bool,
  ) -> Self {
    Self {
      used,
      size,
      prev: ptr::null_mut(),
      next: ptr::null_mut(),
    }
  }

  /// Bytes covered by the block, header included.
  pub fn footprint(&self) -> usize {
    HEADER_SIZE + self.size
  }

  /// Writes a fresh, unlinked header at `at` and returns it as a block.
  ///
  /// # Safety
  ///
  /// `at` must be valid for writes of `HEADER_SIZE` bytes and aligned for `Block`.
  pub unsafe fn format(
    at: *mut u8,
    size: usize,
    used: bool,
  ) -> *mut Block {
    let block = at as *mut Block;
    unsafe { block.write(Block::new(size, used)) };
    block
  }

  /// First payload byte of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to a header inside the managed region.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// Header owning `payload`, the inverse of [`Block::payload`].
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by [`Block::payload`].
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// Address right past the end of `block`'s payload.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header inside the managed region.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add((*block).footprint()) }
  }
}
