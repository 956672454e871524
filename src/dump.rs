//! Read-only views of the block list, for debugging.

use std::{fmt, marker::PhantomData};

use crate::{block::Block, heap::Heap, store::BackingStore};

pub(crate) const COLOR_RED: &str = "\x1b[31m";
pub(crate) const COLOR_BLUE: &str = "\x1b[34m";
pub(crate) const COLOR_RESET: &str = "\x1b[0m";

/// Snapshot of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address handed out (or to be handed out) for this block.
  pub payload: *mut u8,
  pub size: usize,
  pub used: bool,
}

/// Iterator over the blocks of a heap, lowest address first.
pub struct Blocks<'a> {
  current: *mut Block,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.current.is_null() {
      return None;
    }

    // The heap is borrowed for 'a, so the list cannot change under us.
    unsafe {
      let block = self.current;
      self.current = (*block).next;

      Some(BlockInfo {
        payload: Block::payload(block),
        size: (*block).size,
        used: (*block).used,
      })
    }
  }
}

/// `[U 16][F 32]`-style rendering of the block list.
pub struct BlockMap<'a> {
  blocks: Blocks<'a>,
  colored: bool,
}

impl fmt::Display for BlockMap<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let blocks = Blocks {
      current: self.blocks.current,
      _heap: PhantomData,
    };
    let mut empty = true;

    for info in blocks {
      empty = false;

      let (tag, color) = if info.used {
        ('U', COLOR_RED)
      } else {
        ('F', COLOR_BLUE)
      };

      if self.colored {
        write!(f, "{color}[{tag} {}]{COLOR_RESET}", info.size)?;
      } else {
        write!(f, "[{tag} {}]", info.size)?;
      }
    }

    if empty {
      if self.colored {
        write!(f, "{COLOR_BLUE}<empty>{COLOR_RESET}")?;
      } else {
        f.write_str("<empty>")?;
      }
    }

    Ok(())
  }
}

impl<S: BackingStore> Heap<S> {
  /// Walks the block list in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.list.head,
      _heap: PhantomData,
    }
  }

  pub fn block_map(&self) -> BlockMap<'_> {
    BlockMap {
      blocks: self.blocks(),
      colored: false,
    }
  }

  /// Prints `message` and the colored block layout to stdout.
  pub fn dump(
    &self,
    message: &str,
  ) {
    let map = BlockMap {
      blocks: self.blocks(),
      colored: true,
    };

    println!("    {}", message);
    println!("        {}", map);
  }
}
