//! # rmalloc - A First-Fit Free-List Allocator
//!
//! This crate provides a `malloc`/`free`-style heap that manages one
//! contiguous, growable region of memory, such as the program break moved by
//! `sbrk(2)`.
//!
//! ## Overview
//!
//! Every byte of the region belongs to exactly one block. Blocks are kept in
//! a doubly linked list sorted by address, used and free alike:
//!
//! ```text
//!   Managed Region:
//!
//!   ┌────────────────────────────────────────────────────────────────────────┐
//!   │                                                                        │
//!   │   ┌──────┬────────┬──────┬──────────────┬──────┬─────┐                 │
//!   │   │ hdr  │ used   │ hdr  │    free      │ hdr  │used │                 │
//!   │   └──────┴────────┴──────┴──────────────┴──────┴─────┘                 │
//!   │   ▲                                                  ▲                 │
//!   │   │                                                  │                 │
//!   │  head                                          Program Break           │
//!   │                                              (tail ends here)          │
//!   └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Allocation** rounds the request (minimum 16 bytes, multiple of 8),
//!   takes the first free block large enough, and splits off the leftover when
//!   it can still form a block of its own. When nothing fits, the region grows
//!   by one block at the top.
//! - **Release** marks the block free and merges it with free neighbors, so no
//!   two free blocks are ever adjacent. When the merged block ends up at the
//!   top of the region, it is given back to the backing store.
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align      - Rounding macro and size constants
//!   ├── block      - Block header and payload conversions (internal)
//!   ├── list       - Address-ordered block list and coalescing (internal)
//!   ├── fit        - First-fit search with splitting (internal)
//!   ├── store      - BackingStore trait, Brk and Arena stores
//!   ├── heap       - Heap: allocate / release
//!   ├── dump       - Read-only block traversal and rendering
//!   ├── fatal      - fatal! reporter
//!   └── error      - HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rmalloc::{Arena, Heap};
//!
//! let mut heap = Heap::new(Arena::with_capacity(4096));
//!
//! let ptr = heap.allocate(std::mem::size_of::<u64>()) as *mut u64;
//!
//! unsafe {
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!
//!     heap.release(ptr as *mut u8);
//! }
//!
//! assert!(heap.is_empty());
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │           Payload              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ used: bool      │  │  ┌──────────────────────────┐  │
//!   │  │ size: N         │  │  │                          │  │
//!   │  │ prev: ptr/null  │  │  │     N bytes usable       │  │
//!   │  │ next: ptr/null  │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │  32 bytes (64 bit)    │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`; wrap it in
//!   a lock to share it.
//! - **Trusting release**: releasing a foreign pointer or releasing twice is
//!   undefined behaviour. Debug builds assert the block is in use and check
//!   the whole list after each operation.
//! - **Out of memory is fatal** through [`Heap::allocate`]; use
//!   [`Heap::try_allocate`] to handle it.

pub mod align;
mod block;
mod dump;
pub mod error;
pub mod fatal;
mod fit;
mod heap;
mod list;
pub mod store;

pub use block::{HEADER_SIZE, MIN_BLOCK_SIZE};
pub use dump::{BlockInfo, BlockMap, Blocks};
pub use error::HeapError;
pub use heap::Heap;
#[cfg(unix)]
pub use store::Brk;
pub use store::{Arena, BackingStore};
