use std::ptr;

use crate::{
  align::{MINIMUM_ALLOCATION, SIZE_MULTIPLE, round_up_size},
  block::{Block, HEADER_SIZE},
  error::HeapError,
  fatal,
  list::BlockList,
  store::BackingStore,
};

/// Largest request that can be rounded and prefixed with a header.
const MAX_REQUEST: usize = isize::MAX as usize - HEADER_SIZE - SIZE_MULTIPLE;

/// A first-fit heap over a growable backing store.
///
/// The heap is a plain value: it is neither `Send` nor `Sync`, and sharing
/// one between threads requires wrapping it in a lock.
pub struct Heap<S: BackingStore> {
  pub(crate) list: BlockList,
  store: S,
  managed: usize,
}

impl<S: BackingStore> Heap<S> {
  pub const fn new(store: S) -> Self {
    Self {
      list: BlockList::new(),
      store,
      managed: 0,
    }
  }

  /// Allocates at least `size` bytes, returning null for `size == 0`.
  ///
  /// When the backing store cannot provide more memory the process is
  /// terminated through [`fatal!`]. Use [`Heap::try_allocate`] to get the
  /// error back instead.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_allocate(size) {
      Ok(payload) => payload,
      Err(error) => fatal!("allocation of {} bytes failed: {}", size, error),
    }
  }

  /// Allocates at least `size` bytes, returning null for `size == 0`.
  ///
  /// Nothing is modified when an error is returned.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<*mut u8, HeapError> {
    if size == 0 {
      return Ok(ptr::null_mut());
    }

    if size > MAX_REQUEST {
      return Err(HeapError::RequestTooLarge { size });
    }

    let rounded = round_up_size(size);

    let payload = unsafe {
      let mut block = self.list.find_free(rounded);

      if block.is_null() {
        block = self.expand(rounded)?;
      }

      Block::payload(block)
    };

    log::trace!("allocate({}) -> {:p} ({} byte block)", size, payload, rounded);

    #[cfg(debug_assertions)]
    self.check_integrity();

    Ok(payload)
  }

  /// Gives a payload back to the heap. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a payload returned by this heap and not released
  /// since. Foreign pointers and double releases are not detected in release
  /// builds and corrupt the heap.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    log::trace!("release({:p})", ptr);

    unsafe {
      let block = Block::from_payload(ptr);
      debug_assert!((*block).used, "release of {:p}, which is not in use", ptr);

      (*block).used = false;

      let survivor = self.list.coalesce_with_neighbors(block);

      if survivor == self.list.tail {
        self.shrink();
      }
    }

    #[cfg(debug_assertions)]
    self.check_integrity();
  }

  /// Total bytes of the backing store covered by blocks.
  pub fn managed_size(&self) -> usize {
    self.managed
  }

  pub fn is_empty(&self) -> bool {
    self.list.is_empty()
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Grows the store by one used block of `size` bytes, linked as the new tail.
  unsafe fn expand(
    &mut self,
    size: usize,
  ) -> Result<*mut Block, HeapError> {
    let bytes = HEADER_SIZE + size;
    let start = self.store.grow(bytes)?;

    unsafe {
      let block = Block::format(start.as_ptr(), size, true);
      self.list.link(block, self.list.tail);
      self.managed += bytes;

      log::debug!("heap grown by {} bytes at {:p}", bytes, block);
      Ok(block)
    }
  }

  /// Gives the free tail block back to the store.
  ///
  /// A refused shrink leaves the tail linked, so the heap stays consistent.
  unsafe fn shrink(&mut self) {
    unsafe {
      let tail = self.list.tail;
      debug_assert!(!tail.is_null() && !(*tail).used, "shrinking a used tail");

      let bytes = (*tail).footprint();
      let prev = (*tail).prev;

      // Unlink first: the header is gone once the store takes the bytes back.
      self.list.unlink(tail);

      match self.store.shrink(bytes) {
        Ok(()) => {
          self.managed -= bytes;
          log::debug!("heap shrunk by {} bytes", bytes);
        }
        Err(error) => {
          log::warn!("keeping {} free bytes at the top of the heap: {}", bytes, error);
          self.list.link(tail, prev);
        }
      }
    }
  }

  /// Asserts every structural invariant of the block list.
  ///
  /// Runs after each operation in debug builds.
  pub fn check_integrity(&self) {
    let mut covered = 0;
    let mut prev: *mut Block = ptr::null_mut();
    let mut current = self.list.head;

    unsafe {
      while !current.is_null() {
        let block = &*current;

        assert_eq!(block.prev, prev, "broken back link at {:p}", current);
        assert!(
          block.size >= MINIMUM_ALLOCATION && block.size % SIZE_MULTIPLE == 0,
          "unrounded block of {} bytes at {:p}",
          block.size,
          current
        );

        if !prev.is_null() {
          assert_eq!(
            Block::end(prev),
            current as *mut u8,
            "gap or overlap between {:p} and {:p}",
            prev,
            current
          );
          assert!(
            (*prev).used || block.used,
            "adjacent free blocks at {:p} and {:p}",
            prev,
            current
          );
        }

        covered += block.footprint();
        prev = current;
        current = block.next;
      }
    }

    assert_eq!(self.list.tail, prev, "tail is not the last block");
    assert_eq!(covered, self.managed, "blocks do not cover the managed region");
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use proptest::prelude::*;

  use super::*;
  use crate::{block::MIN_BLOCK_SIZE, dump::BlockInfo, store::Arena};

  fn heap(capacity: usize) -> Heap<Arena> {
    let _ = env_logger::try_init();
    Heap::new(Arena::with_capacity(capacity))
  }

  fn layout(heap: &Heap<Arena>) -> Vec<(bool, usize)> {
    heap.blocks().map(|info| (info.used, info.size)).collect()
  }

  fn block_of(payload: *mut u8) -> &'static Block {
    unsafe { &*Block::from_payload(payload) }
  }

  #[test]
  fn one_byte_gets_a_minimal_block() {
    let mut heap = heap(4096);

    let payload = heap.allocate(1);

    assert!(!payload.is_null());
    assert_eq!(block_of(payload).size, 16);
    assert_eq!(heap.managed_size(), HEADER_SIZE + 16);
  }

  #[test]
  fn zero_bytes_is_the_empty_handle() {
    let mut heap = heap(4096);

    assert!(heap.allocate(0).is_null());
    assert!(heap.is_empty());
    assert_eq!(heap.store().len(), 0);
  }

  #[test]
  fn releasing_null_is_a_noop() {
    let mut heap = heap(4096);
    let payload = heap.allocate(24);

    unsafe { heap.release(ptr::null_mut()) };

    assert_eq!(layout(&heap), vec![(true, 24)]);
    unsafe { heap.release(payload) };
  }

  #[test]
  fn allocate_then_release_round_trips() {
    let mut heap = heap(4096);
    let kept = heap.allocate(64);
    let before: Vec<BlockInfo> = heap.blocks().collect();
    let managed = heap.managed_size();

    for size in [1, 16, 17, 40, 100, 1000] {
      let payload = heap.allocate(size);
      unsafe { heap.release(payload) };

      assert_eq!(heap.blocks().collect::<Vec<_>>(), before);
      assert_eq!(heap.managed_size(), managed);
      assert_eq!(heap.store().len(), managed);
    }

    unsafe { heap.release(kept) };
    assert!(heap.is_empty());
  }

  #[test]
  fn first_fit_reuses_before_growing() {
    let mut heap = heap(4096);

    let a = heap.allocate(40);
    let b = heap.allocate(40);
    unsafe { heap.release(a) };
    let grown = heap.store().len();

    let c = heap.allocate(40);

    assert_eq!(c, a);
    assert_eq!(heap.store().len(), grown);
    assert_eq!(layout(&heap), vec![(true, 40), (true, 40)]);

    unsafe {
      heap.release(b);
      heap.release(c);
    }
  }

  #[test]
  fn releasing_everything_empties_the_region() {
    let mut heap = heap(4096);

    let first = heap.allocate(40);
    let second = heap.allocate(40);

    unsafe { heap.release(first) };
    assert_eq!(layout(&heap), vec![(false, 40), (true, 40)]);

    unsafe { heap.release(second) };
    assert!(heap.is_empty());
    assert!(heap.list.tail.is_null());
    assert_eq!(heap.managed_size(), 0);
    assert_eq!(heap.store().len(), 0);
  }

  #[test]
  fn small_remainders_stay_with_the_block() {
    let mut heap = heap(4096);

    let big = heap.allocate(100);
    let guard = heap.allocate(16);
    unsafe { heap.release(big) };
    assert_eq!(layout(&heap), vec![(false, 104), (true, 16)]);

    // 104 - 96 leaves less than a minimal block.
    assert!(104 < round_up_size(90) + MIN_BLOCK_SIZE);
    let reused = heap.allocate(90);

    assert_eq!(reused, big);
    assert_eq!(block_of(reused).size, 104);
    assert_eq!(layout(&heap), vec![(true, 104), (true, 16)]);

    unsafe { heap.release(reused) };
    let split = heap.allocate(40);

    assert_eq!(split, big);
    assert_eq!(
      layout(&heap),
      vec![(true, 40), (false, 104 - 40 - HEADER_SIZE), (true, 16)]
    );

    unsafe {
      heap.release(split);
      heap.release(guard);
    }
    assert!(heap.is_empty());
  }

  #[test]
  fn release_merges_both_neighbors() {
    let mut heap = heap(4096);

    let a = heap.allocate(40);
    let b = heap.allocate(40);
    let c = heap.allocate(40);
    let d = heap.allocate(40);

    unsafe {
      heap.release(a);
      heap.release(c);
    }
    assert_eq!(
      layout(&heap),
      vec![(false, 40), (true, 40), (false, 40), (true, 40)]
    );

    unsafe { heap.release(b) };
    assert_eq!(layout(&heap), vec![(false, 3 * 40 + 2 * HEADER_SIZE), (true, 40)]);

    unsafe { heap.release(d) };
    assert!(heap.is_empty());
  }

  #[test]
  fn releasing_the_tail_shrinks_by_its_footprint() {
    let mut heap = heap(4096);

    let a = heap.allocate(40);
    let b = heap.allocate(200);
    let before = heap.store().len();

    unsafe { heap.release(b) };

    assert_eq!(heap.store().len(), before - (HEADER_SIZE + 200));
    assert_eq!(heap.managed_size(), heap.store().len());
    assert_eq!(layout(&heap), vec![(true, 40)]);

    unsafe { heap.release(a) };
  }

  #[test]
  fn freed_tail_merges_before_shrinking() {
    let mut heap = heap(4096);

    let a = heap.allocate(40);
    let b = heap.allocate(40);
    let c = heap.allocate(40);

    unsafe { heap.release(b) };
    unsafe { heap.release(c) };

    assert_eq!(layout(&heap), vec![(true, 40)]);
    assert_eq!(heap.store().len(), HEADER_SIZE + 40);

    unsafe { heap.release(a) };
  }

  #[test]
  fn exhaustion_is_reported_without_side_effects() {
    let mut heap = heap(128);

    let a = heap.allocate(40);
    let error = heap.try_allocate(200).unwrap_err();

    assert!(matches!(error, HeapError::Exhausted { requested, .. } if requested == HEADER_SIZE + 200));
    assert_eq!(layout(&heap), vec![(true, 40)]);

    unsafe { heap.release(a) };
  }

  // Arena whose shrinks can be refused, like a program break moved by someone else.
  struct StuckBreak {
    arena: Arena,
    refuse_shrink: bool,
  }

  unsafe impl BackingStore for StuckBreak {
    fn grow(
      &mut self,
      bytes: usize,
    ) -> Result<std::ptr::NonNull<u8>, HeapError> {
      self.arena.grow(bytes)
    }

    fn shrink(
      &mut self,
      bytes: usize,
    ) -> Result<(), HeapError> {
      if self.refuse_shrink {
        return Err(HeapError::Discontiguous);
      }
      self.arena.shrink(bytes)
    }
  }

  #[test]
  fn refused_shrink_keeps_the_free_tail() {
    let _ = env_logger::try_init();
    let mut heap = Heap::new(StuckBreak {
      arena: Arena::with_capacity(4096),
      refuse_shrink: true,
    });

    let a = heap.allocate(40);
    let b = heap.allocate(40);
    let managed = heap.managed_size();

    unsafe {
      heap.release(a);
      heap.release(b);
    }

    let blocks: Vec<(bool, usize)> = heap.blocks().map(|info| (info.used, info.size)).collect();
    assert_eq!(blocks, vec![(false, 40 + HEADER_SIZE + 40)]);
    assert_eq!(heap.managed_size(), managed);
    assert_eq!(heap.store().arena.len(), managed);
    heap.check_integrity();

    let reused = heap.allocate(40);
    assert_eq!(reused, a);
    assert_eq!(heap.store().arena.len(), managed);
    heap.check_integrity();

    heap.store.refuse_shrink = false;
    unsafe { heap.release(reused) };
    assert!(heap.is_empty());
    assert_eq!(heap.store().arena.len(), 0);
  }

  const FATAL_CHILD: &str = "RMALLOC_OUT_OF_MEMORY_CHILD";

  #[test]
  fn out_of_memory_is_fatal() {
    if std::env::var_os(FATAL_CHILD).is_some() {
      let mut heap = Heap::new(Arena::with_capacity(64));
      heap.allocate(1024);
      unreachable!("allocate returned after running out of memory");
    }

    let output = std::process::Command::new(std::env::current_exe().unwrap())
      .args(["--exact", "heap::tests::out_of_memory_is_fatal", "--nocapture"])
      .env(FATAL_CHILD, "1")
      .output()
      .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(stderr.contains("out of memory"), "stderr: {stderr}");
  }

  #[test]
  fn oversized_requests_are_refused() {
    let mut heap = heap(128);

    assert_eq!(
      heap.try_allocate(usize::MAX),
      Err(HeapError::RequestTooLarge { size: usize::MAX })
    );
    assert!(heap.is_empty());
  }

  #[test]
  fn payloads_are_aligned_and_writable() {
    let mut heap = heap(4096);

    let a = heap.allocate(3);
    let b = heap.allocate(33);

    assert_eq!(a as usize % SIZE_MULTIPLE, 0);
    assert_eq!(b as usize % SIZE_MULTIPLE, 0);

    unsafe {
      ptr::write_bytes(a, 0xAA, 16);
      ptr::write_bytes(b, 0xBB, 40);

      assert_eq!(*a.add(15), 0xAA);
      assert_eq!(*b, 0xBB);
      assert_eq!(block_of(a).size, 16);

      heap.release(a);
      heap.release(b);
    }
  }

  #[cfg(unix)]
  #[test]
  fn program_break_heap() {
    use crate::store::Brk;

    let _ = env_logger::try_init();
    let mut heap = Heap::new(Brk::new());

    let first = heap.try_allocate(64).unwrap();
    let second = heap.try_allocate(128).unwrap();

    unsafe {
      ptr::write_bytes(first, 1, 64);
      ptr::write_bytes(second, 2, 128);
      assert_eq!(*first.add(63), 1);
      assert_eq!(*second.add(127), 2);

      heap.release(first);
      let again = heap.try_allocate(64).unwrap();
      assert_eq!(again, first);

      heap.release(second);
      heap.release(again);
    }

    // The break may have been moved by someone else; the heap keeps its blocks then.
    assert!(heap.is_empty() || heap.blocks().all(|info| !info.used));
  }

  #[derive(Clone, Debug)]
  enum Op {
    Alloc(usize),
    Release(usize),
  }

  fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
      prop_oneof![
        (0usize..300).prop_map(Op::Alloc),
        any::<usize>().prop_map(Op::Release),
      ],
      0..200,
    )
  }

  proptest! {
    /// Random allocate/release sequences never break the block list, never
    /// hand out overlapping payloads, and leave nothing behind once every
    /// payload is released.
    #[test]
    fn random_workloads_keep_invariants(ops in ops()) {
      let mut heap = heap(1 << 20);
      let mut live: HashMap<usize, (*mut u8, usize, u8)> = HashMap::new();
      let mut next_id = 0usize;

      for op in ops {
        match op {
          Op::Alloc(size) => {
            let payload = heap.allocate(size);
            if size == 0 {
              prop_assert!(payload.is_null());
              continue;
            }

            let pattern = (next_id % 251) as u8;
            unsafe { ptr::write_bytes(payload, pattern, size) };
            live.insert(next_id, (payload, size, pattern));
            next_id += 1;
          }
          Op::Release(pick) => {
            if live.is_empty() {
              continue;
            }
            let mut ids: Vec<usize> = live.keys().copied().collect();
            ids.sort_unstable();
            let id = ids[pick % ids.len()];
            let (payload, _, _) = live.remove(&id).unwrap();
            unsafe { heap.release(payload) };
          }
        }

        heap.check_integrity();
        prop_assert_eq!(heap.managed_size(), heap.store().len());

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        for pair in blocks.windows(2) {
          prop_assert!(pair[0].used || pair[1].used);
        }
        if let Some(last) = blocks.last() {
          prop_assert!(last.used, "free block left at the top of the heap");
        }

        for &(payload, size, pattern) in live.values() {
          let bytes = unsafe { std::slice::from_raw_parts(payload, size) };
          prop_assert!(bytes.iter().all(|&byte| byte == pattern));
        }
      }

      for (_, (payload, _, _)) in live.drain() {
        unsafe { heap.release(payload) };
      }

      prop_assert!(heap.is_empty());
      prop_assert_eq!(heap.store().len(), 0);
    }
  }
}
