use std::{io::Read, ptr};

use rmalloc::{Brk, HEADER_SIZE, Heap};

/// Waits until the user presses ENTER, when run with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap`, `gdb`,
/// or just visually track how allocations change the program break.
fn block_until_enter_pressed(step: bool) {
  if !step {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    Brk::program_break(),
  );
}

fn main() {
  let step = std::env::args().any(|arg| arg == "--step");
  let mut heap = Heap::new(Brk::new());

  print_program_break("start");
  heap.dump("initial state");
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) A one byte request still gets a full 16 byte block.
  // --------------------------------------------------------------------
  let first = heap.allocate(1);
  println!("\n[1] allocate(1) -> {:?}, header is {} bytes", first, HEADER_SIZE);
  heap.dump("after allocate(1)");
  print_program_break("1");
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Two 40 byte blocks, then write through them.
  // --------------------------------------------------------------------
  let second = heap.allocate(40);
  let third = heap.allocate(40);
  unsafe {
    ptr::write_bytes(second, 0xAB, 40);
    ptr::write_bytes(third, 0xCD, 40);
  }
  println!("\n[2] allocate(40) twice -> {:?}, {:?}", second, third);
  heap.dump("after two allocate(40)");
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Free the middle block: it stays in the list as a hole.
  // --------------------------------------------------------------------
  unsafe { heap.release(second) };
  heap.dump("after releasing the first allocate(40)");
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) First fit: the next 40 byte request reuses the hole.
  // --------------------------------------------------------------------
  let fourth = heap.allocate(40);
  println!(
    "\n[4] reused the hole? {}",
    if fourth == second { "yes" } else { "no" }
  );
  heap.dump("after allocate(40)");
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 5) A large block moves the program break; releasing it moves it back.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let big = heap.allocate(64 * 1024);
  print_program_break("after large alloc");
  unsafe { heap.release(big) };
  print_program_break("after large release");
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 6) Release everything: neighbors coalesce and the heap shrinks to nothing.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(first);
    heap.release(third);
    heap.release(fourth);
  }
  heap.dump("after releasing everything");
  print_program_break("end");
}
