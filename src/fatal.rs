use std::{fmt, io::Write, process};

use crate::dump::{COLOR_RED, COLOR_RESET};

/// Reports `message` in red on stderr and terminates the process with status 1.
#[cold]
pub fn fatal(message: fmt::Arguments<'_>) -> ! {
  log::error!("{}", message);

  let stderr = std::io::stderr();
  let mut stderr = stderr.lock();
  let _ = writeln!(stderr, "{COLOR_RED}{message}{COLOR_RESET}");

  process::exit(1)
}

/// Formats its arguments like `format!` and hands them to [`fatal`](crate::fatal::fatal).
#[macro_export]
macro_rules! fatal {
  ($($arg:tt)*) => {
    $crate::fatal::fatal(format_args!($($arg)*))
  };
}
