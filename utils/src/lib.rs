//! This module implements features common to the reiserfs command-line tools.

pub mod disk;
pub mod prompt;
pub mod size;
pub mod util;

use std::fmt;
use std::process::exit;

/// Writes an error to stderr, then exits with the given status code.
pub fn error<M: fmt::Display>(bin: &str, code: i32, msg: M) -> ! {
    eprintln!("{bin}: {msg}");
    exit(code);
}
