//! `reiserfsck`: consistency checking is out of scope for this engine — the
//! tree-traversal and bitmap primitives it would be built on live in
//! `reiserfs`, but no check/repair pass is implemented here.

use std::process::exit;

fn main() {
    eprintln!("reiserfsck: not implemented");
    exit(0xff);
}
