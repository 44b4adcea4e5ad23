//! A user-space engine for the ReiserFS v3 on-disk format (3.5/3.6, with an
//! optional externally-relocated journal): packed structures, the balanced
//! tree, the block bitmap, the segment relocator, the journal, and the
//! filesystem façade that ties them together for `mkfs`/`resizefs`/`tunefs`/
//! `cpfs`/`fsck`.
//!
//! Write support through the tree (inserting or deleting items, rebalancing)
//! is out of scope: `fs::Filesystem::create` lays out only the initial
//! two-item root. Journal *replay* is likewise out of scope — `journal`
//! discovers and reads through pending transactions but never writes them
//! back to their home blocks.

pub mod bitmap;
pub mod block;
pub mod device;
pub mod dir;
pub mod error;
pub mod file;
pub mod fs;
pub mod gauge;
pub mod hashes;
pub mod journal;
pub mod key;
pub mod node;
pub mod object;
pub mod path;
pub mod segment;
pub mod super_block;
pub mod tree;

pub use device::Device;
pub use error::Error;
pub use error::Result;
pub use fs::Filesystem;
