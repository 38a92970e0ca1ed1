//! File system access used during boot.

pub mod vfs;

pub use vfs::{DirEntry, FileSystem, Node, NodeFlags};
