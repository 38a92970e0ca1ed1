//! Virtual file system contract and the boot-time tree listing.
//!
//! The VFS itself is provided by another subsystem. Boot needs four things
//! from it: the root node, directory entries by index, child lookup by name,
//! and path traversal.

use alloc::string::String;
use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// Node type and attribute bits.
    ///
    /// The low three bits hold the node type (one value, not a set). The
    /// symlink bit can be combined with any type, so mask it off with
    /// [`kind`](NodeFlags::kind) before comparing types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        const FILE = 0x01;
        const DIRECTORY = 0x02;
        const CHAR_DEVICE = 0x03;
        const BLOCK_DEVICE = 0x04;
        const PIPE = 0x05;
        const MOUNTPOINT = 0x06;
        const SYMLINK = 0x08;
    }
}

impl NodeFlags {
    /// Node type with the symlink bit removed.
    pub fn kind(self) -> NodeFlags {
        self.difference(NodeFlags::SYMLINK)
    }

    /// Directories and mountpoints have children worth listing.
    pub fn has_children(self) -> bool {
        let kind = self.kind();
        kind == NodeFlags::DIRECTORY || kind == NodeFlags::MOUNTPOINT
    }
}

/// A resolved file system node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub ino: u64,
    pub flags: NodeFlags,
    /// Size in bytes.
    pub length: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: String,
}

/// What boot needs from the mounted VFS.
pub trait FileSystem {
    /// Root of the mounted tree, if anything is mounted.
    fn root(&self) -> Option<Node>;

    /// The `index`-th entry of `dir`. `None` marks the end of the listing.
    fn read_dir(&self, dir: &Node, index: usize) -> Option<DirEntry>;

    /// Resolve the child of `dir` called `name`.
    fn find_dir(&self, dir: &Node, name: &str) -> Option<Node>;

    /// Resolve an absolute path.
    fn traverse_path(&self, path: &str) -> Option<Node>;
}

/// `depth` tab characters.
struct Indent(usize);

impl fmt::Display for Indent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.0 {
            f.write_str("\t")?;
        }
        Ok(())
    }
}

/// Log every node below `dir`, one line per entry, and return how many
/// entries were listed.
///
/// Recurses into directories and mountpoints. There is no cycle check: a
/// mount graph that loops back on itself recurses until the stack runs out.
pub fn dir_list(fs: &dyn FileSystem, dir: &Node, depth: usize) -> usize {
    let mut listed = 0;
    for index in 0.. {
        let Some(entry) = fs.read_dir(dir, index) else {
            break;
        };
        let Some(node) = fs.find_dir(dir, &entry.name) else {
            log::warn!("{}: entry {} vanished during listing", dir.name, entry.name);
            continue;
        };

        log::info!(
            "ino {}:{}{} ({:#04x}), size {}",
            entry.ino,
            Indent(depth),
            entry.name,
            node.flags.bits(),
            node.length
        );
        listed += 1;

        if node.flags.has_children() {
            listed += dir_list(fs, &node, depth + 1);
        }
    }
    listed
}
