//! Executable loading contract.
//!
//! The ELF loader lives in its own subsystem. Boot hands it the kernel's
//! symbol file and lets it fill the kernel symbol table.

pub mod syms;

pub use syms::{Symbol, SymbolTable};

use core::fmt;

use crate::fs::Node;

/// Why a loader gave up on an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The node could not be read.
    Io,
    /// Not a loadable ELF image.
    BadImage,
    /// The requested entry symbol is not defined in the image.
    MissingEntry,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io => f.write_str("read error"),
            LoadError::BadImage => f.write_str("not a loadable ELF image"),
            LoadError::MissingEntry => f.write_str("entry symbol not found"),
        }
    }
}

/// Loads an ELF image, adding the symbols it defines to a table.
pub trait SymbolLoader {
    fn load(&mut self, node: &Node, entry: &str, symbols: &mut SymbolTable) -> Result<(), LoadError>;
}
