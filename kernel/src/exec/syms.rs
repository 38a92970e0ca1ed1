//! Kernel symbol table.
//!
//! Filled by the loader from the kernel's symbol file.

use alloc::string::String;
use alloc::vec::Vec;

/// A named address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
}

/// Growable list of symbols, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Empty table with room for `capacity` symbols before it grows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            symbols: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, address: u64) {
        self.symbols.push(Symbol {
            name: name.into(),
            address,
        });
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.symbols.capacity()
    }

    /// First symbol called `name`.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}
