//! Memory manager contract.
//!
//! The physical and virtual memory managers live outside this crate. Boot
//! only needs to switch them on, physical first.

/// Physical + virtual memory bring-up.
pub trait MemoryManager {
    /// Build the physical frame allocator.
    fn init_physical(&mut self);

    /// Set up kernel page tables. Runs after [`init_physical`](Self::init_physical).
    fn init_virtual(&mut self);
}
