// =============================================================================
// SysX - Kernel Bootstrap
// =============================================================================
//
// Everything between "the CPU is ours" and "the scheduler can take over":
//
//   stdio    the terminal slot and the logger hooked onto it
//   boot     the staged bring-up sequence (`kinit`)
//   arch     the per-target init hook
//   memory   physical/virtual memory bring-up hook
//   fs       the VFS contract and the boot-time tree listing
//   exec     the loader contract and the kernel symbol table
//
// A port wires these together from its entry point:
//
//   stdio_init(&TERMINAL, LevelFilter::Info)?;
//   kinit(BootConfig::DEFAULT, &TERMINAL, bring_up_uart, &mut hooks)?;
//
// Everything here is `no_std` + `alloc`. Host builds (`cargo test`) link
// std so the test harness can run.
// =============================================================================

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod boot;
pub mod exec;
pub mod fs;
pub mod memory;
pub mod stdio;

pub use arch::{Target, TargetError};
pub use boot::{BootConfig, BootError, BootHooks, BootReport, BootSequencer, BootStage, SymbolLoad, kinit};
pub use exec::{LoadError, Symbol, SymbolLoader, SymbolTable};
pub use fs::{DirEntry, FileSystem, Node, NodeFlags};
pub use memory::MemoryManager;
pub use stdio::{TERMINAL, stdio_init};
