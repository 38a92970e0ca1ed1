// =============================================================================
// SysX - Standard I/O
// =============================================================================
//
// The kernel's one terminal slot, and the hook that routes `log` output to
// it. Boot fills `TERMINAL` during terminal bring-up; until then log
// records have nowhere to go and are dropped.
// =============================================================================

use khal::TerminalRegistry;
use log::{LevelFilter, SetLoggerError};

/// The active kernel terminal.
pub static TERMINAL: TerminalRegistry = TerminalRegistry::new();

/// Route the `log` facade to `registry`.
///
/// Call once, before the boot sequencer runs. A second call fails with the
/// `log` crate's error and changes nothing.
pub fn stdio_init(registry: &'static TerminalRegistry, level: LevelFilter) -> Result<(), SetLoggerError> {
    klog::init(registry, level)
}
