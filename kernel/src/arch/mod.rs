// =============================================================================
// SysX - Target Hooks
// =============================================================================
//
// Each board/architecture port supplies one `Target`. The boot sequencer
// calls it once, after memory and the terminal are up, to bring up whatever
// the port needs (interrupt controllers, timers, the root file system...).
//
// A failing target init is the one unconditionally fatal boot step.
// =============================================================================

use core::fmt;

/// Failure code reported by a target's init routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetError {
    pub code: i32,
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target init returned {}", self.code)
    }
}

/// Architecture- or board-specific system initialization.
pub trait Target {
    fn init(&mut self) -> Result<(), TargetError>;
}
