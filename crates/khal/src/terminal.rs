//! Terminal capability table and the active-terminal registry.
//!
//! A backend implements [`Terminal`] and reports which operations it
//! actually supports through [`Terminal::capabilities`]. The set is fixed
//! when the backend is constructed. Consumers never talk to a backend type
//! directly: they go through a [`Console`] obtained from the
//! [`TerminalRegistry`], which checks the capability set before every call.
//!
//! Missing write-like operations (`write_char`, `clear`, `set_cursor`) are
//! silent no-ops. Missing read-like operations fail with
//! [`TermError::Unsupported`].

use alloc::boxed::Box;
use bitflags::bitflags;
use core::fmt;
use spin::{Mutex, Once};

use crate::deadline::{Deadline, Forever};
use crate::serial::SerialError;

bitflags! {
    /// Slots of the capability table a backend fills in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const WRITE_CHAR = 1 << 0;
        const READ_AVAILABLE = 1 << 1;
        const READ_CHAR = 1 << 2;
        const CLEAR_SCREEN = 1 << 3;
        const QUERY_DIMENSIONS = 1 << 4;
        const SET_CURSOR = 1 << 5;
        const QUERY_CURSOR = 1 << 6;
    }
}

/// Cursor position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

/// Terminal and registry errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermError {
    /// The active backend does not provide this operation.
    Unsupported(Capabilities),
    /// No backend has been installed yet.
    NotInitialized,
    /// A backend is already installed.
    AlreadyInitialized,
    /// The backend's device could not be opened.
    Device(SerialError),
    /// A bounded read gave up before the reply was complete.
    TimedOut,
}

impl fmt::Display for TermError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermError::Unsupported(caps) => write!(f, "operation not supported ({:?})", caps),
            TermError::NotInitialized => f.write_str("no terminal installed"),
            TermError::AlreadyInitialized => f.write_str("a terminal is already installed"),
            TermError::Device(err) => write!(f, "terminal device init failed: {}", err),
            TermError::TimedOut => f.write_str("terminal did not answer in time"),
        }
    }
}

impl From<SerialError> for TermError {
    fn from(err: SerialError) -> Self {
        TermError::Device(err)
    }
}

/// A terminal backend: the capability table plus its context.
///
/// Default method bodies describe an absent slot, so a backend only
/// overrides what it supports. Callers should still consult
/// [`capabilities`](Terminal::capabilities) first; [`Console`] does.
pub trait Terminal: Send {
    /// Slots this backend provides. Must not change after construction.
    fn capabilities(&self) -> Capabilities;

    fn write_char(&mut self, _c: u8) {}

    /// Number of bytes that can be read without blocking.
    fn read_available(&mut self) -> Result<usize, TermError> {
        Err(TermError::Unsupported(Capabilities::READ_AVAILABLE))
    }

    fn read_char(&mut self, _deadline: &mut dyn Deadline) -> Result<u8, TermError> {
        Err(TermError::Unsupported(Capabilities::READ_CHAR))
    }

    fn clear(&mut self) {}

    fn dimensions(&mut self, _deadline: &mut dyn Deadline) -> Result<Dimensions, TermError> {
        Err(TermError::Unsupported(Capabilities::QUERY_DIMENSIONS))
    }

    fn set_cursor(&mut self, _pos: Position) {}

    fn cursor(&mut self, _deadline: &mut dyn Deadline) -> Result<Position, TermError> {
        Err(TermError::Unsupported(Capabilities::QUERY_CURSOR))
    }
}

/// Holds the active terminal. Populated once, read many times.
pub struct TerminalRegistry {
    slot: Once<Mutex<Box<dyn Terminal>>>,
}

impl TerminalRegistry {
    pub const fn new() -> Self {
        Self { slot: Once::new() }
    }

    /// Install `terminal` as the active backend.
    ///
    /// Fails with [`TermError::AlreadyInitialized`] if a backend is already
    /// installed; the rejected backend is dropped.
    pub fn set(&self, terminal: Box<dyn Terminal>) -> Result<(), TermError> {
        let mut installed = false;
        self.slot.call_once(|| {
            installed = true;
            Mutex::new(terminal)
        });
        if installed {
            Ok(())
        } else {
            Err(TermError::AlreadyInitialized)
        }
    }

    /// Handle to the active backend.
    pub fn get(&self) -> Result<Console<'_>, TermError> {
        let terminal = self.slot.get().ok_or(TermError::NotInitialized)?;
        let caps = terminal.lock().capabilities();
        Ok(Console { terminal, caps })
    }

    pub fn is_set(&self) -> bool {
        self.slot.is_completed()
    }
}

impl Default for TerminalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability-checked access to the active terminal.
///
/// Each operation takes the terminal lock for its own duration only. A
/// formatted write (`write!`) counts as one operation.
pub struct Console<'a> {
    terminal: &'a Mutex<Box<dyn Terminal>>,
    caps: Capabilities,
}

impl Console<'_> {
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn supports(&self, caps: Capabilities) -> bool {
        self.caps.contains(caps)
    }

    fn require(&self, cap: Capabilities) -> Result<(), TermError> {
        if self.supports(cap) {
            Ok(())
        } else {
            Err(TermError::Unsupported(cap))
        }
    }

    pub fn write_char(&self, c: u8) {
        if self.supports(Capabilities::WRITE_CHAR) {
            self.terminal.lock().write_char(c);
        }
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        if self.supports(Capabilities::WRITE_CHAR) {
            let mut terminal = self.terminal.lock();
            for &c in bytes {
                terminal.write_char(c);
            }
        }
    }

    pub fn read_available(&self) -> Result<usize, TermError> {
        self.require(Capabilities::READ_AVAILABLE)?;
        self.terminal.lock().read_available()
    }

    /// Blocks until a byte arrives.
    pub fn read_char(&self) -> Result<u8, TermError> {
        self.read_char_within(&mut Forever)
    }

    pub fn read_char_within(&self, deadline: &mut dyn Deadline) -> Result<u8, TermError> {
        self.require(Capabilities::READ_CHAR)?;
        self.terminal.lock().read_char(deadline)
    }

    pub fn clear(&self) {
        if self.supports(Capabilities::CLEAR_SCREEN) {
            self.terminal.lock().clear();
        }
    }

    pub fn set_cursor(&self, pos: Position) {
        if self.supports(Capabilities::SET_CURSOR) {
            self.terminal.lock().set_cursor(pos);
        }
    }

    /// Blocks until the terminal reports its cursor. A terminal that never
    /// answers hangs the caller; use [`cursor_within`](Self::cursor_within)
    /// when that is not acceptable.
    pub fn cursor(&self) -> Result<Position, TermError> {
        self.cursor_within(&mut Forever)
    }

    pub fn cursor_within(&self, deadline: &mut dyn Deadline) -> Result<Position, TermError> {
        self.require(Capabilities::QUERY_CURSOR)?;
        self.terminal.lock().cursor(deadline)
    }

    /// Blocks like [`cursor`](Self::cursor).
    pub fn dimensions(&self) -> Result<Dimensions, TermError> {
        self.dimensions_within(&mut Forever)
    }

    pub fn dimensions_within(&self, deadline: &mut dyn Deadline) -> Result<Dimensions, TermError> {
        self.require(Capabilities::QUERY_DIMENSIONS)?;
        self.terminal.lock().dimensions(deadline)
    }
}

impl fmt::Write for Console<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    /// Formats the whole message under one lock, so concurrent writers
    /// never interleave inside it.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        if !self.supports(Capabilities::WRITE_CHAR) {
            return Ok(());
        }
        let mut terminal = self.terminal.lock();
        fmt::write(&mut Locked(&mut **terminal), args)
    }
}

/// Character sink over an already locked terminal.
struct Locked<'a>(&'a mut dyn Terminal);

impl fmt::Write for Locked<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &c in s.as_bytes() {
            self.0.write_char(c);
        }
        Ok(())
    }
}
