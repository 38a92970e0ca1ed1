//! Terminal backend over a serial channel.
//!
//! Talks ANSI/VT100 to the emulator on the other end of the line. Cursor
//! and size queries are answered by the remote side, so they only work when
//! an interactive, escape-sequence-capable terminal is attached.

use alloc::boxed::Box;
use core::fmt::{self, Write};

use crate::deadline::Deadline;
use crate::dsr::{self, CursorReport};
use crate::serial::{SerialChannel, SerialConfig};
use crate::terminal::{Capabilities, Dimensions, Position, TermError, Terminal, TerminalRegistry};

/// Erase the entire screen, then home the cursor.
pub const CLEAR_SEQUENCE: &[u8] = b"\x1b[2J\x1b[H";

/// Cursor target used to find the bottom-right corner. Terminals clamp it.
const FAR_CORNER: Position = Position::new(1000, 1000);

/// Serial terminal settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialTermConfig {
    pub serial: SerialConfig,
    /// Emit CR before every LF.
    pub crnl: bool,
    /// Provide the read slots.
    pub input: bool,
    /// Provide the clear slot (and clear on bring-up).
    pub clear: bool,
    /// Provide cursor placement, cursor query and size query.
    pub cursor: bool,
}

impl SerialTermConfig {
    pub const DEFAULT: Self = Self {
        serial: SerialConfig::DEFAULT,
        crnl: true,
        input: true,
        clear: true,
        cursor: true,
    };

    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::WRITE_CHAR;
        if self.input {
            caps |= Capabilities::READ_AVAILABLE | Capabilities::READ_CHAR;
        }
        if self.clear {
            caps |= Capabilities::CLEAR_SCREEN;
        }
        if self.cursor {
            caps |= Capabilities::SET_CURSOR
                | Capabilities::QUERY_CURSOR
                | Capabilities::QUERY_DIMENSIONS;
        }
        caps
    }
}

impl Default for SerialTermConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// ANSI terminal reached over a [`SerialChannel`].
pub struct SerialTerminal<C> {
    channel: C,
    crnl: bool,
    caps: Capabilities,
}

impl<C: SerialChannel> SerialTerminal<C> {
    /// Open `channel` with the configured line parameters and clear the
    /// screen if the clear slot is enabled.
    pub fn open(mut channel: C, config: &SerialTermConfig) -> Result<Self, TermError> {
        channel.open(&config.serial)?;

        let mut terminal = Self {
            channel,
            crnl: config.crnl,
            caps: config.capabilities(),
        };
        if terminal.caps.contains(Capabilities::CLEAR_SCREEN) {
            terminal.channel.put_bytes(CLEAR_SEQUENCE);
        }
        Ok(terminal)
    }

    fn recv(&mut self, deadline: &mut dyn Deadline) -> Result<u8, TermError> {
        loop {
            if let Some(byte) = self.channel.try_get_byte() {
                return Ok(byte);
            }
            if deadline.expired() {
                return Err(TermError::TimedOut);
            }
            core::hint::spin_loop();
        }
    }

    fn query_cursor(&mut self, deadline: &mut dyn Deadline) -> Result<Position, TermError> {
        self.channel.put_bytes(dsr::REQUEST);

        let mut report = CursorReport::new();
        loop {
            let byte = self.recv(deadline)?;
            if let Some(pos) = report.feed(byte) {
                return Ok(pos);
            }
        }
    }

    fn place_cursor(&mut self, pos: Position) {
        // Raw writer never fails.
        let _ = write!(Raw(&mut self.channel), "\x1b[{};{}H", pos.y, pos.x);
    }
}

impl<C: SerialChannel + Send> Terminal for SerialTerminal<C> {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn write_char(&mut self, c: u8) {
        if self.crnl && c == b'\n' {
            self.channel.put_byte(b'\r');
        }
        self.channel.put_byte(c);
    }

    /// 1 if the line looks alive, 0 otherwise.
    ///
    /// This samples the transmitter's "ready for a byte" flag, not the
    /// receive buffer, so it is not an input depth and a 1 does not mean a
    /// byte is waiting.
    // FIXME: sample the receiver's data-ready flag instead of the
    // transmitter.
    fn read_available(&mut self) -> Result<usize, TermError> {
        Ok(usize::from(self.channel.can_write()))
    }

    fn read_char(&mut self, deadline: &mut dyn Deadline) -> Result<u8, TermError> {
        self.recv(deadline)
    }

    fn clear(&mut self) {
        self.channel.put_bytes(CLEAR_SEQUENCE);
    }

    /// Moves the cursor to the far corner, reads back where the terminal
    /// clamped it, and puts it back. The cursor visibly jumps while this
    /// runs.
    fn dimensions(&mut self, deadline: &mut dyn Deadline) -> Result<Dimensions, TermError> {
        let saved = self.query_cursor(deadline)?;
        self.place_cursor(FAR_CORNER);
        let corner = self.query_cursor(deadline);
        self.place_cursor(saved);

        let corner = corner?;
        Ok(Dimensions {
            width: corner.x.saturating_add(1),
            height: corner.y.saturating_add(1),
        })
    }

    fn set_cursor(&mut self, pos: Position) {
        self.place_cursor(pos);
    }

    fn cursor(&mut self, deadline: &mut dyn Deadline) -> Result<Position, TermError> {
        self.query_cursor(deadline)
    }
}

/// Unbuffered formatter straight onto the channel, bypassing CR-NL
/// translation.
struct Raw<'a, C>(&'a mut C);

impl<C: SerialChannel> fmt::Write for Raw<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_bytes(s.as_bytes());
        Ok(())
    }
}

/// Bring up the serial terminal on `channel` and make it the active
/// terminal.
pub fn init<C>(channel: C, config: &SerialTermConfig, registry: &TerminalRegistry) -> Result<(), TermError>
where
    C: SerialChannel + Send + 'static,
{
    let terminal = SerialTerminal::open(channel, config)?;
    registry.set(Box::new(terminal))
}
