//! Device Status Report (cursor position) reply parser.
//!
//! After sending `ESC [ 6 n` the terminal answers `ESC [ row ; col R`.
//! On a shared or echoing line the answer can be preceded by arbitrary
//! bytes, so the parser skips anything it does not expect instead of
//! failing.
//!
//! There is no cap on the number of digits. An endless run of digits keeps
//! the parser in the same state forever; the accumulators saturate rather
//! than wrap.

use crate::terminal::Position;

/// Escape sequence that requests a cursor position report.
pub const REQUEST: &[u8] = b"\x1b[6n";

const ESC: u8 = 0x1B;

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingEscape,
    AwaitingBracket,
    ReadingRow,
    ReadingColumn,
    Done,
}

/// Byte-fed cursor position report decoder.
#[derive(Debug, Clone)]
pub struct CursorReport {
    state: State,
    row: usize,
    column: usize,
}

impl CursorReport {
    pub const fn new() -> Self {
        Self {
            state: State::AwaitingEscape,
            row: 0,
            column: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feed one byte. Returns the position once the terminating `R` has been
    /// consumed; the caller must stop feeding at that point.
    pub fn feed(&mut self, byte: u8) -> Option<Position> {
        match (self.state, byte) {
            (State::AwaitingEscape, ESC) => self.state = State::AwaitingBracket,
            (State::AwaitingBracket, b'[') => self.state = State::ReadingRow,
            (State::ReadingRow, b';') => self.state = State::ReadingColumn,
            (State::ReadingRow, b'0'..=b'9') => self.row = accumulate(self.row, byte),
            (State::ReadingColumn, b'R') => {
                self.state = State::Done;
                return Some(Position::new(self.column, self.row));
            }
            (State::ReadingColumn, b'0'..=b'9') => self.column = accumulate(self.column, byte),
            (State::Done, _) => return Some(Position::new(self.column, self.row)),
            _ => {}
        }
        None
    }
}

impl Default for CursorReport {
    fn default() -> Self {
        Self::new()
    }
}

fn accumulate(value: usize, digit: u8) -> usize {
    value.saturating_mul(10).saturating_add(usize::from(digit - b'0'))
}
