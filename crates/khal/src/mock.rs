//! Emulated serial line with an ANSI terminal on the far end.
//!
//! Records everything transmitted, follows cursor movement, clamps moves to
//! the screen size and answers cursor position requests the way a VT100
//! would. Clones share one wire, so a test can keep a handle after moving
//! the channel into a terminal or a registry.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Write;
use spin::Mutex;

use crate::serial::{SerialChannel, SerialConfig, SerialError};
use crate::terminal::Position;

const ESC: u8 = 0x1B;

#[derive(Debug)]
struct Wire {
    cols: usize,
    rows: usize,
    cursor: Position,
    output: Vec<u8>,
    input: VecDeque<u8>,
    escape: Vec<u8>,
    opened: Option<SerialConfig>,
    open_error: Option<SerialError>,
    writable: bool,
    answering: bool,
    answers_left: Option<usize>,
    after_reply: Vec<u8>,
}

impl Wire {
    fn receive(&mut self, byte: u8) {
        if !self.escape.is_empty() || byte == ESC {
            self.escape.push(byte);
            self.step_escape();
            return;
        }
        match byte {
            b'\r' => self.cursor.x = 1,
            b'\n' => self.cursor.y = (self.cursor.y + 1).min(self.rows),
            0x20..=0x7E => self.cursor.x = (self.cursor.x + 1).min(self.cols),
            _ => {}
        }
    }

    fn step_escape(&mut self) {
        let complete = match self.escape.as_slice() {
            [ESC] | [ESC, b'['] => Some(false),
            [ESC, b'[', .., last] => Some((0x40..=0x7E).contains(last)),
            _ => None,
        };
        match complete {
            Some(true) => {
                let seq = core::mem::take(&mut self.escape);
                let (command, params) = (seq[seq.len() - 1], &seq[2..seq.len() - 1]);
                self.run_csi(params, command);
            }
            Some(false) => {}
            None => self.escape.clear(),
        }
    }

    fn run_csi(&mut self, params: &[u8], command: u8) {
        let mut fields = params.split(|&b| b == b';').map(parse_number);
        match command {
            b'H' => {
                let row = fields.next().flatten().unwrap_or(1);
                let col = fields.next().flatten().unwrap_or(1);
                self.cursor = Position::new(col.clamp(1, self.cols), row.clamp(1, self.rows));
            }
            b'n' if params == b"6" => self.report_cursor(),
            _ => {}
        }
    }

    fn report_cursor(&mut self) {
        if !self.answering {
            return;
        }
        if let Some(left) = self.answers_left.as_mut() {
            if *left == 0 {
                return;
            }
            *left -= 1;
        }
        let mut reply = alloc::string::String::new();
        let _ = write!(reply, "\x1b[{};{}R", self.cursor.y, self.cursor.x);
        self.input.extend(reply.bytes());
        let after = core::mem::take(&mut self.after_reply);
        self.input.extend(after);
    }
}

fn parse_number(field: &[u8]) -> Option<usize> {
    if field.is_empty() {
        return None;
    }
    core::str::from_utf8(field).ok()?.parse().ok()
}

/// Shared handle to an emulated serial line.
#[derive(Debug, Clone)]
pub struct MockSerial {
    wire: Arc<Mutex<Wire>>,
}

impl MockSerial {
    /// A `cols` x `rows` terminal with the cursor at the top-left corner.
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            wire: Arc::new(Mutex::new(Wire {
                cols: cols.max(1),
                rows: rows.max(1),
                cursor: Position::new(1, 1),
                output: Vec::new(),
                input: VecDeque::new(),
                escape: Vec::new(),
                opened: None,
                open_error: None,
                writable: true,
                answering: true,
                answers_left: None,
                after_reply: Vec::new(),
            })),
        }
    }

    /// Drain and return everything transmitted so far.
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut self.wire.lock().output)
    }

    pub fn cursor(&self) -> Position {
        self.wire.lock().cursor
    }

    /// Configuration the channel was last opened with.
    pub fn opened_with(&self) -> Option<SerialConfig> {
        self.wire.lock().opened
    }

    /// Make the next `open` fail with `err`.
    pub fn fail_open(&self, err: SerialError) {
        self.wire.lock().open_error = Some(err);
    }

    /// Queue bytes as if typed on the remote terminal.
    pub fn push_input(&self, bytes: &[u8]) {
        self.wire.lock().input.extend(bytes.iter().copied());
    }

    /// Queue bytes that arrive right behind the next cursor report.
    pub fn queue_after_reply(&self, bytes: &[u8]) {
        self.wire.lock().after_reply.extend_from_slice(bytes);
    }

    /// Stop (or resume) answering cursor position requests.
    pub fn set_answering(&self, answering: bool) {
        self.wire.lock().answering = answering;
    }

    /// Answer only the next `count` cursor position requests.
    pub fn answer_next(&self, count: usize) {
        self.wire.lock().answers_left = Some(count);
    }

    pub fn set_writable(&self, writable: bool) {
        self.wire.lock().writable = writable;
    }
}

impl SerialChannel for MockSerial {
    fn open(&mut self, config: &SerialConfig) -> Result<(), SerialError> {
        let mut wire = self.wire.lock();
        if let Some(err) = wire.open_error.take() {
            return Err(err);
        }
        config.validate()?;
        wire.opened = Some(*config);
        Ok(())
    }

    fn put_byte(&mut self, byte: u8) {
        let mut wire = self.wire.lock();
        wire.output.push(byte);
        wire.receive(byte);
    }

    fn try_get_byte(&mut self) -> Option<u8> {
        self.wire.lock().input.pop_front()
    }

    fn can_write(&mut self) -> bool {
        self.wire.lock().writable
    }
}
