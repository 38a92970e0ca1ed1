//! Serial channel contract and line configuration.
//!
//! A [`SerialChannel`] is the byte-level transport a terminal backend sits
//! on. The terminal owns its channel exclusively; nothing else may write to
//! the same port while a terminal is installed.

use bitflags::bitflags;
use core::fmt;

/// Input clock of the 16550 divided by 16. Baud rates are derived from it
/// with an integer divisor.
pub const UART_BASE_RATE: u32 = 115_200;

/// Parity mode of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    /// Parity bit always 1.
    Mark,
    /// Parity bit always 0.
    Space,
}

bitflags! {
    /// 16550 Line Control Register layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineControl: u8 {
        /// Word length select, bits 0-1 (`data_bits - 5`).
        const WORD_LENGTH = 0b0000_0011;
        /// Two stop bits instead of one.
        const TWO_STOP_BITS = 1 << 2;
        const PARITY_ENABLE = 1 << 3;
        const EVEN_PARITY = 1 << 4;
        const STICK_PARITY = 1 << 5;
        const BREAK = 1 << 6;
        /// Divisor Latch Access Bit.
        const DLAB = 1 << 7;
    }
}

/// Errors raised while opening a serial channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// Data bits outside 5..=8.
    InvalidDataBits(u8),
    /// Stop bits other than 1 or 2.
    InvalidStopBits(u8),
    /// Zero, or not an exact divisor of the base rate.
    InvalidBaud(u32),
    /// The channel has no port with this identifier.
    NoSuchPort(u8),
    /// The loopback self-test did not echo the test byte.
    LoopbackFailed,
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialError::InvalidDataBits(bits) => write!(f, "unsupported data bit count {}", bits),
            SerialError::InvalidStopBits(bits) => write!(f, "unsupported stop bit count {}", bits),
            SerialError::InvalidBaud(baud) => write!(f, "unsupported baud rate {}", baud),
            SerialError::NoSuchPort(port) => write!(f, "no serial port {}", port),
            SerialError::LoopbackFailed => f.write_str("loopback self-test failed"),
        }
    }
}

/// Fully resolved line parameters for a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port identifier, interpreted by the channel (0 = first port).
    pub port: u8,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub baud: u32,
}

impl SerialConfig {
    /// First port, 115200 baud, 8N1.
    pub const DEFAULT: Self = Self {
        port: 0,
        data_bits: 8,
        stop_bits: 1,
        parity: Parity::None,
        baud: UART_BASE_RATE,
    };

    /// Check that every field holds a value the hardware can be programmed
    /// with.
    pub fn validate(&self) -> Result<(), SerialError> {
        if !(5..=8).contains(&self.data_bits) {
            return Err(SerialError::InvalidDataBits(self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(SerialError::InvalidStopBits(self.stop_bits));
        }
        self.divisor().map(|_| ())
    }

    /// Baud rate divisor for the 16550 divisor latch.
    pub fn divisor(&self) -> Result<u16, SerialError> {
        if self.baud == 0 || UART_BASE_RATE % self.baud != 0 {
            return Err(SerialError::InvalidBaud(self.baud));
        }
        u16::try_from(UART_BASE_RATE / self.baud).map_err(|_| SerialError::InvalidBaud(self.baud))
    }

    /// Line Control Register value (DLAB clear) for these parameters.
    pub fn line_control(&self) -> Result<LineControl, SerialError> {
        self.validate()?;

        let mut lcr = LineControl::from_bits_retain(self.data_bits - 5);
        if self.stop_bits == 2 {
            lcr |= LineControl::TWO_STOP_BITS;
        }
        lcr |= match self.parity {
            Parity::None => LineControl::empty(),
            Parity::Odd => LineControl::PARITY_ENABLE,
            Parity::Even => LineControl::PARITY_ENABLE | LineControl::EVEN_PARITY,
            Parity::Mark => LineControl::PARITY_ENABLE | LineControl::STICK_PARITY,
            Parity::Space => {
                LineControl::PARITY_ENABLE | LineControl::EVEN_PARITY | LineControl::STICK_PARITY
            }
        };
        Ok(lcr)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Byte-level serial transport.
pub trait SerialChannel {
    /// Program the port with `config`. Must be called before any I/O.
    fn open(&mut self, config: &SerialConfig) -> Result<(), SerialError>;

    /// Transmit one byte, waiting for the transmitter if necessary.
    fn put_byte(&mut self, byte: u8);

    /// Transmit a byte string.
    fn put_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_byte(byte);
        }
    }

    /// Take one received byte if there is one. Never blocks.
    fn try_get_byte(&mut self) -> Option<u8>;

    /// Wait for a received byte.
    fn get_byte(&mut self) -> u8 {
        loop {
            if let Some(byte) = self.try_get_byte() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }

    /// Whether the transmitter can take another byte right now.
    fn can_write(&mut self) -> bool;
}
