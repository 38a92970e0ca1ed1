//! Hardware Abstraction Layer.
//!
//! Serial channels, the terminal capability table, and the serial terminal
//! backend that speaks ANSI escape sequences to whatever emulator sits on
//! the other end of the wire.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod deadline;
pub mod dsr;
pub mod serial;
pub mod term_serial;
pub mod terminal;

#[cfg(target_arch = "x86_64")]
pub mod uart;

#[cfg(any(test, feature = "test_mocks"))]
pub mod mock;

pub use deadline::{Deadline, Forever, PollBudget};
pub use serial::{Parity, SerialChannel, SerialConfig, SerialError};
pub use term_serial::{SerialTermConfig, SerialTerminal};
pub use terminal::{Capabilities, Console, Dimensions, Position, TermError, Terminal, TerminalRegistry};

#[cfg(target_arch = "x86_64")]
pub use uart::Uart16550;
