//! 16550 UART serial channel (COM1-COM4).
//!
//! Register map, offsets from the port base:
//!
//! | off | read            | write            | DLAB=1        |
//! |-----|-----------------|------------------|---------------|
//! | +0  | receive buffer  | transmit holding | divisor low   |
//! | +1  | int. enable     | int. enable      | divisor high  |
//! | +2  | int. ident      | FIFO control     |               |
//! | +3  | line control    | line control     |               |
//! | +4  | modem control   | modem control    |               |
//! | +5  | line status     |                  |               |
//!
//! The port is polled; interrupts stay disabled.

use x86_64::instructions::port::Port;

use crate::serial::{LineControl, SerialChannel, SerialConfig, SerialError};

/// Base I/O ports of COM1..COM4, indexed by port identifier.
const COM_BASES: [u16; 4] = [0x3F8, 0x2F8, 0x3E8, 0x2E8];

const DATA_REG: u16 = 0;
const INT_ENABLE_REG: u16 = 1;
const FIFO_CTRL_REG: u16 = 2;
const LINE_CTRL_REG: u16 = 3;
const MODEM_CTRL_REG: u16 = 4;
const LINE_STATUS_REG: u16 = 5;

const LSR_RX_READY: u8 = 1 << 0;
const LSR_TX_EMPTY: u8 = 1 << 5;

/// Enable FIFOs, clear both, 14-byte trigger.
const FIFO_ENABLE_CLEAR_14: u8 = 0xC7;
/// DTR + RTS + OUT2.
const MCR_NORMAL: u8 = 0x0B;
/// Loopback with RTS + OUT1 + OUT2.
const MCR_LOOPBACK: u8 = 0x1E;
/// DTR + RTS + OUT1 + OUT2.
const MCR_RUNNING: u8 = 0x0F;
const LOOPBACK_PROBE: u8 = 0xAE;

/// A polled 16550 UART.
///
/// Does nothing until [`open`](SerialChannel::open) has succeeded.
#[derive(Debug)]
pub struct Uart16550 {
    base: Option<u16>,
}

impl Uart16550 {
    pub const fn new() -> Self {
        Self { base: None }
    }

    fn read_reg(base: u16, offset: u16) -> u8 {
        let mut port = Port::<u8>::new(base + offset);
        // SAFETY: `base` is one of the standard COM ports; reading a UART
        // register has no side effects beyond the UART itself.
        unsafe { port.read() }
    }

    fn write_reg(base: u16, offset: u16, value: u8) {
        let mut port = Port::<u8>::new(base + offset);
        // SAFETY: as above, the port belongs to the UART being programmed.
        unsafe { port.write(value) }
    }
}

impl Default for Uart16550 {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialChannel for Uart16550 {
    fn open(&mut self, config: &SerialConfig) -> Result<(), SerialError> {
        let base = *COM_BASES
            .get(usize::from(config.port))
            .ok_or(SerialError::NoSuchPort(config.port))?;
        let divisor = config.divisor()?;
        let lcr = config.line_control()?;

        self.base = None;
        Self::write_reg(base, INT_ENABLE_REG, 0x00);

        Self::write_reg(base, LINE_CTRL_REG, LineControl::DLAB.bits());
        let [low, high] = divisor.to_le_bytes();
        Self::write_reg(base, DATA_REG, low);
        Self::write_reg(base, INT_ENABLE_REG, high);
        Self::write_reg(base, LINE_CTRL_REG, lcr.bits());

        Self::write_reg(base, FIFO_CTRL_REG, FIFO_ENABLE_CLEAR_14);
        Self::write_reg(base, MODEM_CTRL_REG, MCR_NORMAL);

        Self::write_reg(base, MODEM_CTRL_REG, MCR_LOOPBACK);
        Self::write_reg(base, DATA_REG, LOOPBACK_PROBE);
        if Self::read_reg(base, DATA_REG) != LOOPBACK_PROBE {
            return Err(SerialError::LoopbackFailed);
        }

        Self::write_reg(base, MODEM_CTRL_REG, MCR_RUNNING);
        self.base = Some(base);
        Ok(())
    }

    fn put_byte(&mut self, byte: u8) {
        let Some(base) = self.base else { return };
        while Self::read_reg(base, LINE_STATUS_REG) & LSR_TX_EMPTY == 0 {
            core::hint::spin_loop();
        }
        Self::write_reg(base, DATA_REG, byte);
    }

    fn try_get_byte(&mut self) -> Option<u8> {
        let base = self.base?;
        if Self::read_reg(base, LINE_STATUS_REG) & LSR_RX_READY != 0 {
            Some(Self::read_reg(base, DATA_REG))
        } else {
            None
        }
    }

    fn can_write(&mut self) -> bool {
        match self.base {
            Some(base) => Self::read_reg(base, LINE_STATUS_REG) & LSR_TX_EMPTY != 0,
            None => false,
        }
    }
}
