/*
 * uart.rs - PL011 UART serial console driver
 *
 * The console is the first device brought up and the only one usable before
 * the mailbox is known to work, so it depends on nothing but the register
 * bus and the GPIO pin mux.
 *
 * Wiring: GPIO 14 (TXD0) / GPIO 15 (RXD0) on ALT0, 115200 8N1, FIFOs on,
 * all interrupts masked (polling only).
 */

use bitflags::bitflags;
use core::fmt;
use thiserror::Error;

use super::gpio::{self, Function};
use super::mmio::{Register, RegisterBus};
use crate::config::{CONSOLE_BAUD_RATE, UART_RX_POLL_LIMIT, UART_TX_POLL_LIMIT};
use crate::hardwareselect::{UART_CLOCK_HZ, UART0_BASE};
use crate::utils::poll::PollBudget;

const DR: Register = Register::new(UART0_BASE + 0x00);
const FR: Register = Register::new(UART0_BASE + 0x18);
const IBRD: Register = Register::new(UART0_BASE + 0x24);
const FBRD: Register = Register::new(UART0_BASE + 0x28);
const LCRH: Register = Register::new(UART0_BASE + 0x2C);
const CR: Register = Register::new(UART0_BASE + 0x30);
const IMSC: Register = Register::new(UART0_BASE + 0x38);
const ICR: Register = Register::new(UART0_BASE + 0x44);

bitflags! {
    /// FR - flag register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        const BUSY = 1 << 3;
        const RXFE = 1 << 4;
        const TXFF = 1 << 5;
        const RXFF = 1 << 6;
        const TXFE = 1 << 7;
    }

    /// LCRH - line control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineControl: u32 {
        const FEN = 1 << 4;
        const WLEN_8 = 0b11 << 5;
    }

    /// CR - control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        const UARTEN = 1 << 0;
        const LBE = 1 << 7;
        const TXE = 1 << 8;
        const RXE = 1 << 9;
    }
}

// All eleven interrupt sources in ICR
const ICR_ALL: u32 = 0x7FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UartError {
    #[error("serial console not responding")]
    NotResponding,
}

/*
 * Serial - byte-level console contract
 *
 * Both console devices (PL011 here, mini UART in mini_uart.rs) provide the
 * same blocking primitives; everything above them (strings, fmt::Write,
 * the logger) is written once against this trait.
 */
pub trait Serial {
    fn init(&mut self);
    fn is_initialized(&self) -> bool;
    fn write_byte(&mut self, byte: u8) -> Result<(), UartError>;
    fn read_byte(&mut self) -> Result<u8, UartError>;
    fn try_read_byte(&mut self) -> Option<u8>;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), UartError> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), UartError> {
        self.write_bytes(s.as_bytes())
    }
}

/*
 * Computes (IBRD, FBRD) for a given reference clock and baud rate
 *
 * The PL011 divides by 16 * (IBRD + FBRD/64). Working in 64ths:
 *   divisor*64 = clock*4/baud, rounded to nearest
 */
pub const fn baud_divisors(clock_hz: u32, baud: u32) -> (u32, u32) {
    let times_64 = (clock_hz as u64 * 4 + (baud as u64 / 2)) / baud as u64;
    ((times_64 / 64) as u32, (times_64 % 64) as u32)
}

pub struct Uart<B> {
    bus: B,
    initialized: bool,
    tx_budget: PollBudget,
    rx_budget: PollBudget,
}

impl<B: RegisterBus> Uart<B> {
    pub fn new(bus: B) -> Uart<B> {
        Uart {
            bus,
            initialized: false,
            tx_budget: PollBudget::new(UART_TX_POLL_LIMIT),
            rx_budget: PollBudget::from_option(UART_RX_POLL_LIMIT),
        }
    }

    pub fn with_budgets(bus: B, tx_budget: PollBudget, rx_budget: PollBudget) -> Uart<B> {
        Uart {
            bus,
            initialized: false,
            tx_budget,
            rx_budget,
        }
    }

    fn flags(&self) -> Flags {
        Flags::from_bits_truncate(FR.read(&self.bus))
    }
}

impl<B: RegisterBus> Serial for Uart<B> {
    /*
     * Brings the PL011 up
     *
     * 1. Disable the UART while it is reprogrammed
     * 2. Route GPIO 14/15 to ALT0 and remove their pull resistors
     * 3. Mask and clear every interrupt (this kernel polls)
     * 4. Program the baud divisors (IBRD/FBRD only latch on the LCRH write)
     * 5. 8 data bits, no parity, one stop bit, FIFOs enabled
     * 6. Enable the UART with both transmitter and receiver
     */
    fn init(&mut self) {
        CR.write(&self.bus, 0);

        gpio::route_console_pins(&self.bus, Function::Alt0);

        IMSC.write(&self.bus, 0);
        ICR.write(&self.bus, ICR_ALL);

        let (integer, fraction) = baud_divisors(UART_CLOCK_HZ, CONSOLE_BAUD_RATE);
        IBRD.write(&self.bus, integer);
        FBRD.write(&self.bus, fraction);
        LCRH.write(&self.bus, (LineControl::FEN | LineControl::WLEN_8).bits());

        CR.write(
            &self.bus,
            (Control::UARTEN | Control::TXE | Control::RXE).bits(),
        );
        self.initialized = true;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), UartError> {
        self.tx_budget
            .wait_until(|| !self.flags().contains(Flags::TXFF))
            .map_err(|_| UartError::NotResponding)?;
        DR.write(&self.bus, byte as u32);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, UartError> {
        self.rx_budget
            .wait_until(|| !self.flags().contains(Flags::RXFE))
            .map_err(|_| UartError::NotResponding)?;
        Ok((DR.read(&self.bus) & 0xFF) as u8)
    }

    fn try_read_byte(&mut self) -> Option<u8> {
        if self.flags().contains(Flags::RXFE) {
            None
        } else {
            Some((DR.read(&self.bus) & 0xFF) as u8)
        }
    }
}

impl<B: RegisterBus> fmt::Write for Uart<B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_translated(self, s)
    }
}

// '\n' -> "\r\n" so raw terminals return the carriage
pub(crate) fn write_translated<S: Serial>(serial: &mut S, s: &str) -> fmt::Result {
    for byte in s.bytes() {
        if byte == b'\n' {
            serial.write_byte(b'\r').map_err(|_| fmt::Error)?;
        }
        serial.write_byte(byte).map_err(|_| fmt::Error)?;
    }
    Ok(())
}
