/*
 * mini_uart.rs - AUX mini UART console driver
 *
 * Alternative console for boards where the PL011 is taken by Bluetooth
 * (RPi3/Zero W) and the firmware has put GPIO 14/15 on the mini UART
 * instead. Same Serial contract as the PL011 driver; selected with the
 * `mini-uart` feature.
 *
 * The mini UART's baud generator runs off the VPU core clock, so the
 * divisor depends on the board (hardwareselect::CORE_CLOCK_HZ).
 */

use core::fmt;

use super::gpio::{self, Function};
use super::mmio::{Register, RegisterBus};
use super::uart::{Serial, UartError, write_translated};
use crate::config::{CONSOLE_BAUD_RATE, UART_RX_POLL_LIMIT, UART_TX_POLL_LIMIT};
use crate::hardwareselect::{AUX_BASE, CORE_CLOCK_HZ};
use crate::utils::poll::PollBudget;

const AUX_ENABLES: Register = Register::new(AUX_BASE + 0x04);
const MU_IO: Register = Register::new(AUX_BASE + 0x40);
const MU_IER: Register = Register::new(AUX_BASE + 0x44);
const MU_IIR: Register = Register::new(AUX_BASE + 0x48);
const MU_LCR: Register = Register::new(AUX_BASE + 0x4C);
const MU_MCR: Register = Register::new(AUX_BASE + 0x50);
const MU_LSR: Register = Register::new(AUX_BASE + 0x54);
const MU_CNTL: Register = Register::new(AUX_BASE + 0x60);
const MU_BAUD: Register = Register::new(AUX_BASE + 0x68);

const LSR_DATA_READY: u32 = 1 << 0;
const LSR_TX_EMPTY: u32 = 1 << 5;

// baud = core_clock / (8 * (BAUD + 1))
pub const fn baud_register(core_clock_hz: u32, baud: u32) -> u32 {
    core_clock_hz / (8 * baud) - 1
}

pub struct MiniUart<B> {
    bus: B,
    initialized: bool,
    tx_budget: PollBudget,
    rx_budget: PollBudget,
}

impl<B: RegisterBus> MiniUart<B> {
    pub fn new(bus: B) -> MiniUart<B> {
        MiniUart {
            bus,
            initialized: false,
            tx_budget: PollBudget::new(UART_TX_POLL_LIMIT),
            rx_budget: PollBudget::from_option(UART_RX_POLL_LIMIT),
        }
    }

    pub fn with_budgets(bus: B, tx_budget: PollBudget, rx_budget: PollBudget) -> MiniUart<B> {
        MiniUart {
            bus,
            initialized: false,
            tx_budget,
            rx_budget,
        }
    }

    fn line_status(&self) -> u32 {
        MU_LSR.read(&self.bus)
    }
}

impl<B: RegisterBus> Serial for MiniUart<B> {
    fn init(&mut self) {
        // Enabling the mini UART also opens up access to its registers
        AUX_ENABLES.write(&self.bus, 1);
        // Receiver/transmitter off and no auto flow control while configuring
        MU_CNTL.write(&self.bus, 0);
        MU_IER.write(&self.bus, 0);
        // 8-bit mode
        MU_LCR.write(&self.bus, 3);
        // RTS held high
        MU_MCR.write(&self.bus, 0);
        // Clear both FIFOs
        MU_IIR.write(&self.bus, 0xC6);
        MU_BAUD.write(&self.bus, baud_register(CORE_CLOCK_HZ, CONSOLE_BAUD_RATE));

        gpio::route_console_pins(&self.bus, Function::Alt5);

        MU_CNTL.write(&self.bus, 3);
        self.initialized = true;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), UartError> {
        self.tx_budget
            .wait_until(|| self.line_status() & LSR_TX_EMPTY != 0)
            .map_err(|_| UartError::NotResponding)?;
        MU_IO.write(&self.bus, byte as u32);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, UartError> {
        self.rx_budget
            .wait_until(|| self.line_status() & LSR_DATA_READY != 0)
            .map_err(|_| UartError::NotResponding)?;
        Ok((MU_IO.read(&self.bus) & 0xFF) as u8)
    }

    fn try_read_byte(&mut self) -> Option<u8> {
        if self.line_status() & LSR_DATA_READY == 0 {
            return None;
        }
        Some((MU_IO.read(&self.bus) & 0xFF) as u8)
    }
}

impl<B: RegisterBus> fmt::Write for MiniUart<B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_translated(self, s)
    }
}
