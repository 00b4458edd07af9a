/*
 * gpio.rs - Pin multiplexing and pull control for the console pins
 *
 * Only what the serial console needs: put GPIO 14/15 on a UART function and
 * take their pull resistors off.
 */

use super::mmio::{Register, RegisterBus, delay};
use crate::config::GPIO_SETTLE_CYCLES;
use crate::hardwareselect::GPIO_BASE;

const GPFSEL1: Register = Register::new(GPIO_BASE + 0x04);
#[cfg_attr(feature = "rpi4", allow(dead_code))]
const GPPUD: Register = Register::new(GPIO_BASE + 0x94);
#[cfg_attr(feature = "rpi4", allow(dead_code))]
const GPPUDCLK0: Register = Register::new(GPIO_BASE + 0x98);
#[cfg_attr(not(feature = "rpi4"), allow(dead_code))]
const GPIO_PUP_PDN_CNTRL_REG0: Register = Register::new(GPIO_BASE + 0xE4);

pub const UART_TX_PIN: u32 = 14;
pub const UART_RX_PIN: u32 = 15;

// 3-bit function codes in GPFSELn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Function {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

/*
 * Selects the function of a pin in GPFSEL1 (pins 10-19)
 *
 * Each pin owns three bits at (pin % 10) * 3.
 */
pub fn select_function<B: RegisterBus>(bus: &B, pin: u32, function: Function) {
    debug_assert!((10..20).contains(&pin), "only GPFSEL1 pins are wired up");
    let shift = (pin % 10) * 3;
    GPFSEL1.modify(bus, 0b111 << shift, (function as u32) << shift);
}

/*
 * Removes pull-up/down resistors from the pins in `mask` (bit n = GPIO n)
 *
 * BCM2835-BCM2837: write the control signal to GPPUD, wait, clock it into the
 * selected pins with GPPUDCLK0, wait, then release the clock. Both waits are
 * the fixed 150-cycle set-up/hold time.
 *
 * BCM2711 replaced that handshake with two bits per pin in
 * GPIO_PUP_PDN_CNTRL_REGn (00 = no resistor).
 */
pub fn disable_pulls<B: RegisterBus>(bus: &B, mask: u32) {
    #[cfg(not(feature = "rpi4"))]
    {
        GPPUD.write(bus, 0);
        delay(GPIO_SETTLE_CYCLES);
        GPPUDCLK0.write(bus, mask);
        delay(GPIO_SETTLE_CYCLES);
        GPPUDCLK0.write(bus, 0);
    }

    #[cfg(feature = "rpi4")]
    {
        let mut clear = 0;
        for pin in 0..16 {
            if mask & (1 << pin) != 0 {
                clear |= 0b11 << (pin * 2);
            }
        }
        GPIO_PUP_PDN_CNTRL_REG0.modify(bus, clear, 0);
        delay(GPIO_SETTLE_CYCLES);
    }
}

/// Routes GPIO 14/15 to a UART and floats them.
pub fn route_console_pins<B: RegisterBus>(bus: &B, function: Function) {
    select_function(bus, UART_TX_PIN, function);
    select_function(bus, UART_RX_PIN, function);
    disable_pulls(bus, (1 << UART_TX_PIN) | (1 << UART_RX_PIN));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::SimBus;

    #[test]
    fn alt0_on_console_pins_leaves_neighbours_alone() {
        let bus = SimBus::new();
        GPFSEL1.write(&bus, 0xFFFF_FFFF);
        select_function(&bus, UART_TX_PIN, Function::Alt0);
        select_function(&bus, UART_RX_PIN, Function::Alt0);

        let value = GPFSEL1.read(&bus);
        assert_eq!((value >> 12) & 0b111, 0b100);
        assert_eq!((value >> 15) & 0b111, 0b100);
        assert_eq!(value & 0xFFF, 0xFFF);
        assert_eq!(value >> 18, 0xFFFF_FFFF >> 18);
    }

    #[cfg(not(feature = "rpi4"))]
    #[test]
    fn pull_handshake_clocks_then_releases() {
        let bus = SimBus::new();
        disable_pulls(&bus, (1 << 14) | (1 << 15));

        let writes = bus.writes_to(&[GPPUD.addr(), GPPUDCLK0.addr()]);
        assert_eq!(
            writes,
            vec![
                (GPPUD.addr(), 0),
                (GPPUDCLK0.addr(), (1 << 14) | (1 << 15)),
                (GPPUDCLK0.addr(), 0),
            ]
        );
    }
}
