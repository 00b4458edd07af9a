/*
 * drivers/mod.rs - Device drivers for PIP-OS
 *
 * Leaves first:
 *
 * - mmio: register bus trait and volatile register access
 * - gpio: pin function select and pull control for the console pins
 *
 * - uart: PL011 serial console (GPIO 14/15, ALT0)
 * - mini_uart: AUX mini UART console (GPIO 14/15, ALT5)
 *
 * - mailbox: ARM <-> VideoCore word transport
 * - tags: property tag catalogue
 * - property: property message protocol and the VideoCore handle
 * - framebuffer: display allocation and pixel access
 *
 * - sim: simulated bus and firmware, host tests only
 */

pub mod framebuffer;
pub mod gpio;
pub mod mailbox;
pub mod mini_uart;
pub mod mmio;
pub mod property;
pub mod tags;
pub mod uart;

#[cfg(test)]
pub(crate) mod sim;

// The console device is picked at build time
#[cfg(not(feature = "mini-uart"))]
pub type Console<B> = uart::Uart<B>;

#[cfg(feature = "mini-uart")]
pub type Console<B> = mini_uart::MiniUart<B>;
