/*
 * hardwareselect.rs - Hardware Abstraction and Configuration
 *
 * This module uses conditional compilation (cfg features) to set memory
 * addresses, clock speeds, and platform names at compile time.
 *
 * Build examples:
 * cargo build --target aarch64-unknown-none                      (qemu)
 * cargo build --target aarch64-unknown-none --no-default-features --features rpi3
 * cargo build --target aarch64-unknown-none --no-default-features --features rpi4
 *
 * rpi1 and rpi2 are 32-bit only chips. Those features give the library their
 * register layout; the AArch64 kernel image does not build for them.
 */

// ============================================================================
// 1. PERIPHERAL BASE ADDRESSES
// ============================================================================

// BCM2835 (RPi1, Zero)
#[cfg(feature = "rpi1")]
pub const PERIPHERAL_BASE: usize = 0x2000_0000;

// BCM2836 / BCM2837 (RPi2, RPi3, QEMU raspi3b)
#[cfg(any(feature = "qemu", feature = "rpi2", feature = "rpi3"))]
pub const PERIPHERAL_BASE: usize = 0x3F00_0000;

// BCM2711 (RPi4) in low-peripheral mode
#[cfg(feature = "rpi4")]
pub const PERIPHERAL_BASE: usize = 0xFE00_0000;

// ============================================================================
// 2. PERIPHERAL OFFSETS
// ============================================================================

pub const MAILBOX_BASE: usize = PERIPHERAL_BASE + 0xB880;

pub const GPIO_BASE: usize = PERIPHERAL_BASE + 0x20_0000;

// PL011 UART0
pub const UART0_BASE: usize = PERIPHERAL_BASE + 0x20_1000;

// AUX block (mini UART + SPI1/2)
pub const AUX_BASE: usize = PERIPHERAL_BASE + 0x21_5000;

// ============================================================================
// 3. CLOCK SPEEDS
// ============================================================================

// PL011 reference clock. Older firmware leaves it at 3 MHz.
#[cfg(any(feature = "rpi1", feature = "rpi2"))]
pub const UART_CLOCK_HZ: u32 = 3_000_000;

#[cfg(any(feature = "qemu", feature = "rpi3", feature = "rpi4"))]
pub const UART_CLOCK_HZ: u32 = 48_000_000;

// VPU core clock; the mini UART baud divisor is derived from it
#[cfg(not(feature = "rpi4"))]
pub const CORE_CLOCK_HZ: u32 = 250_000_000;

#[cfg(feature = "rpi4")]
pub const CORE_CLOCK_HZ: u32 = 500_000_000;

// ============================================================================
// 4. BUS ADDRESS TRANSLATION
// ============================================================================

/*
 * BUS_ADDRESS_MASK - strips the VideoCore cache-alias bits
 *
 * The firmware hands framebuffer addresses back as bus addresses
 * (0x4xxxxxxx / 0xCxxxxxxx aliases on the older SoCs). QEMU and the BCM2711
 * already return ARM physical addresses, and masking there would break
 * buffers placed above 1 GiB.
 */
#[cfg(any(feature = "rpi1", feature = "rpi2", feature = "rpi3"))]
pub const BUS_ADDRESS_MASK: u32 = 0x3FFF_FFFF;

#[cfg(any(feature = "qemu", feature = "rpi4"))]
pub const BUS_ADDRESS_MASK: u32 = 0xFFFF_FFFF;

pub const fn bus_to_phys(bus_addr: u32) -> usize {
    (bus_addr & BUS_ADDRESS_MASK) as usize
}

// ============================================================================
// 5. HELPER FUNCTIONS FOR LOGGING
// ============================================================================

pub fn get_platform_name() -> &'static str {
    #[cfg(feature = "qemu")]
    return "QEMU (RPi3 Model)";

    #[cfg(feature = "rpi1")]
    return "Raspberry Pi 1";

    #[cfg(feature = "rpi2")]
    return "Raspberry Pi 2";

    #[cfg(feature = "rpi3")]
    return "Raspberry Pi 3";

    #[cfg(feature = "rpi4")]
    return "Raspberry Pi 4";
}

pub fn get_console_name() -> &'static str {
    #[cfg(feature = "mini-uart")]
    return "mini UART";

    #[cfg(not(feature = "mini-uart"))]
    return "PL011";
}

// ============================================================================
// 6. FEATURE VALIDATION
// ============================================================================

#[cfg(not(any(
    feature = "qemu",
    feature = "rpi1",
    feature = "rpi2",
    feature = "rpi3",
    feature = "rpi4"
)))]
compile_error!(
    "Must enable exactly one hardware feature: qemu, rpi1, rpi2, rpi3, or rpi4\n\
     Example: cargo build --no-default-features --features rpi3"
);

// This compact block ensures the compiler panics if you accidentally pass multiple flags
#[cfg(any(
    all(feature = "qemu", feature = "rpi1"),
    all(feature = "qemu", feature = "rpi2"),
    all(feature = "qemu", feature = "rpi3"),
    all(feature = "qemu", feature = "rpi4"),
    all(feature = "rpi1", feature = "rpi2"),
    all(feature = "rpi1", feature = "rpi3"),
    all(feature = "rpi1", feature = "rpi4"),
    all(feature = "rpi2", feature = "rpi3"),
    all(feature = "rpi2", feature = "rpi4"),
    all(feature = "rpi3", feature = "rpi4")
))]
compile_error!("Cannot enable multiple hardware features simultaneously. Pick one!");
