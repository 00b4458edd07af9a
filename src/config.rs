/*
 * config.rs - Boot-time tunables for PIP-OS
 *
 * Everything board-specific (addresses, clocks) lives in hardwareselect.rs.
 * This file holds the knobs that are the same on every board: console
 * settings, how long to wait on hardware, buffer capacities and the default
 * display mode.
 */

use log::LevelFilter;

/*
 * CONSOLE_BAUD_RATE - Serial console speed
 *
 * 115200 8N1 is what every USB-serial adapter and QEMU's -serial stdio expect.
 */
pub const CONSOLE_BAUD_RATE: u32 = 115_200;

/*
 * GPIO_SETTLE_CYCLES - Delay around the GPPUD/GPPUDCLK0 handshake
 *
 * The BCM2835 datasheet asks for 150 cycles of set-up and hold time when
 * changing pull resistors.
 */
pub const GPIO_SETTLE_CYCLES: u32 = 150;

/*
 * MAILBOX_POLL_LIMIT - Status polls before the VideoCore is declared dead
 *
 * A property round-trip normally completes in well under 100k polls. The
 * limit covers one send or receive, including messages skipped for other
 * channels.
 */
pub const MAILBOX_POLL_LIMIT: u32 = 1_000_000;

/*
 * UART_TX_POLL_LIMIT - Flag polls before a transmit is abandoned
 *
 * At 115200 baud a full 16-byte FIFO drains in ~1.4 ms.
 */
pub const UART_TX_POLL_LIMIT: u32 = 1_000_000;

/*
 * UART_RX_POLL_LIMIT - Flag polls before a blocking read gives up
 *
 * None: console input is human-paced and may never arrive.
 */
pub const UART_RX_POLL_LIMIT: Option<u32> = None;

/*
 * PROPERTY_BUFFER_WORDS - Capacity of the owned property scratch buffer
 *
 * 256 words (1 KiB) fits the framebuffer negotiation with plenty of room for
 * chained board queries.
 */
pub const PROPERTY_BUFFER_WORDS: usize = 256;

/*
 * TAG_MESSAGE_WORDS - Capacity of the stack message used by tag_message()
 */
pub const TAG_MESSAGE_WORDS: usize = 32;

// Default display mode requested at boot
pub const FRAMEBUFFER_WIDTH: u32 = 640;
pub const FRAMEBUFFER_HEIGHT: u32 = 480;
pub const FRAMEBUFFER_DEPTH: u32 = 32;

/*
 * FRAMEBUFFER_ALIGNMENT - Alignment requested from the allocate-buffer tag
 *
 * 4 KiB keeps the framebuffer page-aligned.
 */
pub const FRAMEBUFFER_ALIGNMENT: u32 = 4096;

pub const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
