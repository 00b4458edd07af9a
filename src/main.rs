// ============================================================================
// MAIN.RS - KERNEL ENTRY POINT
// ============================================================================
//
// Boot order:
//   1. serial console (the only thing usable before the mailbox is proven)
//   2. logger on top of it
//   3. board facts through the property channel
//   4. 640x480x32 framebuffer, painted with a test gradient
//   5. park the core
//
// Host builds get a stub main so `cargo test` can build the library.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(
    target_os = "none",
    target_arch = "aarch64",
    any(feature = "rpi1", feature = "rpi2")
))]
compile_error!("rpi1/rpi2 (BCM2835/BCM2836) cannot boot an AArch64 image; use them for library builds only");

#[cfg(target_os = "none")]
mod kernel {
    use core::arch::{asm, global_asm};
    use core::panic::PanicInfo;

    use log::{error, info, warn};

    use pipos::config::{FRAMEBUFFER_DEPTH, FRAMEBUFFER_HEIGHT, FRAMEBUFFER_WIDTH};
    use pipos::drivers::Console;
    use pipos::drivers::framebuffer::{self, Framebuffer, FramebufferError, rgba};
    use pipos::drivers::mailbox::Mailbox;
    use pipos::drivers::mmio::{Mmio, RegisterBus};
    use pipos::drivers::property::{PropertyError, VideoCore};
    use pipos::drivers::tags::Clock;
    use pipos::drivers::uart::Serial;
    use pipos::hardwareselect::{get_console_name, get_platform_name};
    use pipos::{logger, serial_println};

    global_asm!(include_str!("cpu/boot.s"));

    #[unsafe(no_mangle)]
    pub extern "C" fn _main(r0: u64, r1: u64, atags: u64) -> ! {
        // Peripherals are identity-mapped: the MMU is still off
        let bus = unsafe { Mmio::new() };

        // A. Console first, so every later failure can be reported
        let mut console = Console::new(bus);
        console.init();
        if logger::init(console).is_err() {
            park();
        }
        serial_println!();
        info!(
            "PIP-OS booting on {} (console: {})",
            get_platform_name(),
            get_console_name()
        );
        info!("entry: r0={:#x} r1={:#x} atags={:#x}", r0, r1, atags);

        // B. Talk to the firmware
        let mut videocore = VideoCore::new(Mailbox::new(bus));
        if let Err(e) = report_board(&mut videocore) {
            warn!("board query failed: {}", e);
        }

        // C. Framebuffer
        match framebuffer::negotiate(
            &mut videocore,
            FRAMEBUFFER_WIDTH,
            FRAMEBUFFER_HEIGHT,
            FRAMEBUFFER_DEPTH,
        ) {
            Ok(info) => {
                let mut fb = unsafe { Framebuffer::new(info) };
                match draw_gradient(&mut fb) {
                    Ok(()) => info!("framebuffer ready"),
                    Err(e) => error!("drawing failed: {}", e),
                }
            }
            Err(e) => error!("framebuffer negotiation failed: {}", e),
        }

        park()
    }

    fn report_board<B: RegisterBus>(videocore: &mut VideoCore<B>) -> Result<(), PropertyError> {
        info!("firmware revision {:#x}", videocore.firmware_revision()?);
        info!(
            "board model {:#x}, revision {:#x}",
            videocore.board_model()?,
            videocore.board_revision()?
        );

        let mac = videocore.board_mac_address()?;
        info!(
            "MAC {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}, serial {:#018x}",
            mac[0],
            mac[1],
            mac[2],
            mac[3],
            mac[4],
            mac[5],
            videocore.board_serial()?
        );

        let arm = videocore.arm_memory()?;
        let vc = videocore.vc_memory()?;
        info!(
            "ARM memory {:#010x}+{:#x}, VideoCore memory {:#010x}+{:#x}",
            arm.base, arm.size, vc.base, vc.size
        );
        info!(
            "clocks: ARM {} Hz, core {} Hz, UART {} Hz",
            videocore.clock_rate(Clock::Arm)?,
            videocore.clock_rate(Clock::Core)?,
            videocore.clock_rate(Clock::Uart)?
        );
        Ok(())
    }

    fn draw_gradient(fb: &mut Framebuffer) -> Result<(), FramebufferError> {
        let width = fb.info().width.max(1);
        let height = fb.info().height.max(1);
        for y in 0..fb.info().height {
            for x in 0..fb.info().width {
                let red = (x * 255 / width) as u8;
                let green = (y * 255 / height) as u8;
                fb.plot_pixel(x, y, rgba(red, green, 0x80, 0xFF))?;
            }
        }
        Ok(())
    }

    fn park() -> ! {
        loop {
            unsafe { asm!("wfe") };
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        logger::panic_print(format_args!("\n!!! KERNEL PANIC !!!\n{}\n", info));
        park()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
