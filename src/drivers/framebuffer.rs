/*
 * framebuffer.rs - Framebuffer negotiation and pixel access
 *
 * The VideoCore owns display memory. The kernel asks for a mode, the firmware
 * allocates a linear buffer and reports where it is and how long each row is
 * (the pitch, which may be padded past width * bytes per pixel).
 *
 * How it works:
 * 1. negotiate() chains five property tags in one message: set physical
 *    size, set virtual size, set depth, allocate buffer, get pitch
 * 2. the answers become a FramebufferInfo; a zero base/size or a pitch too
 *    small for the width is an error
 * 3. Framebuffer wraps the buffer and plots 32-bit pixels with volatile
 *    stores, bounds-checked against width, height and size
 *
 * negotiate_legacy() does the same over the old channel-1 descriptor
 * interface, for firmware that predates the property channel.
 */

use core::ptr;
use core::sync::atomic::{Ordering, fence};

use log::debug;
use thiserror::Error;

use super::mailbox::{Channel, Mailbox, MailboxError};
use super::mmio::RegisterBus;
use super::property::{PropertyError, PropertyRequest, VideoCore};
use super::tags::Tag;
use crate::config::FRAMEBUFFER_ALIGNMENT;
use crate::hardwareselect::bus_to_phys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramebufferError {
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error("firmware returned no framebuffer memory")]
    AllocationFailed,
    #[error("firmware returned an unusable pitch")]
    InvalidPitch,
    #[error("pixel ({x}, {y}) is outside the framebuffer")]
    OutOfRange { x: u32, y: u32 },
    #[error("{0}-bit pixels cannot be plotted")]
    UnsupportedDepth(u32),
    #[error("legacy framebuffer request refused (status {0})")]
    LegacyRejected(u32),
}

/*
 * FramebufferInfo - the mode the firmware actually granted
 *
 * `base` is kept exactly as the firmware returned it (a bus address);
 * phys_base() converts it for the ARM side.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub width: u32,
    pub height: u32,
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub depth: u32,
    pub pitch: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub base: u32,
    pub size: u32,
}

impl FramebufferInfo {
    pub const fn bytes_per_pixel(&self) -> u32 {
        self.depth.div_ceil(8)
    }

    pub const fn phys_base(&self) -> usize {
        bus_to_phys(self.base)
    }

    fn check(self) -> Result<FramebufferInfo, FramebufferError> {
        if self.base == 0 || self.size == 0 {
            return Err(FramebufferError::AllocationFailed);
        }
        if self.pitch == 0 || self.pitch < self.width.saturating_mul(self.bytes_per_pixel()) {
            return Err(FramebufferError::InvalidPitch);
        }
        Ok(self)
    }
}

/// Asks the firmware for a `width` x `height` x `depth` framebuffer.
pub fn negotiate<B: RegisterBus>(
    videocore: &mut VideoCore<B>,
    width: u32,
    height: u32,
    depth: u32,
) -> Result<FramebufferInfo, FramebufferError> {
    let mut request = PropertyRequest::new();
    let physical = request.push(Tag::SetPhysicalSize { width, height })?;
    let virtual_size = request.push(Tag::SetVirtualSize { width, height })?;
    let bits = request.push(Tag::SetDepth(depth))?;
    let allocation = request.push(Tag::AllocateBuffer {
        alignment: FRAMEBUFFER_ALIGNMENT,
    })?;
    let pitch = request.push(Tag::Pitch)?;

    videocore.submit(&mut request)?;

    let (width, height) = request.response(physical)?.pair()?;
    let (virtual_width, virtual_height) = request.response(virtual_size)?.pair()?;
    let (base, size) = request.response(allocation)?.pair()?;
    let info = FramebufferInfo {
        width,
        height,
        virtual_width,
        virtual_height,
        depth: request.response(bits)?.word(0)?,
        pitch: request.response(pitch)?.word(0)?,
        x_offset: 0,
        y_offset: 0,
        base,
        size,
    }
    .check()?;

    debug!(
        "framebuffer: {}x{}x{} pitch {} at {:#010x} ({} bytes)",
        info.width, info.height, info.depth, info.pitch, info.base, info.size
    );
    Ok(info)
}

/// Hands the framebuffer memory back to the firmware.
pub fn release<B: RegisterBus>(videocore: &mut VideoCore<B>) -> Result<(), FramebufferError> {
    videocore.query(Tag::ReleaseBuffer)?;
    Ok(())
}

// Channel-1 descriptor, in firmware order
const LEGACY_WORDS: usize = 10;
const LEGACY_WIDTH: usize = 0;
const LEGACY_HEIGHT: usize = 1;
const LEGACY_VIRTUAL_WIDTH: usize = 2;
const LEGACY_VIRTUAL_HEIGHT: usize = 3;
const LEGACY_PITCH: usize = 4;
const LEGACY_DEPTH: usize = 5;
const LEGACY_X_OFFSET: usize = 6;
const LEGACY_Y_OFFSET: usize = 7;
const LEGACY_BASE: usize = 8;
const LEGACY_SIZE: usize = 9;

#[repr(C, align(16))]
struct LegacyDescriptor {
    words: [u32; LEGACY_WORDS],
}

impl LegacyDescriptor {
    fn read(&self, index: usize) -> u32 {
        unsafe { ptr::read_volatile(&self.words[index]) }
    }

    fn write(&mut self, index: usize, value: u32) {
        unsafe { ptr::write_volatile(&mut self.words[index], value) }
    }
}

/*
 * Framebuffer setup over mailbox channel 1
 *
 * The descriptor is written with the requested mode, its address is sent on
 * the framebuffer channel, and the firmware fills in pitch, base and size.
 * The reply's data bits are a status; anything but zero is a refusal.
 */
pub fn negotiate_legacy<B: RegisterBus>(
    mailbox: &mut Mailbox<B>,
    width: u32,
    height: u32,
    depth: u32,
) -> Result<FramebufferInfo, FramebufferError> {
    let mut descriptor = LegacyDescriptor {
        words: [0; LEGACY_WORDS],
    };
    descriptor.write(LEGACY_WIDTH, width);
    descriptor.write(LEGACY_HEIGHT, height);
    descriptor.write(LEGACY_VIRTUAL_WIDTH, width);
    descriptor.write(LEGACY_VIRTUAL_HEIGHT, height);
    descriptor.write(LEGACY_DEPTH, depth);

    let address = mailbox.bus_address(descriptor.words.as_mut_ptr() as usize)?;
    fence(Ordering::SeqCst);
    let reply = mailbox.call(address, Channel::Framebuffer)?;
    fence(Ordering::SeqCst);
    if reply != 0 {
        return Err(FramebufferError::LegacyRejected(reply >> 4));
    }

    let info = FramebufferInfo {
        width: descriptor.read(LEGACY_WIDTH),
        height: descriptor.read(LEGACY_HEIGHT),
        virtual_width: descriptor.read(LEGACY_VIRTUAL_WIDTH),
        virtual_height: descriptor.read(LEGACY_VIRTUAL_HEIGHT),
        depth: descriptor.read(LEGACY_DEPTH),
        pitch: descriptor.read(LEGACY_PITCH),
        x_offset: descriptor.read(LEGACY_X_OFFSET),
        y_offset: descriptor.read(LEGACY_Y_OFFSET),
        base: descriptor.read(LEGACY_BASE),
        size: descriptor.read(LEGACY_SIZE),
    }
    .check()?;

    debug!(
        "framebuffer (legacy): {}x{}x{} pitch {} at {:#010x}",
        info.width, info.height, info.depth, info.pitch, info.base
    );
    Ok(info)
}

/// Packs a color as the 32-bit pixel word (red in the low byte).
pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    r as u32 | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
}

pub const fn split_rgba(color: u32) -> (u8, u8, u8, u8) {
    (
        color as u8,
        (color >> 8) as u8,
        (color >> 16) as u8,
        (color >> 24) as u8,
    )
}

pub struct Framebuffer {
    info: FramebufferInfo,
    base: *mut u8,
}

impl Framebuffer {
    /*
     * Maps a negotiated framebuffer at its ARM physical address
     *
     * Safety: `info` must describe a live allocation returned by the
     * firmware, and nothing else may write to it while this handle exists.
     */
    pub unsafe fn new(info: FramebufferInfo) -> Framebuffer {
        Framebuffer {
            info,
            base: info.phys_base() as *mut u8,
        }
    }

    /*
     * Wraps an arbitrary pixel buffer
     *
     * Safety: `base` must be 4-byte aligned and valid for writes of
     * `info.size` bytes for the lifetime of the handle.
     */
    pub unsafe fn from_raw(info: FramebufferInfo, base: *mut u8) -> Framebuffer {
        Framebuffer { info, base }
    }

    pub fn info(&self) -> &FramebufferInfo {
        &self.info
    }

    pub fn plot_pixel(&mut self, x: u32, y: u32, color: u32) -> Result<(), FramebufferError> {
        if self.info.depth != 32 {
            return Err(FramebufferError::UnsupportedDepth(self.info.depth));
        }
        if x >= self.info.width || y >= self.info.height {
            return Err(FramebufferError::OutOfRange { x, y });
        }
        let offset = y as usize * self.info.pitch as usize + x as usize * 4;
        if offset + 4 > self.info.size as usize {
            return Err(FramebufferError::OutOfRange { x, y });
        }
        unsafe { ptr::write_volatile(self.base.add(offset) as *mut u32, color) };
        Ok(())
    }

    pub fn fill(&mut self, color: u32) -> Result<(), FramebufferError> {
        for y in 0..self.info.height {
            for x in 0..self.info.width {
                self.plot_pixel(x, y, color)?;
            }
        }
        Ok(())
    }
}
