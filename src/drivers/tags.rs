/*
 * tags.rs - Property tag catalogue
 *
 * A tag inside a property buffer is:
 *
 *   [id][value buffer size in bytes][request/response length][values...]
 *
 * The firmware answers in place: it overwrites the values and sets bit 31 of
 * the length word, leaving the byte count of its answer in the low bits. The
 * value buffer must be large enough for whichever of request or response is
 * longer.
 *
 * Tag describes every request this kernel knows how to make; TagResponse is
 * one answered tag read back out of a buffer.
 */

use super::property::PropertyError;

// Firmware / board
pub const GET_FIRMWARE_REVISION: u32 = 0x0000_0001;
pub const GET_BOARD_MODEL: u32 = 0x0001_0001;
pub const GET_BOARD_REVISION: u32 = 0x0001_0002;
pub const GET_BOARD_MAC_ADDRESS: u32 = 0x0001_0003;
pub const GET_BOARD_SERIAL: u32 = 0x0001_0004;
pub const GET_ARM_MEMORY: u32 = 0x0001_0005;
pub const GET_VC_MEMORY: u32 = 0x0001_0006;
pub const GET_CLOCKS: u32 = 0x0001_0007;
pub const GET_COMMAND_LINE: u32 = 0x0005_0001;
pub const GET_DMA_CHANNELS: u32 = 0x0006_0001;

// Power
pub const GET_POWER_STATE: u32 = 0x0002_0001;
pub const GET_TIMING: u32 = 0x0002_0002;
pub const SET_POWER_STATE: u32 = 0x0002_8001;

// Clocks
pub const GET_CLOCK_STATE: u32 = 0x0003_0001;
pub const SET_CLOCK_STATE: u32 = 0x0003_8001;
pub const GET_CLOCK_RATE: u32 = 0x0003_0002;
pub const GET_MAX_CLOCK_RATE: u32 = 0x0003_0004;
pub const GET_MIN_CLOCK_RATE: u32 = 0x0003_0007;
pub const SET_CLOCK_RATE: u32 = 0x0003_8002;
pub const GET_TURBO: u32 = 0x0003_0009;
pub const SET_TURBO: u32 = 0x0003_8009;

// Framebuffer
pub const ALLOCATE_BUFFER: u32 = 0x0004_0001;
pub const RELEASE_BUFFER: u32 = 0x0004_8001;
pub const GET_PHYSICAL_SIZE: u32 = 0x0004_0003;
pub const SET_PHYSICAL_SIZE: u32 = 0x0004_8003;
pub const GET_VIRTUAL_SIZE: u32 = 0x0004_0004;
pub const SET_VIRTUAL_SIZE: u32 = 0x0004_8004;
pub const GET_DEPTH: u32 = 0x0004_0005;
pub const SET_DEPTH: u32 = 0x0004_8005;
pub const GET_PIXEL_ORDER: u32 = 0x0004_0006;
pub const SET_PIXEL_ORDER: u32 = 0x0004_8006;
pub const GET_PITCH: u32 = 0x0004_0008;
pub const GET_VIRTUAL_OFFSET: u32 = 0x0004_0009;
pub const SET_VIRTUAL_OFFSET: u32 = 0x0004_8009;

/// Bit 31 of a tag's length word: set by the firmware once it has answered.
pub const RESPONSE_BIT: u32 = 0x8000_0000;

// id + buffer size + length
pub const TAG_HEADER_WORDS: usize = 3;

// Largest value buffer of any Tag (SetClockRate)
pub const MAX_VALUE_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Clock {
    Emmc = 1,
    Uart = 2,
    Arm = 3,
    Core = 4,
    V3d = 5,
    H264 = 6,
    Isp = 7,
    Sdram = 8,
    Pixel = 9,
    Pwm = 10,
    Emmc2 = 12,
}

// Power domains addressed by the power tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Device {
    SdCard = 0,
    Uart0 = 1,
    Uart1 = 2,
    Usb = 3,
    I2c0 = 4,
    I2c1 = 5,
    I2c2 = 6,
    Spi = 7,
    Ccp2tx = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    FirmwareRevision,
    BoardModel,
    BoardRevision,
    BoardMacAddress,
    BoardSerial,
    ArmMemory,
    VcMemory,
    DmaChannels,

    PowerState(Device),
    Timing(Device),
    SetPowerState { device: Device, on: bool, wait: bool },

    ClockState(Clock),
    SetClockState { clock: Clock, on: bool },
    ClockRate(Clock),
    MaxClockRate(Clock),
    MinClockRate(Clock),
    SetClockRate { clock: Clock, rate: u32, skip_turbo: bool },
    Turbo,
    SetTurbo(bool),

    AllocateBuffer { alignment: u32 },
    ReleaseBuffer,
    PhysicalSize,
    SetPhysicalSize { width: u32, height: u32 },
    VirtualSize,
    SetVirtualSize { width: u32, height: u32 },
    Depth,
    SetDepth(u32),
    PixelOrder,
    SetPixelOrder(u32),
    Pitch,
    VirtualOffset,
    SetVirtualOffset { x: u32, y: u32 },
}

impl Tag {
    pub const fn id(&self) -> u32 {
        match self {
            Tag::FirmwareRevision => GET_FIRMWARE_REVISION,
            Tag::BoardModel => GET_BOARD_MODEL,
            Tag::BoardRevision => GET_BOARD_REVISION,
            Tag::BoardMacAddress => GET_BOARD_MAC_ADDRESS,
            Tag::BoardSerial => GET_BOARD_SERIAL,
            Tag::ArmMemory => GET_ARM_MEMORY,
            Tag::VcMemory => GET_VC_MEMORY,
            Tag::DmaChannels => GET_DMA_CHANNELS,
            Tag::PowerState(_) => GET_POWER_STATE,
            Tag::Timing(_) => GET_TIMING,
            Tag::SetPowerState { .. } => SET_POWER_STATE,
            Tag::ClockState(_) => GET_CLOCK_STATE,
            Tag::SetClockState { .. } => SET_CLOCK_STATE,
            Tag::ClockRate(_) => GET_CLOCK_RATE,
            Tag::MaxClockRate(_) => GET_MAX_CLOCK_RATE,
            Tag::MinClockRate(_) => GET_MIN_CLOCK_RATE,
            Tag::SetClockRate { .. } => SET_CLOCK_RATE,
            Tag::Turbo => GET_TURBO,
            Tag::SetTurbo(_) => SET_TURBO,
            Tag::AllocateBuffer { .. } => ALLOCATE_BUFFER,
            Tag::ReleaseBuffer => RELEASE_BUFFER,
            Tag::PhysicalSize => GET_PHYSICAL_SIZE,
            Tag::SetPhysicalSize { .. } => SET_PHYSICAL_SIZE,
            Tag::VirtualSize => GET_VIRTUAL_SIZE,
            Tag::SetVirtualSize { .. } => SET_VIRTUAL_SIZE,
            Tag::Depth => GET_DEPTH,
            Tag::SetDepth(_) => SET_DEPTH,
            Tag::PixelOrder => GET_PIXEL_ORDER,
            Tag::SetPixelOrder(_) => SET_PIXEL_ORDER,
            Tag::Pitch => GET_PITCH,
            Tag::VirtualOffset => GET_VIRTUAL_OFFSET,
            Tag::SetVirtualOffset { .. } => SET_VIRTUAL_OFFSET,
        }
    }

    /*
     * Request values, in order, and how many of them there are
     *
     * Unused trailing slots are zero.
     */
    pub fn request_words(&self) -> ([u32; MAX_VALUE_WORDS], usize) {
        match *self {
            Tag::PowerState(device) | Tag::Timing(device) => ([device as u32, 0, 0], 1),
            Tag::SetPowerState { device, on, wait } => {
                ([device as u32, (on as u32) | ((wait as u32) << 1), 0], 2)
            }
            Tag::ClockState(clock)
            | Tag::ClockRate(clock)
            | Tag::MaxClockRate(clock)
            | Tag::MinClockRate(clock) => ([clock as u32, 0, 0], 1),
            Tag::SetClockState { clock, on } => ([clock as u32, on as u32, 0], 2),
            Tag::SetClockRate {
                clock,
                rate,
                skip_turbo,
            } => ([clock as u32, rate, skip_turbo as u32], 3),
            // turbo id is always 0
            Tag::Turbo => ([0, 0, 0], 1),
            Tag::SetTurbo(on) => ([0, on as u32, 0], 2),
            Tag::AllocateBuffer { alignment } => ([alignment, 0, 0], 1),
            Tag::SetPhysicalSize { width, height } | Tag::SetVirtualSize { width, height } => {
                ([width, height, 0], 2)
            }
            Tag::SetDepth(value) | Tag::SetPixelOrder(value) => ([value, 0, 0], 1),
            Tag::SetVirtualOffset { x, y } => ([x, y, 0], 2),
            _ => ([0; MAX_VALUE_WORDS], 0),
        }
    }

    /// Size of the value buffer in words: the longer of request and response.
    pub const fn value_words(&self) -> usize {
        match self {
            Tag::FirmwareRevision
            | Tag::BoardModel
            | Tag::BoardRevision
            | Tag::DmaChannels
            | Tag::Depth
            | Tag::SetDepth(_)
            | Tag::PixelOrder
            | Tag::SetPixelOrder(_)
            | Tag::Pitch => 1,
            Tag::ReleaseBuffer => 0,
            Tag::SetClockRate { .. } => 3,
            _ => 2,
        }
    }

    pub const fn encoded_words(&self) -> usize {
        TAG_HEADER_WORDS + self.value_words()
    }

    /*
     * Writes the tag at the start of `out`
     *
     * Returns the number of words used. The length word is left at zero
     * (a request), and unused value words are cleared.
     */
    pub fn encode(&self, out: &mut [u32]) -> Result<usize, PropertyError> {
        let words = self.encoded_words();
        if out.len() < words {
            return Err(PropertyError::Overflow {
                needed: words,
                capacity: out.len(),
            });
        }
        let (request, count) = self.request_words();
        out[0] = self.id();
        out[1] = (self.value_words() * 4) as u32;
        out[2] = 0;
        for (i, slot) in out[TAG_HEADER_WORDS..words].iter_mut().enumerate() {
            *slot = if i < count { request[i] } else { 0 };
        }
        Ok(words)
    }
}

/*
 * TagResponse - one answered tag
 *
 * `len` is the byte count the firmware reported, which may be shorter or
 * longer than the value buffer; only what fits in the buffer is kept.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagResponse {
    pub id: u32,
    pub len: usize,
    values: [u32; MAX_VALUE_WORDS],
    stored: usize,
}

impl TagResponse {
    /// Reads the tag starting at `words[0]`.
    pub fn decode(words: &[u32]) -> Result<TagResponse, PropertyError> {
        if words.len() < TAG_HEADER_WORDS {
            return Err(PropertyError::MalformedTags { offset: 0 });
        }
        let id = words[0];
        let capacity = (words[1] / 4) as usize;
        let length = words[2];
        if length & RESPONSE_BIT == 0 {
            return Err(PropertyError::NotAnswered(id));
        }

        let available = &words[TAG_HEADER_WORDS..];
        let stored = capacity.min(MAX_VALUE_WORDS).min(available.len());
        let mut values = [0; MAX_VALUE_WORDS];
        values[..stored].copy_from_slice(&available[..stored]);

        Ok(TagResponse {
            id,
            len: (length & !RESPONSE_BIT) as usize,
            values,
            stored,
        })
    }

    pub fn values(&self) -> &[u32] {
        &self.values[..self.stored]
    }

    /// Fails unless the firmware reported at least `bytes` of answer.
    pub fn expect_len(&self, bytes: usize) -> Result<&TagResponse, PropertyError> {
        if self.len < bytes || self.stored * 4 < bytes {
            return Err(PropertyError::ShortResponse {
                tag: self.id,
                expected: bytes,
                got: self.len,
            });
        }
        Ok(self)
    }

    pub fn word(&self, index: usize) -> Result<u32, PropertyError> {
        self.expect_len((index + 1) * 4)?;
        Ok(self.values[index])
    }

    pub fn pair(&self) -> Result<(u32, u32), PropertyError> {
        self.expect_len(8)?;
        Ok((self.values[0], self.values[1]))
    }
}
