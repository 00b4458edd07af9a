/*
 * property.rs - VideoCore property tag protocol
 *
 * Everything the kernel asks the firmware (board revision, clocks, power,
 * the framebuffer) goes through one message format on mailbox channel 8:
 *
 *   [0] total size in bytes        = 12 + 4 * tag words
 *   [1] request/response code      0 on the way out
 *   [2..] tags                     see tags.rs
 *   [n] end tag                    0
 *
 * The buffer is handed to the VideoCore by bus address and answered in place.
 *
 * How it works:
 * 1. VideoCore owns the mailbox and a 16-byte aligned PropertyBuffer, so
 *    &mut self serializes every exchange
 * 2. process() checks the caller's tag words actually add up, copies them
 *    into the owned buffer, sends the buffer's address and waits for the
 *    reply on the same channel
 * 3. the answered tags are copied back over the caller's slice and the raw
 *    response code is returned
 *
 * All accesses to a buffer the firmware can see are volatile.
 */

use core::ptr;
use core::sync::atomic::{Ordering, fence};

use log::trace;
use thiserror::Error;

use super::mailbox::{Channel, Mailbox, MailboxError};
use super::mmio::RegisterBus;
use super::tags::{
    Clock, Device, GET_CLOCK_RATE, MAX_VALUE_WORDS, TAG_HEADER_WORDS, Tag, TagResponse,
};
use crate::config::{PROPERTY_BUFFER_WORDS, TAG_MESSAGE_WORDS};

const CODE_REQUEST: u32 = 0x0000_0000;
const CODE_SUCCESS: u32 = 0x8000_0000;
const CODE_ERROR: u32 = 0x8000_0001;

const END_TAG: u32 = 0;

// size + code + end tag
const ENVELOPE_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Request,
    Success,
    Error,
    Unknown(u32),
}

impl ResponseCode {
    pub const fn is_success(self) -> bool {
        matches!(self, ResponseCode::Success)
    }
}

impl From<u32> for ResponseCode {
    fn from(raw: u32) -> ResponseCode {
        match raw {
            CODE_REQUEST => ResponseCode::Request,
            CODE_SUCCESS => ResponseCode::Success,
            CODE_ERROR => ResponseCode::Error,
            other => ResponseCode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error("firmware answered {0:?}")]
    Rejected(ResponseCode),
    #[error("tag stream does not add up at word {offset}")]
    MalformedTags { offset: usize },
    #[error("property message needs {needed} words, buffer holds {capacity}")]
    Overflow { needed: usize, capacity: usize },
    #[error("firmware did not answer tag {0:#010x}")]
    NotAnswered(u32),
    #[error("tag {tag:#010x} answered {got} bytes, expected {expected}")]
    ShortResponse {
        tag: u32,
        expected: usize,
        got: usize,
    },
}

fn check(code: ResponseCode) -> Result<(), PropertyError> {
    if code.is_success() {
        Ok(())
    } else {
        Err(PropertyError::Rejected(code))
    }
}

/*
 * Checks that a tag stream is well formed
 *
 * Walks [id][size][len][size/4 words] records and requires them to end
 * exactly at the end of the slice. A zero id would be read by the firmware
 * as the end tag, so it is rejected too.
 */
pub fn validate_tags(tags: &[u32]) -> Result<(), PropertyError> {
    let mut offset = 0;
    while offset < tags.len() {
        let malformed = PropertyError::MalformedTags { offset };
        if offset + TAG_HEADER_WORDS > tags.len() || tags[offset] == END_TAG {
            return Err(malformed);
        }
        let size = tags[offset + 1] as usize;
        if size % 4 != 0 {
            return Err(malformed);
        }
        offset += TAG_HEADER_WORDS + size / 4;
    }
    if offset != tags.len() {
        return Err(PropertyError::MalformedTags { offset: tags.len() });
    }
    Ok(())
}

/*
 * PropertyBuffer - a message as the VideoCore sees it
 *
 * repr(C, align(16)): the mailbox only carries the upper 28 bits of the
 * address.
 */
#[repr(C, align(16))]
pub struct PropertyBuffer<const N: usize = PROPERTY_BUFFER_WORDS> {
    words: [u32; N],
}

impl<const N: usize> PropertyBuffer<N> {
    pub const fn new() -> Self {
        PropertyBuffer { words: [0; N] }
    }

    fn read(&self, index: usize) -> u32 {
        unsafe { ptr::read_volatile(&self.words[index]) }
    }

    fn write(&mut self, index: usize, value: u32) {
        unsafe { ptr::write_volatile(&mut self.words[index], value) }
    }

    // Frames `tags` as a request. Returns the message length in words.
    fn load(&mut self, tags: &[u32]) -> Result<usize, PropertyError> {
        let total = tags.len() + ENVELOPE_WORDS;
        if total > N {
            return Err(PropertyError::Overflow {
                needed: total,
                capacity: N,
            });
        }
        self.write(0, (total * 4) as u32);
        self.write(1, CODE_REQUEST);
        for (i, &word) in tags.iter().enumerate() {
            self.write(2 + i, word);
        }
        self.write(2 + tags.len(), END_TAG);
        Ok(total)
    }

    fn unload(&self, tags: &mut [u32]) {
        for (i, slot) in tags.iter_mut().enumerate() {
            *slot = self.read(2 + i);
        }
    }

    /*
     * One round trip on the tags channel
     *
     * The reply word is only a completion signal; the answer is in the
     * buffer. Only the reply echoing this buffer's address counts. Fences
     * keep the buffer accesses on the right side of the mailbox writes.
     */
    fn exchange<B: RegisterBus>(
        &mut self,
        mailbox: &mut Mailbox<B>,
    ) -> Result<ResponseCode, MailboxError> {
        let address = mailbox.bus_address(self.words.as_mut_ptr() as usize)?;
        fence(Ordering::SeqCst);
        mailbox.transfer(address, Channel::Tags)?;
        fence(Ordering::SeqCst);
        Ok(ResponseCode::from(self.read(1)))
    }
}

impl<const N: usize> Default for PropertyBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u32,
    pub size: u32,
}

/// Power and clock state word: bit 0 on, bit 1 "no such device".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub on: bool,
    pub present: bool,
}

impl DeviceState {
    pub const fn from_word(word: u32) -> DeviceState {
        DeviceState {
            on: word & 0b01 != 0,
            present: word & 0b10 == 0,
        }
    }
}

pub const REQUEST_WORDS: usize = 64;
pub const MAX_TAGS: usize = 16;

/// Where one tag of a PropertyRequest sits in its word stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSlot {
    tag: Tag,
    offset: usize,
}

impl TagSlot {
    pub const fn tag(&self) -> Tag {
        self.tag
    }
}

/*
 * PropertyRequest - several tags in one message
 *
 * push() encodes a tag and hands back its slot; after VideoCore::submit()
 * each slot decodes into the firmware's answer for that tag.
 */
pub struct PropertyRequest {
    words: [u32; REQUEST_WORDS],
    len: usize,
    slots: [Option<TagSlot>; MAX_TAGS],
    count: usize,
}

impl PropertyRequest {
    pub const fn new() -> PropertyRequest {
        PropertyRequest {
            words: [0; REQUEST_WORDS],
            len: 0,
            slots: [None; MAX_TAGS],
            count: 0,
        }
    }

    pub fn push(&mut self, tag: Tag) -> Result<TagSlot, PropertyError> {
        if self.count == MAX_TAGS {
            return Err(PropertyError::Overflow {
                needed: self.len + tag.encoded_words(),
                capacity: REQUEST_WORDS,
            });
        }
        let offset = self.len;
        let used = tag.encode(&mut self.words[offset..])?;
        self.len += used;

        let slot = TagSlot { tag, offset };
        self.slots[self.count] = Some(slot);
        self.count += 1;
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.len]
    }

    pub fn slots(&self) -> impl Iterator<Item = TagSlot> + '_ {
        self.slots[..self.count].iter().flatten().copied()
    }

    pub fn response(&self, slot: TagSlot) -> Result<TagResponse, PropertyError> {
        let end = slot.offset + slot.tag.encoded_words();
        let words = self
            .words
            .get(slot.offset..end)
            .filter(|_| end <= self.len)
            .ok_or(PropertyError::MalformedTags {
                offset: slot.offset,
            })?;
        TagResponse::decode(words)
    }
}

impl Default for PropertyRequest {
    fn default() -> Self {
        Self::new()
    }
}

/*
 * VideoCore - the owned handle to the firmware
 *
 * There is exactly one per boot. It owns the mailbox and the scratch buffer
 * the firmware writes into.
 */
pub struct VideoCore<B> {
    mailbox: Mailbox<B>,
    buffer: PropertyBuffer,
}

impl<B: RegisterBus> VideoCore<B> {
    pub fn new(mailbox: Mailbox<B>) -> VideoCore<B> {
        VideoCore {
            mailbox,
            buffer: PropertyBuffer::new(),
        }
    }

    pub fn mailbox(&mut self) -> &mut Mailbox<B> {
        &mut self.mailbox
    }

    /*
     * Runs a tag stream through the firmware and copies the answer back
     *
     * Returns the raw response code. Tags are not inspected beyond the size
     * check: callers decide what an ERROR or a missing response bit means.
     * Nothing is sent if the stream is malformed or too large.
     */
    pub fn process(&mut self, tags: &mut [u32]) -> Result<ResponseCode, PropertyError> {
        validate_tags(tags)?;
        let words = self.buffer.load(tags)?;
        let code = self.buffer.exchange(&mut self.mailbox)?;
        self.buffer.unload(tags);
        trace!("property: {} words, answered {:?}", words, code);
        Ok(code)
    }

    /*
     * Sends `data` as a one-off message built on the stack
     *
     * On SUCCESS the answered words (as many as fit) are copied into
     * `response`. On any other code `response` is left as it was.
     */
    pub fn tag_message(&mut self, response: &mut [u32], data: &[u32]) -> Result<(), PropertyError> {
        validate_tags(data)?;
        let mut message = PropertyBuffer::<TAG_MESSAGE_WORDS>::new();
        message.load(data)?;
        check(message.exchange(&mut self.mailbox)?)?;

        let count = response.len().min(data.len());
        message.unload(&mut response[..count]);
        Ok(())
    }

    /// Single-value getter: one word of request space, first word back.
    pub fn get(&mut self, tag_id: u32) -> Result<u32, PropertyError> {
        let mut tag = [tag_id, 4, 0, 0];
        check(self.process(&mut tag)?)?;
        TagResponse::decode(&tag)?.word(0)
    }

    /// Getter keyed by a device or clock id; returns the value after the id.
    pub fn get_id(&mut self, tag_id: u32, id: u32) -> Result<u32, PropertyError> {
        let mut tag = [tag_id, 8, 0, id, 0];
        check(self.process(&mut tag)?)?;
        TagResponse::decode(&tag)?.word(1)
    }

    pub fn query(&mut self, tag: Tag) -> Result<TagResponse, PropertyError> {
        let mut words = [0; TAG_HEADER_WORDS + MAX_VALUE_WORDS];
        let used = tag.encode(&mut words)?;
        check(self.process(&mut words[..used])?)?;
        TagResponse::decode(&words[..used])
    }

    pub fn submit(&mut self, request: &mut PropertyRequest) -> Result<(), PropertyError> {
        let len = request.len;
        check(self.process(&mut request.words[..len])?)
    }

    pub fn firmware_revision(&mut self) -> Result<u32, PropertyError> {
        self.query(Tag::FirmwareRevision)?.word(0)
    }

    pub fn board_model(&mut self) -> Result<u32, PropertyError> {
        self.query(Tag::BoardModel)?.word(0)
    }

    pub fn board_revision(&mut self) -> Result<u32, PropertyError> {
        self.query(Tag::BoardRevision)?.word(0)
    }

    pub fn board_mac_address(&mut self) -> Result<[u8; 6], PropertyError> {
        let response = self.query(Tag::BoardMacAddress)?;
        let values = response.expect_len(6)?.values();
        let low = values[0].to_le_bytes();
        let high = values[1].to_le_bytes();
        Ok([low[0], low[1], low[2], low[3], high[0], high[1]])
    }

    pub fn board_serial(&mut self) -> Result<u64, PropertyError> {
        let (low, high) = self.query(Tag::BoardSerial)?.pair()?;
        Ok((high as u64) << 32 | low as u64)
    }

    pub fn arm_memory(&mut self) -> Result<MemoryRegion, PropertyError> {
        let (base, size) = self.query(Tag::ArmMemory)?.pair()?;
        Ok(MemoryRegion { base, size })
    }

    pub fn vc_memory(&mut self) -> Result<MemoryRegion, PropertyError> {
        let (base, size) = self.query(Tag::VcMemory)?.pair()?;
        Ok(MemoryRegion { base, size })
    }

    /// Bitmask of DMA channels the firmware leaves to the ARM.
    pub fn dma_channels(&mut self) -> Result<u32, PropertyError> {
        self.query(Tag::DmaChannels)?.word(0)
    }

    pub fn power_state(&mut self, device: Device) -> Result<DeviceState, PropertyError> {
        Ok(DeviceState::from_word(self.query(Tag::PowerState(device))?.word(1)?))
    }

    pub fn set_power_state(
        &mut self,
        device: Device,
        on: bool,
        wait: bool,
    ) -> Result<DeviceState, PropertyError> {
        let response = self.query(Tag::SetPowerState { device, on, wait })?;
        Ok(DeviceState::from_word(response.word(1)?))
    }

    /// Microseconds the device needs to stabilise after power on.
    pub fn timing(&mut self, device: Device) -> Result<u32, PropertyError> {
        self.query(Tag::Timing(device))?.word(1)
    }

    pub fn clock_state(&mut self, clock: Clock) -> Result<DeviceState, PropertyError> {
        Ok(DeviceState::from_word(self.query(Tag::ClockState(clock))?.word(1)?))
    }

    pub fn set_clock_state(&mut self, clock: Clock, on: bool) -> Result<DeviceState, PropertyError> {
        let response = self.query(Tag::SetClockState { clock, on })?;
        Ok(DeviceState::from_word(response.word(1)?))
    }

    pub fn clock_rate(&mut self, clock: Clock) -> Result<u32, PropertyError> {
        self.get_id(GET_CLOCK_RATE, clock as u32)
    }

    pub fn max_clock_rate(&mut self, clock: Clock) -> Result<u32, PropertyError> {
        self.query(Tag::MaxClockRate(clock))?.word(1)
    }

    pub fn min_clock_rate(&mut self, clock: Clock) -> Result<u32, PropertyError> {
        self.query(Tag::MinClockRate(clock))?.word(1)
    }

    /// Returns the rate the firmware actually applied.
    pub fn set_clock_rate(
        &mut self,
        clock: Clock,
        rate: u32,
        skip_turbo: bool,
    ) -> Result<u32, PropertyError> {
        let response = self.query(Tag::SetClockRate {
            clock,
            rate,
            skip_turbo,
        })?;
        response.word(1)
    }

    pub fn turbo(&mut self) -> Result<bool, PropertyError> {
        Ok(self.query(Tag::Turbo)?.word(1)? != 0)
    }

    pub fn set_turbo(&mut self, on: bool) -> Result<bool, PropertyError> {
        Ok(self.query(Tag::SetTurbo(on))?.word(1)? != 0)
    }
}
