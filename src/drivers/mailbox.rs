/*
 * mailbox.rs - ARM <-> VideoCore mailbox transport
 *
 * The mailbox is a pair of hardware FIFOs between the ARM core and the
 * VideoCore. Each entry is one 32-bit word: the upper 28 bits carry data
 * (usually the bus address of a 16-byte aligned buffer), the lower 4 bits
 * select the channel.
 *
 * How it works:
 * 1. send(): wait until the ARM->VC FIFO is not FULL (STATUS1), then write
 *    data|channel to WRITE
 * 2. the VideoCore services the request and pushes a word to the VC->ARM FIFO
 * 3. receive(): wait until that FIFO is not EMPTY (STATUS0), read READ, and
 *    drop anything addressed to another channel
 *
 * Every wait is bounded by a PollBudget, so a firmware that never answers
 * comes back as MailboxError::NotResponding instead of hanging the boot.
 *
 * A timed-out request may still be answered later. call() and transfer()
 * drain the read FIFO before sending, transfer() only accepts the reply that
 * echoes its own buffer address, and a request whose reply never came
 * blocks the next one until that reply has been collected.
 */

use bitflags::bitflags;
use log::{debug, trace};
use thiserror::Error;

use super::mmio::{Register, RegisterBus};
use crate::config::MAILBOX_POLL_LIMIT;
use crate::hardwareselect::MAILBOX_BASE;
use crate::utils::poll::PollBudget;

const READ: Register = Register::new(MAILBOX_BASE + 0x00);
const STATUS0: Register = Register::new(MAILBOX_BASE + 0x18);
const WRITE: Register = Register::new(MAILBOX_BASE + 0x20);
const STATUS1: Register = Register::new(MAILBOX_BASE + 0x38);

// Buffers passed through the mailbox lose their low four bits
pub const BUFFER_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Channel {
    Power = 0,
    Framebuffer = 1,
    VirtualUart = 2,
    Vchiq = 3,
    Leds = 4,
    Buttons = 5,
    Touch = 6,
    Count = 7,
    Tags = 8,
    Gpu = 9,
}

impl Channel {
    pub const ALL: [Channel; 10] = [
        Channel::Power,
        Channel::Framebuffer,
        Channel::VirtualUart,
        Channel::Vchiq,
        Channel::Leds,
        Channel::Buttons,
        Channel::Touch,
        Channel::Count,
        Channel::Tags,
        Channel::Gpu,
    ];

    pub const fn raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Channel {
    type Error = MailboxError;

    fn try_from(raw: u32) -> Result<Channel, MailboxError> {
        Channel::ALL
            .get(raw as usize)
            .copied()
            .ok_or(MailboxError::InvalidChannel(raw))
    }
}

/// One mailbox word: `data[31:4] | channel[3:0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message(u32);

impl Message {
    pub const DATA_MASK: u32 = 0xFFFF_FFF0;
    pub const CHANNEL_MASK: u32 = 0x0000_000F;

    /// Any bits of `data` below bit 4 are dropped.
    pub const fn new(data: u32, channel: Channel) -> Message {
        Message((data & Self::DATA_MASK) | (channel as u32 & Self::CHANNEL_MASK))
    }

    pub const fn from_raw(raw: u32) -> Message {
        Message(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn data(self) -> u32 {
        self.0 & Self::DATA_MASK
    }

    pub const fn channel_bits(self) -> u32 {
        self.0 & Self::CHANNEL_MASK
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        const FULL = 1 << 31;
        const EMPTY = 1 << 30;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    #[error("VideoCore not responding on mailbox channel {channel:?}")]
    NotResponding { channel: Channel },
    #[error("mailbox channel {0} does not exist")]
    InvalidChannel(u32),
    #[error("buffer at {0:#x} is outside the VideoCore's 32-bit window")]
    Unaddressable(usize),
    #[error("buffer at {0:#x} is not 16-byte aligned")]
    Misaligned(usize),
}

// A request whose reply did not arrive in time
#[derive(Debug, Clone, Copy)]
struct Lost {
    channel: Channel,
    echo: Option<u32>,
}

pub struct Mailbox<B> {
    bus: B,
    budget: PollBudget,
    lost: Option<Lost>,
}

impl<B: RegisterBus> Mailbox<B> {
    pub fn new(bus: B) -> Mailbox<B> {
        Mailbox::with_budget(bus, PollBudget::new(MAILBOX_POLL_LIMIT))
    }

    pub fn with_budget(bus: B, budget: PollBudget) -> Mailbox<B> {
        Mailbox {
            bus,
            budget,
            lost: None,
        }
    }

    /// True while an earlier request is still waiting for its reply.
    pub fn is_desynced(&self) -> bool {
        self.lost.is_some()
    }

    /*
     * Translates a buffer's physical address into the word the VideoCore
     * expects in a message
     *
     * Fails if the buffer is not 16-byte aligned (its low bits would be
     * eaten by the channel field) or sits outside 32-bit bus space.
     */
    pub fn bus_address(&self, phys: usize) -> Result<u32, MailboxError> {
        if phys % BUFFER_ALIGNMENT != 0 {
            return Err(MailboxError::Misaligned(phys));
        }
        self.bus
            .dma_address(phys)
            .ok_or(MailboxError::Unaddressable(phys))
    }

    fn status(&self, register: Register) -> Status {
        Status::from_bits_truncate(register.read(&self.bus))
    }

    /*
     * Posts one word to the VideoCore
     *
     * The low four bits of `payload` are cleared, never reported.
     */
    pub fn send(&mut self, payload: u32, channel: Channel) -> Result<(), MailboxError> {
        self.budget
            .wait_until(|| !self.status(STATUS1).contains(Status::FULL))
            .map_err(|_| MailboxError::NotResponding { channel })?;
        WRITE.write(&self.bus, Message::new(payload, channel).raw());
        Ok(())
    }

    /*
     * Waits for the next word on `channel`
     *
     * Words for other channels are consumed and discarded. They count
     * against the same budget as the flag polls, so a stream of foreign
     * traffic cannot keep this loop alive forever.
     */
    pub fn receive(&mut self, channel: Channel) -> Result<u32, MailboxError> {
        self.await_reply(channel, None)
    }

    /*
     * Like receive(), but with `echo` set only a word carrying exactly that
     * data is accepted. Everything else on the channel is a stale reply.
     */
    fn await_reply(&mut self, channel: Channel, echo: Option<u32>) -> Result<u32, MailboxError> {
        let timeout = |_| MailboxError::NotResponding { channel };
        let mut spinner = self.budget.start();
        loop {
            spinner
                .wait_until(|| !self.status(STATUS0).contains(Status::EMPTY))
                .map_err(timeout)?;
            let message = Message::from_raw(READ.read(&self.bus));
            if message.channel_bits() == channel.raw()
                && echo.is_none_or(|data| data == message.data())
            {
                return Ok(message.data());
            }
            trace!(
                "mailbox: dropped {:#010x} while waiting on {:?}",
                message.raw(),
                channel
            );
            spinner.spin().map_err(timeout)?;
        }
    }

    /*
     * Gets the mailbox back into a state where the next reply belongs to the
     * next request
     *
     * A reply still owed from a timed-out request is waited for first; if it
     * does not show up the new request is refused. Anything already sitting
     * in the read FIFO predates the new request and is discarded.
     */
    fn settle(&mut self, channel: Channel) -> Result<(), MailboxError> {
        if let Some(lost) = self.lost {
            self.await_reply(lost.channel, lost.echo)?;
            debug!("mailbox: late reply on {:?} collected", lost.channel);
            self.lost = None;
        }

        let mut spinner = self.budget.start();
        while !self.status(STATUS0).contains(Status::EMPTY) {
            let stale = READ.read(&self.bus);
            trace!("mailbox: drained stale {:#010x}", stale);
            spinner
                .spin()
                .map_err(|_| MailboxError::NotResponding { channel })?;
        }
        Ok(())
    }

    fn exchange(
        &mut self,
        payload: u32,
        channel: Channel,
        echo: Option<u32>,
    ) -> Result<u32, MailboxError> {
        self.settle(channel)?;
        self.send(payload, channel)?;
        self.await_reply(channel, echo).inspect_err(|_| {
            self.lost = Some(Lost { channel, echo });
        })
    }

    /// One request and its reply on `channel`. Returns the reply's data bits.
    pub fn call(&mut self, payload: u32, channel: Channel) -> Result<u32, MailboxError> {
        self.exchange(payload, channel, None)
    }

    /*
     * Hands the buffer at bus address `address` to the VideoCore and waits
     * until it comes back
     *
     * The firmware answers in place and echoes the address, so only that
     * exact word completes the transfer.
     */
    pub fn transfer(&mut self, address: u32, channel: Channel) -> Result<(), MailboxError> {
        let data = Message::new(address, channel).data();
        self.exchange(address, channel, Some(data)).map(|_| ())
    }
}
