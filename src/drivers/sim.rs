/*
 * sim.rs - Simulated peripherals for host tests
 *
 * SimBus implements RegisterBus over a plain register map and models the
 * three devices the boot path talks to:
 *
 * - the mailbox: a read FIFO with EMPTY/FULL status, plus an optional peer
 *   (silent, loopback, or a VideoCore that answers property requests and the
 *   legacy framebuffer channel by editing the buffer in host memory),
 * - the PL011 / mini UART data and flag registers, optionally wired in
 *   loopback,
 * - everything else: write-logged, read-back registers.
 *
 * Host buffers live above 4 GiB, so dma_address() hands out 32-bit tokens and
 * keeps the real pointer on the side.
 */

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ptr;

use super::mmio::RegisterBus;
use crate::hardwareselect::{AUX_BASE, MAILBOX_BASE, UART0_BASE};

const MBOX_READ: usize = MAILBOX_BASE;
const MBOX_STATUS0: usize = MAILBOX_BASE + 0x18;
const MBOX_WRITE: usize = MAILBOX_BASE + 0x20;
const MBOX_STATUS1: usize = MAILBOX_BASE + 0x38;

const MBOX_FULL: u32 = 0x8000_0000;
const MBOX_EMPTY: u32 = 0x4000_0000;

const UART_DR: usize = UART0_BASE;
const UART_FR: usize = UART0_BASE + 0x18;
const FR_RXFE: u32 = 1 << 4;
const FR_TXFF: u32 = 1 << 5;

const MU_IO: usize = AUX_BASE + 0x40;
const MU_LSR: usize = AUX_BASE + 0x54;
const LSR_DATA_READY: u32 = 1 << 0;
const LSR_TX_EMPTY: u32 = 1 << 5;

// Tokens handed out by dma_address(); 16-byte aligned, one per buffer
const DMA_WINDOW: u32 = 0x0010_0000;
const DMA_STRIDE: u32 = 0x1000;

const CODE_SUCCESS: u32 = 0x8000_0000;
const CODE_ERROR: u32 = 0x8000_0001;
const TAG_RESPONSE: u32 = 0x8000_0000;

pub(crate) enum Peer {
    Silent,
    Loopback,
    VideoCore(SimVideoCore),
}

struct State {
    regs: HashMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    peer: Peer,
    inbox: VecDeque<u32>,
    sent: Vec<u32>,
    mailbox_wedged: bool,
    write_busy_polls: u32,
    holding: bool,
    held: Vec<u32>,
    cross_traffic: VecDeque<u32>,
    dma: Vec<usize>,
    uart_rx: VecDeque<u32>,
    uart_tx: Vec<u8>,
    uart_loopback: bool,
    uart_wedged: bool,
}

pub(crate) struct SimBus {
    state: RefCell<State>,
}

impl SimBus {
    pub(crate) fn new() -> SimBus {
        SimBus::with_peer(Peer::Silent)
    }

    pub(crate) fn with_loopback() -> SimBus {
        SimBus::with_peer(Peer::Loopback)
    }

    pub(crate) fn with_videocore(videocore: SimVideoCore) -> SimBus {
        SimBus::with_peer(Peer::VideoCore(videocore))
    }

    fn with_peer(peer: Peer) -> SimBus {
        SimBus {
            state: RefCell::new(State {
                regs: HashMap::new(),
                writes: Vec::new(),
                peer,
                inbox: VecDeque::new(),
                sent: Vec::new(),
                mailbox_wedged: false,
                write_busy_polls: 0,
                holding: false,
                held: Vec::new(),
                cross_traffic: VecDeque::new(),
                dma: Vec::new(),
                uart_rx: VecDeque::new(),
                uart_tx: Vec::new(),
                uart_loopback: false,
                uart_wedged: false,
            }),
        }
    }

    // --- mailbox controls ---

    pub(crate) fn queue_mail(&self, word: u32) {
        self.state.borrow_mut().inbox.push_back(word);
    }

    pub(crate) fn sent_mail(&self) -> Vec<u32> {
        self.state.borrow().sent.clone()
    }

    pub(crate) fn pending_mail(&self) -> usize {
        self.state.borrow().inbox.len()
    }

    /// Status registers stop changing: reads look EMPTY, writes look FULL.
    pub(crate) fn wedge_mailbox(&self) {
        self.state.borrow_mut().mailbox_wedged = true;
    }

    pub(crate) fn stall_mailbox_writes(&self, polls: u32) {
        self.state.borrow_mut().write_busy_polls = polls;
    }

    /// Replies are kept back until release_replies(), as if answered late.
    pub(crate) fn hold_replies(&self) {
        self.state.borrow_mut().holding = true;
    }

    pub(crate) fn release_replies(&self) {
        let mut state = self.state.borrow_mut();
        state.holding = false;
        let held = std::mem::take(&mut state.held);
        state.inbox.extend(held);
    }

    /// `word` lands in the read FIFO right after the next send, ahead of
    /// that send's own reply.
    pub(crate) fn deliver_on_next_send(&self, word: u32) {
        self.state.borrow_mut().cross_traffic.push_back(word);
    }

    pub(crate) fn videocore<R>(&self, f: impl FnOnce(&mut SimVideoCore) -> R) -> R {
        match &mut self.state.borrow_mut().peer {
            Peer::VideoCore(vc) => f(vc),
            _ => panic!("bus has no simulated VideoCore"),
        }
    }

    // --- UART controls ---

    pub(crate) fn wire_uart_loopback(&self) {
        self.state.borrow_mut().uart_loopback = true;
    }

    pub(crate) fn feed_uart(&self, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.uart_rx.extend(bytes.iter().map(|&b| b as u32));
    }

    /// Queues a raw data-register value, error bits included.
    pub(crate) fn feed_uart_raw(&self, word: u32) {
        self.state.borrow_mut().uart_rx.push_back(word);
    }

    pub(crate) fn uart_output(&self) -> Vec<u8> {
        self.state.borrow().uart_tx.clone()
    }

    pub(crate) fn wedge_uart(&self) {
        self.state.borrow_mut().uart_wedged = true;
    }

    // --- generic registers ---

    pub(crate) fn writes_to(&self, addrs: &[usize]) -> Vec<(usize, u32)> {
        self.state
            .borrow()
            .writes
            .iter()
            .copied()
            .filter(|(addr, _)| addrs.contains(addr))
            .collect()
    }

    pub(crate) fn reg(&self, addr: usize) -> u32 {
        self.state.borrow().regs.get(&addr).copied().unwrap_or(0)
    }
}

impl RegisterBus for SimBus {
    fn read(&self, addr: usize) -> u32 {
        let mut state = self.state.borrow_mut();
        match addr {
            MBOX_STATUS0 => {
                if state.mailbox_wedged || state.inbox.is_empty() {
                    MBOX_EMPTY
                } else {
                    0
                }
            }
            MBOX_STATUS1 => {
                if state.mailbox_wedged {
                    MBOX_FULL
                } else if state.write_busy_polls > 0 {
                    state.write_busy_polls -= 1;
                    MBOX_FULL
                } else {
                    0
                }
            }
            MBOX_READ => state.inbox.pop_front().unwrap_or(0),
            UART_FR => {
                let mut flags = 0;
                if state.uart_rx.is_empty() {
                    flags |= FR_RXFE;
                }
                if state.uart_wedged {
                    flags |= FR_TXFF;
                }
                flags
            }
            MU_LSR => {
                let mut flags = 0;
                if !state.uart_rx.is_empty() {
                    flags |= LSR_DATA_READY;
                }
                if !state.uart_wedged {
                    flags |= LSR_TX_EMPTY;
                }
                flags
            }
            UART_DR | MU_IO => state.uart_rx.pop_front().unwrap_or(0),
            _ => state.regs.get(&addr).copied().unwrap_or(0),
        }
    }

    fn write(&self, addr: usize, value: u32) {
        let mut state = self.state.borrow_mut();
        state.writes.push((addr, value));
        match addr {
            MBOX_WRITE => {
                state.sent.push(value);
                if state.mailbox_wedged {
                    return;
                }
                let host = state.resolve(value & !0xF);
                let reply = match &mut state.peer {
                    Peer::Silent => None,
                    Peer::Loopback => Some(value),
                    Peer::VideoCore(vc) => match (value & 0xF, host) {
                        (8, Some(ptr)) => {
                            unsafe { vc.answer_property(ptr) };
                            Some(value)
                        }
                        (1, Some(ptr)) => {
                            let status = unsafe { vc.answer_legacy_framebuffer(ptr) };
                            Some((status << 4) | 1)
                        }
                        _ => None,
                    },
                };
                if let Some(word) = state.cross_traffic.pop_front() {
                    state.inbox.push_back(word);
                }
                if let Some(word) = reply {
                    if state.holding {
                        state.held.push(word);
                    } else {
                        state.inbox.push_back(word);
                    }
                }
            }
            UART_DR | MU_IO => {
                if state.uart_wedged {
                    return;
                }
                let byte = (value & 0xFF) as u8;
                state.uart_tx.push(byte);
                if state.uart_loopback {
                    state.uart_rx.push_back(byte as u32);
                }
            }
            _ => {
                state.regs.insert(addr, value);
            }
        }
    }

    fn dma_address(&self, phys: usize) -> Option<u32> {
        let mut state = self.state.borrow_mut();
        let index = match state.dma.iter().position(|&p| p == phys) {
            Some(index) => index,
            None => {
                state.dma.push(phys);
                state.dma.len() - 1
            }
        };
        Some(DMA_WINDOW + index as u32 * DMA_STRIDE)
    }
}

impl State {
    fn resolve(&self, token: u32) -> Option<*mut u32> {
        let offset = token.checked_sub(DMA_WINDOW)?;
        if offset % DMA_STRIDE != 0 {
            return None;
        }
        self.dma
            .get((offset / DMA_STRIDE) as usize)
            .map(|&phys| phys as *mut u32)
    }
}

// ============================================================================
// SIMULATED VIDEOCORE FIRMWARE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SimDisplay {
    pub physical: (u32, u32),
    pub virtual_size: (u32, u32),
    pub depth: u32,
    pub pixel_order: u32,
    pub offset: (u32, u32),
    pub base: u32,
    pub size: u32,
}

pub(crate) struct SimVideoCore {
    pub firmware_revision: u32,
    pub board_model: u32,
    pub board_revision: u32,
    pub mac: [u8; 6],
    pub serial: u64,
    pub arm_memory: (u32, u32),
    pub vc_memory: (u32, u32),
    pub dma_channels: u32,
    pub clock_rates: HashMap<u32, u32>,
    pub clock_on: HashMap<u32, bool>,
    pub power_on: HashMap<u32, bool>,
    pub turbo: u32,
    pub display: SimDisplay,
    pub allocations: u32,
    /// Pitch to report instead of the computed one.
    pub forced_pitch: Option<u32>,
    /// Tag ids that make the whole request come back with ERROR.
    pub reject: Vec<u32>,
    /// Tag ids the firmware pretends not to know (no response bit).
    pub ignore: Vec<u32>,
    pub requests: u32,
    pub last_request: Vec<u32>,
}

impl SimVideoCore {
    pub(crate) fn new() -> SimVideoCore {
        let clock_rates = HashMap::from([
            (1, 200_000_000),  // EMMC
            (2, 48_000_000),   // UART
            (3, 1_200_000_000), // ARM
            (4, 400_000_000),  // CORE
            (8, 450_000_000),  // SDRAM
        ]);
        SimVideoCore {
            firmware_revision: 0x5AB1_7A8E,
            board_model: 0,
            board_revision: 0x00A0_2082,
            mac: [0xB8, 0x27, 0xEB, 0x12, 0x34, 0x56],
            serial: 0x0000_0000_1234_ABCD,
            arm_memory: (0, 0x3C00_0000),
            vc_memory: (0x3C00_0000, 0x0400_0000),
            dma_channels: 0x7F35,
            clock_on: clock_rates.keys().map(|&id| (id, true)).collect(),
            clock_rates,
            power_on: HashMap::new(),
            turbo: 0,
            display: SimDisplay {
                physical: (1024, 768),
                virtual_size: (1024, 768),
                depth: 16,
                ..SimDisplay::default()
            },
            allocations: 0,
            forced_pitch: None,
            reject: Vec::new(),
            ignore: Vec::new(),
            requests: 0,
            last_request: Vec::new(),
        }
    }

    fn pitch(&self) -> u32 {
        if let Some(pitch) = self.forced_pitch {
            return pitch;
        }
        let raw = self.display.virtual_size.0 * (self.display.depth / 8);
        (raw + 15) & !15
    }

    /*
     * Services one property buffer in place
     *
     * Safety: `buffer` must point at a live, word-aligned property buffer
     * whose first word holds its total size in bytes.
     */
    unsafe fn answer_property(&mut self, buffer: *mut u32) {
        self.requests += 1;
        let total = unsafe { ptr::read_volatile(buffer) } as usize;
        let words = unsafe { core::slice::from_raw_parts_mut(buffer, total / 4) };
        self.last_request = words.to_vec();

        let mut rejected = false;
        let mut i = 2;
        while i + 2 < words.len() && words[i] != 0 {
            let id = words[i];
            let capacity = (words[i + 1] / 4) as usize;
            let end = (i + 3 + capacity).min(words.len());
            if self.reject.contains(&id) {
                rejected = true;
            }
            if !self.ignore.contains(&id) {
                let values = &mut words[i + 3..end];
                if let Some(len) = self.answer_tag(id, values) {
                    words[i + 2] = TAG_RESPONSE | len;
                }
            }
            i = end;
        }
        words[1] = if rejected { CODE_ERROR } else { CODE_SUCCESS };
    }

    // Returns the response length in bytes, or None for unknown tags.
    fn answer_tag(&mut self, id: u32, v: &mut [u32]) -> Option<u32> {
        let mut out = [0u32; 4];
        let len: u32 = match id {
            0x0000_0001 => {
                out[0] = self.firmware_revision;
                4
            }
            0x0001_0001 => {
                out[0] = self.board_model;
                4
            }
            0x0001_0002 => {
                out[0] = self.board_revision;
                4
            }
            0x0001_0003 => {
                let m = self.mac;
                out[0] = u32::from_le_bytes([m[0], m[1], m[2], m[3]]);
                out[1] = u32::from_le_bytes([m[4], m[5], 0, 0]);
                6
            }
            0x0001_0004 => {
                out[0] = self.serial as u32;
                out[1] = (self.serial >> 32) as u32;
                8
            }
            0x0001_0005 => {
                out[0] = self.arm_memory.0;
                out[1] = self.arm_memory.1;
                8
            }
            0x0001_0006 => {
                out[0] = self.vc_memory.0;
                out[1] = self.vc_memory.1;
                8
            }
            0x0006_0001 => {
                out[0] = self.dma_channels;
                4
            }
            0x0002_0001 => {
                let device = v.first().copied().unwrap_or(0);
                out[0] = device;
                out[1] = match self.power_on.get(&device) {
                    Some(true) => 0b01,
                    Some(false) => 0b00,
                    None if device <= 8 => 0b00,
                    None => 0b10,
                };
                8
            }
            0x0002_0002 => {
                out[0] = v.first().copied().unwrap_or(0);
                out[1] = 1_000;
                8
            }
            0x0002_8001 => {
                let device = v.first().copied().unwrap_or(0);
                let on = v.get(1).copied().unwrap_or(0) & 1 != 0;
                self.power_on.insert(device, on);
                out[0] = device;
                out[1] = on as u32;
                8
            }
            0x0003_0001 => {
                let clock = v.first().copied().unwrap_or(0);
                out[0] = clock;
                out[1] = match self.clock_on.get(&clock) {
                    Some(true) => 0b01,
                    Some(false) => 0b00,
                    None => 0b10,
                };
                8
            }
            0x0003_8001 => {
                let clock = v.first().copied().unwrap_or(0);
                let on = v.get(1).copied().unwrap_or(0) & 1 != 0;
                self.clock_on.insert(clock, on);
                out[0] = clock;
                out[1] = on as u32;
                8
            }
            0x0003_0002 | 0x0003_0004 | 0x0003_0007 => {
                let clock = v.first().copied().unwrap_or(0);
                let rate = self.clock_rates.get(&clock).copied().unwrap_or(0);
                out[0] = clock;
                out[1] = match id {
                    0x0003_0004 => rate.saturating_mul(2),
                    0x0003_0007 => rate / 2,
                    _ => rate,
                };
                8
            }
            0x0003_8002 => {
                let clock = v.first().copied().unwrap_or(0);
                let rate = v.get(1).copied().unwrap_or(0);
                self.clock_rates.insert(clock, rate);
                out[0] = clock;
                out[1] = rate;
                8
            }
            0x0003_0009 => {
                out[0] = 0;
                out[1] = self.turbo;
                8
            }
            0x0003_8009 => {
                self.turbo = v.get(1).copied().unwrap_or(0);
                out[0] = 0;
                out[1] = self.turbo;
                8
            }
            0x0004_0001 => {
                let alignment = v.first().copied().unwrap_or(16).max(16);
                let raw = 0x3C00_0000 + self.allocations * 0x0020_0000;
                self.allocations += 1;
                self.display.base = (raw + alignment - 1) & !(alignment - 1);
                self.display.size = self.pitch() * self.display.virtual_size.1;
                out[0] = self.display.base;
                out[1] = self.display.size;
                8
            }
            0x0004_8001 => {
                self.display.base = 0;
                self.display.size = 0;
                0
            }
            0x0004_0003 | 0x0004_8003 => {
                if id == 0x0004_8003 {
                    self.display.physical = (v[0], v[1]);
                }
                out[0] = self.display.physical.0;
                out[1] = self.display.physical.1;
                8
            }
            0x0004_0004 | 0x0004_8004 => {
                if id == 0x0004_8004 {
                    self.display.virtual_size = (v[0], v[1]);
                }
                out[0] = self.display.virtual_size.0;
                out[1] = self.display.virtual_size.1;
                8
            }
            0x0004_0005 | 0x0004_8005 => {
                if id == 0x0004_8005 {
                    self.display.depth = v[0];
                }
                out[0] = self.display.depth;
                4
            }
            0x0004_0006 | 0x0004_8006 => {
                if id == 0x0004_8006 {
                    self.display.pixel_order = v[0];
                }
                out[0] = self.display.pixel_order;
                4
            }
            0x0004_0008 => {
                out[0] = self.pitch();
                4
            }
            0x0004_0009 | 0x0004_8009 => {
                if id == 0x0004_8009 {
                    self.display.offset = (v[0], v[1]);
                }
                out[0] = self.display.offset.0;
                out[1] = self.display.offset.1;
                8
            }
            _ => return None,
        };
        let words = (len as usize).div_ceil(4);
        for (slot, value) in v.iter_mut().zip(out.iter().take(words)) {
            *slot = *value;
        }
        Some(len)
    }

    /*
     * Services the channel-1 framebuffer descriptor
     *
     * Layout: width, height, vwidth, vheight, pitch, depth, xoff, yoff, base,
     * size. Returns the status the firmware puts in the reply's data bits.
     *
     * Safety: `desc` must point at ten writable, aligned words.
     */
    unsafe fn answer_legacy_framebuffer(&mut self, desc: *mut u32) -> u32 {
        self.requests += 1;
        let words = unsafe { core::slice::from_raw_parts_mut(desc, 10) };
        if words[0] == 0 || words[1] == 0 || words[5] == 0 {
            return 1;
        }
        self.display.physical = (words[0], words[1]);
        self.display.virtual_size = (words[2], words[3]);
        self.display.depth = words[5];
        self.display.offset = (words[6], words[7]);
        self.display.base = 0x3C00_0000 + self.allocations * 0x0020_0000;
        self.allocations += 1;
        self.display.size = self.pitch() * words[3];
        words[4] = self.pitch();
        words[8] = self.display.base;
        words[9] = self.display.size;
        0
    }
}
