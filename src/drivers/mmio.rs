/*
 * mmio.rs - Register Access Layer
 *
 * Every peripheral in this kernel is driven through 32-bit registers at
 * fixed physical addresses. Drivers never dereference those addresses
 * themselves; they go through a RegisterBus so that:
 *
 * 1. every access is a volatile 32-bit load/store (the compiler may not
 *    cache, merge, or reorder it against other register accesses), and
 * 2. tests can swap the hardware for a simulated bus (see drivers/sim.rs).
 */

use core::ptr::{read_volatile, write_volatile};

/*
 * RegisterBus - how a driver reaches its registers
 *
 * dma_address() answers "what address does the VideoCore see for this
 * buffer?". The firmware only takes 32-bit addresses, so anything above
 * 4 GiB is unaddressable. On these boards the ARM physical address is used
 * unchanged.
 */
pub trait RegisterBus {
    fn read(&self, addr: usize) -> u32;
    fn write(&self, addr: usize, value: u32);

    fn dma_address(&self, phys: usize) -> Option<u32> {
        u32::try_from(phys).ok()
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for &B {
    fn read(&self, addr: usize) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: usize, value: u32) {
        (**self).write(addr, value)
    }

    fn dma_address(&self, phys: usize) -> Option<u32> {
        (**self).dma_address(phys)
    }
}

/*
 * Peripheral Register Address
 *
 * A physical address known at compile time. Alignment is checked when the
 * constant is built, so a typo in an offset table fails the build instead of
 * faulting on the board.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register(usize);

impl Register {
    pub const fn new(addr: usize) -> Register {
        assert!(addr % 4 == 0, "register address must be 32-bit aligned");
        Register(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    #[inline]
    pub fn read<B: RegisterBus>(self, bus: &B) -> u32 {
        bus.read(self.0)
    }

    #[inline]
    pub fn write<B: RegisterBus>(self, bus: &B, value: u32) {
        bus.write(self.0, value)
    }

    /// Read-modify-write: clears `clear`, then sets `set`.
    #[inline]
    pub fn modify<B: RegisterBus>(self, bus: &B, clear: u32, set: u32) {
        let value = (self.read(bus) & !clear) | set;
        self.write(bus, value);
    }
}

/*
 * Mmio - the real bus
 *
 * Zero-sized; all state lives in the hardware.
 */
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /*
     * Creates a handle onto physical memory
     *
     * Safety: the caller must be running with the peripheral window
     * identity-mapped (MMU off, or mapped 1:1) and must only pass Register
     * addresses from hardwareselect.rs through it.
     */
    pub const unsafe fn new() -> Mmio {
        Mmio { _private: () }
    }
}

impl RegisterBus for Mmio {
    #[inline]
    fn read(&self, addr: usize) -> u32 {
        unsafe { read_volatile(addr as *const u32) }
    }

    #[inline]
    fn write(&self, addr: usize, value: u32) {
        unsafe { write_volatile(addr as *mut u32, value) }
    }
}

/*
 * Spins for roughly `cycles` iterations
 *
 * Used for the fixed set-up/hold delays of the GPIO pull-resistor sequence.
 * spin_loop() is an opaque hint instruction, so the loop is not optimized
 * away.
 */
#[inline(never)]
pub fn delay(cycles: u32) {
    for _ in 0..cycles {
        core::hint::spin_loop();
    }
}
