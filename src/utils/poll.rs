/*
 * poll.rs - Bounded busy-waiting
 *
 * Every wait in the boot path is a spin on a hardware flag. A PollBudget
 * turns "spin forever" into "spin at most N times", so a wedged device shows
 * up as an error instead of a silent hang. No interrupts, no yielding: the
 * execution model is unchanged, only the loop has an exit.
 */

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("device did not become ready after {polls} polls")]
pub struct PollTimeout {
    pub polls: u32,
}

/// Upper bound on flag polls for one operation. `None` spins forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    limit: Option<u32>,
}

impl PollBudget {
    pub const fn new(limit: u32) -> Self {
        PollBudget { limit: Some(limit) }
    }

    pub const fn unbounded() -> Self {
        PollBudget { limit: None }
    }

    pub const fn from_option(limit: Option<u32>) -> Self {
        PollBudget { limit }
    }

    /*
     * Starts a countdown for one operation
     *
     * A single Spinner can be shared across several waits (the mailbox
     * receive path restarts its poll after skipping foreign messages and
     * those restarts must count against the same budget).
     */
    pub fn start(&self) -> Spinner {
        Spinner {
            limit: self.limit,
            used: 0,
        }
    }

    /// Spins until `ready` returns true or the budget runs out.
    pub fn wait_until(&self, ready: impl FnMut() -> bool) -> Result<(), PollTimeout> {
        self.start().wait_until(ready)
    }
}

pub struct Spinner {
    limit: Option<u32>,
    used: u32,
}

impl Spinner {
    /// Accounts for one poll. Errors once the budget is spent.
    pub fn spin(&mut self) -> Result<(), PollTimeout> {
        if let Some(limit) = self.limit {
            if self.used >= limit {
                return Err(PollTimeout { polls: self.used });
            }
        }
        self.used = self.used.saturating_add(1);
        core::hint::spin_loop();
        Ok(())
    }

    pub fn wait_until(&mut self, mut ready: impl FnMut() -> bool) -> Result<(), PollTimeout> {
        while !ready() {
            self.spin()?;
        }
        Ok(())
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}
