use spin::{Mutex, MutexGuard};

/*
 * Locked - process-wide home for a peripheral handle
 *
 * Statics such as the logger's console need interior mutability. A spin
 * mutex is enough on a single core with interrupts off; try_lock exists for
 * the panic path, which must never wait on a lock its own core already holds.
 */
pub struct Locked<A> {
    inner: Mutex<A>,
}

impl<A> Locked<A> {
    pub const fn new(inner: A) -> Self {
        Locked {
            inner: Mutex::new(inner),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, A>> {
        self.inner.try_lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_fails_while_held() {
        let cell = Locked::new(5u32);
        let guard = cell.lock();
        assert!(cell.try_lock().is_none());
        drop(guard);
        *cell.try_lock().unwrap() += 1;
        assert_eq!(*cell.lock(), 6);
    }
}
