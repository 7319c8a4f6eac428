//! Binary semaphore
//!
//! Backs the zero-copy write mutex: "taken" means a transmit owns the
//! caller's buffer and it is not safe to reuse it or start another
//! zero-copy write. A task takes it before arming a transfer; the
//! interrupt handler gives it back exactly once, when the final byte has
//! left the buffer. Giving an already-available semaphore is a release
//! discipline violation and asserts.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use super::{WaitBudget, Wake};

#[derive(Clone, Copy)]
struct SemState {
    available: bool,
    waiters: usize,
}

/// Binary semaphore with bounded blocking take and ISR-safe give.
pub struct BinarySemaphore {
    state: Mutex<CriticalSectionRawMutex, Cell<SemState>>,
}

impl BinarySemaphore {
    /// Create the semaphore in the available state.
    pub const fn new_available() -> Self {
        Self {
            state: Mutex::new(Cell::new(SemState {
                available: true,
                waiters: 0,
            })),
        }
    }

    /// Create the semaphore in the taken state.
    pub const fn new_taken() -> Self {
        Self {
            state: Mutex::new(Cell::new(SemState {
                available: false,
                waiters: 0,
            })),
        }
    }

    /// Take the semaphore if it is available, without waiting.
    pub fn try_take(&self) -> bool {
        self.state.lock(|state| {
            let mut s = state.get();
            let taken = s.available;
            s.available = false;
            state.set(s);
            taken
        })
    }

    /// Take the semaphore, waiting up to the budget.
    ///
    /// Returns `false` when the budget expires first.
    pub fn take(&self, budget: &mut WaitBudget, delay: &mut impl DelayNs) -> bool {
        self.add_waiter(1);
        let taken = loop {
            if self.try_take() {
                break true;
            }
            if budget.expired() {
                break false;
            }
            budget.pause(delay);
        };
        self.add_waiter(-1);
        taken
    }

    /// Give the semaphore back. ISR-safe.
    ///
    /// Returns [`Wake::TASK_WOKEN`] when a task is currently blocked on
    /// it. Asserts if the semaphore was already available: each take is
    /// matched by exactly one give.
    pub fn give(&self) -> Wake {
        self.state.lock(|state| {
            let mut s = state.get();
            assert!(!s.available, "binary semaphore given while available");
            s.available = true;
            state.set(s);
            if s.waiters > 0 {
                Wake::TASK_WOKEN
            } else {
                Wake::NONE
            }
        })
    }

    /// Force the semaphore to the available state, discarding ownership.
    ///
    /// Used when a transfer mode is re-selected and the previous mode's
    /// state is torn down.
    pub fn reset_available(&self) {
        self.state.lock(|state| {
            let mut s = state.get();
            s.available = true;
            state.set(s);
        });
    }

    fn add_waiter(&self, delta: isize) {
        self.state.lock(|state| {
            let mut s = state.get();
            s.waiters = s.waiters.wrapping_add_signed(delta);
            state.set(s);
        });
    }
}
