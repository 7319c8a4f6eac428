//! Edge-triggered notification
//!
//! The "new data" signal between an interrupt handler and the task
//! draining a circular buffer. A signal raised with no waiter stays
//! pending until consumed, so a task that checks its buffer and then
//! waits cannot miss a byte that arrived in between.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use super::{WaitBudget, Wake};

#[derive(Clone, Copy)]
struct NotifyState {
    pending: bool,
    waiters: usize,
}

/// Edge-triggered wake primitive.
pub struct Notify {
    state: Mutex<CriticalSectionRawMutex, Cell<NotifyState>>,
}

impl Notify {
    /// Create a notification with no signal pending.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(NotifyState {
                pending: false,
                waiters: 0,
            })),
        }
    }

    /// Raise the signal. ISR-safe.
    ///
    /// Returns [`Wake::TASK_WOKEN`] when a task is currently waiting.
    pub fn signal(&self) -> Wake {
        self.state.lock(|state| {
            let mut s = state.get();
            s.pending = true;
            state.set(s);
            if s.waiters > 0 {
                Wake::TASK_WOKEN
            } else {
                Wake::NONE
            }
        })
    }

    /// Consume a pending signal without waiting.
    pub fn try_take(&self) -> bool {
        self.state.lock(|state| {
            let mut s = state.get();
            let was_pending = s.pending;
            s.pending = false;
            state.set(s);
            was_pending
        })
    }

    /// Discard any pending signal.
    pub fn clear(&self) {
        let _ = self.try_take();
    }

    /// Wait for the signal, consuming it.
    ///
    /// Returns `false` when the budget expires first.
    pub fn wait(&self, budget: &mut WaitBudget, delay: &mut impl DelayNs) -> bool {
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

    fn add_waiter(&self, delta: isize) {
        self.state.lock(|state| {
            let mut s = state.get();
            s.waiters = s.waiters.wrapping_add_signed(delta);
            state.set(s);
        });
    }
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}
