//! Task/ISR synchronization primitives
//!
//! These model the RTOS services the transfer controls are built on. The
//! task side blocks by polling under a [`WaitBudget`], paced by an
//! injected delay provider; the ISR side never blocks and reports
//! whether it unblocked a waiting task via [`Wake`], so the decision
//! stays inside the primitive rather than being re-derived at every
//! interrupt handler.

mod notify;
mod queue;
mod semaphore;
mod wake;

pub use notify::Notify;
pub use queue::ByteQueue;
pub use semaphore::BinarySemaphore;
pub use wake::Wake;

use embedded_hal::delay::DelayNs;

/// Interval between polls of a blocked condition, in microseconds.
pub const POLL_INTERVAL_US: u32 = 100;

/// Remaining wait time for one blocking operation.
///
/// A budget is created from the operation's timeout and shared by every
/// wait the operation performs, so a multi-byte read bounded by a 100 ms
/// timeout takes at most 100 ms in total, not 100 ms per byte.
#[derive(Debug)]
pub struct WaitBudget {
    remaining_us: u64,
}

impl WaitBudget {
    /// Create a budget of `ms` milliseconds.
    pub fn from_ms(ms: u32) -> Self {
        Self {
            remaining_us: u64::from(ms) * 1000,
        }
    }

    /// Whether the budget has been used up.
    pub fn expired(&self) -> bool {
        self.remaining_us == 0
    }

    /// Spend one poll interval of the budget.
    pub fn pause(&mut self, delay: &mut impl DelayNs) {
        delay.delay_us(POLL_INTERVAL_US);
        self.remaining_us = self.remaining_us.saturating_sub(u64::from(POLL_INTERVAL_US));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use embedded_hal::delay::DelayNs;

    /// Delay provider for unit tests; elapsed time is only accounting.
    pub struct TestDelay;

    impl DelayNs for TestDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }
}
