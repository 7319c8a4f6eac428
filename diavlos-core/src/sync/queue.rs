//! Byte queue with task-side blocking and ISR-side endpoints
//!
//! The character-queue transfer mode hands bytes between task and
//! interrupt handler through one of these. The queue itself is an
//! `embassy-sync` channel under a critical-section mutex; this wrapper
//! adds the bounded blocking endpoints and the waiter accounting that
//! lets the ISR side report whether it unblocked a task.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embedded_hal::delay::DelayNs;

use super::{WaitBudget, Wake};

#[derive(Clone, Copy, Default)]
struct WaiterCounts {
    senders: usize,
    receivers: usize,
}

/// Fixed-capacity byte queue shared between one task side and one ISR side.
pub struct ByteQueue<const N: usize> {
    channel: Channel<CriticalSectionRawMutex, u8, N>,
    waiters: Mutex<CriticalSectionRawMutex, Cell<WaiterCounts>>,
}

impl<const N: usize> ByteQueue<N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            waiters: Mutex::new(Cell::new(WaiterCounts {
                senders: 0,
                receivers: 0,
            })),
        }
    }

    /// Queue capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes currently queued.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Enqueue without waiting. Returns `false` when the queue is full.
    pub fn try_send(&self, byte: u8) -> bool {
        self.channel.try_send(byte).is_ok()
    }

    /// Dequeue without waiting.
    pub fn try_receive(&self) -> Option<u8> {
        self.channel.try_receive().ok()
    }

    /// Enqueue, waiting up to the budget for space.
    ///
    /// Returns `false` when the budget expires with the queue still full.
    pub fn send_blocking(&self, byte: u8, budget: &mut WaitBudget, delay: &mut impl DelayNs) -> bool {
        self.add_senders(1);
        let sent = loop {
            if self.try_send(byte) {
                break true;
            }
            if budget.expired() {
                break false;
            }
            budget.pause(delay);
        };
        self.add_senders(-1);
        sent
    }

    /// Dequeue, waiting up to the budget for a byte.
    pub fn receive_blocking(&self, budget: &mut WaitBudget, delay: &mut impl DelayNs) -> Option<u8> {
        self.add_receivers(1);
        let received = loop {
            if let Some(byte) = self.try_receive() {
                break Some(byte);
            }
            if budget.expired() {
                break None;
            }
            budget.pause(delay);
        };
        self.add_receivers(-1);
        received
    }

    /// Enqueue from interrupt context.
    ///
    /// Returns whether the byte was accepted (a full queue drops it, as
    /// an RTOS queue send from an ISR would) and whether a blocked
    /// receiver should be woken.
    pub fn send_from_isr(&self, byte: u8) -> (bool, Wake) {
        let accepted = self.try_send(byte);
        let wake = if accepted && self.receivers() > 0 {
            Wake::TASK_WOKEN
        } else {
            Wake::NONE
        };
        (accepted, wake)
    }

    /// Dequeue from interrupt context.
    ///
    /// A dequeued byte frees space, so a blocked sender may need waking.
    pub fn receive_from_isr(&self) -> (Option<u8>, Wake) {
        let byte = self.try_receive();
        let wake = if byte.is_some() && self.senders() > 0 {
            Wake::TASK_WOKEN
        } else {
            Wake::NONE
        };
        (byte, wake)
    }

    /// Discard all queued bytes.
    pub fn clear(&self) {
        while self.try_receive().is_some() {}
    }

    fn senders(&self) -> usize {
        self.waiters.lock(|w| w.get().senders)
    }

    fn receivers(&self) -> usize {
        self.waiters.lock(|w| w.get().receivers)
    }

    fn add_senders(&self, delta: isize) {
        self.waiters.lock(|w| {
            let mut counts = w.get();
            counts.senders = counts.senders.wrapping_add_signed(delta);
            w.set(counts);
        });
    }

    fn add_receivers(&self, delta: isize) {
        self.waiters.lock(|w| {
            let mut counts = w.get();
            counts.receivers = counts.receivers.wrapping_add_signed(delta);
            w.set(counts);
        });
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestDelay;
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue: ByteQueue<4> = ByteQueue::new();
        assert!(queue.try_send(1));
        assert!(queue.try_send(2));
        assert!(queue.try_send(3));

        assert_eq!(queue.try_receive(), Some(1));
        assert_eq!(queue.try_receive(), Some(2));
        assert_eq!(queue.try_receive(), Some(3));
        assert_eq!(queue.try_receive(), None);
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue: ByteQueue<2> = ByteQueue::new();
        assert!(queue.try_send(1));
        assert!(queue.try_send(2));
        assert!(!queue.try_send(3));

        let (accepted, wake) = queue.send_from_isr(4);
        assert!(!accepted);
        assert_eq!(wake, Wake::NONE);
    }

    #[test]
    fn test_send_blocking_times_out_when_full() {
        let queue: ByteQueue<1> = ByteQueue::new();
        assert!(queue.try_send(1));

        let mut budget = WaitBudget::from_ms(1);
        assert!(!queue.send_blocking(2, &mut budget, &mut TestDelay));
    }

    #[test]
    fn test_receive_blocking_times_out_when_empty() {
        let queue: ByteQueue<4> = ByteQueue::new();
        let mut budget = WaitBudget::from_ms(1);
        assert_eq!(queue.receive_blocking(&mut budget, &mut TestDelay), None);
    }

    #[test]
    fn test_isr_send_wakes_registered_receiver() {
        let queue: ByteQueue<4> = ByteQueue::new();

        let (accepted, wake) = queue.send_from_isr(7);
        assert!(accepted);
        assert_eq!(wake, Wake::NONE);

        queue.add_receivers(1);
        let (accepted, wake) = queue.send_from_isr(8);
        assert!(accepted);
        assert_eq!(wake, Wake::TASK_WOKEN);
        queue.add_receivers(-1);
    }

    #[test]
    fn test_isr_receive_wakes_registered_sender() {
        let queue: ByteQueue<1> = ByteQueue::new();
        assert!(queue.try_send(9));

        queue.add_senders(1);
        let (byte, wake) = queue.receive_from_isr();
        assert_eq!(byte, Some(9));
        assert_eq!(wake, Wake::TASK_WOKEN);
        queue.add_senders(-1);

        let (byte, wake) = queue.receive_from_isr();
        assert_eq!(byte, None);
        assert_eq!(wake, Wake::NONE);
    }

    #[test]
    fn test_clear() {
        let queue: ByteQueue<4> = ByteQueue::new();
        assert!(queue.try_send(1));
        assert!(queue.try_send(2));
        queue.clear();
        assert!(queue.is_empty());
    }
}
