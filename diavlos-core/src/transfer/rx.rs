//! Receive-side transfer control

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use super::{RxTransferMode, DEFAULT_TIMEOUT_MS, QUEUE_DEPTH, RING_DEPTH};
use crate::error::IoError;
use crate::ring::RingBuffer;
use crate::sync::{ByteQueue, Notify, WaitBudget, Wake};

/// Receive-side state shared between the task and the interrupt handler.
pub struct RxControl {
    mode: Mutex<CriticalSectionRawMutex, Cell<RxTransferMode>>,
    ring: Mutex<CriticalSectionRawMutex, RefCell<RingBuffer<RING_DEPTH>>>,
    data_available: Notify,
    queue: ByteQueue<QUEUE_DEPTH>,
    timeout_ms: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl RxControl {
    /// Create a receive control in polled mode.
    pub const fn new() -> Self {
        Self {
            mode: Mutex::new(Cell::new(RxTransferMode::Polled)),
            ring: Mutex::new(RefCell::new(RingBuffer::new())),
            data_available: Notify::new(),
            queue: ByteQueue::new(),
            timeout_ms: Mutex::new(Cell::new(DEFAULT_TIMEOUT_MS)),
        }
    }

    /// Currently selected transfer mode.
    pub fn mode(&self) -> RxTransferMode {
        self.mode.lock(|mode| mode.get())
    }

    /// Select a transfer mode, tearing the previous mode's state down.
    pub fn select_mode(&self, mode: RxTransferMode) -> Result<(), IoError> {
        self.clear_ring();
        self.data_available.clear();
        self.queue.clear();
        self.mode.lock(|current| current.set(mode));
        Ok(())
    }

    /// Bounded-wait timeout for receive operations, milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms.lock(|timeout| timeout.get())
    }

    /// Set the bounded-wait timeout for receive operations.
    pub fn set_timeout_ms(&self, ms: u32) {
        self.timeout_ms.lock(|timeout| timeout.set(ms));
    }

    /// Deliver one received byte to the active mode's sink. ISR-safe.
    ///
    /// Ring deliveries are silent here; the handler raises one
    /// [`publish_from_isr`](Self::publish_from_isr) per drain batch
    /// rather than one signal per byte. A full ring drops the byte and
    /// latches the ring's overrun flag; a full queue drops the byte, as
    /// an RTOS queue send from an ISR would.
    pub fn store_from_isr(&self, byte: u8) -> Wake {
        match self.mode() {
            RxTransferMode::CircularBuffer => {
                self.ring.lock(|ring| {
                    let _ = ring.borrow_mut().push(byte);
                });
                Wake::NONE
            }
            RxTransferMode::CharacterQueue => {
                let (_accepted, wake) = self.queue.send_from_isr(byte);
                wake
            }
            // No interrupt-driven sink is active; the byte is junked
            RxTransferMode::Polled => Wake::NONE,
        }
    }

    /// Signal the reader after a drain batch stored `stored` bytes.
    /// ISR-safe.
    pub fn publish_from_isr(&self, stored: usize) -> Wake {
        if stored > 0 && self.mode() == RxTransferMode::CircularBuffer {
            self.data_available.signal()
        } else {
            Wake::NONE
        }
    }

    /// Drain the ring into `buf`, blocking on the data-available signal
    /// until `buf` is full or the receive timeout expires.
    ///
    /// Returns the count obtained; a short count means the timeout
    /// expired first.
    pub fn read_ring_blocking(&self, buf: &mut [u8], delay: &mut impl DelayNs) -> usize {
        let mut budget = WaitBudget::from_ms(self.timeout_ms());
        let mut count = 0;
        loop {
            count += self
                .ring
                .lock(|ring| ring.borrow_mut().read_into(&mut buf[count..]));
            if count == buf.len() {
                break;
            }
            if !self.data_available.wait(&mut budget, delay) {
                break;
            }
        }
        count
    }

    /// Dequeue up to `buf.len()` character-queue bytes, blocking up to
    /// the receive timeout in total.
    pub fn receive_queue_blocking(&self, buf: &mut [u8], delay: &mut impl DelayNs) -> usize {
        let mut budget = WaitBudget::from_ms(self.timeout_ms());
        let mut count = 0;
        while count < buf.len() {
            match self.queue.receive_blocking(&mut budget, delay) {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Discard any residual ring contents and overrun indication.
    pub fn clear_ring(&self) {
        self.ring.lock(|ring| ring.borrow_mut().clear());
    }

    /// Bytes currently held in the ring.
    pub fn ring_len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().len())
    }

    /// Whether the ring has dropped bytes since it was last cleared.
    pub fn ring_overrun(&self) -> bool {
        self.ring.lock(|ring| ring.borrow().overrun())
    }

    /// Discard any residual character-queue contents.
    pub fn clear_queue(&self) {
        self.queue.clear();
    }
}

impl Default for RxControl {
    fn default() -> Self {
        Self::new()
    }
}
