//! Transmit-side transfer control

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use super::{TxTransferMode, DEFAULT_TIMEOUT_MS, QUEUE_DEPTH};
use crate::error::IoError;
use crate::sync::{BinarySemaphore, ByteQueue, WaitBudget, Wake};

/// Byte clocked out when a transmission only exists to generate clock
/// edges for reception.
pub const FILLER_BYTE: u8 = 0xFF;

/// Source of a zero-copy transmission.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxSource {
    /// Transmit the bytes of this buffer. The buffer is handed to the
    /// interrupt handler for incremental consumption, which is why it
    /// must outlive the call; it is safe to reuse once the write mutex
    /// has been re-obtained.
    Buffer(&'static [u8]),
    /// No data to send: clock out this many [`FILLER_BYTE`]s, purely to
    /// generate clock edges.
    Filler(usize),
}

impl TxSource {
    /// Number of bytes this source will produce.
    pub fn len(&self) -> usize {
        match self {
            TxSource::Buffer(data) => data.len(),
            TxSource::Filler(count) => *count,
        }
    }

    /// Whether the source produces no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An armed source with its consumption cursor.
struct ArmedSource {
    source: TxSource,
    pos: usize,
}

impl ArmedSource {
    fn next_byte(&mut self) -> Option<u8> {
        if self.pos >= self.source.len() {
            return None;
        }
        let byte = match self.source {
            TxSource::Buffer(data) => data[self.pos],
            TxSource::Filler(_) => FILLER_BYTE,
        };
        self.pos += 1;
        Some(byte)
    }
}

/// Transmit-side state shared between the task and the interrupt handler.
pub struct TxControl {
    mode: Mutex<CriticalSectionRawMutex, Cell<TxTransferMode>>,
    armed: Mutex<CriticalSectionRawMutex, RefCell<Option<ArmedSource>>>,
    queue: ByteQueue<QUEUE_DEPTH>,
    write_mutex: BinarySemaphore,
    timeout_ms: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl TxControl {
    /// Create a transmit control in polled mode.
    pub const fn new() -> Self {
        Self {
            mode: Mutex::new(Cell::new(TxTransferMode::Polled)),
            armed: Mutex::new(RefCell::new(None)),
            queue: ByteQueue::new(),
            write_mutex: BinarySemaphore::new_available(),
            timeout_ms: Mutex::new(Cell::new(DEFAULT_TIMEOUT_MS)),
        }
    }

    /// Currently selected transfer mode.
    pub fn mode(&self) -> TxTransferMode {
        self.mode.lock(|mode| mode.get())
    }

    /// Select a transfer mode, tearing the previous mode's state down.
    ///
    /// Refused while a transfer is in flight, so an armed source or
    /// queued bytes are never corrupted mid-transmission.
    pub fn select_mode(&self, mode: TxTransferMode) -> Result<(), IoError> {
        if self.in_flight() {
            return Err(IoError::TransferInProgress);
        }
        self.queue.clear();
        self.write_mutex.reset_available();
        self.mode.lock(|current| current.set(mode));
        Ok(())
    }

    /// Whether a transmission is in flight: a source is armed or queued
    /// bytes are still draining.
    pub fn in_flight(&self) -> bool {
        let armed = self.armed.lock(|armed| armed.borrow().is_some());
        armed || !self.queue.is_empty()
    }

    /// Bounded-wait timeout for transmit operations, milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms.lock(|timeout| timeout.get())
    }

    /// Set the bounded-wait timeout for transmit operations.
    pub fn set_timeout_ms(&self, ms: u32) {
        self.timeout_ms.lock(|timeout| timeout.set(ms));
    }

    /// Obtain the zero-copy write mutex, waiting up to `timeout_ms`.
    ///
    /// Obtaining it is the precondition for arming a zero-copy write;
    /// the interrupt handler gives it back when the transfer completes,
    /// which is how the next acquisition attempt detects completion.
    pub fn obtain_write_mutex(
        &self,
        timeout_ms: u32,
        delay: &mut impl DelayNs,
    ) -> Result<(), IoError> {
        let mut budget = WaitBudget::from_ms(timeout_ms);
        if self.write_mutex.take(&mut budget, delay) {
            Ok(())
        } else {
            Err(IoError::TimedOut)
        }
    }

    /// Assert the zero-copy write precondition: the write mutex must not
    /// be obtainable, because the caller already holds it.
    pub fn assert_write_mutex_held(&self) {
        assert!(
            !self.write_mutex.try_take(),
            "zero-copy write without holding the write mutex"
        );
    }

    /// Arm a zero-copy source for the interrupt handler to consume.
    pub fn arm(&self, source: TxSource) {
        self.armed.lock(|armed| {
            let mut armed = armed.borrow_mut();
            assert!(armed.is_none(), "zero-copy transfer already armed");
            *armed = Some(ArmedSource { source, pos: 0 });
        });
    }

    /// Take the next byte from the armed source. ISR-safe.
    ///
    /// Returns `None` once the source is exhausted (or nothing is
    /// armed); the source stays armed until
    /// [`complete_armed`](Self::complete_armed) retires it.
    pub fn pop_armed(&self) -> Option<u8> {
        self.armed.lock(|armed| {
            armed
                .borrow_mut()
                .as_mut()
                .and_then(ArmedSource::next_byte)
        })
    }

    /// Retire the armed source and release the write mutex. ISR-safe.
    ///
    /// Idempotent: only the call that actually retires a source gives
    /// the mutex, so it is released exactly once per transfer.
    pub fn complete_armed(&self) -> Wake {
        let retired = self.armed.lock(|armed| armed.borrow_mut().take().is_some());
        if retired {
            self.write_mutex.give()
        } else {
            Wake::NONE
        }
    }

    /// Enqueue a byte for character-queue transmission, waiting up to
    /// the budget for space.
    pub fn send_blocking(&self, byte: u8, budget: &mut WaitBudget, delay: &mut impl DelayNs) -> bool {
        self.queue.send_blocking(byte, budget, delay)
    }

    /// Dequeue the next character-queue byte from interrupt context.
    pub fn pop_queue_from_isr(&self) -> (Option<u8>, Wake) {
        self.queue.receive_from_isr()
    }

    /// Whether the character queue has drained.
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for TxControl {
    fn default() -> Self {
        Self::new()
    }
}
