//! Per-direction transfer controls
//!
//! A peripheral instance owns one [`TxControl`] and one [`RxControl`].
//! Each holds the direction's active transfer mode and the mode-specific
//! state the task side and the interrupt handler share: the armed
//! zero-copy source and write mutex for transmit, the ring buffer and
//! data-available notification for receive, and a byte queue for the
//! character-queue mode of either direction.
//!
//! At most one mode is active per direction; selecting a mode tears the
//! previous mode's state down and is refused while a transfer is in
//! flight.

mod rx;
mod tx;

pub use rx::RxControl;
pub use tx::{TxControl, TxSource, FILLER_BYTE};

/// Capacity of the character-queue byte queues, per direction.
pub const QUEUE_DEPTH: usize = 128;

/// Capacity of the circular receive buffer.
pub const RING_DEPTH: usize = 2048;

/// Bounded-wait timeout applied until `SetTxTimeout`/`SetRxTimeout`
/// change it, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Transmit transfer strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxTransferMode {
    /// Synchronous register-level transmission by the calling task
    Polled,
    /// Caller's buffer handed to the interrupt handler, gated by the
    /// write mutex
    ZeroCopy,
    /// Bytes copied through the queue, drained by the interrupt handler
    CharacterQueue,
}

/// Receive transfer strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxTransferMode {
    /// Synchronous register-level reception by the calling task
    Polled,
    /// Interrupt handler deposits into the ring buffer, readers drain it
    CircularBuffer,
    /// Bytes queued by the interrupt handler, dequeued by readers
    CharacterQueue,
}
