//! Board-agnostic transfer-mode core for the Diavlos I/O layer
//!
//! This crate contains everything the peripheral drivers share that does
//! not depend on a specific hardware class:
//!
//! - The per-direction transfer controls and their four transfer
//!   strategies (polled, zero-copy, character-queue, circular-buffer)
//! - The task/ISR synchronization primitives (edge-triggered notification,
//!   binary semaphore, byte queue) and the deferred context-switch
//!   request they report
//! - The byte ring buffer with detectable overrun
//! - The claiming registry that replaces global per-peripheral tables
//! - The ioctl request model and error types
//!
//! Task-side operations block by polling under a [`sync::WaitBudget`],
//! paced by an injected [`embedded_hal::delay::DelayNs`]. ISR-side
//! operations never block; they return a [`sync::Wake`] that the platform
//! glue turns into a context-switch request at interrupt exit.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod error;
pub mod ioctl;
pub mod registry;
pub mod ring;
pub mod sync;
pub mod transfer;

// Re-export key types at crate root for convenience
pub use error::IoError;
pub use ioctl::IoctlRequest;
pub use registry::{Registry, Slot};
pub use ring::RingBuffer;
pub use sync::{Wake, WaitBudget};
pub use transfer::{RxControl, RxTransferMode, TxControl, TxSource, TxTransferMode};
