//! Diavlos hardware capability layer
//!
//! This crate defines the register-level capability traits that the
//! transfer-mode drivers are written against, plus the configuration types
//! they accept. Chip-specific backends (and the simulated backend used for
//! host testing) implement these traits; the drivers and their interrupt
//! service routines never touch hardware except through them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application tasks                      │
//! └─────────────────────────────────────────┘
//!                     │ open/read/write/ioctl
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  diavlos-drivers (UART / SSP / I2C)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  diavlos-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  chip backend │       │  diavlos-sim  │
//! │  (PAC-based)  │       │  (host tests) │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`FifoPort`] - byte-level FIFO access shared by UART-like and SPI-like
//!   ports; the generic transfer routines are written against this
//! - [`uart::UartPort`] - UART register access
//! - [`spi::SpiPort`] - SSP/SPI register access
//! - [`i2c::I2cPort`] - event-level I2C bus access

#![no_std]
#![deny(unsafe_code)]

pub mod i2c;
pub mod spi;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use i2c::{I2cEvent, I2cPort};
pub use spi::SpiPort;
pub use uart::UartPort;

/// Lowest interrupt priority value at which the ISR-side primitive
/// operations may be used.
///
/// Priorities are numeric urgency-descending, as on Cortex-M NVICs: a
/// *larger* value is a *less* urgent interrupt. An interrupt configured
/// more urgent than this floor could preempt a critical section, so the
/// drivers assert against it when `SetInterruptPriority` is requested.
pub const ISR_SAFE_PRIORITY_FLOOR: u8 = 1;

/// Byte-level FIFO access shared by UART-like and SPI-like ports.
///
/// The generic fill/drain transfer routines are parameterized over this
/// trait so that the per-mode behavior is derived once rather than once
/// per peripheral class.
pub trait FifoPort {
    /// Depth of the hardware transmit FIFO in bytes.
    const FIFO_DEPTH: usize;

    /// Whether the transmit FIFO can accept another byte.
    fn tx_has_space(&mut self) -> bool;

    /// Push one byte into the transmit FIFO.
    ///
    /// Callers must have observed [`tx_has_space`](Self::tx_has_space)
    /// first; the byte is silently lost otherwise.
    fn write_byte(&mut self, byte: u8);

    /// Whether the receive FIFO holds at least one byte.
    fn rx_has_data(&mut self) -> bool;

    /// Pop one byte from the receive FIFO.
    fn read_byte(&mut self) -> u8;
}
