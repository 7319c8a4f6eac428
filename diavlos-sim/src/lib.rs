//! Simulated peripheral backends
//!
//! Host-test stand-ins for the chip HAL crates: each simulated port
//! implements the corresponding `diavlos-hal` trait over in-memory
//! wires, and the tests script what the far end of the wire does.
//!
//! Interrupts do not preempt on the host. Instead, a driver blocked in a
//! bounded wait repeatedly pauses through its delay provider, and a
//! [`PumpDelay`] built around a test closure uses each pause to advance
//! the wires and deliver any pending interrupt to the driver's ISR entry
//! point. That keeps the task-side code genuinely blocked while the
//! "hardware" makes progress, on one thread.
//!
//! The port traits take `&mut self`, while a port instance must be
//! reachable from both the driver and the pump closure; the simulated
//! ports therefore implement the traits on `&SimUart` (etc.), with
//! interior mutability under critical-section mutexes.

#![no_std]
#![deny(unsafe_code)]

mod delay;
mod i2c;
mod spi;
mod uart;

pub use delay::{IdleDelay, PumpDelay};
pub use i2c::SimI2c;
pub use spi::SimSpi;
pub use uart::SimUart;
