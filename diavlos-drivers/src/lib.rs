//! Transfer-mode-polymorphic peripheral drivers
//!
//! One driver per hardware class - [`uart::Uart`], [`spi::Spi`],
//! [`i2c::I2c`] - each exposing the same surface: open a registry slot,
//! then `read`/`write`/`ioctl`, with the behavior of `read` and `write`
//! keyed by the transfer mode selected through `ioctl`.
//!
//! Each driver has an interrupt entry point (`on_uart_interrupt`,
//! `on_ssp_interrupt`, `on_i2c_interrupt`) that the platform's vector
//! glue calls with its own port instance. The entry points return a
//! [`Wake`](diavlos_core::sync::Wake); the glue requests a context
//! switch at interrupt exit when it reads true, never earlier.
//!
//! The per-mode FIFO loops shared by the byte-FIFO drivers live in
//! [`engine`], written once against the capability traits rather than
//! once per peripheral class.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod engine;
pub mod i2c;
pub mod spi;
pub mod uart;

pub use i2c::{on_i2c_interrupt, I2c, I2cBank, I2cShared};
pub use spi::{on_ssp_interrupt, Spi, SspBank, SspShared};
pub use uart::{on_uart_interrupt, Uart, UartBank, UartShared};
