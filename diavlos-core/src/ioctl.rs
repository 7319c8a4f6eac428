//! Configuration requests
//!
//! The drivers expose a single `ioctl` entry point for everything that is
//! not a data transfer: speed and framing, interrupt control, transfer
//! mode selection, timeouts, and the zero-copy write mutex. Each driver
//! recognizes the subset that makes sense for its hardware class and
//! rejects the rest with [`IoError::UnsupportedRequest`].
//!
//! [`IoError::UnsupportedRequest`]: crate::error::IoError::UnsupportedRequest

use diavlos_hal::spi::{BusRole, FrameFormat, Phase, Polarity};
use diavlos_hal::uart::{DataBits, Parity, StopBits};

/// A configuration request, carrying its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoctlRequest {
    /// Set the bus speed in bits per second (UART) or Hz (SPI, I2C)
    SetSpeed(u32),
    /// Set the UART frame's data bits
    SetDataBits(DataBits),
    /// Set the UART frame's parity mode
    SetParity(Parity),
    /// Set the UART frame's stop bits
    SetStopBits(StopBits),
    /// Set the SPI frame width in bits (4 to 16)
    SetSpiDataBits(u8),
    /// Set the SPI clock phase
    SetClockPhase(Phase),
    /// Set the SPI clock polarity
    SetClockPolarity(Polarity),
    /// Set the synchronous serial frame format
    SetFrameFormat(FrameFormat),
    /// Select master or slave operation
    SetBusRole(BusRole),
    /// Set the 7-bit I2C slave address used for subsequent transfers
    SetSlaveAddress(u8),
    /// Enable or disable interrupt-driven operation
    UseInterrupts(bool),
    /// Set the interrupt priority (asserted against the ISR-safe floor)
    SetInterruptPriority(u8),
    /// Select polled transmit mode
    UsePolledTx,
    /// Select polled receive mode
    UsePolledRx,
    /// Select zero-copy transmit mode
    UseZeroCopyTx,
    /// Select character-queue transmit mode
    UseCharacterQueueTx,
    /// Select character-queue receive mode
    UseCharacterQueueRx,
    /// Select circular-buffer receive mode
    UseCircularBufferRx,
    /// Set the bounded-wait timeout for transmit operations, milliseconds
    SetTxTimeout(u32),
    /// Set the bounded-wait timeout for receive operations, milliseconds
    SetRxTimeout(u32),
    /// Obtain the zero-copy write mutex, waiting up to the given number
    /// of milliseconds. Obtaining it is the precondition for a zero-copy
    /// write; it comes back when the interrupt service routine finishes
    /// clocking the buffer out.
    ObtainWriteMutex(u32),
}
