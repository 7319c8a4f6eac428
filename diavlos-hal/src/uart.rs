//! UART port access and configuration
//!
//! The trait exposes the registers the transfer-mode driver needs: FIFO
//! access (via [`FifoPort`]), interrupt cause readout, per-direction
//! interrupt enables, and configuration.

use crate::FifoPort;

/// Interrupt causes reported by a UART, read-and-clear.
///
/// [`UartPort::irq_status`] must clear the reported conditions in the same
/// operation, including on paths where the caller subsequently asserts -
/// leaving a cause set would re-raise the interrupt forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartIrqStatus {
    /// Receive data available (or receive character timeout)
    pub rx_data: bool,
    /// Transmit holding register / FIFO empty
    pub tx_empty: bool,
}

/// Register-level access to one UART instance.
pub trait UartPort: FifoPort {
    /// Read and clear the pending interrupt causes.
    fn irq_status(&mut self) -> UartIrqStatus;

    /// Enable or disable the receive-data interrupt.
    fn set_rx_interrupt(&mut self, enabled: bool);

    /// Enable or disable the transmit-empty interrupt.
    fn set_tx_interrupt(&mut self, enabled: bool);

    /// Set the interrupt priority for this instance.
    fn set_interrupt_priority(&mut self, priority: u8);

    /// Whether the transmitter has fully drained (shift register included).
    fn tx_idle(&mut self) -> bool;

    /// Apply a complete configuration to the hardware.
    fn apply_config(&mut self, config: &UartConfig);
}

/// UART configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Seven,
    Eight,
    Nine,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    One,
    Two,
}
