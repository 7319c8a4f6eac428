//! I2C port access and configuration
//!
//! Unlike the FIFO-style ports, an I2C controller surfaces its bus
//! protocol one event at a time: start sent, address acked, byte
//! transferred, and so on. The driver runs a state machine over
//! [`I2cEvent`]s - the same machine whether the events arrive by
//! interrupt or by polling.

/// Bus events reported by an I2C controller.
///
/// These generalize the status codes a master-mode controller steps
/// through during a transfer. The `Nacked` and `ArbitrationLost` events
/// are fatal to the transfer in progress; recovery requires a bus reset,
/// which is above this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cEvent {
    /// No status information to act upon
    None,
    /// A start condition has been transmitted
    StartSent,
    /// A repeated-start condition has been transmitted
    RestartSent,
    /// Slave address + write bit sent, ACK received
    AddressWriteAcked,
    /// Slave address + write bit sent, NACK received
    AddressWriteNacked,
    /// Slave address + read bit sent, ACK received
    AddressReadAcked,
    /// Slave address + read bit sent, NACK received
    AddressReadNacked,
    /// Data byte transmitted, ACK received
    DataWriteAcked,
    /// Data byte transmitted, NACK received
    DataWriteNacked,
    /// Data byte received and ACKed (more expected)
    DataReceivedAcked,
    /// Data byte received and NACKed (last byte of the transfer)
    DataReceivedNacked,
    /// Bus arbitration lost to another master
    ArbitrationLost,
}

/// Register-level access to one I2C instance.
pub trait I2cPort {
    /// Current bus event. Does not clear the condition; the handler
    /// clears it with [`clear_event`](Self::clear_event) once serviced,
    /// or implicitly via [`clear_start`](Self::clear_start).
    fn event(&mut self) -> I2cEvent;

    /// Clear the serviced interrupt condition so the controller
    /// proceeds to the next bus state.
    fn clear_event(&mut self);

    /// Request a start (or repeated-start) condition.
    fn send_start(&mut self);

    /// Clear the start request along with the serviced condition.
    fn clear_start(&mut self);

    /// Request a stop condition.
    fn send_stop(&mut self);

    /// Place a byte in the data register (address or data phase).
    fn write_data(&mut self, byte: u8);

    /// Read the byte most recently clocked in.
    fn read_data(&mut self) -> u8;

    /// Select whether the next received byte is ACKed or NACKed.
    fn set_ack(&mut self, ack: bool);

    /// Enable or disable the controller's interrupt.
    fn set_interrupt(&mut self, enabled: bool);

    /// Clear any pended interrupt left over from a previous transfer.
    fn clear_pending_interrupt(&mut self);

    /// Set the interrupt priority for this instance.
    fn set_interrupt_priority(&mut self, priority: u8);

    /// Apply a complete configuration to the hardware.
    fn apply_config(&mut self, config: &I2cConfig);
}

/// I2C configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            frequency: 100_000, // 100kHz standard mode
        }
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };

    /// Fast mode plus (1 MHz)
    pub const FAST_PLUS: Self = Self {
        frequency: 1_000_000,
    };
}
