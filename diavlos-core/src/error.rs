//! Error types for the driver surface
//!
//! Only locally-recoverable conditions are represented here. Transfer
//! timeouts surface as short byte counts from `read`/`write`, and
//! protocol-fatal conditions (NACK, arbitration loss, unexpected
//! interrupt cause) or contract violations halt via assertion rather
//! than propagating.

/// Errors returned by `open` and `ioctl` operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// Peripheral index outside the registry
    InvalidPeripheral,
    /// Peripheral already claimed by an earlier open
    PeripheralInUse,
    /// Request not recognized by this peripheral class
    UnsupportedRequest,
    /// Mode change attempted while a transfer is in flight
    TransferInProgress,
    /// Bounded wait expired before the operation completed
    TimedOut,
}
