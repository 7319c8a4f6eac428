//! SSP/SPI port access and configuration
//!
//! An SSP-style port is full duplex: every transmitted byte clocks a byte
//! in, whether or not the caller wants it. The driver built on this trait
//! is therefore receive-driven - transmit interrupts are never used, and
//! the receive path decides whether incoming bytes are stored or junked.

use crate::FifoPort;

/// Interrupt causes reported by an SSP port, read-and-clear.
///
/// `rx_overrun` and `rx_timeout` are latched conditions; reading the
/// status must clear them, including on paths where the caller
/// subsequently asserts (an uncleared overrun would re-raise the
/// interrupt forever and mask the assert behind an interrupt storm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SspIrqStatus {
    /// Receive FIFO at or above its trigger level
    pub rx_data: bool,
    /// Receive timeout - data sitting in the FIFO below the trigger level
    pub rx_timeout: bool,
    /// Receive FIFO overrun - bytes were lost
    pub rx_overrun: bool,
}

impl SspIrqStatus {
    /// Whether any received-data condition is pending.
    pub fn rx_pending(&self) -> bool {
        self.rx_data || self.rx_timeout
    }
}

/// Register-level access to one SSP/SPI instance.
pub trait SpiPort: FifoPort {
    /// Read and clear the pending interrupt causes.
    fn irq_status(&mut self) -> SspIrqStatus;

    /// Whether the receive FIFO is completely full.
    ///
    /// The fill routines stop pushing transmit bytes when it is, since
    /// every transmitted byte lands another one here.
    fn rx_fifo_full(&mut self) -> bool;

    /// Enable or disable the receive-side interrupts (data, timeout,
    /// overrun) as a group.
    fn set_rx_interrupts(&mut self, enabled: bool);

    /// Set the interrupt priority for this instance.
    fn set_interrupt_priority(&mut self, priority: u8);

    /// Whether the port is still clocking a frame.
    fn busy(&mut self) -> bool;

    /// Apply a complete configuration to the hardware.
    fn apply_config(&mut self, config: &SpiConfig);
}

/// SSP/SPI configuration
///
/// The whole structure is stored by the driver and re-applied on every
/// configuration change, so a single `ioctl` can change one field while
/// the rest keep their previously-set values.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpiConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// Clock polarity
    pub polarity: Polarity,
    /// Clock phase
    pub phase: Phase,
    /// Bits per frame (4 to 16)
    pub data_bits: u8,
    /// Frame format
    pub frame_format: FrameFormat,
    /// Master or slave operation
    pub role: BusRole,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000, // 1 MHz
            polarity: Polarity::IdleLow,
            phase: Phase::CaptureOnFirstTransition,
            data_bits: 8,
            frame_format: FrameFormat::Motorola,
            role: BusRole::Master,
        }
    }
}

/// SPI clock polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    /// Clock idles low (CPOL=0)
    IdleLow,
    /// Clock idles high (CPOL=1)
    IdleHigh,
}

/// SPI clock phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Data captured on first clock transition (CPHA=0)
    CaptureOnFirstTransition,
    /// Data captured on second clock transition (CPHA=1)
    CaptureOnSecondTransition,
}

/// Frame format of the synchronous serial port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameFormat {
    /// Motorola SPI framing
    Motorola,
    /// TI synchronous serial framing
    Ti,
    /// National Semiconductor Microwire framing
    Microwire,
}

/// Bus role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BusRole {
    Master,
    Slave,
}

/// SPI mode (combined polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl From<Mode> for (Polarity, Phase) {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Mode0 => (Polarity::IdleLow, Phase::CaptureOnFirstTransition),
            Mode::Mode1 => (Polarity::IdleLow, Phase::CaptureOnSecondTransition),
            Mode::Mode2 => (Polarity::IdleHigh, Phase::CaptureOnFirstTransition),
            Mode::Mode3 => (Polarity::IdleHigh, Phase::CaptureOnSecondTransition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SpiConfig::default();
        assert_eq!(config.frequency, 1_000_000);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.frame_format, FrameFormat::Motorola);
        assert_eq!(config.role, BusRole::Master);
    }

    #[test]
    fn test_mode_to_polarity_phase() {
        let (pol, pha) = Mode::Mode3.into();
        assert_eq!(pol, Polarity::IdleHigh);
        assert_eq!(pha, Phase::CaptureOnSecondTransition);
    }
}
