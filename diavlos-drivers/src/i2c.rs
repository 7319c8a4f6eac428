//! I2C driver
//!
//! The controller surfaces its bus protocol as a sequence of events;
//! the driver advances a per-instance state machine over them: start or
//! repeated-start sends the slave address with the direction bit, write
//! acks feed the next data byte or end with a stop, receive events
//! store one byte each and steer the ACK/NACK policy from the
//! outstanding-byte count. A NACK where an ACK was expected, or a lost
//! arbitration, is fatal to the transfer and halts - recovery would
//! need a bus reset, which is above this layer.
//!
//! Transmit modes: polled and zero-copy. Receive modes: polled and
//! circular-buffer. The character-queue modes are not implemented for
//! I2C and are rejected at mode-select.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use diavlos_core::error::IoError;
use diavlos_core::ioctl::IoctlRequest;
use diavlos_core::registry::{Registry, Slot};
use diavlos_core::sync::{WaitBudget, Wake};
use diavlos_core::transfer::{RxControl, RxTransferMode, TxControl, TxSource, TxTransferMode};
use diavlos_hal::i2c::{I2cConfig, I2cEvent, I2cPort};
use diavlos_hal::ISR_SAFE_PRIORITY_FLOOR;

/// Direction of the transfer currently on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusDirection {
    /// Master transmit in progress
    Writing,
    /// Master receive in progress
    Reading,
    /// No transfer on the bus
    Idle,
}

#[derive(Clone, Copy)]
struct BusState {
    direction: BusDirection,
    /// Bytes still expected by the receive in progress
    outstanding: usize,
}

/// Per-instance state shared between the task-side handle and the
/// interrupt handler.
pub struct I2cShared {
    /// Transmit-side transfer control
    pub tx: TxControl,
    /// Receive-side transfer control
    pub rx: RxControl,
    bus: Mutex<CriticalSectionRawMutex, Cell<BusState>>,
    slave_address: Mutex<CriticalSectionRawMutex, Cell<u8>>,
    config: Mutex<CriticalSectionRawMutex, RefCell<I2cConfig>>,
}

impl I2cShared {
    /// Create shared state with the default configuration stored.
    pub fn new() -> Self {
        Self {
            tx: TxControl::new(),
            rx: RxControl::new(),
            bus: Mutex::new(Cell::new(BusState {
                direction: BusDirection::Idle,
                outstanding: 0,
            })),
            slave_address: Mutex::new(Cell::new(0)),
            config: Mutex::new(RefCell::new(I2cConfig::default())),
        }
    }

    /// Direction of the transfer currently on the bus.
    pub fn direction(&self) -> BusDirection {
        self.bus.lock(|bus| bus.get().direction)
    }

    /// Bytes still expected by the receive in progress.
    pub fn outstanding(&self) -> usize {
        self.bus.lock(|bus| bus.get().outstanding)
    }

    /// 7-bit slave address used for subsequent transfers.
    pub fn slave_address(&self) -> u8 {
        self.slave_address.lock(|address| address.get())
    }

    fn set_slave_address(&self, address: u8) {
        self.slave_address.lock(|cell| cell.set(address));
    }

    fn begin_write(&self) {
        self.bus.lock(|bus| {
            bus.set(BusState {
                direction: BusDirection::Writing,
                outstanding: 0,
            })
        });
    }

    fn begin_read(&self, expected: usize) {
        self.bus.lock(|bus| {
            bus.set(BusState {
                direction: BusDirection::Reading,
                outstanding: expected,
            })
        });
    }

    fn set_idle(&self) {
        self.bus.lock(|bus| {
            bus.set(BusState {
                direction: BusDirection::Idle,
                outstanding: 0,
            })
        });
    }

    /// Account one received byte. Asserts that one was still expected;
    /// returns the count still outstanding.
    fn decrement_outstanding(&self) -> usize {
        self.bus.lock(|bus| {
            let mut state = bus.get();
            assert!(state.outstanding > 0, "received a byte nobody expected");
            state.outstanding -= 1;
            bus.set(state);
            state.outstanding
        })
    }

    fn update_config<P: I2cPort>(&self, port: &mut P, f: impl FnOnce(&mut I2cConfig)) {
        self.config.lock(|config| {
            let mut config = config.borrow_mut();
            f(&mut config);
            port.apply_config(&config);
        });
    }

    /// Copy of the stored configuration.
    pub fn config(&self) -> I2cConfig {
        self.config.lock(|config| *config.borrow())
    }
}

impl Default for I2cShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of I2C instances.
pub type I2cBank<const N: usize> = Registry<I2cShared, N>;

/// Interrupt entry point for one I2C instance.
///
/// Services exactly one bus event per firing, clearing the serviced
/// condition in every arm - including the fatal ones, where an
/// uncleared condition would re-raise forever and bury the assert
/// under an interrupt storm.
pub fn on_i2c_interrupt<P: I2cPort>(port: &mut P, shared: &I2cShared) -> Wake {
    let mut wake = Wake::NONE;
    let event = port.event();

    match event {
        I2cEvent::None => {
            // Nothing to act upon; just clear the interrupt
            port.clear_event();
        }

        I2cEvent::StartSent | I2cEvent::RestartSent => {
            // Common to both directions: follow the start condition
            // with the slave address and the direction bit
            let direction = shared.direction();
            assert!(
                direction != BusDirection::Idle,
                "start condition with no transfer armed"
            );
            let direction_bit = match direction {
                BusDirection::Reading => 1,
                _ => 0,
            };
            port.write_data((shared.slave_address() << 1) | direction_bit);
            port.clear_start();
        }

        I2cEvent::AddressWriteNacked
        | I2cEvent::DataWriteNacked
        | I2cEvent::AddressReadNacked
        | I2cEvent::ArbitrationLost => {
            port.clear_event();
            panic!("I2C transfer NACKed or arbitration lost");
        }

        I2cEvent::AddressWriteAcked | I2cEvent::DataWriteAcked => {
            // The previous byte was accepted; is there more to send?
            match shared.tx.pop_armed() {
                Some(byte) => {
                    port.write_data(byte);
                    port.clear_event();
                }
                None => {
                    port.set_interrupt(false);
                    port.send_stop();
                    shared.set_idle();
                    wake |= shared.tx.complete_armed();
                    port.clear_event();
                }
            }
        }

        I2cEvent::AddressReadAcked => {
            // ACK while more than one byte is expected; NACK after the
            // next byte ends the reception
            port.set_ack(shared.outstanding() > 1);
            port.clear_event();
        }

        I2cEvent::DataReceivedAcked | I2cEvent::DataReceivedNacked => {
            let byte = port.read_data();
            wake |= shared.rx.store_from_isr(byte);
            wake |= shared.rx.publish_from_isr(1);
            let remaining = shared.decrement_outstanding();

            if event == I2cEvent::DataReceivedAcked {
                port.set_ack(remaining > 1);
                port.clear_event();
            } else {
                // The NACKed byte is the last of the transfer
                assert_eq!(remaining, 0, "reception NACKed with bytes outstanding");
                port.set_interrupt(false);
                port.send_stop();
                shared.set_idle();
                port.clear_event();
            }
        }
    }

    wake
}

/// Task-side handle to one I2C instance.
pub struct I2c<'a, P: I2cPort, D: DelayNs> {
    port: P,
    delay: D,
    slot: &'a Slot<I2cShared>,
}

impl<'a, P: I2cPort, D: DelayNs> I2c<'a, P, D> {
    /// Claim an I2C instance and apply its default configuration.
    pub fn open<const N: usize>(
        bank: &'a I2cBank<N>,
        index: usize,
        mut port: P,
        delay: D,
    ) -> Result<Self, IoError> {
        let slot = bank.open(index)?;
        slot.update_config(&mut port, |_| {});
        Ok(Self { port, delay, slot })
    }

    /// Shared state of this instance.
    pub fn shared(&self) -> &I2cShared {
        self.slot
    }

    /// Write `buf` to the configured slave, dispatching on the
    /// transmit mode.
    ///
    /// Polled mode runs the whole bus transaction synchronously and
    /// returns the count written, or 0 if the slave rejected the
    /// transfer. A zero-copy transmit goes through
    /// [`write_zero_copy`](Self::write_zero_copy).
    pub fn write(&mut self, buf: &[u8]) -> usize {
        match self.slot.tx.mode() {
            TxTransferMode::Polled => self.write_polled(buf),
            TxTransferMode::ZeroCopy => {
                panic!("write() while the transmit mode is zero-copy; use write_zero_copy()")
            }
            TxTransferMode::CharacterQueue => {
                // Rejected at mode-select; reaching here means the
                // control was bypassed
                panic!("character-queue transmit is not implemented for I2C")
            }
        }
    }

    /// Arm a zero-copy transmission and issue the start condition; the
    /// interrupt handler runs the transfer from there.
    ///
    /// Same mutex contract as the UART's zero-copy write.
    pub fn write_zero_copy(&mut self, source: TxSource) -> usize {
        assert_eq!(
            self.slot.tx.mode(),
            TxTransferMode::ZeroCopy,
            "zero-copy write without selecting zero-copy transmit mode"
        );
        self.slot.tx.assert_write_mutex_held();

        let len = source.len();
        self.slot.tx.arm(source);
        if len == 0 {
            let _ = self.slot.tx.complete_armed();
            return 0;
        }

        self.slot.begin_write();
        // The interrupt must not fire until the start condition is
        // set up and stale conditions are gone
        self.port.set_interrupt(false);
        self.port.clear_pending_interrupt();
        self.port.send_start();
        self.port.set_interrupt(true);
        len
    }

    /// Read from the configured slave, dispatching on the receive mode.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        match self.slot.rx.mode() {
            RxTransferMode::Polled => self.read_polled(buf),
            RxTransferMode::CircularBuffer => self.read_circular(buf),
            RxTransferMode::CharacterQueue => {
                panic!("character-queue reception is not implemented for I2C")
            }
        }
    }

    /// Configuration and mode-select requests.
    pub fn ioctl(&mut self, request: IoctlRequest) -> Result<(), IoError> {
        match request {
            IoctlRequest::SetSlaveAddress(address) => {
                self.slot.set_slave_address(address);
                Ok(())
            }
            IoctlRequest::SetSpeed(frequency) => {
                self.slot
                    .update_config(&mut self.port, |config| config.frequency = frequency);
                Ok(())
            }
            IoctlRequest::UseInterrupts(enabled) => {
                if enabled {
                    // Prepare, but do not enable: the interrupt is only
                    // switched on when a transfer is started
                    self.port.set_interrupt(false);
                    self.port.clear_pending_interrupt();
                    self.port.set_interrupt_priority(ISR_SAFE_PRIORITY_FLOOR);
                } else {
                    self.port.set_interrupt(false);
                }
                Ok(())
            }
            IoctlRequest::SetInterruptPriority(priority) => {
                assert!(
                    priority >= ISR_SAFE_PRIORITY_FLOOR,
                    "interrupt priority too urgent for ISR-safe operations"
                );
                self.port.set_interrupt_priority(priority);
                Ok(())
            }
            IoctlRequest::UsePolledTx => self.slot.tx.select_mode(TxTransferMode::Polled),
            IoctlRequest::UseZeroCopyTx => self.slot.tx.select_mode(TxTransferMode::ZeroCopy),
            IoctlRequest::UsePolledRx => self.slot.rx.select_mode(RxTransferMode::Polled),
            IoctlRequest::UseCircularBufferRx => {
                self.slot.rx.select_mode(RxTransferMode::CircularBuffer)
            }
            IoctlRequest::UseCharacterQueueTx | IoctlRequest::UseCharacterQueueRx => {
                Err(IoError::UnsupportedRequest)
            }
            IoctlRequest::SetTxTimeout(ms) => {
                self.slot.tx.set_timeout_ms(ms);
                Ok(())
            }
            IoctlRequest::SetRxTimeout(ms) => {
                self.slot.rx.set_timeout_ms(ms);
                Ok(())
            }
            IoctlRequest::ObtainWriteMutex(ms) => {
                self.slot.tx.obtain_write_mutex(ms, &mut self.delay)
            }
            _ => Err(IoError::UnsupportedRequest),
        }
    }

    /// Wait for the next bus event, pacing on the delay provider.
    fn wait_event(&mut self, budget: &mut WaitBudget) -> Option<I2cEvent> {
        loop {
            match self.port.event() {
                I2cEvent::None => {
                    if budget.expired() {
                        return None;
                    }
                    budget.pause(&mut self.delay);
                }
                event => return Some(event),
            }
        }
    }

    /// Synchronous master transmit: the same event machine the
    /// interrupt handler runs, driven by polling.
    fn write_polled(&mut self, buf: &[u8]) -> usize {
        let address = self.slot.slave_address();
        self.slot.begin_write();
        self.port.clear_pending_interrupt();
        self.port.send_start();

        let mut budget = WaitBudget::from_ms(self.slot.tx.timeout_ms());
        let mut sent = 0;
        let result = loop {
            let Some(event) = self.wait_event(&mut budget) else {
                break sent;
            };
            match event {
                I2cEvent::StartSent | I2cEvent::RestartSent => {
                    self.port.write_data(address << 1);
                    self.port.clear_start();
                }
                I2cEvent::AddressWriteAcked | I2cEvent::DataWriteAcked => {
                    if sent < buf.len() {
                        self.port.write_data(buf[sent]);
                        sent += 1;
                        self.port.clear_event();
                    } else {
                        self.port.send_stop();
                        self.port.clear_event();
                        break sent;
                    }
                }
                // The polled path surfaces a rejected transfer as a
                // zero count rather than halting; retrying is the
                // caller's decision here
                _ => {
                    self.port.clear_event();
                    self.port.send_stop();
                    break 0;
                }
            }
        };

        self.slot.set_idle();
        result
    }

    /// Synchronous master receive.
    fn read_polled(&mut self, buf: &mut [u8]) -> usize {
        let address = self.slot.slave_address();
        self.slot.begin_read(buf.len());
        self.port.clear_pending_interrupt();
        self.port.send_start();

        let mut budget = WaitBudget::from_ms(self.slot.rx.timeout_ms());
        let mut count = 0;
        let result = loop {
            let Some(event) = self.wait_event(&mut budget) else {
                break count;
            };
            match event {
                I2cEvent::StartSent | I2cEvent::RestartSent => {
                    self.port.write_data((address << 1) | 1);
                    self.port.clear_start();
                }
                I2cEvent::AddressReadAcked => {
                    self.port.set_ack(self.slot.outstanding() > 1);
                    self.port.clear_event();
                }
                I2cEvent::DataReceivedAcked => {
                    let byte = self.port.read_data();
                    let remaining = self.slot.decrement_outstanding();
                    buf[count] = byte;
                    count += 1;
                    self.port.set_ack(remaining > 1);
                    self.port.clear_event();
                }
                I2cEvent::DataReceivedNacked => {
                    let byte = self.port.read_data();
                    let _ = self.slot.decrement_outstanding();
                    buf[count] = byte;
                    count += 1;
                    self.port.send_stop();
                    self.port.clear_event();
                    break count;
                }
                _ => {
                    self.port.clear_event();
                    self.port.send_stop();
                    break count;
                }
            }
        };

        self.slot.set_idle();
        result
    }

    /// Circular-buffer receive: the first call for a transfer issues
    /// the start condition and arms the interrupt-driven machine; the
    /// ring is then drained under the data-available signal.
    ///
    /// No write mutex is involved: the bus direction state is what
    /// serializes transfers on an I2C port.
    fn read_circular(&mut self, buf: &mut [u8]) -> usize {
        if self.slot.direction() == BusDirection::Idle {
            self.slot.begin_read(buf.len());
            self.port.clear_pending_interrupt();
            self.port.send_start();
            self.port.set_interrupt(true);
        }
        self.slot.rx.read_ring_blocking(buf, &mut self.delay)
    }
}

impl<P: I2cPort, D: DelayNs> Drop for I2c<'_, P, D> {
    fn drop(&mut self) {
        self.slot.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diavlos_sim::{IdleDelay, PumpDelay, SimI2c};

    const SLAVE: u8 = 0x48;

    fn bank() -> I2cBank<2> {
        I2cBank::new([I2cShared::new(), I2cShared::new()])
    }

    fn pump<'s>(sim: &'s SimI2c, shared: &'s I2cShared) -> PumpDelay<impl FnMut(u32) + 's> {
        PumpDelay::new(move |_| {
            if sim.has_event() && sim.irq_enabled() {
                let _ = on_i2c_interrupt(&mut &*sim, shared);
            }
        })
    }

    #[test]
    fn test_polled_write_transaction() {
        let bank = bank();
        let sim = SimI2c::new();
        let mut i2c = I2c::open(&bank, 0, &sim, IdleDelay).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::SetTxTimeout(5)).unwrap();

        sim.push_events(&[
            I2cEvent::StartSent,
            I2cEvent::AddressWriteAcked,
            I2cEvent::DataWriteAcked,
            I2cEvent::DataWriteAcked,
        ]);

        assert_eq!(i2c.write(b"hi"), 2);

        let mut writes = [0u8; 4];
        assert_eq!(sim.read_writes(&mut writes), 3);
        assert_eq!(writes[0], SLAVE << 1);
        assert_eq!(&writes[1..3], b"hi");
        assert_eq!(sim.stops(), 1);
        assert_eq!(i2c.shared().direction(), BusDirection::Idle);
    }

    #[test]
    fn test_polled_write_rejected_by_slave_returns_zero() {
        let bank = bank();
        let sim = SimI2c::new();
        let mut i2c = I2c::open(&bank, 0, &sim, IdleDelay).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::SetTxTimeout(5)).unwrap();

        sim.push_events(&[I2cEvent::StartSent, I2cEvent::AddressWriteNacked]);

        assert_eq!(i2c.write(b"hi"), 0);
        assert_eq!(sim.stops(), 1);
    }

    #[test]
    fn test_polled_read_transaction_with_ack_policy() {
        let bank = bank();
        let sim = SimI2c::new();
        let mut i2c = I2c::open(&bank, 0, &sim, IdleDelay).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::SetRxTimeout(5)).unwrap();

        sim.push_events(&[
            I2cEvent::StartSent,
            I2cEvent::AddressReadAcked,
            I2cEvent::DataReceivedAcked,
            I2cEvent::DataReceivedAcked,
            I2cEvent::DataReceivedNacked,
        ]);
        sim.feed_read_bytes(b"abc");

        let mut buf = [0u8; 3];
        assert_eq!(i2c.read(&mut buf), 3);
        assert_eq!(&buf, b"abc");

        // Address phase carries the read bit
        let mut writes = [0u8; 2];
        assert_eq!(sim.read_writes(&mut writes), 1);
        assert_eq!(writes[0], (SLAVE << 1) | 1);

        // ACK while more than one byte is outstanding, NACK at the end
        let mut acks = [false; 4];
        assert_eq!(sim.read_acks(&mut acks), 3);
        assert_eq!(&acks[..3], &[true, true, false]);
        assert_eq!(sim.stops(), 1);
    }

    #[test]
    fn test_zero_copy_write_runs_through_isr() {
        let bank = bank();
        let sim = SimI2c::new();
        let shared = bank.get(0).unwrap();
        let mut i2c = I2c::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        i2c.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        assert!(sim.pending_was_cleared());

        sim.push_events(&[
            I2cEvent::StartSent,
            I2cEvent::AddressWriteAcked,
            I2cEvent::DataWriteAcked,
            I2cEvent::DataWriteAcked,
        ]);

        i2c.ioctl(IoctlRequest::ObtainWriteMutex(5)).unwrap();
        assert_eq!(i2c.write_zero_copy(TxSource::Buffer(b"ok")), 2);
        assert_eq!(sim.starts(), 1);

        // Step the scripted events through the interrupt handler
        while sim.has_event() {
            let _ = on_i2c_interrupt(&mut &sim, shared);
        }

        let mut writes = [0u8; 4];
        assert_eq!(sim.read_writes(&mut writes), 3);
        assert_eq!(writes[0], SLAVE << 1);
        assert_eq!(&writes[1..3], b"ok");
        assert_eq!(sim.stops(), 1);
        assert!(!sim.irq_enabled());
        assert_eq!(shared.direction(), BusDirection::Idle);

        // Completion released the write mutex
        i2c.ioctl(IoctlRequest::ObtainWriteMutex(0)).unwrap();
    }

    #[test]
    fn test_circular_read_decrements_outstanding_exactly_once_per_byte() {
        let bank = bank();
        let sim = SimI2c::new();
        let shared = bank.get(0).unwrap();
        let mut i2c = I2c::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        i2c.ioctl(IoctlRequest::SetRxTimeout(5)).unwrap();

        sim.push_events(&[
            I2cEvent::StartSent,
            I2cEvent::AddressReadAcked,
            I2cEvent::DataReceivedAcked,
            I2cEvent::DataReceivedAcked,
            I2cEvent::DataReceivedNacked,
        ]);
        sim.feed_read_bytes(b"xyz");

        let mut buf = [0u8; 3];
        assert_eq!(i2c.read(&mut buf), 3);
        assert_eq!(&buf, b"xyz");

        assert_eq!(shared.outstanding(), 0);
        assert_eq!(shared.direction(), BusDirection::Idle);
        assert_eq!(sim.stops(), 1);
        assert!(!sim.irq_enabled());
    }

    #[test]
    #[should_panic(expected = "NACKed or arbitration lost")]
    fn test_unexpected_nack_is_fatal_in_isr() {
        let bank = bank();
        let sim = SimI2c::new();
        let shared = bank.get(0).unwrap();
        let mut i2c = I2c::open(&bank, 0, &sim, IdleDelay).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        i2c.ioctl(IoctlRequest::ObtainWriteMutex(5)).unwrap();
        let _ = i2c.write_zero_copy(TxSource::Buffer(b"dead"));

        sim.push_events(&[I2cEvent::DataWriteNacked]);
        let _ = on_i2c_interrupt(&mut &sim, shared);
    }

    #[test]
    #[should_panic(expected = "arbitration lost")]
    fn test_arbitration_loss_is_fatal_in_isr() {
        let bank = bank();
        let sim = SimI2c::new();
        let shared = bank.get(0).unwrap();
        let _i2c = I2c::open(&bank, 0, &sim, IdleDelay).unwrap();

        sim.push_events(&[I2cEvent::ArbitrationLost]);
        let _ = on_i2c_interrupt(&mut &sim, shared);
    }

    #[test]
    fn test_character_queue_modes_rejected() {
        let bank = bank();
        let sim = SimI2c::new();
        let mut i2c = I2c::open(&bank, 0, &sim, IdleDelay).unwrap();

        assert_eq!(
            i2c.ioctl(IoctlRequest::UseCharacterQueueTx),
            Err(IoError::UnsupportedRequest)
        );
        assert_eq!(
            i2c.ioctl(IoctlRequest::UseCharacterQueueRx),
            Err(IoError::UnsupportedRequest)
        );
    }

    #[test]
    fn test_read_timeout_returns_short() {
        let bank = bank();
        let sim = SimI2c::new();
        let shared = bank.get(0).unwrap();
        let mut i2c = I2c::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        i2c.ioctl(IoctlRequest::SetSlaveAddress(SLAVE)).unwrap();
        i2c.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        i2c.ioctl(IoctlRequest::SetRxTimeout(5)).unwrap();

        // Only two of three expected bytes ever arrive
        sim.push_events(&[
            I2cEvent::StartSent,
            I2cEvent::AddressReadAcked,
            I2cEvent::DataReceivedAcked,
            I2cEvent::DataReceivedAcked,
        ]);
        sim.feed_read_bytes(b"xy");

        let mut buf = [0u8; 3];
        assert_eq!(i2c.read(&mut buf), 2);
        assert_eq!(&buf[..2], b"xy");
    }
}
