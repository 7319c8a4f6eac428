//! UART driver
//!
//! Transmit modes: polled, zero-copy, character-queue. Receive modes:
//! polled (non-blocking drain of whatever has arrived), circular-buffer
//! and character-queue. UART reception is continuous - unlike the
//! synchronous ports there is no notion of soliciting bytes, so the
//! circular-buffer read does not clear residue or toggle a
//! receive-active flag; bytes that arrived before the call are exactly
//! what the ring is for.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use diavlos_core::error::IoError;
use diavlos_core::ioctl::IoctlRequest;
use diavlos_core::registry::{Registry, Slot};
use diavlos_core::sync::{WaitBudget, Wake};
use diavlos_core::transfer::{RxControl, RxTransferMode, TxControl, TxSource, TxTransferMode};
use diavlos_hal::uart::{UartConfig, UartPort};
use diavlos_hal::{FifoPort, ISR_SAFE_PRIORITY_FLOOR};

use crate::engine;

/// Per-instance state shared between the task-side handle and the
/// interrupt handler.
pub struct UartShared {
    /// Transmit-side transfer control
    pub tx: TxControl,
    /// Receive-side transfer control
    pub rx: RxControl,
    config: Mutex<CriticalSectionRawMutex, RefCell<UartConfig>>,
}

impl UartShared {
    /// Create shared state with the default configuration stored.
    pub fn new() -> Self {
        Self {
            tx: TxControl::new(),
            rx: RxControl::new(),
            config: Mutex::new(RefCell::new(UartConfig::default())),
        }
    }

    /// Mutate the stored configuration and re-apply it to the port, all
    /// inside the configuration lock so the interrupt handler never
    /// observes a half-updated configuration.
    fn update_config<P: UartPort>(&self, port: &mut P, f: impl FnOnce(&mut UartConfig)) {
        self.config.lock(|config| {
            let mut config = config.borrow_mut();
            f(&mut config);
            port.apply_config(&config);
        });
    }

    /// Copy of the stored configuration.
    pub fn config(&self) -> UartConfig {
        self.config.lock(|config| *config.borrow())
    }
}

impl Default for UartShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of UART instances.
pub type UartBank<const N: usize> = Registry<UartShared, N>;

/// Interrupt entry point for one UART instance.
///
/// Called by the platform's vector glue with its own port instance.
/// Reads and clears the cause bits, drains the receive FIFO into the
/// active sink, refills the transmit FIFO from the active source, and
/// returns whether a context switch should be requested at exit.
pub fn on_uart_interrupt<P: UartPort>(port: &mut P, shared: &UartShared) -> Wake {
    let status = port.irq_status();
    let mut wake = Wake::NONE;

    if status.rx_data {
        match shared.rx.mode() {
            RxTransferMode::CircularBuffer | RxTransferMode::CharacterQueue => {
                let (_stored, woke) = engine::drain_into_rx(port, &shared.rx);
                wake |= woke;
            }
            // No interrupt-driven sink; junk the bytes so the FIFO
            // cannot overrun
            RxTransferMode::Polled => {
                let _ = engine::discard_rx(port);
            }
        }
    }

    if status.tx_empty {
        match shared.tx.mode() {
            TxTransferMode::ZeroCopy => {
                let (woke, exhausted) = engine::refill_from_armed(port, &shared.tx);
                wake |= woke;
                if exhausted {
                    port.set_tx_interrupt(false);
                }
            }
            TxTransferMode::CharacterQueue => {
                let (woke, drained) = engine::refill_from_queue(port, &shared.tx);
                wake |= woke;
                if drained {
                    port.set_tx_interrupt(false);
                }
            }
            TxTransferMode::Polled => {}
        }
    }

    wake
}

/// Task-side handle to one UART instance.
pub struct Uart<'a, P: UartPort, D: DelayNs> {
    port: P,
    delay: D,
    slot: &'a Slot<UartShared>,
}

impl<'a, P: UartPort, D: DelayNs> Uart<'a, P, D> {
    /// Claim a UART instance and apply its default configuration.
    ///
    /// Fails with [`IoError::InvalidPeripheral`] for an index outside
    /// the bank and [`IoError::PeripheralInUse`] for an instance that
    /// is already open. Both transfer directions start in polled mode.
    pub fn open<const N: usize>(
        bank: &'a UartBank<N>,
        index: usize,
        mut port: P,
        delay: D,
    ) -> Result<Self, IoError> {
        let slot = bank.open(index)?;
        slot.update_config(&mut port, |_| {});
        Ok(Self { port, delay, slot })
    }

    /// Shared state of this instance.
    pub fn shared(&self) -> &UartShared {
        self.slot
    }

    /// Write `buf`, dispatching on the transmit mode.
    ///
    /// Polled mode clocks the bytes out directly and returns the count
    /// sent; no queue or mutex is involved, so the application must
    /// ensure only one task makes polled writes to an instance at a
    /// time. Character-queue mode copies into the queue (blocking up
    /// to the transmit timeout) and returns the count enqueued. A
    /// zero-copy transmit goes through [`write_zero_copy`]; calling
    /// `write` in that mode is a contract violation.
    ///
    /// [`write_zero_copy`]: Self::write_zero_copy
    pub fn write(&mut self, buf: &[u8]) -> usize {
        match self.slot.tx.mode() {
            TxTransferMode::Polled => self.write_polled(buf),
            TxTransferMode::CharacterQueue => self.write_queued(buf),
            TxTransferMode::ZeroCopy => {
                panic!("write() while the transmit mode is zero-copy; use write_zero_copy()")
            }
        }
    }

    /// Hand a source to the interrupt handler for incremental
    /// transmission and return immediately.
    ///
    /// The caller must already hold the write mutex, obtained through
    /// `ioctl(ObtainWriteMutex)`; arming without it asserts. The
    /// interrupt handler releases the mutex when the final byte has
    /// left the buffer, so the next acquisition attempt doubles as
    /// completion detection.
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
            // Nothing will reach the FIFO, so no interrupt would ever
            // complete the transfer; retire it here
            let _ = self.slot.tx.complete_armed();
            return 0;
        }

        engine::fill_fifo_from_armed(&mut self.port, &self.slot.tx);
        self.port.set_tx_interrupt(true);
        len
    }

    /// Read into `buf`, dispatching on the receive mode.
    ///
    /// Polled mode drains whatever has already arrived without
    /// blocking. The interrupt-driven modes block until `buf` is full
    /// or the receive timeout expires; a short count means timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.slot.rx.mode() {
            RxTransferMode::Polled => self.read_polled(buf),
            RxTransferMode::CircularBuffer => self.slot.rx.read_ring_blocking(buf, &mut self.delay),
            RxTransferMode::CharacterQueue => {
                self.slot.rx.receive_queue_blocking(buf, &mut self.delay)
            }
        }
    }

    /// Configuration and mode-select requests.
    pub fn ioctl(&mut self, request: IoctlRequest) -> Result<(), IoError> {
        match request {
            IoctlRequest::SetSpeed(baudrate) => {
                self.slot
                    .update_config(&mut self.port, |config| config.baudrate = baudrate);
                Ok(())
            }
            IoctlRequest::SetDataBits(data_bits) => {
                self.slot
                    .update_config(&mut self.port, |config| config.data_bits = data_bits);
                Ok(())
            }
            IoctlRequest::SetParity(parity) => {
                self.slot
                    .update_config(&mut self.port, |config| config.parity = parity);
                Ok(())
            }
            IoctlRequest::SetStopBits(stop_bits) => {
                self.slot
                    .update_config(&mut self.port, |config| config.stop_bits = stop_bits);
                Ok(())
            }
            IoctlRequest::UseInterrupts(enabled) => {
                self.port.set_rx_interrupt(enabled);
                if !enabled {
                    self.port.set_tx_interrupt(false);
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
            IoctlRequest::UseCharacterQueueTx => {
                self.slot.tx.select_mode(TxTransferMode::CharacterQueue)
            }
            IoctlRequest::UsePolledRx => self.slot.rx.select_mode(RxTransferMode::Polled),
            IoctlRequest::UseCircularBufferRx => {
                self.slot.rx.select_mode(RxTransferMode::CircularBuffer)
            }
            IoctlRequest::UseCharacterQueueRx => {
                self.slot.rx.select_mode(RxTransferMode::CharacterQueue)
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

    fn write_polled(&mut self, buf: &[u8]) -> usize {
        let mut budget = WaitBudget::from_ms(self.slot.tx.timeout_ms());
        let mut sent = 0;
        for &byte in buf {
            while !self.port.tx_has_space() {
                if budget.expired() {
                    return sent;
                }
                budget.pause(&mut self.delay);
            }
            self.port.write_byte(byte);
            sent += 1;
        }
        // Polled mode has no interrupt to run the transmitter down;
        // wait for it here so the caller may reuse the buffer freely
        while !self.port.tx_idle() {
            if budget.expired() {
                break;
            }
            budget.pause(&mut self.delay);
        }
        sent
    }

    fn write_queued(&mut self, buf: &[u8]) -> usize {
        let mut budget = WaitBudget::from_ms(self.slot.tx.timeout_ms());
        let mut sent = 0;
        for &byte in buf {
            if !self.slot.tx.send_blocking(byte, &mut budget, &mut self.delay) {
                break;
            }
            sent += 1;
        }
        // Kick the transmitter if it has gone idle; the interrupt
        // handler keeps it fed from here
        if self.port.tx_idle() {
            let (_woke, _drained) = engine::refill_from_queue(&mut self.port, &self.slot.tx);
        }
        self.port.set_tx_interrupt(true);
        sent
    }

    fn read_polled(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() && self.port.rx_has_data() {
            buf[count] = self.port.read_byte();
            count += 1;
        }
        count
    }
}

impl<P: UartPort, D: DelayNs> Drop for Uart<'_, P, D> {
    fn drop(&mut self) {
        self.slot.release();
    }
}

impl<P: UartPort, D: DelayNs> embedded_io::ErrorType for Uart<'_, P, D> {
    type Error = core::convert::Infallible;
}

impl<P: UartPort, D: DelayNs> embedded_io::Write for Uart<'_, P, D> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(Uart::write(self, buf))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let mut budget = WaitBudget::from_ms(self.slot.tx.timeout_ms());
        while !(self.slot.tx.queue_is_empty() && self.port.tx_idle()) {
            if budget.expired() {
                break;
            }
            budget.pause(&mut self.delay);
        }
        Ok(())
    }
}

impl<P: UartPort, D: DelayNs> embedded_io::Read for Uart<'_, P, D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(Uart::read(self, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use diavlos_sim::{IdleDelay, PumpDelay, SimUart};

    fn bank() -> UartBank<2> {
        UartBank::new([UartShared::new(), UartShared::new()])
    }

    fn pump<'s>(sim: &'s SimUart, shared: &'s UartShared) -> PumpDelay<impl FnMut(u32) + 's> {
        PumpDelay::new(move |_| {
            sim.pump();
            if sim.irq_pending() {
                let _ = on_uart_interrupt(&mut &*sim, shared);
            }
        })
    }

    #[test]
    fn test_open_claims_and_releases() {
        let bank = bank();
        let sim = SimUart::new();

        let uart = Uart::open(&bank, 0, &sim, IdleDelay).unwrap();
        assert!(matches!(
            Uart::open(&bank, 0, &sim, IdleDelay).map(|_| ()),
            Err(IoError::PeripheralInUse)
        ));
        assert!(matches!(
            Uart::open(&bank, 5, &sim, IdleDelay).map(|_| ()),
            Err(IoError::InvalidPeripheral)
        ));

        // Opening applies the stored default configuration
        assert_eq!(sim.applied_config().unwrap().baudrate, 115200);

        drop(uart);
        assert!(Uart::open(&bank, 0, &sim, IdleDelay).is_ok());
    }

    #[test]
    fn test_polled_loopback() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        let payload = b"polled loopback";
        assert_eq!(uart.write(payload), payload.len());

        // Polled reception never blocks; collect as the wire delivers
        let mut received = [0u8; 15];
        let mut count = 0;
        for _ in 0..64 {
            count += uart.read(&mut received[count..]);
            if count == payload.len() {
                break;
            }
            sim.pump();
        }
        assert_eq!(count, payload.len());
        assert_eq!(&received, payload);
    }

    #[test]
    fn test_character_queue_loopback() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        uart.ioctl(IoctlRequest::UseCharacterQueueTx).unwrap();
        uart.ioctl(IoctlRequest::UseCharacterQueueRx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::SetRxTimeout(20)).unwrap();

        let payload = b"through the queues, both ways";
        assert_eq!(uart.write(payload), payload.len());

        let mut received = [0u8; 29];
        assert_eq!(uart.read(&mut received), payload.len());
        assert_eq!(&received, payload);
    }

    #[test]
    fn test_zero_copy_circular_loopback() {
        static PAYLOAD: [u8; 48] = *b"zero copy payload spanning several fifo depths!!";

        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        uart.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        uart.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::SetRxTimeout(20)).unwrap();

        uart.ioctl(IoctlRequest::ObtainWriteMutex(20)).unwrap();
        assert_eq!(uart.write_zero_copy(TxSource::Buffer(&PAYLOAD)), 48);

        let mut received = [0u8; 48];
        assert_eq!(uart.read(&mut received), 48);
        assert_eq!(&received, &PAYLOAD);

        // Completion released the mutex; it is obtainable again
        uart.ioctl(IoctlRequest::ObtainWriteMutex(20)).unwrap();
    }

    #[test]
    fn test_zero_copy_empty_payload_completes_immediately() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        uart.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();

        uart.ioctl(IoctlRequest::ObtainWriteMutex(20)).unwrap();
        assert_eq!(uart.write_zero_copy(TxSource::Buffer(&[])), 0);
        uart.ioctl(IoctlRequest::ObtainWriteMutex(0)).unwrap();
    }

    #[test]
    #[should_panic(expected = "without holding the write mutex")]
    fn test_zero_copy_without_mutex_asserts() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        uart.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        let _ = uart.write_zero_copy(TxSource::Filler(4));
    }

    #[test]
    fn test_second_obtain_times_out_while_transfer_in_flight() {
        static PAYLOAD: [u8; 4] = *b"late";

        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        // An idle delay keeps the "hardware" from making progress, so
        // the first transfer stays in flight
        let mut uart = Uart::open(&bank, 0, &sim, IdleDelay).unwrap();

        uart.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::ObtainWriteMutex(1)).unwrap();
        assert_eq!(uart.write_zero_copy(TxSource::Buffer(&PAYLOAD)), 4);

        assert_eq!(
            uart.ioctl(IoctlRequest::ObtainWriteMutex(1)),
            Err(IoError::TimedOut)
        );
    }

    #[test]
    fn test_mode_switch_rejected_mid_transfer() {
        static PAYLOAD: [u8; 32] = [b'm'; 32];

        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, IdleDelay).unwrap();

        uart.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::ObtainWriteMutex(1)).unwrap();
        assert_eq!(uart.write_zero_copy(TxSource::Buffer(&PAYLOAD)), 32);

        assert_eq!(
            uart.ioctl(IoctlRequest::UseCharacterQueueTx),
            Err(IoError::TransferInProgress)
        );
    }

    #[test]
    fn test_queue_read_times_out_short() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        uart.ioctl(IoctlRequest::UseCharacterQueueRx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::SetRxTimeout(5)).unwrap();

        // Nothing arrives; the read must come back short, not hang
        let mut buf = [0u8; 8];
        assert_eq!(uart.read(&mut buf), 0);
    }

    #[test]
    fn test_circular_rx_keeps_pre_arrival_bytes() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        uart.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::SetRxTimeout(20)).unwrap();

        // Bytes arrive before anyone reads; continuous reception must
        // buffer them rather than discard them
        sim.feed(b"early");
        sim.pump();
        let _ = on_uart_interrupt(&mut &sim, shared);

        let mut buf = [0u8; 5];
        assert_eq!(uart.read(&mut buf), 5);
        assert_eq!(&buf, b"early");
    }

    #[test]
    fn test_unsupported_request_rejected() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let mut uart = Uart::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        assert_eq!(
            uart.ioctl(IoctlRequest::SetSlaveAddress(0x42)),
            Err(IoError::UnsupportedRequest)
        );
    }

    #[test]
    fn test_isr_wake_fires_for_blocked_reader() {
        let bank = bank();
        let sim = SimUart::new();
        let shared = bank.get(0).unwrap();
        let woke = Cell::new(false);

        let delay = PumpDelay::new(|_| {
            sim.pump();
            if sim.irq_pending() {
                let wake = on_uart_interrupt(&mut &sim, shared);
                if wake.should_yield() {
                    woke.set(true);
                }
            }
        });
        let mut uart = Uart::open(&bank, 0, &sim, delay).unwrap();

        uart.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        uart.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        uart.ioctl(IoctlRequest::SetRxTimeout(20)).unwrap();

        // Feed the wire after the reader is blocked, via the pump; the
        // signal must report that it unblocked a waiter
        sim.feed(b"wake");
        let mut buf = [0u8; 4];
        assert_eq!(uart.read(&mut buf), 4);
        assert!(woke.get());
    }
}
