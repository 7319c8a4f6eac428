//! SSP/SPI driver
//!
//! The synchronous serial port couples the two directions: clocking a
//! byte out always clocks a byte in. Writing for its own sake therefore
//! junks what comes back, and reading requires transmitting - a real
//! buffer or filler bytes - purely to generate clock edges. The
//! receive-active flag is what separates the two cases: bytes arriving
//! while it is clear are incidental and get discarded by the interrupt
//! handler; bytes arriving while it is set are the ones a reader asked
//! for.
//!
//! The port is receive-driven: transmit interrupts are never enabled,
//! and the interrupt handler refills the transmit FIFO by exactly the
//! count it drained, keeping the FIFOs in lockstep.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;

use diavlos_core::error::IoError;
use diavlos_core::ioctl::IoctlRequest;
use diavlos_core::registry::{Registry, Slot};
use diavlos_core::sync::{WaitBudget, Wake};
use diavlos_core::transfer::{
    RxControl, RxTransferMode, TxControl, TxSource, TxTransferMode, FILLER_BYTE,
};
use diavlos_hal::spi::{SpiConfig, SpiPort};
use diavlos_hal::{FifoPort, ISR_SAFE_PRIORITY_FLOOR};

use crate::engine;

/// Per-instance state shared between the task-side handle and the
/// interrupt handler.
pub struct SspShared {
    /// Transmit-side transfer control
    pub tx: TxControl,
    /// Receive-side transfer control
    pub rx: RxControl,
    /// Whether received bytes are solicited (store them) or incidental
    /// (junk them)
    receive_active: Mutex<CriticalSectionRawMutex, Cell<bool>>,
    config: Mutex<CriticalSectionRawMutex, RefCell<SpiConfig>>,
}

impl SspShared {
    /// Create shared state with the default configuration stored.
    pub fn new() -> Self {
        Self {
            tx: TxControl::new(),
            rx: RxControl::new(),
            receive_active: Mutex::new(Cell::new(false)),
            config: Mutex::new(RefCell::new(SpiConfig::default())),
        }
    }

    /// Whether a reader is soliciting the bytes currently arriving.
    pub fn receive_active(&self) -> bool {
        self.receive_active.lock(|active| active.get())
    }

    fn set_receive_active(&self, active: bool) {
        self.receive_active.lock(|cell| cell.set(active));
    }

    fn update_config<P: SpiPort>(&self, port: &mut P, f: impl FnOnce(&mut SpiConfig)) {
        self.config.lock(|config| {
            let mut config = config.borrow_mut();
            f(&mut config);
            port.apply_config(&config);
        });
    }

    /// Copy of the stored configuration.
    pub fn config(&self) -> SpiConfig {
        self.config.lock(|config| *config.borrow())
    }
}

impl Default for SspShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of SSP instances.
pub type SspBank<const N: usize> = Registry<SspShared, N>;

/// Interrupt entry point for one SSP instance.
///
/// The cause bits are cleared by the status read before anything else -
/// including the overrun assert, which would otherwise leave the
/// condition latched and storm. Receive servicing comes first; the
/// count drained bounds the transmit refill.
pub fn on_ssp_interrupt<P: SpiPort>(port: &mut P, shared: &SspShared) -> Wake {
    let status = port.irq_status();
    assert!(
        !status.rx_overrun,
        "SSP receive FIFO overrun; received bytes were lost"
    );

    let mut wake = Wake::NONE;
    if status.rx_pending() {
        let received = if shared.receive_active() {
            let (stored, woke) = engine::drain_into_rx(port, &shared.rx);
            wake |= woke;
            stored
        } else {
            // Nobody asked for these bytes; they only exist because
            // something was transmitted
            engine::discard_rx(port)
        };

        match shared.tx.mode() {
            TxTransferMode::ZeroCopy => {
                let (woke, _exhausted) = engine::refill_from_armed_budget(port, &shared.tx, received);
                wake |= woke;
            }
            TxTransferMode::CharacterQueue => {
                let (woke, _drained) = engine::refill_from_queue_budget(port, &shared.tx, received);
                wake |= woke;
            }
            TxTransferMode::Polled => {}
        }
    }

    wake
}

/// Task-side handle to one SSP instance.
pub struct Spi<'a, P: SpiPort, D: DelayNs> {
    port: P,
    delay: D,
    slot: &'a Slot<SspShared>,
}

impl<'a, P: SpiPort, D: DelayNs> Spi<'a, P, D> {
    /// Claim an SSP instance, apply its default configuration and drain
    /// whatever is lingering in the receive FIFO.
    pub fn open<const N: usize>(
        bank: &'a SspBank<N>,
        index: usize,
        mut port: P,
        delay: D,
    ) -> Result<Self, IoError> {
        let slot = bank.open(index)?;
        slot.update_config(&mut port, |_| {});
        let _ = engine::discard_rx(&mut port);
        Ok(Self { port, delay, slot })
    }

    /// Shared state of this instance.
    pub fn shared(&self) -> &SspShared {
        self.slot
    }

    /// Write `buf`, dispatching on the transmit mode.
    ///
    /// Polled mode involves no queue or mutex; the application must
    /// ensure only one task makes polled transfers on an instance at a
    /// time. Bytes clocked in during the write are junked.
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
    /// Same contract as the UART's zero-copy write; the SSP version
    /// additionally serves reads, with [`TxSource::Filler`] generating
    /// the clock for solicited reception.
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

        // Keep the handler away from a half-primed FIFO
        self.port.set_rx_interrupts(false);
        self.prime_fifo();
        self.port.set_rx_interrupts(true);
        len
    }

    /// Read into `buf`, dispatching on the receive mode.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.slot.rx.mode() {
            RxTransferMode::Polled => self.read_polled(buf),
            RxTransferMode::CircularBuffer => self.read_circular(buf),
            RxTransferMode::CharacterQueue => self.read_queued(buf),
        }
    }

    /// Configuration and mode-select requests.
    pub fn ioctl(&mut self, request: IoctlRequest) -> Result<(), IoError> {
        match request {
            IoctlRequest::SetSpeed(frequency) => {
                self.slot
                    .update_config(&mut self.port, |config| config.frequency = frequency);
                Ok(())
            }
            IoctlRequest::SetSpiDataBits(bits) => {
                if !(4..=16).contains(&bits) {
                    return Err(IoError::UnsupportedRequest);
                }
                self.slot
                    .update_config(&mut self.port, |config| config.data_bits = bits);
                Ok(())
            }
            IoctlRequest::SetClockPhase(phase) => {
                self.slot
                    .update_config(&mut self.port, |config| config.phase = phase);
                Ok(())
            }
            IoctlRequest::SetClockPolarity(polarity) => {
                self.slot
                    .update_config(&mut self.port, |config| config.polarity = polarity);
                Ok(())
            }
            IoctlRequest::SetFrameFormat(format) => {
                self.slot
                    .update_config(&mut self.port, |config| config.frame_format = format);
                Ok(())
            }
            IoctlRequest::SetBusRole(role) => {
                self.slot
                    .update_config(&mut self.port, |config| config.role = role);
                Ok(())
            }
            IoctlRequest::UseInterrupts(enabled) => {
                // Receive interrupts only: new transmit data goes out
                // when the handler makes space, so the transmit side
                // needs no interrupt of its own
                self.port.set_rx_interrupts(enabled);
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
            IoctlRequest::UsePolledRx => self.select_rx_mode(RxTransferMode::Polled),
            IoctlRequest::UseCircularBufferRx => {
                self.select_rx_mode(RxTransferMode::CircularBuffer)
            }
            IoctlRequest::UseCharacterQueueRx => {
                self.select_rx_mode(RxTransferMode::CharacterQueue)
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

    fn select_rx_mode(&mut self, mode: RxTransferMode) -> Result<(), IoError> {
        if self.slot.receive_active() {
            return Err(IoError::TransferInProgress);
        }
        self.slot.rx.select_mode(mode)
    }

    /// Fill the transmit FIFO from the armed source, bounded by the
    /// FIFO depth and by space on the receive side - every byte pushed
    /// here lands one over there.
    fn prime_fifo(&mut self) {
        let mut primed = 0;
        while primed < P::FIFO_DEPTH
            && self.port.tx_has_space()
            && !self.port.rx_fifo_full()
        {
            match self.slot.tx.pop_armed() {
                Some(byte) => {
                    self.port.write_byte(byte);
                    primed += 1;
                }
                None => break,
            }
        }
    }

    fn write_polled(&mut self, buf: &[u8]) -> usize {
        let mut budget = WaitBudget::from_ms(self.slot.tx.timeout_ms());
        let mut sent = 0;
        for &byte in buf {
            loop {
                // Junk the bytes clocked in alongside the transmission;
                // this is also what frees receive space to keep clocking
                let _ = engine::discard_rx(&mut self.port);
                if self.port.tx_has_space() && !self.port.rx_fifo_full() {
                    break;
                }
                if budget.expired() {
                    return sent;
                }
                budget.pause(&mut self.delay);
            }
            self.port.write_byte(byte);
            sent += 1;
        }
        // Run the frame down and junk the stragglers
        loop {
            let _ = engine::discard_rx(&mut self.port);
            if !self.port.busy() {
                break;
            }
            if budget.expired() {
                break;
            }
            budget.pause(&mut self.delay);
        }
        let _ = engine::discard_rx(&mut self.port);
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
        self.kick_queue();
        sent
    }

    /// Move queued bytes into the FIFO to start (or restart) the
    /// receive-driven transmit chain.
    fn kick_queue(&mut self) {
        self.port.set_rx_interrupts(false);
        let mut pushed = 0;
        while pushed < P::FIFO_DEPTH
            && self.port.tx_has_space()
            && !self.port.rx_fifo_full()
        {
            let (byte, _woke) = self.slot.tx.pop_queue_from_isr();
            match byte {
                Some(byte) => {
                    self.port.write_byte(byte);
                    pushed += 1;
                }
                None => break,
            }
        }
        self.port.set_rx_interrupts(true);
    }

    fn read_polled(&mut self, buf: &mut [u8]) -> usize {
        let mut budget = WaitBudget::from_ms(self.slot.rx.timeout_ms());
        let mut count = 0;
        while count < buf.len() {
            // Clock a filler byte out to clock a data byte in
            loop {
                if self.port.tx_has_space() && !self.port.rx_fifo_full() {
                    break;
                }
                if budget.expired() {
                    return count;
                }
                budget.pause(&mut self.delay);
            }
            self.port.write_byte(FILLER_BYTE);
            loop {
                if self.port.rx_has_data() {
                    break;
                }
                if budget.expired() {
                    return count;
                }
                budget.pause(&mut self.delay);
            }
            buf[count] = self.port.read_byte();
            count += 1;
        }
        count
    }

    /// Circular-buffer read: solicit `buf.len()` bytes with a dummy
    /// zero-copy write and drain them from the ring.
    ///
    /// The transmit side must be in zero-copy mode - the dummy write
    /// rides that machinery, and its completion (signaled through the
    /// write mutex) is what guarantees the previous transmit has
    /// finished before the ring is cleared.
    fn read_circular(&mut self, buf: &mut [u8]) -> usize {
        assert_eq!(
            self.slot.tx.mode(),
            TxTransferMode::ZeroCopy,
            "circular-buffer reception rides the zero-copy transmit path"
        );

        // Waits for any in-flight transmit to complete; the handler
        // gives the mutex back when its source is exhausted
        let obtained = self
            .slot
            .tx
            .obtain_write_mutex(self.slot.tx.timeout_ms(), &mut self.delay);
        assert!(
            obtained.is_ok(),
            "transmit path never completed; cannot solicit reception"
        );

        // Anything lingering from earlier clocking is stale
        self.slot.rx.clear_ring();

        self.slot.set_receive_active(true);
        let _ = self.write_zero_copy(TxSource::Filler(buf.len()));
        let count = self.slot.rx.read_ring_blocking(buf, &mut self.delay);
        self.slot.set_receive_active(false);
        count
    }

    /// Character-queue read: solicit through the transmit queue, then
    /// drain the receive queue.
    fn read_queued(&mut self, buf: &mut [u8]) -> usize {
        // Let the previous transmission drain so its incidental bytes
        // are junked rather than mistaken for the reply
        let mut budget = WaitBudget::from_ms(self.slot.tx.timeout_ms());
        loop {
            if self.slot.tx.queue_is_empty() && !self.port.busy() {
                break;
            }
            if budget.expired() {
                break;
            }
            budget.pause(&mut self.delay);
        }

        self.slot.rx.clear_queue();
        self.slot.set_receive_active(true);

        let mut solicited = 0;
        for _ in 0..buf.len() {
            if !self
                .slot
                .tx
                .send_blocking(FILLER_BYTE, &mut budget, &mut self.delay)
            {
                break;
            }
            solicited += 1;
            self.kick_queue();
        }

        let count = self
            .slot
            .rx
            .receive_queue_blocking(&mut buf[..solicited], &mut self.delay);
        self.slot.set_receive_active(false);
        count
    }
}

impl<P: SpiPort, D: DelayNs> Drop for Spi<'_, P, D> {
    fn drop(&mut self) {
        self.slot.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use diavlos_hal::spi::Phase;
    use diavlos_sim::{IdleDelay, PumpDelay, SimSpi};

    fn bank() -> SspBank<2> {
        SspBank::new([SspShared::new(), SspShared::new()])
    }

    fn pump<'s>(sim: &'s SimSpi, shared: &'s SspShared) -> PumpDelay<impl FnMut(u32) + 's> {
        PumpDelay::new(move |_| {
            sim.pump();
            if sim.irq_pending() {
                let _ = on_ssp_interrupt(&mut &*sim, shared);
            }
        })
    }

    #[test]
    fn test_polled_write_then_read_back_2000() {
        static FIVES: [u8; 2000] = [b'5'; 2000];

        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let mut spi = Spi::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();
        spi.ioctl(IoctlRequest::SetRxTimeout(500)).unwrap();

        assert_eq!(spi.write(&FIVES), 2000);

        // Hand everything the master clocked out back as the device's
        // reply, then read it
        let mut echoed = [0u8; 2000];
        assert_eq!(sim.read_mosi(&mut echoed), 2000);
        sim.script(&echoed);

        let mut received = [0u8; 2000];
        assert_eq!(spi.read(&mut received), 2000);
        assert!(received.iter().all(|&byte| byte == b'5'));

        // The device has nothing further to say; a second read of the
        // same quantity comes back empty
        sim.set_idle_response(None);
        let mut empty = [0u8; 2000];
        assert_eq!(spi.read(&mut empty), 0);
    }

    #[test]
    fn test_circular_rx_with_dummy_write_collects_512_in_order() {
        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let woke = Cell::new(false);

        let delay = PumpDelay::new(|_| {
            sim.pump();
            if sim.irq_pending() {
                let wake = on_ssp_interrupt(&mut &sim, shared);
                if wake.should_yield() {
                    woke.set(true);
                }
            }
        });
        let mut spi = Spi::open(&bank, 0, &sim, delay).unwrap();

        spi.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        spi.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        spi.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        spi.ioctl(IoctlRequest::SetRxTimeout(50)).unwrap();
        spi.ioctl(IoctlRequest::SetTxTimeout(50)).unwrap();

        let mut pattern = [0u8; 512];
        for (i, byte) in pattern.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        sim.script(&pattern);

        let mut received = [0u8; 512];
        assert_eq!(spi.read(&mut received), 512);
        assert_eq!(received, pattern);
        assert!(woke.get());

        // Exactly 512 filler bytes were clocked out to solicit them
        let mut mosi = [0u8; 600];
        assert_eq!(sim.read_mosi(&mut mosi), 512);
        assert!(mosi[..512].iter().all(|&byte| byte == FILLER_BYTE));
    }

    #[test]
    fn test_unsolicited_bytes_are_discarded() {
        static JUNK_TRIGGER: [u8; 6] = *b"abcdef";

        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let mut spi = Spi::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        spi.ioctl(IoctlRequest::UseZeroCopyTx).unwrap();
        spi.ioctl(IoctlRequest::UseCircularBufferRx).unwrap();
        spi.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        spi.ioctl(IoctlRequest::SetRxTimeout(20)).unwrap();
        spi.ioctl(IoctlRequest::SetTxTimeout(20)).unwrap();

        // A plain transmit clocks stale bytes in with nobody reading
        sim.script(b"stale!");
        spi.ioctl(IoctlRequest::ObtainWriteMutex(20)).unwrap();
        assert_eq!(spi.write_zero_copy(TxSource::Buffer(&JUNK_TRIGGER)), 6);

        // Run the transfer down; the handler junks everything it drains
        for _ in 0..8 {
            sim.pump();
            if sim.irq_pending() {
                let _ = on_ssp_interrupt(&mut &sim, shared);
            }
        }
        assert_eq!(spi.shared().rx.ring_len(), 0);

        // A solicited read must see only its own bytes, never the
        // stale ones
        sim.script(b"fresh!");
        let mut received = [0u8; 6];
        assert_eq!(spi.read(&mut received), 6);
        assert_eq!(&received, b"fresh!");
    }

    #[test]
    fn test_character_queue_solicited_read() {
        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let mut spi = Spi::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        spi.ioctl(IoctlRequest::UseCharacterQueueTx).unwrap();
        spi.ioctl(IoctlRequest::UseCharacterQueueRx).unwrap();
        spi.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();
        spi.ioctl(IoctlRequest::SetRxTimeout(20)).unwrap();
        spi.ioctl(IoctlRequest::SetTxTimeout(20)).unwrap();

        sim.script(b"reply data");
        let mut received = [0u8; 10];
        assert_eq!(spi.read(&mut received), 10);
        assert_eq!(&received, b"reply data");
    }

    #[test]
    fn test_character_queue_write_delivers() {
        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let mut spi = Spi::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        spi.ioctl(IoctlRequest::UseCharacterQueueTx).unwrap();
        spi.ioctl(IoctlRequest::UseInterrupts(true)).unwrap();

        let payload = b"twenty bytes exactly";
        assert_eq!(spi.write(payload), payload.len());

        // Drain the receive-driven transmit chain
        for _ in 0..16 {
            sim.pump();
            if sim.irq_pending() {
                let _ = on_ssp_interrupt(&mut &sim, shared);
            }
        }

        let mut mosi = [0u8; 32];
        assert_eq!(sim.read_mosi(&mut mosi), payload.len());
        assert_eq!(&mosi[..payload.len()], payload);
    }

    #[test]
    fn test_config_requests_update_stored_configuration() {
        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let mut spi = Spi::open(&bank, 0, &sim, pump(&sim, shared)).unwrap();

        spi.ioctl(IoctlRequest::SetSpeed(8_000_000)).unwrap();
        spi.ioctl(IoctlRequest::SetClockPhase(Phase::CaptureOnSecondTransition))
            .unwrap();

        // One field at a time: the earlier speed survives the later
        // phase change
        let applied = sim.applied_config().unwrap();
        assert_eq!(applied.frequency, 8_000_000);
        assert_eq!(applied.phase, Phase::CaptureOnSecondTransition);

        assert_eq!(
            spi.ioctl(IoctlRequest::SetSpiDataBits(3)),
            Err(IoError::UnsupportedRequest)
        );
        assert_eq!(
            spi.ioctl(IoctlRequest::SetSlaveAddress(0x10)),
            Err(IoError::UnsupportedRequest)
        );
    }

    #[test]
    #[should_panic(expected = "receive FIFO overrun")]
    fn test_receive_overrun_asserts_after_clearing() {
        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let _spi = Spi::open(&bank, 0, &sim, IdleDelay).unwrap();

        sim.inject_overrun();
        let _ = on_ssp_interrupt(&mut &sim, shared);
    }

    #[test]
    fn test_mode_switch_rejected_while_receive_active() {
        let bank = bank();
        let sim = SimSpi::new();
        let shared = bank.get(0).unwrap();
        let mut spi = Spi::open(&bank, 0, &sim, IdleDelay).unwrap();

        shared.set_receive_active(true);
        assert_eq!(
            spi.ioctl(IoctlRequest::UsePolledRx),
            Err(IoError::TransferInProgress)
        );
        shared.set_receive_active(false);
        assert!(spi.ioctl(IoctlRequest::UsePolledRx).is_ok());
    }
}
