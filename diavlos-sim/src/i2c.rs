//! Simulated I2C controller driven by a scripted event sequence
//!
//! Tests push the bus events a transfer would step through
//! (`StartSent`, `AddressWriteAcked`, ...) and the data bytes a slave
//! would return. The port reports the front of the script as the
//! current event; clearing the serviced condition advances to the next.
//! Everything the driver does to the bus - data register writes, ACK
//! selections, start and stop requests - is recorded for the test to
//! assert on.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use diavlos_hal::i2c::{I2cConfig, I2cEvent, I2cPort};

const SCRIPT_DEPTH: usize = 128;

struct I2cInner {
    events: Deque<I2cEvent, SCRIPT_DEPTH>,
    read_bytes: Deque<u8, SCRIPT_DEPTH>,
    data_writes: Deque<u8, SCRIPT_DEPTH>,
    acks: Deque<bool, SCRIPT_DEPTH>,
    starts: usize,
    stops: usize,
    irq_enabled: bool,
    pending_cleared: bool,
    priority: u8,
    config: Option<I2cConfig>,
}

/// Simulated I2C controller instance.
pub struct SimI2c {
    inner: Mutex<CriticalSectionRawMutex, RefCell<I2cInner>>,
}

impl SimI2c {
    /// Create a controller with an empty script.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(I2cInner {
                events: Deque::new(),
                read_bytes: Deque::new(),
                data_writes: Deque::new(),
                acks: Deque::new(),
                starts: 0,
                stops: 0,
                irq_enabled: false,
                pending_cleared: false,
                priority: 0,
                config: None,
            })),
        }
    }

    /// Append bus events for the driver to step through.
    pub fn push_events(&self, events: &[I2cEvent]) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            for &event in events {
                let _ = inner.events.push_back(event);
            }
        });
    }

    /// Append bytes the slave will return during received-data events.
    pub fn feed_read_bytes(&self, bytes: &[u8]) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            for &byte in bytes {
                let _ = inner.read_bytes.push_back(byte);
            }
        });
    }

    /// Whether an unserviced scripted event remains.
    pub fn has_event(&self) -> bool {
        self.inner.lock(|inner| !inner.borrow().events.is_empty())
    }

    /// Whether the controller's interrupt is enabled.
    pub fn irq_enabled(&self) -> bool {
        self.inner.lock(|inner| inner.borrow().irq_enabled)
    }

    /// Drain everything written to the data register, in order. The
    /// address phase appears here too, as `address << 1 | direction`.
    pub fn read_writes(&self, buf: &mut [u8]) -> usize {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let mut count = 0;
            while count < buf.len() {
                match inner.data_writes.pop_front() {
                    Some(byte) => {
                        buf[count] = byte;
                        count += 1;
                    }
                    None => break,
                }
            }
            count
        })
    }

    /// Drain the recorded ACK selections, in order.
    pub fn read_acks(&self, buf: &mut [bool]) -> usize {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let mut count = 0;
            while count < buf.len() {
                match inner.acks.pop_front() {
                    Some(ack) => {
                        buf[count] = ack;
                        count += 1;
                    }
                    None => break,
                }
            }
            count
        })
    }

    /// Start conditions requested so far.
    pub fn starts(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().starts)
    }

    /// Stop conditions requested so far.
    pub fn stops(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().stops)
    }

    /// Whether pending interrupts were cleared since construction.
    pub fn pending_was_cleared(&self) -> bool {
        self.inner.lock(|inner| inner.borrow().pending_cleared)
    }

    /// Configuration most recently applied to the port.
    pub fn applied_config(&self) -> Option<I2cConfig> {
        self.inner.lock(|inner| inner.borrow().config)
    }
}

impl Default for SimI2c {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cPort for &SimI2c {
    fn event(&mut self) -> I2cEvent {
        self.inner.lock(|inner| {
            inner
                .borrow()
                .events
                .front()
                .copied()
                .unwrap_or(I2cEvent::None)
        })
    }

    fn clear_event(&mut self) {
        self.inner.lock(|inner| {
            let _ = inner.borrow_mut().events.pop_front();
        });
    }

    fn send_start(&mut self) {
        self.inner.lock(|inner| {
            inner.borrow_mut().starts += 1;
        });
    }

    fn clear_start(&mut self) {
        self.inner.lock(|inner| {
            let _ = inner.borrow_mut().events.pop_front();
        });
    }

    fn send_stop(&mut self) {
        self.inner.lock(|inner| {
            inner.borrow_mut().stops += 1;
        });
    }

    fn write_data(&mut self, byte: u8) {
        self.inner.lock(|inner| {
            let _ = inner.borrow_mut().data_writes.push_back(byte);
        });
    }

    fn read_data(&mut self) -> u8 {
        self.inner
            .lock(|inner| inner.borrow_mut().read_bytes.pop_front().unwrap_or(0))
    }

    fn set_ack(&mut self, ack: bool) {
        self.inner.lock(|inner| {
            let _ = inner.borrow_mut().acks.push_back(ack);
        });
    }

    fn set_interrupt(&mut self, enabled: bool) {
        self.inner.lock(|inner| {
            inner.borrow_mut().irq_enabled = enabled;
        });
    }

    fn clear_pending_interrupt(&mut self) {
        self.inner.lock(|inner| {
            inner.borrow_mut().pending_cleared = true;
        });
    }

    fn set_interrupt_priority(&mut self, priority: u8) {
        self.inner.lock(|inner| {
            inner.borrow_mut().priority = priority;
        });
    }

    fn apply_config(&mut self, config: &I2cConfig) {
        self.inner.lock(|inner| {
            inner.borrow_mut().config = Some(*config);
        });
    }
}
