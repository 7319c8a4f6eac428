//! Simulated SSP/SPI with a scriptable far end
//!
//! Full duplex: every byte clocked out captures one byte into the MOSI
//! log and clocks one byte in from the MISO script. When the script is
//! empty the far end answers with the idle response (0xFF by default,
//! the value an undriven line latches as); scripting `None` models a
//! device that has stopped driving the line entirely, so nothing is
//! received at all.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use diavlos_hal::spi::{SpiConfig, SpiPort, SspIrqStatus};
use diavlos_hal::FifoPort;

/// Hardware FIFO depth of the simulated SSP.
pub const SSP_FIFO_DEPTH: usize = 8;

const LOG_DEPTH: usize = 4096;

struct SpiInner {
    tx_fifo: Deque<u8, SSP_FIFO_DEPTH>,
    rx_fifo: Deque<u8, SSP_FIFO_DEPTH>,
    /// Every byte clocked out, in order
    mosi_log: Deque<u8, LOG_DEPTH>,
    /// Bytes the far-end device will clock back, in order
    miso_script: Deque<u8, LOG_DEPTH>,
    /// What the far end answers once the script runs dry
    idle_response: Option<u8>,
    rx_irq_enabled: bool,
    /// Latched overrun condition, injected by tests
    overrun: bool,
    priority: u8,
    config: Option<SpiConfig>,
}

/// Simulated SSP/SPI instance.
pub struct SimSpi {
    inner: Mutex<CriticalSectionRawMutex, RefCell<SpiInner>>,
}

impl SimSpi {
    /// Create a quiescent port with an empty script.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(SpiInner {
                tx_fifo: Deque::new(),
                rx_fifo: Deque::new(),
                mosi_log: Deque::new(),
                miso_script: Deque::new(),
                idle_response: Some(0xFF),
                rx_irq_enabled: false,
                overrun: false,
                priority: 0,
                config: None,
            })),
        }
    }

    /// Clock pending transmit bytes: each one is logged and lands a
    /// response byte in the receive FIFO. Clocking stops when the
    /// receive FIFO is full, as a master would before overrunning
    /// itself.
    pub fn pump(&self) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            while !inner.rx_fifo.is_full() {
                match inner.tx_fifo.pop_front() {
                    Some(byte) => {
                        let _ = inner.mosi_log.push_back(byte);
                        let response = match inner.miso_script.pop_front() {
                            Some(scripted) => Some(scripted),
                            None => inner.idle_response,
                        };
                        if let Some(response) = response {
                            let _ = inner.rx_fifo.push_back(response);
                        }
                    }
                    None => break,
                }
            }
        });
    }

    /// Whether an interrupt would be asserted right now.
    pub fn irq_pending(&self) -> bool {
        self.inner.lock(|inner| {
            let inner = inner.borrow();
            inner.rx_irq_enabled && (!inner.rx_fifo.is_empty() || inner.overrun)
        })
    }

    /// Append bytes the far-end device will clock back.
    pub fn script(&self, bytes: &[u8]) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            for &byte in bytes {
                let _ = inner.miso_script.push_back(byte);
            }
        });
    }

    /// Set what the far end answers once the script is exhausted.
    /// `None` models a device that no longer drives the line.
    pub fn set_idle_response(&self, response: Option<u8>) {
        self.inner.lock(|inner| {
            inner.borrow_mut().idle_response = response;
        });
    }

    /// Drain the MOSI log into `buf`, returning the count copied.
    pub fn read_mosi(&self, buf: &mut [u8]) -> usize {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let mut count = 0;
            while count < buf.len() {
                match inner.mosi_log.pop_front() {
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

    /// Bytes currently captured in the MOSI log.
    pub fn mosi_len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().mosi_log.len())
    }

    /// Latch the receive-overrun condition, as lost bytes would.
    pub fn inject_overrun(&self) {
        self.inner.lock(|inner| {
            inner.borrow_mut().overrun = true;
        });
    }

    /// Configuration most recently applied to the port.
    pub fn applied_config(&self) -> Option<SpiConfig> {
        self.inner.lock(|inner| inner.borrow().config)
    }
}

impl Default for SimSpi {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoPort for &SimSpi {
    const FIFO_DEPTH: usize = SSP_FIFO_DEPTH;

    fn tx_has_space(&mut self) -> bool {
        self.inner.lock(|inner| !inner.borrow().tx_fifo.is_full())
    }

    fn write_byte(&mut self, byte: u8) {
        self.inner.lock(|inner| {
            let _ = inner.borrow_mut().tx_fifo.push_back(byte);
        });
    }

    fn rx_has_data(&mut self) -> bool {
        self.inner.lock(|inner| !inner.borrow().rx_fifo.is_empty())
    }

    fn read_byte(&mut self) -> u8 {
        self.inner
            .lock(|inner| inner.borrow_mut().rx_fifo.pop_front().unwrap_or(0))
    }
}

impl SpiPort for &SimSpi {
    fn irq_status(&mut self) -> SspIrqStatus {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let status = SspIrqStatus {
                rx_data: !inner.rx_fifo.is_empty(),
                rx_timeout: false,
                rx_overrun: inner.overrun,
            };
            // Latched conditions clear on read
            inner.overrun = false;
            status
        })
    }

    fn rx_fifo_full(&mut self) -> bool {
        self.inner.lock(|inner| inner.borrow().rx_fifo.is_full())
    }

    fn set_rx_interrupts(&mut self, enabled: bool) {
        self.inner.lock(|inner| {
            inner.borrow_mut().rx_irq_enabled = enabled;
        });
    }

    fn set_interrupt_priority(&mut self, priority: u8) {
        self.inner.lock(|inner| {
            inner.borrow_mut().priority = priority;
        });
    }

    fn busy(&mut self) -> bool {
        self.inner.lock(|inner| !inner.borrow().tx_fifo.is_empty())
    }

    fn apply_config(&mut self, config: &SpiConfig) {
        self.inner.lock(|inner| {
            inner.borrow_mut().config = Some(*config);
        });
    }
}
