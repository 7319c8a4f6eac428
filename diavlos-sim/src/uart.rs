//! Simulated UART with a loopback wire

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use diavlos_hal::uart::{UartConfig, UartIrqStatus, UartPort};
use diavlos_hal::FifoPort;

/// Hardware FIFO depth of the simulated UART.
pub const UART_FIFO_DEPTH: usize = 16;

const WIRE_DEPTH: usize = 4096;

struct UartInner {
    tx_fifo: Deque<u8, UART_FIFO_DEPTH>,
    rx_fifo: Deque<u8, UART_FIFO_DEPTH>,
    /// Bytes in flight between transmitter and receiver. The default
    /// wiring is loopback: everything transmitted comes back.
    wire: Deque<u8, WIRE_DEPTH>,
    rx_irq_enabled: bool,
    tx_irq_enabled: bool,
    /// Latched when the transmit FIFO drains while its interrupt is
    /// enabled; cleared by reading the interrupt status.
    tx_empty_pending: bool,
    priority: u8,
    config: Option<UartConfig>,
}

/// Simulated UART instance.
pub struct SimUart {
    inner: Mutex<CriticalSectionRawMutex, RefCell<UartInner>>,
}

impl SimUart {
    /// Create a quiescent UART with an empty loopback wire.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(UartInner {
                tx_fifo: Deque::new(),
                rx_fifo: Deque::new(),
                wire: Deque::new(),
                rx_irq_enabled: false,
                tx_irq_enabled: false,
                tx_empty_pending: false,
                priority: 0,
                config: None,
            })),
        }
    }

    /// Advance the wires one step: drain the transmit FIFO onto the
    /// wire, then deliver the wire into the receive FIFO as far as it
    /// has room.
    pub fn pump(&self) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let had_tx = !inner.tx_fifo.is_empty();
            while let Some(byte) = inner.tx_fifo.pop_front() {
                let _ = inner.wire.push_back(byte);
            }
            if had_tx && inner.tx_irq_enabled {
                inner.tx_empty_pending = true;
            }
            while !inner.rx_fifo.is_full() {
                match inner.wire.pop_front() {
                    Some(byte) => {
                        let _ = inner.rx_fifo.push_back(byte);
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
            (inner.rx_irq_enabled && !inner.rx_fifo.is_empty())
                || (inner.tx_irq_enabled && inner.tx_empty_pending)
        })
    }

    /// Inject bytes as if a far-end device transmitted them.
    pub fn feed(&self, bytes: &[u8]) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            for &byte in bytes {
                let _ = inner.wire.push_back(byte);
            }
        });
    }

    /// Configuration most recently applied to the port.
    pub fn applied_config(&self) -> Option<UartConfig> {
        self.inner.lock(|inner| inner.borrow().config)
    }

    /// Interrupt priority most recently applied to the port.
    pub fn applied_priority(&self) -> u8 {
        self.inner.lock(|inner| inner.borrow().priority)
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoPort for &SimUart {
    const FIFO_DEPTH: usize = UART_FIFO_DEPTH;

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

impl UartPort for &SimUart {
    fn irq_status(&mut self) -> UartIrqStatus {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let status = UartIrqStatus {
                rx_data: !inner.rx_fifo.is_empty(),
                tx_empty: inner.tx_empty_pending,
            };
            inner.tx_empty_pending = false;
            status
        })
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        self.inner.lock(|inner| {
            inner.borrow_mut().rx_irq_enabled = enabled;
        });
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.tx_irq_enabled = enabled;
            if enabled && inner.tx_fifo.is_empty() {
                // Enabling transmit-empty on an idle transmitter raises
                // the condition immediately, as hardware does
                inner.tx_empty_pending = true;
            }
            if !enabled {
                inner.tx_empty_pending = false;
            }
        });
    }

    fn set_interrupt_priority(&mut self, priority: u8) {
        self.inner.lock(|inner| {
            inner.borrow_mut().priority = priority;
        });
    }

    fn tx_idle(&mut self) -> bool {
        self.inner.lock(|inner| inner.borrow().tx_fifo.is_empty())
    }

    fn apply_config(&mut self, config: &UartConfig) {
        self.inner.lock(|inner| {
            inner.borrow_mut().config = Some(*config);
        });
    }
}
