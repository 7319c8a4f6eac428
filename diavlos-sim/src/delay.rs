//! Pump-on-delay adapter

use embedded_hal::delay::DelayNs;

/// Delay provider that advances the simulation instead of sleeping.
///
/// Every pause a blocked driver takes runs the wrapped closure once,
/// which is where a test pumps its simulated wires and delivers pending
/// interrupts. The nanosecond argument is passed through for tests that
/// want to account virtual time.
pub struct PumpDelay<F: FnMut(u32)> {
    step: F,
}

impl<F: FnMut(u32)> PumpDelay<F> {
    /// Wrap a pump closure.
    pub fn new(step: F) -> Self {
        Self { step }
    }
}

impl<F: FnMut(u32)> DelayNs for PumpDelay<F> {
    fn delay_ns(&mut self, ns: u32) {
        (self.step)(ns);
    }
}

/// Delay provider that does nothing; for polled paths and timeout tests
/// where the hardware must not make progress.
pub struct IdleDelay;

impl DelayNs for IdleDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
