//! Claiming registry for peripheral shared state
//!
//! One registry per hardware class owns the shared state of every
//! instance, keyed by instance number. `open` claims a slot; the claim
//! fails for an index outside the registry or a slot already claimed,
//! which is the static-allocation analogue of the original design's
//! allocation failure. Interrupt glue reaches the shared state through
//! [`Registry::get`] without claiming.
//!
//! The registry is injected into the drivers at construction, so tests
//! substitute simulated hardware by building a registry of their own.

use core::cell::Cell;
use core::ops::Deref;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::IoError;

/// One peripheral instance's shared state plus its claim flag.
pub struct Slot<T> {
    claimed: Mutex<CriticalSectionRawMutex, Cell<bool>>,
    value: T,
}

impl<T> Slot<T> {
    /// Wrap a value in an unclaimed slot.
    pub const fn new(value: T) -> Self {
        Self {
            claimed: Mutex::new(Cell::new(false)),
            value,
        }
    }

    /// Claim the slot. Returns `false` when it is already claimed.
    fn try_claim(&self) -> bool {
        self.claimed.lock(|claimed| {
            if claimed.get() {
                false
            } else {
                claimed.set(true);
                true
            }
        })
    }

    /// Release the slot for a subsequent open.
    pub fn release(&self) {
        self.claimed.lock(|claimed| claimed.set(false));
    }

    /// Whether the slot is currently claimed.
    pub fn is_claimed(&self) -> bool {
        self.claimed.lock(|claimed| claimed.get())
    }
}

impl<T> Deref for Slot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Registry of `N` peripheral instances of one hardware class.
pub struct Registry<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T, const N: usize> Registry<T, N> {
    /// Build a registry from the per-instance shared state values.
    pub fn new(values: [T; N]) -> Self {
        Self {
            slots: values.map(Slot::new),
        }
    }

    /// Claim the slot at `index`.
    pub fn open(&self, index: usize) -> Result<&Slot<T>, IoError> {
        let slot = self.slots.get(index).ok_or(IoError::InvalidPeripheral)?;
        if slot.try_claim() {
            Ok(slot)
        } else {
            Err(IoError::PeripheralInUse)
        }
    }

    /// Access a slot without claiming it. Interrupt glue uses this to
    /// reach the shared state for its instance.
    pub fn get(&self, index: usize) -> Option<&Slot<T>> {
        self.slots.get(index)
    }

    /// Number of instances in the registry.
    pub const fn len(&self) -> usize {
        N
    }

    /// Whether the registry holds no instances.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}
