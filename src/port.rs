//! Push/pull routing ports.
//!
//! Pipeline stages are wired together with [`Port`]s: single-slot,
//! latest-value-wins channels with "has a new value arrived" / "pull the
//! latest value" semantics. The demuxer owns one output port per elementary
//! stream; the pipeline parks each stream's most recent decoded frame on a
//! port of its own.
//!
//! Ports are deliberately *not* thread-safe: all pushing and pulling happens
//! on the decode thread. Cloning a `Port` yields another handle to the same
//! slot.

use std::{cell::RefCell, rc::Rc};

struct Slot<T> {
    value: Option<T>,
    changed: bool,
}

/// A cloneable handle to a single latest-value slot.
pub struct Port<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Port<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> Default for Port<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Port<T> {
    /// Create an empty port.
    pub fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                value: None,
                changed: false,
            })),
        }
    }

    /// Publish a value, replacing whatever was in the slot.
    pub fn push(&self, value: T) {
        let mut slot = self.slot.borrow_mut();
        slot.value = Some(value);
        slot.changed = true;
    }

    /// Whether a value has been pushed since the last [`pull`](Port::pull).
    pub fn has_changed(&self) -> bool {
        self.slot.borrow().changed
    }

    /// Take the latest value out of the slot, clearing the changed flag.
    ///
    /// Returns `None` if the slot is empty (nothing was ever pushed, or the
    /// port was [`reset`](Port::reset)).
    pub fn pull(&self) -> Option<T> {
        let mut slot = self.slot.borrow_mut();
        slot.changed = false;
        slot.value.take()
    }

    /// Peek at the latest value without consuming it or clearing the flag.
    pub fn latest<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.slot.borrow().value.as_ref())
    }

    /// Drop the stored value and clear the changed flag.
    pub fn reset(&self) {
        let mut slot = self.slot.borrow_mut();
        slot.value = None;
        slot.changed = false;
    }
}
