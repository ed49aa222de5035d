//! Shared run-local value
//!
//! Reads and writes on a [`SharedCell`] are not traps. Only one task runs at
//! a time, so every access is atomic on its own; interleavings only happen
//! at the traps a routine places between accesses. A read, a
//! `cx.yield_now()` and a write together model a non-atomic
//! read-modify-write.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex as StateLock;

/// Value shared by the tasks of one run
pub struct SharedCell<T> {
    value: Arc<StateLock<T>>,
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> SharedCell<T> {
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(StateLock::new(value)),
        }
    }

    /// Overwrite the value
    pub fn set(&self, value: T) {
        *self.value.lock() = value;
    }

    /// Replace the value, returning the old one
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.value.lock(), value)
    }

    /// Mutate in place
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.value.lock())
    }

    /// Read through a reference
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.value.lock())
    }
}

impl<T: Clone> SharedCell<T> {
    /// Copy of the current value
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }
}

impl<T: Default> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedCell").field(&*self.value.lock()).finish()
    }
}
