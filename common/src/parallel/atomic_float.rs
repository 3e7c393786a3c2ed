//! AtomicFloat

use crate::math::{bits_to_float, float_to_bits, Float};
use std::sync::atomic::{AtomicU32, Ordering};

/// Atomic floating point value stored as its bit pattern in an `AtomicU32`.
/// Pixel buffers are made of these so sample callbacks on different threads
/// can splat into the same pixel.
pub struct AtomicFloat {
    /// Bit representation of floating point value.
    bits: AtomicU32,
}

impl AtomicFloat {
    /// Create a new `AtomicFloat`.
    ///
    /// * `v` - The value.
    pub fn new(v: Float) -> Self {
        Self {
            bits: AtomicU32::new(float_to_bits(v)),
        }
    }

    /// Atomically adds a value and returns the previous one.
    ///
    /// * `v` - The value to add.
    pub fn add(&self, v: Float) -> Float {
        let mut old_bits = self.bits.load(Ordering::Relaxed);
        loop {
            let new_bits = float_to_bits(bits_to_float(old_bits) + v);
            match self.bits.compare_exchange_weak(
                old_bits,
                new_bits,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return bits_to_float(old_bits),
                Err(x) => old_bits = x,
            }
        }
    }

    /// Loads the value.
    ///
    /// * `order` - Memory ordering of this operation
    pub fn load(&self, order: Ordering) -> Float {
        bits_to_float(self.bits.load(order))
    }

    /// Stores a value.
    ///
    /// * `v`     - The value.
    /// * `order` - Memory ordering of this operation
    pub fn store(&self, v: Float, order: Ordering) {
        self.bits.store(float_to_bits(v), order);
    }

    /// Returns the value with relaxed ordering. Used between iterations when
    /// no sample callbacks are in flight.
    #[inline]
    pub fn get(&self) -> Float {
        self.load(Ordering::Relaxed)
    }

    /// Sets the value with relaxed ordering.
    ///
    /// * `v` - The value.
    #[inline]
    pub fn set(&self, v: Float) {
        self.store(v, Ordering::Relaxed);
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
