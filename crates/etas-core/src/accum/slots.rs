//! Flat `[column][slot]` storage where each catalog claims one slot.
//!
//! Workers claim slots with a compare-and-swap on a shared counter and then
//! write their own slot without further synchronization. Reads happen
//! after the ensemble's workers have been joined.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use etas_common::{Error, Result};

#[derive(Debug)]
pub(crate) struct SlotTable {
    columns: usize,
    capacity: usize,
    data: Vec<AtomicU64>,
    next: AtomicUsize,
}

impl SlotTable {
    pub(crate) fn new(columns: usize, capacity: usize) -> Self {
        Self {
            columns,
            capacity,
            data: (0..columns * capacity).map(|_| AtomicU64::new(0)).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Slots claimed so far.
    pub(crate) fn filled(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.capacity)
    }

    /// Claim the next free slot.
    ///
    /// Fails without claiming once every slot is taken, so a later
    /// `grow` never exposes slots nobody wrote.
    pub(crate) fn claim(&self) -> Result<usize> {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            if current >= self.capacity {
                return Err(Error::CapacityExceeded {
                    capacity: self.capacity,
                    attempted: current + 1,
                });
            }
            match self.next.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = actual,
            }
        }
    }

    fn index(&self, column: usize, slot: usize) -> usize {
        debug_assert!(column < self.columns && slot < self.capacity);
        column * self.capacity + slot
    }

    pub(crate) fn set(&self, column: usize, slot: usize, value: u64) {
        self.data[self.index(column, slot)].store(value, Ordering::Relaxed);
    }

    pub(crate) fn set_f64(&self, column: usize, slot: usize, value: f64) {
        self.set(column, slot, value.to_bits());
    }

    pub(crate) fn get(&self, column: usize, slot: usize) -> u64 {
        self.data[self.index(column, slot)].load(Ordering::Relaxed)
    }

    pub(crate) fn get_f64(&self, column: usize, slot: usize) -> f64 {
        f64::from_bits(self.get(column, slot))
    }

    /// Filled values of one column, in slot order.
    pub(crate) fn column(&self, column: usize) -> Vec<u64> {
        (0..self.filled()).map(|s| self.get(column, s)).collect()
    }

    pub(crate) fn column_f64(&self, column: usize) -> Vec<f64> {
        (0..self.filled()).map(|s| self.get_f64(column, s)).collect()
    }

    /// Enlarge to `capacity` slots, keeping every written value.
    pub(crate) fn grow(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        let filled = self.filled();
        let mut data: Vec<AtomicU64> = (0..self.columns * capacity)
            .map(|_| AtomicU64::new(0))
            .collect();
        for column in 0..self.columns {
            for slot in 0..filled {
                let value = *self.data[column * self.capacity + slot].get_mut();
                *data[column * capacity + slot].get_mut() = value;
            }
        }
        self.data = data;
        self.capacity = capacity;
    }
}

/// Per-column sorted copies, built on first query.
#[derive(Debug)]
pub(crate) struct SortedCache<T> {
    columns: Vec<OnceLock<Vec<T>>>,
}

impl<T> SortedCache<T> {
    pub(crate) fn new(columns: usize) -> Self {
        Self {
            columns: (0..columns).map(|_| OnceLock::new()).collect(),
        }
    }

    pub(crate) fn get_or_init(&self, column: usize, build: impl FnOnce() -> Vec<T>) -> &[T] {
        self.columns[column].get_or_init(build)
    }

    pub(crate) fn clear(&mut self) {
        for column in &mut self.columns {
            column.take();
        }
    }
}

/// Element at fraction `fractile` of a sorted slice: index
/// `min(floor(f·n), n - 1)`, so 0 gives the minimum and 1 the maximum.
pub(crate) fn fractile_index(len: usize, fractile: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let f = if fractile.is_nan() { 0.0 } else { fractile.clamp(0.0, 1.0) };
    Some(((f * len as f64).floor() as usize).min(len - 1))
}
