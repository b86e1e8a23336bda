//! Body Buffer Pool
//!
//! Reusable byte buffers grouped by size class, so steady request traffic
//! does not allocate a fresh body buffer per call.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

/// Smallest size class ever used
pub const MIN_CLASS_SIZE: usize = 4096;

/// Number of size classes; each is four times the previous
pub const CLASS_COUNT: usize = 5;

/// Pool of idle buffers keyed by size class
#[derive(Debug)]
pub struct BufferPool {
    /// Capacity of each class, ascending
    classes: [usize; CLASS_COUNT],

    /// Idle buffers per class
    idle: [Mutex<Vec<BytesMut>>; CLASS_COUNT],

    /// Upper bound on idle buffers retained per class
    max_per_class: usize,
}

impl BufferPool {
    pub fn new(base_size: usize, max_per_class: usize) -> Self {
        let base = base_size.max(MIN_CLASS_SIZE);
        let classes = std::array::from_fn(|i| base.saturating_mul(4usize.saturating_pow(i as u32)));

        Self {
            classes,
            idle: std::array::from_fn(|_| Mutex::new(Vec::new())),
            max_per_class,
        }
    }

    pub fn class_sizes(&self) -> &[usize] {
        &self.classes
    }

    /// Get an empty buffer with at least `size_hint` capacity
    pub fn acquire(&self, size_hint: usize) -> BytesMut {
        let Some(class) = self.classes.iter().position(|&c| c >= size_hint) else {
            return BytesMut::with_capacity(size_hint);
        };

        if let Some(buf) = self.idle[class].lock().pop() {
            tracing::trace!(class, capacity = buf.capacity(), "reusing pooled buffer");
            return buf;
        }

        BytesMut::with_capacity(self.classes[class])
    }

    /// Return a buffer for reuse
    pub fn release(&self, mut buf: BytesMut) {
        let capacity = buf.capacity();
        if capacity < self.classes[0] || capacity > self.classes[CLASS_COUNT - 1] {
            return;
        }

        let class = self
            .classes
            .iter()
            .rposition(|&c| c <= capacity)
            .unwrap_or(0);

        let mut idle = self.idle[class].lock();
        if idle.len() < self.max_per_class {
            buf.clear();
            idle.push(buf);
        }
    }

    /// Return a frozen body for reuse if nothing else still references it
    pub fn reclaim(&self, bytes: Bytes) {
        if let Ok(buf) = bytes.try_into_mut() {
            self.release(buf);
        }
    }

    /// Total idle buffers across all classes
    pub fn idle_count(&self) -> usize {
        self.idle.iter().map(|class| class.lock().len()).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(MIN_CLASS_SIZE, 16)
    }
}
