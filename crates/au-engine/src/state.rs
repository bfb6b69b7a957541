//! Lock-free snapshot publication
//!
//! Triple buffering: the writer fills a back buffer and publishes it
//! with a single atomic swap; the reader picks up the freshest complete
//! buffer with another swap. Neither side ever blocks the other, and a
//! reader can never observe a half-written value.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Bit set on the shared slot index when it holds unread data
const DIRTY: u8 = 0b100;
const INDEX_MASK: u8 = 0b011;

struct Shared<T> {
    buffers: [UnsafeCell<T>; 3],
    /// Middle-slot index plus the DIRTY bit
    state: AtomicU8,
}

// The index protocol guarantees the writer and reader never alias the
// same slot: the writer only touches its back slot, the reader only its
// front slot, and slots change hands via atomic swaps of `state`.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

/// Writer half of a triple buffer
pub struct TripleBufferWriter<T> {
    shared: Arc<Shared<T>>,
    back: u8,
}

/// Reader half of a triple buffer
pub struct TripleBufferReader<T> {
    shared: Arc<Shared<T>>,
    front: u8,
}

/// Create a connected writer/reader pair; all three slots start as
/// clones of `initial`.
pub fn triple_buffer<T: Clone>(initial: T) -> (TripleBufferWriter<T>, TripleBufferReader<T>) {
    let shared = Arc::new(Shared {
        buffers: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial),
        ],
        state: AtomicU8::new(1), // middle = slot 1, clean
    });
    (
        TripleBufferWriter {
            shared: Arc::clone(&shared),
            back: 0,
        },
        TripleBufferReader { shared, front: 2 },
    )
}

impl<T> TripleBufferWriter<T> {
    /// Mutable access to the back buffer. Not visible to the reader
    /// until `publish` is called.
    pub fn input_buffer(&mut self) -> &mut T {
        unsafe { &mut *self.shared.buffers[self.back as usize].get() }
    }

    /// Publish the back buffer, taking over the previous middle slot
    /// as the new back buffer.
    pub fn publish(&mut self) {
        let old = self
            .shared
            .state
            .swap(self.back | DIRTY, Ordering::AcqRel);
        self.back = old & INDEX_MASK;
    }
}

impl<T> TripleBufferReader<T> {
    /// The freshest published value. Returns the previous value again
    /// if nothing new has been published.
    pub fn read(&mut self) -> &T {
        if self.shared.state.load(Ordering::Acquire) & DIRTY != 0 {
            let old = self.shared.state.swap(self.front, Ordering::AcqRel);
            if old & DIRTY != 0 {
                self.front = old & INDEX_MASK;
            }
        }
        unsafe { &*self.shared.buffers[self.front as usize].get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_value() {
        let (_w, mut r) = triple_buffer(42u32);
        assert_eq!(*r.read(), 42);
    }

    #[test]
    fn test_publish_read() {
        let (mut w, mut r) = triple_buffer(0u32);
        *w.input_buffer() = 7;
        w.publish();
        assert_eq!(*r.read(), 7);
        // Nothing new: reader keeps the last value.
        assert_eq!(*r.read(), 7);
        *w.input_buffer() = 8;
        w.publish();
        assert_eq!(*r.read(), 8);
    }

    /// Every field of a published value must come from the same
    /// generation, even under concurrent hammering.
    #[test]
    fn test_no_torn_reads() {
        #[derive(Clone)]
        struct Wide {
            a: u64,
            b: Vec<u64>,
            c: u64,
        }

        let (mut w, mut r) = triple_buffer(Wide {
            a: 0,
            b: vec![0; 64],
            c: 0,
        });

        let writer = thread::spawn(move || {
            for gen in 1..5000u64 {
                let slot = w.input_buffer();
                slot.a = gen;
                slot.b.fill(gen);
                slot.c = gen;
                w.publish();
            }
        });

        let reader = thread::spawn(move || {
            let mut last = 0u64;
            for _ in 0..5000 {
                let v = r.read();
                assert_eq!(v.a, v.c);
                assert!(v.b.iter().all(|&x| x == v.a));
                assert!(v.a >= last, "snapshot went backwards");
                last = v.a;
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
