//! Reader/writer double buffer with one-shot and cyclic playback.
//!
//! Only the host's DAC entry uses this; the MCU streams points through
//! plain [`RingBuffer`](crate::ring::RingBuffer)s instead.
//!
//! The reader owns the swap: enforced here by convention (the API only
//! calls it `read_into`, never exposing `swap` outside the crate) plus a
//! debug-only re-entrancy guard that panics if two threads call
//! `read_into` at once.

use core::cell::{Cell, RefCell, UnsafeCell};
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use heapless::Vec;

/// Playback mode for a latched waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// The reader consumes the waveform once; `write_buf` is moved into
    /// `read_buf` on swap and left empty.
    OneShot,
    /// The reader repeats the latched waveform indefinitely; `write_buf`
    /// is copied (not moved) into `read_buf` on every swap.
    Cyclic,
}

/// Double-buffered waveform of up to `N` elements of type `T`.
///
/// There must be exactly one reader thread and one writer thread for the
/// lifetime of a given instance; `write_exact` is the only writer-side
/// entry point, `read_into`/`write_ready` are the only reader-side entry
/// points.
pub struct DoubleBuffer<T: Copy + Default, const N: usize> {
    read: UnsafeCell<Vec<T, N>>,
    read_pos: Cell<usize>,
    write: Mutex<RefCell<Vec<T, N>>>,
    cyclic: AtomicBool,
    swapped: AtomicBool,
    #[cfg(debug_assertions)]
    reader_busy: AtomicBool,
}

// SAFETY: `read`/`read_pos` are only ever touched from the single reader
// thread (enforced by convention and, in debug builds, by `reader_busy`);
// `write` is protected by a `critical_section::Mutex`.
unsafe impl<T: Copy + Default, const N: usize> Sync for DoubleBuffer<T, N> {}

impl<T: Copy + Default, const N: usize> Default for DoubleBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> DoubleBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            read: UnsafeCell::new(Vec::new()),
            read_pos: Cell::new(0),
            write: Mutex::new(RefCell::new(Vec::new())),
            cyclic: AtomicBool::new(false),
            swapped: AtomicBool::new(true),
            #[cfg(debug_assertions)]
            reader_busy: AtomicBool::new(false),
        }
    }

    pub fn set_cyclic(&self, cyclic: bool) {
        self.cyclic.store(cyclic, Ordering::Relaxed);
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic.load(Ordering::Relaxed)
    }

    /// Writer side: atomically replace the write-side contents with
    /// `data`, clearing `swapped`. Fails only if `data` is longer than
    /// capacity `N`.
    pub fn write_exact(&self, data: &[T]) -> bool {
        if data.len() > N {
            return false;
        }
        critical_section::with(|cs| {
            let mut w = self.write.borrow(cs).borrow_mut();
            w.clear();
            // Cannot fail: length was just checked against N.
            let _ = w.extend_from_slice(data);
        });
        self.swapped.store(false, Ordering::Release);
        true
    }

    /// Reader side: true iff there has been no `write_exact` since the
    /// last swap, i.e. the reader has drained a complete waveform and is
    /// waiting for the next one.
    pub fn write_ready(&self) -> bool {
        self.swapped.load(Ordering::Acquire)
    }

    fn enter_reader(&self) {
        #[cfg(debug_assertions)]
        {
            if self.reader_busy.swap(true, Ordering::AcqRel) {
                panic!("DoubleBuffer::read_into called concurrently from two threads");
            }
        }
    }

    fn exit_reader(&self) {
        #[cfg(debug_assertions)]
        self.reader_busy.store(false, Ordering::Release);
    }

    fn drain_read_buf(&self, sink: &mut [T]) -> usize {
        // SAFETY: only called from the single reader thread, guarded by
        // `reader_busy` in debug builds.
        let read = unsafe { &*self.read.get() };
        let pos = self.read_pos.get();
        let n = (read.len() - pos).min(sink.len());
        sink[..n].copy_from_slice(&read[pos..pos + n]);
        self.read_pos.set(pos + n);
        n
    }

    /// Reader-side swap: clear `read_buf`, then either move (one-shot) or
    /// copy (cyclic) `write_buf`'s contents into it. Must never be called
    /// from the writer side.
    fn swap(&self) {
        // SAFETY: reader-exclusive access, see `drain_read_buf`.
        let read = unsafe { &mut *self.read.get() };
        read.clear();
        critical_section::with(|cs| {
            let mut w = self.write.borrow(cs).borrow_mut();
            if self.is_cyclic() {
                let _ = read.extend_from_slice(w.as_slice());
            } else {
                core::mem::swap(&mut *w, read);
            }
        });
        self.read_pos.set(0);
        self.swapped.store(true, Ordering::Release);
    }

    /// Reader side: drain up to `bound` elements into `sink` (which must
    /// be at least `bound` long), swapping in the latched waveform as
    /// needed. Returns the number of elements actually written.
    ///
    /// In cyclic mode, passing an unbounded `bound` loops forever —
    /// callers must always pass a finite bound.
    pub fn read_into(&self, sink: &mut [T], bound: usize) -> usize {
        self.enter_reader();
        let bound = bound.min(sink.len());
        let mut total = 0;
        loop {
            total += self.drain_read_buf(&mut sink[total..bound]);
            if total >= bound {
                break;
            }
            self.swap();
            let remaining = {
                let read = unsafe { &*self.read.get() };
                read.len() - self.read_pos.get()
            };
            if remaining == 0 {
                break;
            }
        }
        self.exit_reader();
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_round_trip() {
        let db: DoubleBuffer<i32, 8> = DoubleBuffer::new();
        db.write_exact(&[1, 2, 3, 4]);
        let mut out = [0; 4];
        assert_eq!(db.read_into(&mut out, 4), 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(db.write_ready());
    }

    #[test]
    fn one_shot_does_not_repeat() {
        let db: DoubleBuffer<i32, 8> = DoubleBuffer::new();
        db.write_exact(&[1, 2]);
        let mut out = [0; 2];
        assert_eq!(db.read_into(&mut out, 2), 2);
        let mut out2 = [9; 2];
        assert_eq!(db.read_into(&mut out2, 2), 0);
        assert_eq!(out2, [9, 9]);
    }

    #[test]
    fn cyclic_repeats_k_times() {
        let db: DoubleBuffer<i32, 8> = DoubleBuffer::new();
        db.set_cyclic(true);
        db.write_exact(&[1, 2, 3]);
        for _ in 0..3 {
            let mut out = [0; 3];
            assert_eq!(db.read_into(&mut out, 3), 3);
            assert_eq!(out, [1, 2, 3]);
        }
    }

    #[test]
    fn fresh_waveform_replaces_pending_one() {
        let db: DoubleBuffer<i32, 8> = DoubleBuffer::new();
        db.write_exact(&[1, 2, 3]);
        db.write_exact(&[9, 9]);
        let mut out = [0; 2];
        assert_eq!(db.read_into(&mut out, 2), 2);
        assert_eq!(out, [9, 9]);
    }

    #[test]
    fn write_ready_false_until_drained() {
        let db: DoubleBuffer<i32, 8> = DoubleBuffer::new();
        db.write_exact(&[1, 2, 3]);
        assert!(!db.write_ready());
        let mut out = [0; 3];
        db.read_into(&mut out, 3);
        assert!(db.write_ready());
    }
}
