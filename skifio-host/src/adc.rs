//! Per-channel ADC entry, host side.
//!
//! Each channel accumulates converted voltages in a deque until the IOC
//! reads them; `last_value` always reflects the most recent raw code
//! seen for the channel regardless of whether anything has been read
//! yet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;

use skifio_core::point::Point;

/// Callback invoked once per channel when its deque reaches `max_size`
/// and has not yet been drained by the IOC.
pub type AdcCallback = Box<dyn FnMut() + Send + 'static>;

pub struct AdcEntry {
    max_size: AtomicUsize,
    last_value: AtomicI32,
    queue: Mutex<VecDeque<f64>>,
    ioc_notified: AtomicBool,
    callback: Mutex<Option<AdcCallback>>,
}

impl Default for AdcEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcEntry {
    pub fn new() -> Self {
        Self {
            max_size: AtomicUsize::new(0),
            last_value: AtomicI32::new(0),
            queue: Mutex::new(VecDeque::new()),
            ioc_notified: AtomicBool::new(false),
            callback: Mutex::new(None),
        }
    }

    /// IOC side: (re)configure the notification threshold and clear any
    /// pending state.
    pub fn init(&self, max_size: usize) {
        self.max_size.store(max_size, Ordering::Release);
        self.queue.lock().unwrap().clear();
        self.ioc_notified.store(false, Ordering::Release);
    }

    pub fn set_callback(&self, cb: AdcCallback) {
        *self.callback.lock().unwrap() = Some(cb);
    }

    pub fn last_value(&self) -> Point {
        self.last_value.load(Ordering::Acquire)
    }

    /// Receive-thread side: append one converted sample, remembering its
    /// raw code as `last_value`. Notifies the IOC callback once per
    /// threshold crossing.
    pub fn push(&self, raw: Point, volts: f64) {
        self.last_value.store(raw, Ordering::Release);
        let max_size = self.max_size.load(Ordering::Acquire);
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(volts);
        if max_size > 0 && queue.len() >= max_size && !self.ioc_notified.swap(true, Ordering::AcqRel) {
            drop(queue);
            if let Some(cb) = self.callback.lock().unwrap().as_mut() {
                cb();
            }
        }
    }

    /// IOC side: drain and return everything accumulated so far, after
    /// trimming stale data: while the deque holds at least `2 *
    /// max_size` points, the oldest `max_size` are dropped and counted
    /// as skipped.
    pub fn read(&self) -> Vec<f64> {
        let max_size = self.max_size.load(Ordering::Acquire);
        let mut queue = self.queue.lock().unwrap();
        if max_size > 0 {
            while queue.len() >= 2 * max_size {
                let skipped = queue.drain(..max_size).count();
                log::warn!("adc channel backlog: dropping {skipped} stale samples");
            }
        }
        let out = queue.drain(..).collect();
        self.ioc_notified.store(false, Ordering::Release);
        out
    }
}
