//! Host-side DAC entry: double buffer, credit, and IOC-request flag.
//!
//! The waveform itself rides on [`skifio_core::DoubleBuffer`], the same
//! type the sample loop would use if the MCU had an allocator — here
//! it's the host reusing the shared primitive rather than rolling its
//! own. Capacity is fixed at compile time
//! ([`DAC_WAVEFORM_CAPACITY`]); `init_dac`'s `max_len` only bounds how
//! many points go out in a single `DacData` message, not how large a
//! waveform the IOC may stage.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use skifio_core::constants::DAC_MSG_MAX_POINTS;
use skifio_core::point::{volts_to_dac_code, Point};
use skifio_core::{DoubleBuffer, PlaybackMode};

/// Largest waveform the host-side double buffer can stage. Not part of
/// the wire protocol (that cap is [`DAC_MSG_MAX_POINTS`] per message);
/// this is purely a host-side storage limit, chosen generously since the
/// host has a heap but `DoubleBuffer` itself does not.
pub const DAC_WAVEFORM_CAPACITY: usize = 1 << 16;

/// Callback invoked when the MCU has consumed the current waveform and
/// is ready for the next one.
pub type DacReqCallback = Box<dyn FnMut() + Send + 'static>;

pub struct DacEntry {
    data: DoubleBuffer<Point, DAC_WAVEFORM_CAPACITY>,
    /// Per-message chunk cap, set by `init_dac`; always `<=
    /// DAC_MSG_MAX_POINTS`.
    max_len: AtomicUsize,
    /// Credit granted by the MCU via `DacRequest`, not yet sent back as
    /// `DacData`.
    mcu_requested_count: AtomicU32,
    /// Set once per drained waveform until `write_dac` provides a new one.
    ioc_requested: AtomicBool,
    req_callback: Mutex<Option<DacReqCallback>>,
}

impl Default for DacEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl DacEntry {
    pub fn new() -> Self {
        Self {
            data: DoubleBuffer::new(),
            max_len: AtomicUsize::new(DAC_MSG_MAX_POINTS),
            mcu_requested_count: AtomicU32::new(0),
            ioc_requested: AtomicBool::new(false),
            req_callback: Mutex::new(None),
        }
    }

    /// IOC side: set the per-message chunk cap, clamped to the wire
    /// limit.
    pub fn init(&self, max_len: usize) {
        self.max_len
            .store(max_len.min(DAC_MSG_MAX_POINTS), Ordering::Release);
    }

    pub fn max_len(&self) -> usize {
        self.max_len.load(Ordering::Acquire)
    }

    /// IOC side: latch a new waveform, converting volts to codes. Clears
    /// the "please send more" flag — fresh data answers the request.
    pub fn write(&self, volts: &[f64]) -> bool {
        let codes: Vec<Point> = volts.iter().map(|v| volts_to_dac_code(*v)).collect();
        let ok = self.data.write_exact(&codes);
        if ok {
            self.ioc_requested.store(false, Ordering::Release);
        }
        ok
    }

    pub fn set_cyclic(&self, mode: PlaybackMode) {
        self.data.set_cyclic(matches!(mode, PlaybackMode::Cyclic));
    }

    pub fn req_flag(&self) -> bool {
        self.ioc_requested.load(Ordering::Acquire)
    }

    pub fn set_req_callback(&self, cb: DacReqCallback) {
        *self.req_callback.lock().unwrap() = Some(cb);
    }

    /// Send-thread side: credit accounting and the outgoing chunk loop.
    /// Returns the raw codes for each `DacData` chunk to send, in order;
    /// stops once credit or staged data runs out.
    pub fn drain_chunks(&self) -> Vec<Vec<Point>> {
        let mut chunks = Vec::new();
        loop {
            let requested = self.mcu_requested_count.load(Ordering::Acquire);
            if requested == 0 {
                break;
            }
            let max_count = self.max_len().min(requested as usize);
            let mut tmp = vec![0 as Point; max_count];
            let count = self.data.read_into(&mut tmp, max_count);
            if count == 0 {
                break;
            }
            self.mcu_requested_count
                .fetch_sub(count as u32, Ordering::AcqRel);
            tmp.truncate(count);
            chunks.push(tmp);
        }

        if self.data.write_ready() && !self.ioc_requested.swap(true, Ordering::AcqRel) {
            if let Some(cb) = self.req_callback.lock().unwrap().as_mut() {
                cb();
            }
        }
        chunks
    }

    /// Receive-thread side: grant MCU-issued credit.
    pub fn add_credit(&self, count: u32) {
        self.mcu_requested_count.fetch_add(count, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_drain_respects_credit() {
        let dac = DacEntry::new();
        dac.init(4);
        dac.write(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        dac.add_credit(5);
        let chunks = dac.drain_chunks();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn req_flag_set_after_drain_and_cleared_by_write() {
        let dac = DacEntry::new();
        dac.init(4);
        dac.write(&[1.0, 2.0]);
        dac.add_credit(10);
        dac.drain_chunks();
        assert!(dac.req_flag());
        dac.write(&[3.0]);
        assert!(!dac.req_flag());
    }
}
