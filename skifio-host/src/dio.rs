//! Discrete I/O state, host side.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

/// Callback invoked from the receive thread whenever `din` changes.
pub type DinCallback = Box<dyn FnMut(u8) + Send + 'static>;

pub struct DioState {
    din: AtomicU8,
    din_callback: Mutex<Option<DinCallback>>,
    dout: AtomicU8,
    dout_changed: AtomicBool,
}

impl Default for DioState {
    fn default() -> Self {
        Self::new()
    }
}

impl DioState {
    pub fn new() -> Self {
        Self {
            din: AtomicU8::new(0),
            din_callback: Mutex::new(None),
            dout: AtomicU8::new(0),
            dout_changed: AtomicBool::new(false),
        }
    }

    /// IOC side: write the discrete output mask. Values above the low 4
    /// bits are masked off and logged, never passed on.
    pub fn write_dout(&self, mask: u32) {
        if mask & !0x0F != 0 {
            log::warn!("write_dout: mask {mask:#x} has bits set above the low nibble, masking");
        }
        self.dout.store((mask & 0x0F) as u8, Ordering::Release);
        self.dout_changed.store(true, Ordering::Release);
    }

    /// IOC side: last observed discrete-input mask.
    pub fn read_din(&self) -> u32 {
        self.din.load(Ordering::Acquire) as u32
    }

    pub fn set_din_callback(&self, cb: DinCallback) {
        *self.din_callback.lock().unwrap() = Some(cb);
    }

    /// Receive-thread side: record a new `din` value and invoke the
    /// callback, if any, with the raw mask.
    pub fn on_din_update(&self, value: u8) {
        self.din.store(value, Ordering::Release);
        if let Some(cb) = self.din_callback.lock().unwrap().as_mut() {
            cb(value);
        }
    }

    /// Send-thread side: take the pending `dout` value if it changed
    /// since the last call.
    pub fn take_dout_if_changed(&self) -> Option<u8> {
        if self.dout_changed.swap(false, Ordering::AcqRel) {
            Some(self.dout.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_dout_masks_high_bits_and_flags_change() {
        let dio = DioState::new();
        dio.write_dout(0xFF5);
        assert_eq!(dio.take_dout_if_changed(), Some(0x05));
        assert_eq!(dio.take_dout_if_changed(), None);
    }

    #[test]
    fn din_update_invokes_callback() {
        let dio = DioState::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(0u8));
        let seen2 = seen.clone();
        dio.set_din_callback(Box::new(move |v| *seen2.lock().unwrap() = v));
        dio.on_din_update(0x2A);
        assert_eq!(dio.read_din(), 0x2A);
        assert_eq!(*seen.lock().unwrap(), 0x2A);
    }
}
