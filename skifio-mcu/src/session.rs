//! MCU-side session state shared between the sample loop and the RPMSG
//! tasks: a small bundle of flags and counters both sides of the task
//! split touch.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Cross-task session state. One instance, shared by `&'static` reference
/// between the sample-loop task and the two RPMSG tasks.
pub struct Session {
    /// Whether the host has sent `Connect` and not yet gone silent for
    /// `KEEP_ALIVE_MAX_DELAY_MS`.
    alive: AtomicBool,
    /// Whether the DAC ring should be drained this tick (true between
    /// `Connect` and disconnect).
    dac_running: AtomicBool,
    /// DAC credit: points the MCU has asked for and not yet received.
    dac_requested: AtomicU32,
    /// Current discrete-output nibble.
    dout: AtomicU8,
    /// Set when `dout` changed and the sample loop has not yet written it
    /// to the board.
    dout_changed: AtomicBool,
    /// Current discrete-input byte, as last observed by the sample loop.
    din: AtomicU8,
    /// Set when `din` changed and the send-task has not yet reported it.
    din_changed: AtomicBool,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            dac_running: AtomicBool::new(false),
            dac_requested: AtomicU32::new(0),
            dout: AtomicU8::new(0),
            dout_changed: AtomicBool::new(false),
            din: AtomicU8::new(0),
            din_changed: AtomicBool::new(false),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_dac_running(&self) -> bool {
        self.dac_running.load(Ordering::Acquire)
    }

    /// Transition to connected: reset credit, mark alive and running.
    /// Returns the credit value it reset from (for diagnostics).
    pub fn on_connect(&self) {
        self.dac_requested.store(0, Ordering::Release);
        self.dac_running.store(true, Ordering::Release);
        self.alive.store(true, Ordering::Release);
    }

    /// Transition to disconnected (keep-alive deadline elapsed). Returns
    /// `true` if this call actually performed the transition (so the
    /// caller calls `dac_disable` exactly once per transition).
    pub fn on_keep_alive_timeout(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        if was_alive {
            self.dac_running.store(false, Ordering::Release);
            self.dac_requested.store(0, Ordering::Release);
        }
        was_alive
    }

    pub fn dac_requested(&self) -> u32 {
        self.dac_requested.load(Ordering::Acquire)
    }

    /// Add to the DAC credit counter (recv-task, on `DacRequest` being
    /// issued by the send-task — see `rpmsg::send_task`).
    pub fn add_dac_credit(&self, count: u32) {
        self.dac_requested.fetch_add(count, Ordering::AcqRel);
    }

    /// Saturating-subtract from the DAC credit counter; returns the
    /// amount that overflowed past zero (counted as `stats.dac.req_exceed`).
    pub fn consume_dac_credit(&self, count: u32) -> u32 {
        let mut overflow = 0;
        let _ = self
            .dac_requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if count > cur {
                    overflow = count - cur;
                    Some(0)
                } else {
                    Some(cur - count)
                }
            });
        overflow
    }

    pub fn set_dout(&self, mask: u8) {
        self.dout.store(mask & 0x0F, Ordering::Release);
        self.dout_changed.store(true, Ordering::Release);
    }

    pub fn take_dout_if_changed(&self) -> Option<u8> {
        if self.dout_changed.swap(false, Ordering::AcqRel) {
            Some(self.dout.load(Ordering::Acquire))
        } else {
            None
        }
    }

    pub fn update_din(&self, value: u8) -> bool {
        let changed = self.din.swap(value, Ordering::AcqRel) != value;
        if changed {
            self.din_changed.store(true, Ordering::Release);
        }
        changed
    }

    pub fn take_din_if_changed(&self) -> Option<u8> {
        if self.din_changed.swap(false, Ordering::AcqRel) {
            Some(self.din.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
