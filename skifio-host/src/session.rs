//! Host device session: the receive/send thread pair and the transport
//! abstraction they run over.
//!
//! Splits the bidirectional channel into owned send/receive halves so
//! each thread can own its half without locking, matching how most real
//! RPMSG/serial transports expose themselves (one socket, split via
//! `try_clone` or an explicit half-duplex API).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use skifio_core::constants::{ADC_COUNT, KEEP_ALIVE_PERIOD_MS, STATS_REPORT_PERIOD_MS};
use skifio_core::point::adc_code_to_volts;
use skifio_core::proto::{AppMsg, McuMsg};
use skifio_core::stats::Statistics;

use crate::adc::AdcEntry;
use crate::dac::DacEntry;
use crate::dio::DioState;

/// Transport error, either from the underlying medium or from a
/// malformed message it carried.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed message: {0:?}")]
    Protocol(skifio_core::ParseError),
}

/// The outbound half of the channel (host → MCU).
pub trait ChannelTx: Send + 'static {
    fn send(&mut self, msg: &AppMsg) -> Result<(), ChannelError>;
}

/// The inbound half of the channel (MCU → host).
pub trait ChannelRx: Send + 'static {
    /// Block for up to `timeout`; `Ok(None)` on timeout with nothing
    /// received.
    fn receive(&mut self, timeout: Duration) -> Result<Option<McuMsg>, ChannelError>;
}

pub(crate) struct Shared {
    pub dac: DacEntry,
    pub adc: [AdcEntry; ADC_COUNT],
    pub dio: DioState,
    pub stats: Mutex<Statistics>,
    pub alive: AtomicBool,
    pub stats_reset_requested: AtomicBool,
    pub send_ready: (Mutex<bool>, Condvar),
}

impl Shared {
    fn new() -> Self {
        Self {
            dac: DacEntry::new(),
            adc: std::array::from_fn(|_| AdcEntry::new()),
            dio: DioState::new(),
            stats: Mutex::new(Statistics::new()),
            alive: AtomicBool::new(false),
            stats_reset_requested: AtomicBool::new(false),
            send_ready: (Mutex::new(false), Condvar::new()),
        }
    }

    fn wake_send_thread(&self) {
        let (lock, cvar) = &self.send_ready;
        *lock.lock().unwrap() = true;
        cvar.notify_one();
    }
}

/// Owns the receive/send threads and the shared device state. `start`
/// launches the threads (the receive thread in turn launches the send
/// thread); `stop`/`Drop` tear both down.
pub struct DeviceSession {
    pub(crate) shared: Arc<Shared>,
    done: Arc<AtomicBool>,
    recv_handle: Option<JoinHandle<()>>,
    stats_handle: Option<JoinHandle<()>>,
}

impl DeviceSession {
    /// Start the session over an already-connected transport, split into
    /// its two halves.
    pub fn start<Tx: ChannelTx, Rx: ChannelRx>(tx: Tx, rx: Rx) -> Self {
        let shared = Arc::new(Shared::new());
        let done = Arc::new(AtomicBool::new(false));

        let recv_handle = {
            let shared = shared.clone();
            let done = done.clone();
            thread::spawn(move || recv_thread_main(tx, rx, shared, done))
        };

        let stats_handle = {
            let shared = shared.clone();
            let done = done.clone();
            thread::spawn(move || stats_thread_main(shared, done))
        };

        Self {
            shared,
            done,
            recv_handle: Some(recv_handle),
            stats_handle: Some(stats_handle),
        }
    }

    /// Obtain a cheap, cloneable handle to the IOC-facing API surface.
    pub fn api(&self) -> crate::api::DeviceApi {
        crate::api::DeviceApi::new(self.shared.clone())
    }

    /// Signal both threads to exit and join them. Idempotent.
    pub fn stop(&mut self) {
        self.done.store(true, Ordering::Release);
        self.shared.wake_send_thread();
        if let Some(h) = self.recv_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.stats_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recv_thread_main<Tx: ChannelTx, Rx: ChannelRx>(
    mut tx: Tx,
    mut rx: Rx,
    shared: Arc<Shared>,
    done: Arc<AtomicBool>,
) {
    // "sends Connect synchronously (waits forever)": keep retrying until
    // the transport accepts it or the session is torn down before ever
    // coming up.
    while !done.load(Ordering::Acquire) {
        match tx.send(&AppMsg::Connect) {
            Ok(()) => break,
            Err(e) => {
                log::warn!("failed to send Connect, retrying: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
    shared.alive.store(true, Ordering::Release);

    let send_handle = {
        let shared = shared.clone();
        let done = done.clone();
        thread::spawn(move || send_thread_main(tx, shared, done))
    };

    while !done.load(Ordering::Acquire) {
        match rx.receive(Duration::from_millis(100)) {
            Ok(Some(msg)) => dispatch_mcu_msg(msg, &shared),
            Ok(None) => continue,
            Err(e) => panic!("host receive channel failed: {e}"),
        }
    }

    let _ = send_handle.join();
}

fn dispatch_mcu_msg(msg: McuMsg, shared: &Shared) {
    match msg {
        McuMsg::None => {}
        McuMsg::DinUpdate(v) => shared.dio.on_din_update(v),
        McuMsg::AdcData(arrays) => {
            for arr in arrays.iter() {
                for (i, entry) in shared.adc.iter().enumerate() {
                    let code = arr[i];
                    entry.push(code, adc_code_to_volts(code));
                }
            }
        }
        McuMsg::DacRequest(count) => {
            shared.dac.add_credit(count);
            shared.wake_send_thread();
        }
        McuMsg::Debug(s) => log::debug!("MCU: {s}"),
        McuMsg::Error(code, s) => log::error!("MCU error {code}: {s}"),
    }
}

fn send_thread_main<Tx: ChannelTx>(mut tx: Tx, shared: Arc<Shared>, done: Arc<AtomicBool>) {
    let period = Duration::from_millis(KEEP_ALIVE_PERIOD_MS as u64);
    while !done.load(Ordering::Acquire) {
        {
            let (lock, cvar) = &shared.send_ready;
            let mut woken = lock.lock().unwrap();
            let (guard, timeout) = cvar.wait_timeout_while(woken, period, |w| !*w).unwrap();
            woken = guard;
            *woken = false;
            if timeout.timed_out() {
                if let Err(e) = tx.send(&AppMsg::KeepAlive) {
                    log::warn!("failed to send KeepAlive: {e}");
                }
            }
        }
        if done.load(Ordering::Acquire) {
            break;
        }

        if let Some(dout) = shared.dio.take_dout_if_changed() {
            let _ = tx.send(&AppMsg::DoutUpdate(dout));
        }

        for chunk in shared.dac.drain_chunks() {
            let mut points = heapless::Vec::new();
            for p in chunk {
                if points.push(p).is_err() {
                    log::warn!("DAC chunk longer than wire limit, truncating");
                    break;
                }
            }
            let _ = tx.send(&AppMsg::DacData(points));
        }

        if shared
            .stats_reset_requested
            .swap(false, Ordering::AcqRel)
        {
            let _ = tx.send(&AppMsg::StatsReset);
        }
    }
}

fn stats_thread_main(shared: Arc<Shared>, done: Arc<AtomicBool>) {
    let period = Duration::from_millis(STATS_REPORT_PERIOD_MS as u64);
    while !done.load(Ordering::Acquire) {
        thread::sleep(period);
        if done.load(Ordering::Acquire) {
            break;
        }
        let stats = shared.stats.lock().unwrap();
        crate::stats::report(&stats);
    }
}
