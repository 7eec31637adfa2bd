//! RPMSG send/receive tasks.
//!
//! The real transport is the host's `imx_rpmsg` channel; this module
//! only assumes a [`RpmsgChannel`] that can move opaque byte buffers
//! across it, the way `skifio-hal`'s driver only assumes `embedded-hal`
//! traits rather than a specific chip's SPI peripheral. A loopback
//! implementation for tests lives at the bottom of this file.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

use skifio_core::constants::{
    ADC_MSG_MAX_POINTS, DAC_BUFFER_SIZE, DAC_MSG_MAX_POINTS, KEEP_ALIVE_MAX_DELAY_MS,
    RPMSG_MAX_MCU_MSG_LEN,
};
use skifio_core::point::{AdcArray, Point};
use skifio_core::proto::{AppMsg, McuMsg};
use skifio_core::ring::RingBuffer;
use skifio_core::stats::Statistics;

use crate::sample_loop::ADC_RING_CAPACITY;
use crate::session::Session;

/// Transport abstraction the send/recv tasks run over.
pub trait RpmsgChannel {
    type Error;

    /// Send one message, blocking until accepted by the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receive one message, or `Ok(None)` if `timeout_ms` elapses first.
    async fn recv_timeout(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<Option<usize>, Self::Error>;
}

/// Shared buffers the two RPMSG tasks and the sample loop all touch.
pub struct RpmsgResources<'a> {
    pub session: &'a Session,
    pub stats: &'a Mutex<RefCell<Statistics>>,
    pub dac_ring: &'a Mutex<RefCell<RingBuffer<Point, DAC_BUFFER_SIZE>>>,
    pub adc_ring: &'a Mutex<RefCell<RingBuffer<AdcArray, ADC_RING_CAPACITY>>>,
    pub send_signal: &'a Signal<CriticalSectionRawMutex, ()>,
}

/// Receive task body. Never returns.
pub async fn recv_task<C: RpmsgChannel>(mut channel: C, res: &RpmsgResources<'_>) -> ! {
    let mut buf = [0u8; RPMSG_MAX_MCU_MSG_LEN];
    loop {
        match channel
            .recv_timeout(&mut buf, KEEP_ALIVE_MAX_DELAY_MS as u64)
            .await
        {
            Ok(Some(len)) => match AppMsg::decode(&buf[..len]) {
                Ok(msg) => dispatch_app_msg(msg, res),
                Err(_parse_err) => {
                    // Malformed message: drop and continue.
                }
            },
            Ok(None) => {
                // Timeout: declare the host dead if it was previously alive.
                res.session.on_keep_alive_timeout();
            }
            Err(_transport_err) => {
                // Transport hiccup; keep the session's own keep-alive
                // deadline as the source of truth for liveness.
            }
        }
    }
}

fn dispatch_app_msg(msg: AppMsg, res: &RpmsgResources<'_>) {
    match msg {
        AppMsg::None => {}
        AppMsg::Connect => {
            res.session.on_connect();
            res.send_signal.signal(());
        }
        AppMsg::KeepAlive => {
            if !res.session.is_alive() {
                #[cfg(feature = "defmt")]
                defmt::warn!("KeepAlive received while session not alive");
            }
        }
        AppMsg::DoutUpdate(v) => {
            res.session.set_dout(v);
        }
        AppMsg::DacData(points) => {
            let written = critical_section::with(|cs| {
                res.dac_ring.borrow(cs).borrow_mut().write(&points)
            });
            let len = points.len();
            if written < len {
                critical_section::with(|cs| {
                    res.stats.borrow(cs).borrow_mut().dac.lost_full += (len - written) as u64;
                });
            }
            let overflow = res.session.consume_dac_credit(len as u32);
            if overflow > 0 {
                critical_section::with(|cs| {
                    res.stats.borrow(cs).borrow_mut().dac.req_exceed += overflow as u64;
                });
            }
        }
        AppMsg::StatsReset => {
            critical_section::with(|cs| {
                res.stats.borrow(cs).borrow_mut().reset();
            });
        }
    }
}

/// Send task body. Never returns.
pub async fn send_task<C: RpmsgChannel>(mut channel: C, res: &RpmsgResources<'_>) -> ! {
    let mut buf = [0u8; RPMSG_MAX_MCU_MSG_LEN];
    loop {
        let _ = with_timeout(Duration::from_secs(10), res.send_signal.wait()).await;

        if !res.session.is_alive() {
            // Drain and discard ADC batches so the ring doesn't fill up
            // while nobody is listening.
            critical_section::with(|cs| {
                let mut ring = res.adc_ring.borrow(cs).borrow_mut();
                let occupied = ring.occupied();
                ring.skip(occupied);
            });
            continue;
        }

        if let Some(din) = res.session.take_din_if_changed() {
            let len = McuMsg::DinUpdate(din).encode(&mut buf);
            let _ = channel.send(&buf[..len]).await;
        }

        loop {
            let occupied =
                critical_section::with(|cs| res.adc_ring.borrow(cs).borrow().occupied());
            if occupied < ADC_MSG_MAX_POINTS {
                break;
            }
            let mut arrays: heapless::Vec<AdcArray, ADC_MSG_MAX_POINTS> = heapless::Vec::new();
            critical_section::with(|cs| {
                let mut ring = res.adc_ring.borrow(cs).borrow_mut();
                let mut tmp = [[0 as Point; skifio_core::constants::ADC_COUNT]; ADC_MSG_MAX_POINTS];
                let n = ring.read(&mut tmp);
                for arr in &tmp[..n] {
                    let _ = arrays.push(*arr);
                }
            });
            let len = McuMsg::AdcData(arrays).encode(&mut buf);
            let _ = channel.send(&buf[..len]).await;
        }

        let vacant = critical_section::with(|cs| res.dac_ring.borrow(cs).borrow().vacant());
        let requested = res.session.dac_requested();
        if vacant as u32 > requested {
            let available = vacant as u32 - requested;
            if available >= DAC_MSG_MAX_POINTS as u32 {
                let count = (available / DAC_MSG_MAX_POINTS as u32) * DAC_MSG_MAX_POINTS as u32;
                res.session.add_dac_credit(count);
                let len = McuMsg::DacRequest(count).encode(&mut buf);
                let _ = channel.send(&buf[..len]).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory loopback channel for exercising dispatch logic without a
    /// real transport.
    pub struct LoopbackChannel {
        pub inbox: heapless::Deque<heapless::Vec<u8, RPMSG_MAX_MCU_MSG_LEN>, 16>,
        pub outbox: heapless::Deque<heapless::Vec<u8, RPMSG_MAX_MCU_MSG_LEN>, 16>,
    }

    impl LoopbackChannel {
        pub fn new() -> Self {
            Self {
                inbox: heapless::Deque::new(),
                outbox: heapless::Deque::new(),
            }
        }
    }

    impl RpmsgChannel for &mut LoopbackChannel {
        type Error = core::convert::Infallible;

        async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
            let mut v = heapless::Vec::new();
            let _ = v.extend_from_slice(buf);
            let _ = self.outbox.push_back(v);
            Ok(())
        }

        async fn recv_timeout(
            &mut self,
            buf: &mut [u8],
            _timeout_ms: u64,
        ) -> Result<Option<usize>, Self::Error> {
            match self.inbox.pop_front() {
                Some(msg) => {
                    buf[..msg.len()].copy_from_slice(&msg);
                    Ok(Some(msg.len()))
                }
                None => Ok(None),
            }
        }
    }

    #[test]
    fn connect_dispatch_sets_alive_and_running() {
        let session = Session::new();
        let stats = Mutex::new(RefCell::new(Statistics::new()));
        let dac_ring = Mutex::new(RefCell::new(RingBuffer::<Point, DAC_BUFFER_SIZE>::new()));
        let adc_ring = Mutex::new(RefCell::new(
            RingBuffer::<AdcArray, ADC_RING_CAPACITY>::new(),
        ));
        let send_signal = Signal::new();
        let res = RpmsgResources {
            session: &session,
            stats: &stats,
            dac_ring: &dac_ring,
            adc_ring: &adc_ring,
            send_signal: &send_signal,
        };
        dispatch_app_msg(AppMsg::Connect, &res);
        assert!(session.is_alive());
        assert!(session.is_dac_running());
    }

    #[test]
    fn dac_data_beyond_credit_counts_req_exceed() {
        let session = Session::new();
        let stats = Mutex::new(RefCell::new(Statistics::new()));
        let dac_ring = Mutex::new(RefCell::new(RingBuffer::<Point, DAC_BUFFER_SIZE>::new()));
        let adc_ring = Mutex::new(RefCell::new(
            RingBuffer::<AdcArray, ADC_RING_CAPACITY>::new(),
        ));
        let send_signal = Signal::new();
        let res = RpmsgResources {
            session: &session,
            stats: &stats,
            dac_ring: &dac_ring,
            adc_ring: &adc_ring,
            send_signal: &send_signal,
        };
        let mut pts: heapless::Vec<Point, DAC_MSG_MAX_POINTS> = heapless::Vec::new();
        pts.extend_from_slice(&[1, 2, 3]).unwrap();
        dispatch_app_msg(AppMsg::DacData(pts), &res);
        critical_section::with(|cs| {
            assert_eq!(res.stats.borrow(cs).borrow().dac.req_exceed, 3);
        });
    }

    #[test]
    fn dout_update_marks_change() {
        let session = Session::new();
        let stats = Mutex::new(RefCell::new(Statistics::new()));
        let dac_ring = Mutex::new(RefCell::new(RingBuffer::<Point, DAC_BUFFER_SIZE>::new()));
        let adc_ring = Mutex::new(RefCell::new(
            RingBuffer::<AdcArray, ADC_RING_CAPACITY>::new(),
        ));
        let send_signal = Signal::new();
        let res = RpmsgResources {
            session: &session,
            stats: &stats,
            dac_ring: &dac_ring,
            adc_ring: &adc_ring,
            send_signal: &send_signal,
        };
        dispatch_app_msg(AppMsg::DoutUpdate(0x09), &res);
        assert_eq!(session.take_dout_if_changed(), Some(0x09));
    }
}
