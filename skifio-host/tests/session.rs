//! Integration tests driving `DeviceSession` over an in-memory loopback
//! transport standing in for the real RPMSG channel.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use skifio_core::constants::ADC_COUNT;
use skifio_core::point::volts_to_dac_code;
use skifio_core::proto::{AppMsg, McuMsg};
use skifio_host::{ChannelError, ChannelRx, ChannelTx, DeviceSession};

struct MpscTx(Sender<AppMsg>);
impl ChannelTx for MpscTx {
    fn send(&mut self, msg: &AppMsg) -> Result<(), ChannelError> {
        self.0
            .send(msg.clone())
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

struct MpscRx(Receiver<McuMsg>);
impl ChannelRx for MpscRx {
    fn receive(&mut self, timeout: Duration) -> Result<Option<McuMsg>, ChannelError> {
        match self.0.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// Read from `app_rx` until `pred` matches or `overall_timeout` elapses,
/// tolerating the periodic `KeepAlive` traffic the send thread emits.
fn wait_for(app_rx: &Receiver<AppMsg>, overall_timeout: Duration, pred: impl Fn(&AppMsg) -> bool) -> AppMsg {
    let deadline = Instant::now() + overall_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let msg = app_rx
            .recv_timeout(remaining)
            .expect("expected message before deadline");
        if pred(&msg) {
            return msg;
        }
    }
}

#[test]
fn connect_is_sent_on_start() {
    let (app_tx, app_rx) = channel::<AppMsg>();
    let (_mcu_tx, mcu_rx) = channel::<McuMsg>();
    let mut session = DeviceSession::start(MpscTx(app_tx), MpscRx(mcu_rx));
    let first = app_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first, AppMsg::Connect);
    session.stop();
}

#[test]
fn din_update_is_observable_through_api() {
    let (app_tx, app_rx) = channel::<AppMsg>();
    let (mcu_tx, mcu_rx) = channel::<McuMsg>();
    let mut session = DeviceSession::start(MpscTx(app_tx), MpscRx(mcu_rx));
    let api = session.api();

    // Drain the initial Connect.
    app_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    mcu_tx.send(McuMsg::DinUpdate(0x2A)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while api.read_din() != 0x2A && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(api.read_din(), 0x2A);
    session.stop();
}

#[test]
fn adc_data_converts_codes_and_tracks_last_value() {
    let (app_tx, app_rx) = channel::<AppMsg>();
    let (mcu_tx, mcu_rx) = channel::<McuMsg>();
    let mut session = DeviceSession::start(MpscTx(app_tx), MpscRx(mcu_rx));
    let api = session.api();
    api.init_adc(2, 1).unwrap();

    app_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let mut arrays = heapless::Vec::new();
    let mut arr = [0i32; ADC_COUNT];
    arr[2] = 512;
    arrays.push(arr).unwrap();
    mcu_tx.send(McuMsg::AdcData(arrays)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while api.read_adc_last_value(2).unwrap() != 512 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(api.read_adc_last_value(2).unwrap(), 512);
    let values = api.read_adc(2).unwrap();
    assert_eq!(values.len(), 1);
    session.stop();
}

#[test]
fn dac_request_drains_staged_waveform() {
    let (app_tx, app_rx) = channel::<AppMsg>();
    let (mcu_tx, mcu_rx) = channel::<McuMsg>();
    let mut session = DeviceSession::start(MpscTx(app_tx), MpscRx(mcu_rx));
    let api = session.api();
    api.init_dac(8);

    app_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let volts = [0.0, 1.0, 2.0];
    api.write_dac(&volts);
    mcu_tx.send(McuMsg::DacRequest(3)).unwrap();

    let msg = wait_for(&app_rx, Duration::from_secs(2), |m| {
        matches!(m, AppMsg::DacData(pts) if !pts.is_empty())
    });
    match msg {
        AppMsg::DacData(pts) => {
            let expected: Vec<i32> = volts.iter().map(|v| volts_to_dac_code(*v)).collect();
            assert_eq!(pts.as_slice(), expected.as_slice());
        }
        other => panic!("unexpected message: {other:?}"),
    }
    session.stop();
}
