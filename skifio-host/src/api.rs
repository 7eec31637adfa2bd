//! The IOC-facing API surface.
//!
//! `DeviceApi` is a cheap `Arc` handle cloned out of a running
//! [`DeviceSession`](crate::session::DeviceSession); callers from the
//! EPICS device-support layer are expected to hold one per device and
//! call these methods from whatever thread the record processing
//! happens on.

use std::sync::Arc;

use skifio_core::constants::ADC_COUNT;
use skifio_core::point::Point;
use skifio_core::PlaybackMode;

use crate::adc::AdcCallback;
use crate::dac::DacReqCallback;
use crate::dio::DinCallback;
use crate::session::Shared;

/// Requested DAC output state. Reserved: see [`DeviceApi::set_dac_operation_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("adc channel index {0} out of range (ADC_COUNT = {ADC_COUNT})")]
    ChannelOutOfRange(usize),
}

pub struct DeviceApi {
    pub(crate) shared: Arc<Shared>,
}

impl DeviceApi {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // --- Discrete I/O ---

    pub fn write_dout(&self, mask: u32) {
        self.shared.dio.write_dout(mask);
        self.shared.wake_send_thread();
    }

    pub fn read_din(&self) -> u32 {
        self.shared.dio.read_din()
    }

    pub fn set_din_callback(&self, cb: DinCallback) {
        self.shared.dio.set_din_callback(cb);
    }

    // --- DAC ---

    pub fn init_dac(&self, max_len: usize) {
        self.shared.dac.init(max_len);
    }

    pub fn write_dac(&self, volts: &[f64]) -> bool {
        let ok = self.shared.dac.write(volts);
        self.shared.wake_send_thread();
        ok
    }

    pub fn dac_req_flag(&self) -> bool {
        self.shared.dac.req_flag()
    }

    pub fn set_dac_req_callback(&self, cb: DacReqCallback) {
        self.shared.dac.set_req_callback(cb);
    }

    pub fn set_dac_playback_mode(&self, mode: PlaybackMode) {
        self.shared.dac.set_cyclic(mode);
    }

    /// Reserved: the MCU sample loop's DAC-running state is driven
    /// entirely by `Connect`/disconnect, not by an independent run/stop
    /// switch. This logs the request and has no effect.
    pub fn set_dac_operation_state(&self, state: OperationState) {
        log::info!("set_dac_operation_state({state:?}) is reserved and has no effect");
    }

    // --- ADC ---

    pub fn init_adc(&self, channel: usize, max_size: usize) -> Result<(), ApiError> {
        let entry = self
            .shared
            .adc
            .get(channel)
            .ok_or(ApiError::ChannelOutOfRange(channel))?;
        entry.init(max_size);
        Ok(())
    }

    pub fn read_adc(&self, channel: usize) -> Result<Vec<f64>, ApiError> {
        let entry = self
            .shared
            .adc
            .get(channel)
            .ok_or(ApiError::ChannelOutOfRange(channel))?;
        Ok(entry.read())
    }

    pub fn read_adc_last_value(&self, channel: usize) -> Result<Point, ApiError> {
        let entry = self
            .shared
            .adc
            .get(channel)
            .ok_or(ApiError::ChannelOutOfRange(channel))?;
        Ok(entry.last_value())
    }

    pub fn set_adc_callback(&self, channel: usize, cb: AdcCallback) -> Result<(), ApiError> {
        let entry = self
            .shared
            .adc
            .get(channel)
            .ok_or(ApiError::ChannelOutOfRange(channel))?;
        entry.set_callback(cb);
        Ok(())
    }

    // --- Statistics ---

    pub fn reset_statistics(&self) {
        self.shared.stats.lock().unwrap().reset();
        self.shared
            .stats_reset_requested
            .store(true, std::sync::atomic::Ordering::Release);
        self.shared.wake_send_thread();
    }
}
