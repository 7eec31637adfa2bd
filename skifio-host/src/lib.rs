//! Host-side SkifIO device session: the recv/send thread pair, the DAC
//! double buffer, the per-channel ADC queues, and the IOC-facing API
//! surface.

pub mod adc;
pub mod api;
pub mod dac;
pub mod dio;
pub mod session;
pub mod stats;

pub use api::{ApiError, DeviceApi, OperationState};
pub use session::{ChannelError, ChannelRx, ChannelTx, DeviceSession};
