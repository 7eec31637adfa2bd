//! Platform-agnostic pieces of the SkifIO control plane: the wire
//! protocol, the ring/double buffers, and the statistics counters shared
//! by both the MCU firmware (`skifio-mcu`) and the host session
//! (`skifio-host`).
//!
//! `no_std`, no allocator — every buffer here is statically sized, the
//! same way the original firmware never frees any of its buffers.
#![cfg_attr(not(test), no_std)]

pub mod constants;
pub mod double_buffer;
pub mod point;
pub mod proto;
pub mod ring;
pub mod stats;

pub use double_buffer::{DoubleBuffer, PlaybackMode};
pub use point::{adc_code_to_volts, volts_to_dac_code, AdcArray, Point};
pub use proto::{AppMsg, McuMsg, ParseError};
pub use ring::RingBuffer;
pub use stats::{AdcStats, DacStats, Statistics, ValueStats};
